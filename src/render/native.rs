use std::num::NonZeroU64;
use std::sync::mpsc;

use anyhow::{anyhow, bail, Context, Result};
use bytemuck::bytes_of;
use log::{debug, info, warn};
use wgpu::util::DeviceExt;

use crate::bindings::{
    self, BindingSlot, ResourceKind, Visibility, MAIN_PASS_LAYOUT, NORMAL_LOCATION,
    POSITION_LOCATION, SHADOW_PASS_LAYOUT,
};
use crate::config::RenderConfig;
use crate::frame::{Draw, RenderScene};
use crate::mesh::{Mesh, Vertex};
use crate::raster::CullMode;
use crate::shadow_map::{AddressMode, BorderColor, CompareFunction, FilterMode, SamplerConfig};

use super::shared::{main_shader, SHADOW_SHADER};

const SHADOW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Image read back from the GPU after both passes.
#[derive(Debug, Clone)]
pub struct GpuFrame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 rows, top row first.
    pub rgba: Vec<u8>,
}

/// Offscreen wgpu renderer running the shadow-depth pass and the main pass
/// in one command buffer.
pub struct GpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: RenderConfig,
    shadow_pipeline: wgpu::RenderPipeline,
    main_pipeline: wgpu::RenderPipeline,
    shadow_layouts: Vec<wgpu::BindGroupLayout>,
    main_layouts: Vec<wgpu::BindGroupLayout>,
    shadow_texture: wgpu::Texture,
    shadow_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

impl GpuRenderer {
    /// Creates a headless device and both pipelines.
    pub async fn new(config: RenderConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            bail!("render target {}x{} has no pixels", config.width, config.height);
        }
        if config.shadow_map_size == 0 {
            bail!("shadow map size must be positive");
        }
        if !config.shading.ambient.is_finite() {
            bail!("ambient term {} is not finite", config.shading.ambient);
        }
        for layout in [MAIN_PASS_LAYOUT, SHADOW_PASS_LAYOUT] {
            bindings::validate_layout(layout)?;
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;
        info!("using GPU adapter {}", adapter.get_info().name);

        let mut sampler_config = config.sampler;
        let mut required_features = wgpu::Features::empty();
        if sampler_config.address_mode == AddressMode::ClampToBorder {
            if adapter
                .features()
                .contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER)
            {
                required_features |= wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER;
            } else {
                warn!("adapter lacks clamp-to-border sampling, falling back to clamp-to-edge");
                sampler_config.address_mode = AddressMode::ClampToEdge;
            }
        }

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("shadow-pipeline-device"),
            required_features,
            required_limits: wgpu::Limits::default(),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .context("failed to create GPU device")?;

        let shadow_layouts = create_layouts(&device, SHADOW_PASS_LAYOUT, "shadow");
        let main_layouts = create_layouts(&device, MAIN_PASS_LAYOUT, "main");

        let shadow_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shadow-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADOW_SHADER.into()),
        });
        let main_source = main_shader(config.shading.ambient);
        let main_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("main-shader"),
            source: wgpu::ShaderSource::Wgsl(main_source.into()),
        });

        let shadow_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("shadow-pipeline-layout"),
                bind_group_layouts: &shadow_layouts.iter().collect::<Vec<_>>(),
                push_constant_ranges: &[],
            });
        let main_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("main-pipeline-layout"),
            bind_group_layouts: &main_layouts.iter().collect::<Vec<_>>(),
            push_constant_ranges: &[],
        });

        let shadow_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("shadow-pipeline"),
            layout: Some(&shadow_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shadow_module,
                entry_point: Some("vs_shadow"),
                compilation_options: Default::default(),
                buffers: &[vertex_layout()],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: SHADOW_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: wgpu::DepthBiasState {
                    constant: depth_bias_units(config.depth_bias.constant),
                    slope_scale: config.depth_bias.slope_scale,
                    clamp: config.depth_bias.clamp,
                },
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: None,
            multiview: None,
            cache: None,
        });

        let main_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("main-pipeline"),
            layout: Some(&main_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &main_module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[vertex_layout()],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: cull_face(config.main_cull_mode),
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &main_module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        let shadow_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow-map"),
            size: wgpu::Extent3d {
                width: config.shadow_map_size,
                height: config.shadow_map_size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHADOW_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let shadow_view = shadow_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = create_comparison_sampler(&device, &sampler_config);

        Ok(Self {
            device,
            queue,
            config,
            shadow_pipeline,
            main_pipeline,
            shadow_layouts,
            main_layouts,
            shadow_texture,
            shadow_view,
            sampler,
        })
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Renders `scene` and blocks until the colour target is read back.
    pub fn render(&self, scene: &RenderScene) -> Result<GpuFrame> {
        scene.validate()?;
        let RenderConfig { width, height, .. } = self.config;

        let color_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("color-target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mesh_buffers: Vec<MeshBuffers> = scene
            .meshes
            .iter()
            .enumerate()
            .map(|(index, mesh)| MeshBuffers::from_mesh(&self.device, mesh, &format!("mesh-{index}")))
            .collect();

        let camera_buffer = self.uniform_buffer("camera-uniform", bytes_of(&scene.camera));
        let light_buffer = self.uniform_buffer("light-uniform", bytes_of(&scene.light));
        let object_buffers: Vec<wgpu::Buffer> = scene
            .draws
            .iter()
            .map(|draw| self.uniform_buffer(&format!("{}-object", draw.name), bytes_of(&draw.object)))
            .collect();

        let resources = PassResources {
            camera: &camera_buffer,
            light: &light_buffer,
            shadow_view: &self.shadow_view,
            sampler: &self.sampler,
        };
        let shadow_globals = self.bind_group(SHADOW_PASS_LAYOUT, &self.shadow_layouts, 0, &resources, None)?;
        let main_camera = self.bind_group(MAIN_PASS_LAYOUT, &self.main_layouts, 0, &resources, None)?;
        let main_light = self.bind_group(MAIN_PASS_LAYOUT, &self.main_layouts, 2, &resources, None)?;
        let main_shadow = self.bind_group(MAIN_PASS_LAYOUT, &self.main_layouts, 3, &resources, None)?;
        let shadow_objects = object_buffers
            .iter()
            .map(|buffer| self.bind_group(SHADOW_PASS_LAYOUT, &self.shadow_layouts, 1, &resources, Some(buffer)))
            .collect::<Result<Vec<_>>>()?;
        let main_objects = object_buffers
            .iter()
            .map(|buffer| self.bind_group(MAIN_PASS_LAYOUT, &self.main_layouts, 1, &resources, Some(buffer)))
            .collect::<Result<Vec<_>>>()?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shadow-pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.shadow_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.shadow_pipeline);
            pass.set_bind_group(0, &shadow_globals, &[]);
            draw_all(&mut pass, &scene.draws, &mesh_buffers, &shadow_objects, 1);
        }

        // The shadow pass has ended; wgpu inserts the attachment-to-sampled
        // transition before the next pass reads the texture.
        {
            let clear = self.config.clear_color;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("main-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &color_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(clear.x),
                            g: f64::from(clear.y),
                            b: f64::from(clear.z),
                            a: f64::from(clear.w),
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.main_pipeline);
            pass.set_bind_group(0, &main_camera, &[]);
            pass.set_bind_group(2, &main_light, &[]);
            pass.set_bind_group(3, &main_shadow, &[]);
            draw_all(&mut pass, &scene.draws, &mesh_buffers, &main_objects, 1);
        }

        let readback = Readback::new(&self.device, width, height);
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &color_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(readback.padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        debug!(
            "submitted shadow and main passes for {} draws ({}x{} shadow map)",
            scene.draws.len(),
            self.shadow_texture.width(),
            self.shadow_texture.height()
        );

        let rgba = readback.read(&self.device)?;
        Ok(GpuFrame {
            width,
            height,
            rgba,
        })
    }

    fn uniform_buffer(&self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
    }

    /// Builds the bind group for `set` of `layout`; `object` fills the
    /// per-object uniform slot.
    fn bind_group(
        &self,
        layout: &[BindingSlot],
        group_layouts: &[wgpu::BindGroupLayout],
        set: u32,
        resources: &PassResources<'_>,
        object: Option<&wgpu::Buffer>,
    ) -> Result<wgpu::BindGroup> {
        let slots = bindings::slots_in_set(layout, set);
        let entries = slots
            .iter()
            .map(|slot| -> Result<wgpu::BindGroupEntry> {
                let resource = match slot.resource {
                    ResourceKind::CameraUniform => resources.camera.as_entire_binding(),
                    ResourceKind::GlobalLightUniform => resources.light.as_entire_binding(),
                    ResourceKind::ObjectUniform => object
                        .ok_or_else(|| anyhow!("set {set} needs an object uniform"))?
                        .as_entire_binding(),
                    ResourceKind::DepthTexture2d => {
                        wgpu::BindingResource::TextureView(resources.shadow_view)
                    }
                    ResourceKind::ComparisonSampler => {
                        wgpu::BindingResource::Sampler(resources.sampler)
                    }
                };
                Ok(wgpu::BindGroupEntry {
                    binding: slot.binding,
                    resource,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let group_layout = group_layouts
            .get(set as usize)
            .ok_or_else(|| anyhow!("no bind group layout for set {set}"))?;
        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pass-bind-group"),
            layout: group_layout,
            entries: &entries,
        }))
    }
}

struct PassResources<'a> {
    camera: &'a wgpu::Buffer,
    light: &'a wgpu::Buffer,
    shadow_view: &'a wgpu::TextureView,
    sampler: &'a wgpu::Sampler,
}

fn draw_all(
    pass: &mut wgpu::RenderPass<'_>,
    draws: &[Draw],
    meshes: &[MeshBuffers],
    objects: &[wgpu::BindGroup],
    object_set: u32,
) {
    for (draw, object) in draws.iter().zip(objects) {
        let mesh = &meshes[draw.mesh];
        pass.set_vertex_buffer(0, mesh.vertex.slice(..));
        pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
        pass.set_bind_group(object_set, object, &[]);
        pass.draw_indexed(0..mesh.index_count, 0, 0..1);
    }
}

fn create_layouts(
    device: &wgpu::Device,
    layout: &[BindingSlot],
    label: &str,
) -> Vec<wgpu::BindGroupLayout> {
    (0..bindings::set_count(layout))
        .map(|set| {
            let entries: Vec<_> = bindings::slots_in_set(layout, set)
                .iter()
                .map(layout_entry)
                .collect();
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{label}-set-{set}")),
                entries: &entries,
            })
        })
        .collect()
}

fn layout_entry(slot: &BindingSlot) -> wgpu::BindGroupLayoutEntry {
    let ty = match slot.resource {
        ResourceKind::DepthTexture2d => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Depth,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        ResourceKind::ComparisonSampler => {
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison)
        }
        uniform => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: uniform.uniform_size().and_then(NonZeroU64::new),
        },
    };
    wgpu::BindGroupLayoutEntry {
        binding: slot.binding,
        visibility: shader_stages(slot.visibility),
        ty,
        count: None,
    }
}

fn shader_stages(visibility: Visibility) -> wgpu::ShaderStages {
    match visibility {
        Visibility::Vertex => wgpu::ShaderStages::VERTEX,
        Visibility::Fragment => wgpu::ShaderStages::FRAGMENT,
        Visibility::VertexFragment => wgpu::ShaderStages::VERTEX_FRAGMENT,
    }
}

fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] = [
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x3,
            offset: 0,
            shader_location: POSITION_LOCATION,
        },
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x3,
            offset: (3 * std::mem::size_of::<f32>()) as u64,
            shader_location: NORMAL_LOCATION,
        },
    ];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

fn create_comparison_sampler(device: &wgpu::Device, config: &SamplerConfig) -> wgpu::Sampler {
    let address_mode = match config.address_mode {
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        AddressMode::ClampToBorder => wgpu::AddressMode::ClampToBorder,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
    };
    let filter = match config.filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    };
    let border_color = match config.border_color {
        BorderColor::OpaqueWhite => wgpu::SamplerBorderColor::OpaqueWhite,
        BorderColor::OpaqueBlack => wgpu::SamplerBorderColor::OpaqueBlack,
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("shadow-sampler"),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: filter,
        min_filter: filter,
        compare: Some(compare_function(config.compare)),
        border_color: (config.address_mode == AddressMode::ClampToBorder).then_some(border_color),
        ..Default::default()
    })
}

fn compare_function(compare: CompareFunction) -> wgpu::CompareFunction {
    match compare {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

fn cull_face(mode: CullMode) -> Option<wgpu::Face> {
    match mode {
        CullMode::None => None,
        CullMode::Front => Some(wgpu::Face::Front),
        CullMode::Back => Some(wgpu::Face::Back),
    }
}

/// Converts a normalized constant bias into the integer units wgpu expects,
/// assuming 24 bits of depth precision.
fn depth_bias_units(constant: f32) -> i32 {
    (constant * (1u32 << 24) as f32).round() as i32
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &Mesh, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: mesh.indices.len() as u32,
        }
    }
}

struct Readback {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
}

impl Readback {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let padded_bytes_per_row = padded_row_bytes(width);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("color-readback"),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            width,
            height,
            padded_bytes_per_row,
        }
    }

    fn read(self, device: &wgpu::Device) -> Result<Vec<u8>> {
        let slice = self.buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let mapped = loop {
            device
                .poll(wgpu::PollType::Poll)
                .context("failed to poll GPU device")?;
            match receiver.try_recv() {
                Ok(result) => break result,
                Err(mpsc::TryRecvError::Empty) => std::thread::yield_now(),
                Err(mpsc::TryRecvError::Disconnected) => {
                    bail!("readback callback was dropped")
                }
            }
        };
        mapped.context("failed to map readback buffer")?;

        let row_bytes = self.width as usize * 4;
        let mut rgba = Vec::with_capacity(row_bytes * self.height as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(self.padded_bytes_per_row as usize) {
                rgba.extend_from_slice(&row[..row_bytes]);
            }
        }
        self.buffer.unmap();
        Ok(rgba)
    }
}

fn padded_row_bytes(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readback_rows_are_aligned() {
        assert_eq!(padded_row_bytes(64), 256);
        assert_eq!(padded_row_bytes(65), 512);
        assert_eq!(padded_row_bytes(800), 3328);
    }

    #[test]
    fn layout_entries_follow_binding_table() {
        let entries: Vec<_> = bindings::slots_in_set(MAIN_PASS_LAYOUT, 3)
            .iter()
            .map(layout_entry)
            .collect();
        assert_eq!(entries.len(), 2);
        assert!(matches!(
            entries[0].ty,
            wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Depth,
                ..
            }
        ));
        assert!(matches!(
            entries[1].ty,
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison)
        ));
        assert_eq!(entries[1].visibility, wgpu::ShaderStages::FRAGMENT);
    }

    #[test]
    fn vertex_layout_matches_vertex_struct() {
        let layout = vertex_layout();
        assert_eq!(layout.array_stride, 24);
        assert_eq!(layout.attributes[1].shader_location, NORMAL_LOCATION);
    }

    #[test]
    fn cull_and_bias_conversions() {
        assert_eq!(cull_face(CullMode::Back), Some(wgpu::Face::Back));
        assert_eq!(cull_face(CullMode::None), None);
        assert_eq!(depth_bias_units(0.0), 0);
        assert!(depth_bias_units(0.0015) > 0);
    }
}
