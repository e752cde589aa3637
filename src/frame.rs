//! Two-pass frame orchestration on the software rasterizer.
//!
//! The shadow-depth pass hands back a [`WrittenShadowMap`], which cannot be
//! sampled. Only [`WrittenShadowMap::barrier`] turns it into a
//! [`ShadowMapView`], the type the main pass accepts, so a frame cannot read
//! the shadow map before every depth-pass draw has been recorded. The view
//! also remembers which light matrix filled it and the main pass refuses to
//! run against a different one.

use glam::{Mat4, Vec4};
use log::{debug, trace};
use thiserror::Error;

use crate::config::RenderConfig;
use crate::mesh::{Mesh, MeshError};
use crate::raster::{ClipVertex, DepthBias, DepthOnly, RasterState, RasterStats, Rasterizer};
use crate::shading::{
    composite, main_vertex, shadow_depth_vertex, shadow_factor, FragmentParams, MainVaryings,
    MainVertexParams, ShadingConfig, ShadowDepthParams,
};
use crate::shadow_map::{ComparisonSampler, DepthTexture, SamplerConfig};
use crate::uniforms::{CameraUniform, GlobalLightUniform, ObjectUniform};

/// Frame rejected by the orchestrator before or between passes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("shadow map extent {width}x{height} has no texels")]
    ShadowMapExtent { width: u32, height: u32 },
    #[error("render target extent {width}x{height} has no pixels")]
    TargetExtent { width: u32, height: u32 },
    #[error("colour target is {color:?} but depth target is {depth:?}")]
    TargetMismatch { color: (u32, u32), depth: (u32, u32) },
    #[error("draw {draw} references mesh {mesh}, but only {available} meshes are loaded")]
    MissingMesh {
        draw: usize,
        mesh: usize,
        available: usize,
    },
    #[error("mesh {mesh} is invalid")]
    InvalidMesh {
        mesh: usize,
        #[source]
        reason: MeshError,
    },
    #[error("shadow map was rendered with a different light projection than the one bound for the main pass")]
    LightMismatch,
}

/// One draw call: a mesh plus its per-object uniform block.
#[derive(Debug, Clone, PartialEq)]
pub struct Draw {
    pub name: String,
    pub mesh: usize,
    pub object: ObjectUniform,
}

/// Everything a frame needs, already resolved into uniform blocks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderScene {
    pub camera: CameraUniform,
    pub light: GlobalLightUniform,
    pub meshes: Vec<Mesh>,
    pub draws: Vec<Draw>,
}

impl RenderScene {
    /// Checks that every draw references a well-formed mesh.
    pub fn validate(&self) -> Result<(), FrameError> {
        for (mesh_index, mesh) in self.meshes.iter().enumerate() {
            mesh.validate().map_err(|reason| FrameError::InvalidMesh {
                mesh: mesh_index,
                reason,
            })?;
        }
        for (draw_index, draw) in self.draws.iter().enumerate() {
            if draw.mesh >= self.meshes.len() {
                return Err(FrameError::MissingMesh {
                    draw: draw_index,
                    mesh: draw.mesh,
                    available: self.meshes.len(),
                });
            }
        }
        Ok(())
    }
}

/// Shadow map straight out of the depth pass; not yet sampleable.
#[derive(Debug)]
pub struct WrittenShadowMap {
    texture: DepthTexture,
    light_proj_view: Mat4,
    stats: RasterStats,
}

impl WrittenShadowMap {
    /// Ends the depth pass and publishes its writes to later passes.
    pub fn barrier(self) -> ShadowMapView {
        debug!(
            "shadow map barrier: {}x{} texels, {} fragments written",
            self.texture.width(),
            self.texture.height(),
            self.stats.fragments
        );
        ShadowMapView {
            texture: self.texture,
            light_proj_view: self.light_proj_view,
            stats: self.stats,
        }
    }
}

/// Read-only shadow map that the main pass may sample.
#[derive(Debug, Clone)]
pub struct ShadowMapView {
    texture: DepthTexture,
    light_proj_view: Mat4,
    stats: RasterStats,
}

impl ShadowMapView {
    pub fn texture(&self) -> &DepthTexture {
        &self.texture
    }

    /// Light matrix the depth pass rendered with.
    pub fn light_proj_view(&self) -> Mat4 {
        self.light_proj_view
    }

    pub fn stats(&self) -> RasterStats {
        self.stats
    }

    /// Gives the texture back for reuse in a later frame.
    pub fn into_texture(self) -> DepthTexture {
        self.texture
    }
}

/// Depth-only pass rendering every draw from the light.
#[derive(Debug, Clone, Copy)]
pub struct ShadowDepthPass {
    raster: Rasterizer,
}

impl ShadowDepthPass {
    pub fn new(depth_bias: DepthBias) -> Self {
        Self {
            raster: Rasterizer::new(RasterState {
                depth_bias,
                ..RasterState::default()
            }),
        }
    }

    /// Clears `target` and fills it with the nearest light-space depth of
    /// every draw.
    pub fn execute(
        &self,
        light: &GlobalLightUniform,
        scene: &RenderScene,
        mut target: DepthTexture,
    ) -> Result<WrittenShadowMap, FrameError> {
        if target.is_empty() {
            return Err(FrameError::ShadowMapExtent {
                width: target.width(),
                height: target.height(),
            });
        }
        scene.validate()?;

        target.clear(DepthTexture::CLEAR_DEPTH);
        let mut stats = RasterStats::default();
        for draw in &scene.draws {
            let mesh = &scene.meshes[draw.mesh];
            let params = ShadowDepthParams {
                light,
                object: &draw.object,
            };
            let vertices: Vec<ClipVertex<DepthOnly>> = mesh
                .vertices
                .iter()
                .map(|vertex| ClipVertex {
                    position: shadow_depth_vertex(&params, vertex),
                    varying: DepthOnly,
                })
                .collect();
            let draw_stats = self
                .raster
                .draw_indexed(&vertices, &mesh.indices, &mut target, |_| {});
            trace!("shadow draw {}: {:?}", draw.name, draw_stats);
            stats += draw_stats;
        }
        debug!(
            "shadow pass: {} draws, {} triangles, {} fragments",
            scene.draws.len(),
            stats.triangles,
            stats.fragments
        );

        Ok(WrittenShadowMap {
            texture: target,
            light_proj_view: light.proj_view,
            stats,
        })
    }
}

/// RGBA `f32` colour attachment, row-major from the top-left pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTarget {
    width: u32,
    height: u32,
    pixels: Vec<Vec4>,
}

impl ColorTarget {
    pub fn new(width: u32, height: u32, clear: Vec4) -> Self {
        Self {
            width,
            height,
            pixels: vec![clear; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Vec4 {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    fn set_pixel(&mut self, x: u32, y: u32, color: Vec4) {
        let index = y as usize * self.width as usize + x as usize;
        self.pixels[index] = color;
    }

    pub fn clear(&mut self, color: Vec4) {
        self.pixels.fill(color);
    }

    /// Clamps every channel into `[0, 1]` and quantizes to 8 bits.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|pixel| {
                pixel
                    .to_array()
                    .map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8)
            })
            .collect()
    }
}

/// Visibility gathered for a single draw in the main pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DrawVisibility {
    pub name: String,
    pub fragments: usize,
    pub fully_lit: usize,
    pub fully_shadowed: usize,
    visibility_sum: f64,
}

impl DrawVisibility {
    /// Average shadow factor over the draw's visible fragments.
    pub fn mean_visibility(&self) -> Option<f32> {
        (self.fragments > 0).then(|| (self.visibility_sum / self.fragments as f64) as f32)
    }

    fn record(&mut self, visibility: f32) {
        self.fragments += 1;
        self.visibility_sum += f64::from(visibility);
        if visibility >= 1.0 {
            self.fully_lit += 1;
        } else if visibility <= 0.0 {
            self.fully_shadowed += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MainPassStats {
    pub raster: RasterStats,
    pub draws: Vec<DrawVisibility>,
}

impl MainPassStats {
    pub fn fully_lit(&self) -> usize {
        self.draws.iter().map(|draw| draw.fully_lit).sum()
    }

    pub fn fully_shadowed(&self) -> usize {
        self.draws.iter().map(|draw| draw.fully_shadowed).sum()
    }

    pub fn partially_lit(&self) -> usize {
        self.raster.fragments - self.fully_lit() - self.fully_shadowed()
    }

    pub fn draw(&self, name: &str) -> Option<&DrawVisibility> {
        self.draws.iter().find(|draw| draw.name == name)
    }
}

/// Camera pass that reprojects every fragment into the shadow map.
#[derive(Debug, Clone, Copy)]
pub struct MainPass {
    raster: Rasterizer,
    sampler: ComparisonSampler,
    shading: ShadingConfig,
}

impl MainPass {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            raster: Rasterizer::new(RasterState {
                cull_mode: config.main_cull_mode,
                ..RasterState::default()
            }),
            sampler: ComparisonSampler::new(config.sampler),
            shading: config.shading,
        }
    }

    pub fn sampler_config(&self) -> SamplerConfig {
        self.sampler.config
    }

    /// Draws every object into `color`, depth-testing against `depth`.
    ///
    /// `light` must be the exact block the shadow map was rendered with.
    pub fn execute(
        &self,
        scene: &RenderScene,
        shadow_map: &ShadowMapView,
        color: &mut ColorTarget,
        depth: &mut DepthTexture,
    ) -> Result<MainPassStats, FrameError> {
        if color.width() == 0 || color.height() == 0 {
            return Err(FrameError::TargetExtent {
                width: color.width(),
                height: color.height(),
            });
        }
        if (color.width(), color.height()) != (depth.width(), depth.height()) {
            return Err(FrameError::TargetMismatch {
                color: (color.width(), color.height()),
                depth: (depth.width(), depth.height()),
            });
        }
        if shadow_map.light_proj_view() != scene.light.proj_view {
            return Err(FrameError::LightMismatch);
        }
        scene.validate()?;

        depth.clear(DepthTexture::CLEAR_DEPTH);
        let fragment_params = FragmentParams {
            shadow_map: shadow_map.texture(),
            sampler: &self.sampler,
            shading: &self.shading,
        };
        let mut stats = MainPassStats::default();
        for draw in &scene.draws {
            let mesh = &scene.meshes[draw.mesh];
            let params = MainVertexParams {
                camera: &scene.camera,
                object: &draw.object,
                light: &scene.light,
            };
            let vertices: Vec<ClipVertex<MainVaryings>> = mesh
                .vertices
                .iter()
                .map(|vertex| {
                    let out = main_vertex(&params, vertex);
                    ClipVertex {
                        position: out.clip_position,
                        varying: out.varyings,
                    }
                })
                .collect();

            // Fragments that later lose the depth test are overwritten in
            // `color`, but still counted here.
            let mut visibility = DrawVisibility {
                name: draw.name.clone(),
                ..DrawVisibility::default()
            };
            let draw_stats = self.raster.draw_indexed(&vertices, &mesh.indices, depth, |fragment| {
                let shadow = shadow_factor(
                    fragment.varying.light_space_position,
                    fragment_params.shadow_map,
                    fragment_params.sampler,
                );
                visibility.record(shadow);
                color.set_pixel(
                    fragment.x,
                    fragment.y,
                    composite(fragment.varying.color, shadow, fragment_params.shading.ambient),
                );
            });
            trace!("main draw {}: {:?}", draw.name, draw_stats);
            stats.raster += draw_stats;
            stats.draws.push(visibility);
        }
        debug!(
            "main pass: {} fragments ({} lit, {} shadowed)",
            stats.raster.fragments,
            stats.fully_lit(),
            stats.fully_shadowed()
        );
        Ok(stats)
    }
}

/// Output of [`SoftwareRenderer::render`].
#[derive(Debug, Clone)]
pub struct Frame {
    pub color: ColorTarget,
    pub shadow_map: ShadowMapView,
    pub stats: MainPassStats,
}

/// Runs the shadow-depth pass, the barrier and the main pass in order.
#[derive(Debug, Clone)]
pub struct SoftwareRenderer {
    config: RenderConfig,
    shadow_pass: ShadowDepthPass,
    main_pass: MainPass,
}

impl SoftwareRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            shadow_pass: ShadowDepthPass::new(config.depth_bias),
            main_pass: MainPass::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn render(&self, scene: &RenderScene) -> Result<Frame, FrameError> {
        let RenderConfig {
            width,
            height,
            shadow_map_size,
            clear_color,
            ..
        } = self.config;

        let shadow_target = DepthTexture::new(shadow_map_size, shadow_map_size);
        let shadow_map = self
            .shadow_pass
            .execute(&scene.light, scene, shadow_target)?
            .barrier();

        let mut color = ColorTarget::new(width, height, clear_color);
        let mut depth = DepthTexture::new(width, height);
        let stats = self
            .main_pass
            .execute(scene, &shadow_map, &mut color, &mut depth)?;

        Ok(Frame {
            color,
            shadow_map,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::{DirectionalLight, LightProjection};
    use glam::Vec3;

    fn overhead_light() -> GlobalLightUniform {
        DirectionalLight::looking_at(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO)
            .with_projection(LightProjection::Orthographic { half_extent: 6.0 })
            .uniform()
    }

    fn floor_scene() -> RenderScene {
        RenderScene {
            camera: crate::camera::PerspectiveCamera::new(
                Vec3::new(0.0, 8.0, 8.0),
                glam::Quat::from_rotation_x(-45f32.to_radians()),
            )
            .uniform(),
            light: overhead_light(),
            meshes: vec![Mesh::plane(10.0, 10.0)],
            draws: vec![Draw {
                name: "floor".into(),
                mesh: 0,
                object: ObjectUniform::new(Mat4::IDENTITY, Vec3::ONE),
            }],
        }
    }

    #[test]
    fn depth_pass_writes_floor_depth() {
        let scene = floor_scene();
        let written = ShadowDepthPass::new(DepthBias::default())
            .execute(&scene.light, &scene, DepthTexture::new(32, 32))
            .unwrap();
        let view = written.barrier();
        let centre = view.texture().texel(16, 16);
        assert!(centre < 1.0, "floor should be closer than the far plane");
        assert!(view.stats().fragments > 0);
    }

    #[test]
    fn main_pass_rejects_mismatched_light() {
        let scene = floor_scene();
        let view = ShadowDepthPass::new(DepthBias::default())
            .execute(&scene.light, &scene, DepthTexture::new(16, 16))
            .unwrap()
            .barrier();
        let mut moved = scene.clone();
        moved.light = DirectionalLight::looking_at(Vec3::new(1.0, 10.0, 0.0), Vec3::ZERO).uniform();
        let pass = MainPass::new(&RenderConfig::default());
        let mut color = ColorTarget::new(8, 8, Vec4::ZERO);
        let mut depth = DepthTexture::new(8, 8);
        let err = pass
            .execute(&moved, &view, &mut color, &mut depth)
            .unwrap_err();
        assert_eq!(err, FrameError::LightMismatch);
    }

    #[test]
    fn empty_shadow_map_is_rejected() {
        let scene = floor_scene();
        let err = ShadowDepthPass::new(DepthBias::default())
            .execute(&scene.light, &scene, DepthTexture::new(0, 512))
            .unwrap_err();
        assert_eq!(err, FrameError::ShadowMapExtent { width: 0, height: 512 });
    }

    #[test]
    fn mismatched_targets_are_rejected() {
        let scene = floor_scene();
        let view = ShadowDepthPass::new(DepthBias::default())
            .execute(&scene.light, &scene, DepthTexture::new(16, 16))
            .unwrap()
            .barrier();
        let pass = MainPass::new(&RenderConfig::default());
        let mut color = ColorTarget::new(8, 8, Vec4::ZERO);
        let mut depth = DepthTexture::new(4, 8);
        assert!(matches!(
            pass.execute(&scene, &view, &mut color, &mut depth),
            Err(FrameError::TargetMismatch { .. })
        ));
    }

    #[test]
    fn missing_mesh_is_rejected() {
        let mut scene = floor_scene();
        scene.draws[0].mesh = 3;
        let err = SoftwareRenderer::new(RenderConfig::default().with_size(8, 8))
            .render(&scene)
            .unwrap_err();
        assert_eq!(
            err,
            FrameError::MissingMesh {
                draw: 0,
                mesh: 3,
                available: 1
            }
        );
    }

    #[test]
    fn malformed_mesh_is_rejected_with_its_cause() {
        let mut scene = floor_scene();
        scene.meshes[0].indices.push(0);
        let err = SoftwareRenderer::new(RenderConfig::default().with_size(8, 8))
            .render(&scene)
            .unwrap_err();
        assert_eq!(
            err,
            FrameError::InvalidMesh {
                mesh: 0,
                reason: MeshError::IncompleteTriangle { index_count: 7 },
            }
        );
        let cause = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(cause.as_deref(), Some("index count 7 is not a multiple of three"));
    }

    #[test]
    fn unoccluded_floor_is_lit() {
        let config = RenderConfig {
            shadow_map_size: 128,
            ..RenderConfig::default().with_size(64, 48)
        };
        let frame = SoftwareRenderer::new(config).render(&floor_scene()).unwrap();
        let floor = frame.stats.draw("floor").unwrap();
        assert!(floor.fragments > 0);
        assert!(floor.mean_visibility().unwrap() > 0.99);
        assert_eq!(frame.stats.fully_shadowed(), 0);
    }

    #[test]
    fn rgba8_conversion_clamps() {
        let target = ColorTarget::new(1, 1, Vec4::new(1.2, 0.5, -0.1, 1.0));
        assert_eq!(target.to_rgba8(), vec![255, 128, 0, 255]);
    }
}
