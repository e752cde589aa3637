//! Forward renderer with a single directional shadow map.
//!
//! A frame runs two passes. The shadow-depth pass renders every object from
//! the light into a depth texture; the main pass renders from the camera and
//! compares each fragment's light-space depth against that texture to decide
//! how lit it is. The stages themselves live in [`shading`], the pass
//! ordering in [`frame`], and [`render`] runs the same passes on the GPU.

pub mod app;
pub mod bindings;
pub mod camera;
pub mod config;
pub mod frame;
pub mod light;
pub mod mesh;
pub mod obj;
pub mod raster;
pub mod render;
pub mod scene;
pub mod shading;
pub mod shadow_map;
pub mod timer;
pub mod transform;
pub mod uniforms;

pub use app::{
    build_render_scene, camera_from_objects, demo_scene, light_from_objects, print_frame_summary,
    print_scene_summary,
};
pub use camera::PerspectiveCamera;
pub use config::RenderConfig;
pub use frame::{
    ColorTarget, Draw, DrawVisibility, Frame, FrameError, MainPass, MainPassStats, RenderScene,
    ShadowDepthPass, ShadowMapView, SoftwareRenderer, WrittenShadowMap,
};
pub use light::{DirectionalLight, LightProjection};
pub use mesh::{Mesh, MeshError, Vertex};
pub use obj::{load_obj, parse_obj};
pub use render::{GpuFrame, GpuRenderer};
pub use scene::{ObjectKind, ProjectionKind, Scene, SceneObject};
pub use shading::ShadingConfig;
pub use shadow_map::{ComparisonSampler, DepthTexture, SamplerConfig};
pub use timer::FrameTimer;
pub use transform::Transform;
pub use uniforms::{CameraUniform, GlobalLightUniform, ObjectUniform};
