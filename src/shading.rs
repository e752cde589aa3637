//! Per-vertex and per-fragment stages.
//!
//! Every stage is a pure function of its inputs and an immutable parameter
//! struct holding the uniform blocks bound for the draw. Nothing here knows
//! about pass ordering; see [`crate::frame`] for that.

use std::ops::{Add, Mul};

use glam::{Mat3, Vec2, Vec3, Vec4, Vec4Swizzles};
use serde::{Deserialize, Serialize};

use crate::mesh::Vertex;
use crate::shadow_map::{ComparisonSampler, DepthTexture};
use crate::uniforms::{CameraUniform, GlobalLightUniform, ObjectUniform};

/// Fragment shading constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadingConfig {
    /// Fraction of the object colour that survives full occlusion.
    pub ambient: f32,
}

impl ShadingConfig {
    pub const DEFAULT_AMBIENT: f32 = 0.2;
}

impl Default for ShadingConfig {
    fn default() -> Self {
        Self {
            ambient: Self::DEFAULT_AMBIENT,
        }
    }
}

/// Bindings visible to the shadow-depth vertex stage.
#[derive(Debug, Clone, Copy)]
pub struct ShadowDepthParams<'a> {
    pub light: &'a GlobalLightUniform,
    pub object: &'a ObjectUniform,
}

/// Bindings visible to the main vertex stage.
#[derive(Debug, Clone, Copy)]
pub struct MainVertexParams<'a> {
    pub camera: &'a CameraUniform,
    pub object: &'a ObjectUniform,
    pub light: &'a GlobalLightUniform,
}

/// Bindings visible to the main fragment stage.
#[derive(Debug, Clone, Copy)]
pub struct FragmentParams<'a> {
    pub shadow_map: &'a DepthTexture,
    pub sampler: &'a ComparisonSampler,
    pub shading: &'a ShadingConfig,
}

/// Attributes interpolated between the main vertex and fragment stages.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MainVaryings {
    pub color: Vec4,
    pub world_normal: Vec3,
    /// Homogeneous light clip position; `w` is kept for the fragment stage.
    pub light_space_position: Vec4,
}

impl Add for MainVaryings {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            color: self.color + other.color,
            world_normal: self.world_normal + other.world_normal,
            light_space_position: self.light_space_position + other.light_space_position,
        }
    }
}

impl Mul<f32> for MainVaryings {
    type Output = Self;
    fn mul(self, scalar: f32) -> Self {
        Self {
            color: self.color * scalar,
            world_normal: self.world_normal * scalar,
            light_space_position: self.light_space_position * scalar,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MainVertexOutput {
    pub clip_position: Vec4,
    pub varyings: MainVaryings,
}

/// Light clip position of a vertex: `proj_view * world * (position, 1)`.
pub fn shadow_depth_vertex(params: &ShadowDepthParams<'_>, vertex: &Vertex) -> Vec4 {
    params.light.proj_view * (params.object.world * vertex.position.extend(1.0))
}

/// Transforms a vertex for the camera and the light at once.
///
/// The normal goes through the upper 3x3 of the world matrix and is not
/// renormalized.
pub fn main_vertex(params: &MainVertexParams<'_>, vertex: &Vertex) -> MainVertexOutput {
    let world_position = params.object.world * vertex.position.extend(1.0);
    MainVertexOutput {
        clip_position: params.camera.projection * (params.camera.view * world_position),
        varyings: MainVaryings {
            color: params.object.color,
            world_normal: Mat3::from_mat4(params.object.world) * vertex.normal,
            light_space_position: params.light.proj_view * world_position,
        },
    }
}

/// Maps clip-space `xy / w` in `[-1, 1]` to texture coordinates in `[0, 1]`
/// with the V axis flipped.
pub fn light_space_uv(ndc: Vec2) -> Vec2 {
    ndc * Vec2::new(0.5, -0.5) + Vec2::splat(0.5)
}

/// Visibility of a light-space position in `[0, 1]`; `1.0` is fully lit.
///
/// Positions at or behind the light's near plane (`w <= 0`) are treated as
/// lit without dividing.
pub fn shadow_factor(
    light_space_position: Vec4,
    shadow_map: &DepthTexture,
    sampler: &ComparisonSampler,
) -> f32 {
    let w = light_space_position.w;
    if w <= 0.0 {
        return 1.0;
    }
    let depth = light_space_position.z / w;
    let uv = light_space_uv(light_space_position.xy() / w);
    sampler.sample_compare(shadow_map, uv, depth)
}

/// `color * ambient + color * shadow`, applied to all four channels.
pub fn composite(color: Vec4, shadow: f32, ambient: f32) -> Vec4 {
    color * ambient + color * shadow
}

/// Main fragment stage.
pub fn shade_fragment(params: &FragmentParams<'_>, input: &MainVaryings) -> Vec4 {
    let shadow = shadow_factor(input.light_space_position, params.shadow_map, params.sampler);
    composite(input.color, shadow, params.shading.ambient)
}
