//! WGSL sources for the two GPU passes.
//!
//! Group and binding indices follow [`crate::bindings::MAIN_PASS_LAYOUT`] and
//! [`crate::bindings::SHADOW_PASS_LAYOUT`].

pub(crate) const SHADOW_SHADER: &str = r#"
struct GlobalLight {
    proj_view: mat4x4<f32>,
    direction: vec4<f32>,
    color: vec4<f32>,
}

struct Object {
    world: mat4x4<f32>,
    color: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> light: GlobalLight;

@group(1) @binding(0)
var<uniform> object: Object;

@vertex
fn vs_shadow(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return light.proj_view * (object.world * vec4<f32>(position, 1.0));
}
"#;

const MAIN_SHADER_TEMPLATE: &str = r#"
const AMBIENT: f32 = {{ambient}};

struct Camera {
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    position: vec4<f32>,
}

struct Object {
    world: mat4x4<f32>,
    color: vec4<f32>,
}

struct GlobalLight {
    proj_view: mat4x4<f32>,
    direction: vec4<f32>,
    color: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> camera: Camera;

@group(1) @binding(0)
var<uniform> object: Object;

@group(2) @binding(0)
var<uniform> light: GlobalLight;

@group(3) @binding(0)
var shadow_map: texture_depth_2d;

@group(3) @binding(1)
var shadow_sampler: sampler_comparison;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) world_normal: vec3<f32>,
    @location(2) light_space_position: vec4<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = object.world * vec4<f32>(input.position, 1.0);
    out.clip_position = camera.projection * (camera.view * world_position);
    out.color = object.color;
    out.world_normal = mat3x3<f32>(
        object.world[0].xyz,
        object.world[1].xyz,
        object.world[2].xyz
    ) * input.normal;
    out.light_space_position = light.proj_view * world_position;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let w = input.light_space_position.w;
    let in_front = w > 0.0;
    let safe_w = select(1.0, w, in_front);
    let ndc = input.light_space_position.xyz / safe_w;
    let uv = ndc.xy * vec2<f32>(0.5, -0.5) + vec2<f32>(0.5, 0.5);
    let reference = clamp(ndc.z, 0.0, 1.0);
    let sampled = textureSampleCompareLevel(shadow_map, shadow_sampler, uv, reference);
    let shadow = select(1.0, sampled, in_front);
    return input.color * AMBIENT + input.color * shadow;
}
"#;

/// Main pass shader with `ambient` baked in as a constant.
pub(crate) fn main_shader(ambient: f32) -> String {
    MAIN_SHADER_TEMPLATE.replace("{{ambient}}", &format!("{ambient:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambient_is_a_wgsl_float_literal() {
        assert!(main_shader(0.2).contains("const AMBIENT: f32 = 0.2;"));
        assert!(main_shader(1.0).contains("const AMBIENT: f32 = 1.0;"));
        assert!(!main_shader(0.5).contains("{{ambient}}"));
    }

    #[test]
    fn shaders_follow_binding_tables() {
        use crate::bindings::{locate, ResourceKind, MAIN_PASS_LAYOUT, SHADOW_PASS_LAYOUT};

        let main = main_shader(0.2);
        let expectations = [
            (ResourceKind::CameraUniform, "var<uniform> camera"),
            (ResourceKind::ObjectUniform, "var<uniform> object"),
            (ResourceKind::GlobalLightUniform, "var<uniform> light"),
            (ResourceKind::DepthTexture2d, "var shadow_map"),
            (ResourceKind::ComparisonSampler, "var shadow_sampler"),
        ];
        for (resource, declaration) in expectations {
            let (set, binding) = locate(MAIN_PASS_LAYOUT, resource).unwrap();
            let attribute = format!("@group({set}) @binding({binding})\n{declaration}");
            assert!(main.contains(&attribute), "missing `{attribute}`");
        }

        for (resource, declaration) in expectations.iter().take(3).skip(1) {
            let (set, binding) = locate(SHADOW_PASS_LAYOUT, *resource).unwrap();
            let attribute = format!("@group({set}) @binding({binding})\n{declaration}");
            assert!(SHADOW_SHADER.contains(&attribute), "missing `{attribute}`");
        }
    }
}
