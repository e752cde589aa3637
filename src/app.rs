use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use glam::{EulerRot, Quat, Vec3};
use log::debug;

use crate::camera::PerspectiveCamera;
use crate::config::RenderConfig;
use crate::frame::{Draw, Frame, RenderScene};
use crate::light::{DirectionalLight, LightProjection};
use crate::mesh::Mesh;
use crate::obj::load_obj;
use crate::scene::{ObjectKind, ProjectionKind, Scene, SceneObject};
use crate::transform::Transform;
use crate::uniforms::ObjectUniform;

const DEMO_CAMERA_POSITION: Vec3 = Vec3::new(0.0, 5.5, 5.0);
const DEMO_CAMERA_PITCH_DEGREES: f32 = -45.0;
const DEFAULT_CAMERA_FOV_DEGREES: f32 = 60.0;
const DEFAULT_LIGHT_FOV_DEGREES: f32 = 90.0;

/// Grey floor with three coloured boxes, viewed from above and in front.
pub fn demo_scene() -> Scene {
    let mut floor = SceneObject::new("Floor", ObjectKind::Plane);
    floor.size = Vec3::new(10.0, 0.0, 10.0);
    floor.color = Vec3::splat(0.5);

    let mut red = SceneObject::new("RedCube", ObjectKind::Cube);
    red.color = Vec3::new(1.0, 0.2, 0.2);
    red.position = Vec3::new(0.0, 0.5, 0.0);

    let mut green = SceneObject::new("GreenCube", ObjectKind::Cube);
    green.color = Vec3::new(0.2, 1.0, 0.2);
    green.position = Vec3::new(1.0, 1.25, 1.0);
    green.rotation = euler_degrees(Quat::from_axis_angle(
        Vec3::ONE.normalize(),
        60f32.to_radians(),
    ));

    let mut blue = SceneObject::new("BlueCube", ObjectKind::Cube);
    blue.color = Vec3::new(0.2, 0.2, 1.0);
    blue.position = Vec3::new(-1.0, 0.75, -0.8);
    blue.rotation = euler_degrees(Quat::from_axis_angle(
        Vec3::new(-1.0, 1.0, 0.0).normalize(),
        38f32.to_radians(),
    ));

    let mut camera = SceneObject::new("Camera", ObjectKind::Camera);
    camera.position = DEMO_CAMERA_POSITION;
    camera.rotation = Vec3::new(DEMO_CAMERA_PITCH_DEGREES, 0.0, 0.0);

    let default_light = DirectionalLight::default();
    let mut sun = SceneObject::new("Sun", ObjectKind::Light);
    sun.position = default_light.transform.translation;
    sun.target = Some(Vec3::ZERO);

    Scene {
        settings: RenderConfig::default(),
        objects: vec![camera, sun, floor, red, green, blue],
        base_dir: None,
    }
}

/// Converts a rotation into the scene's Z·Y·X Euler degrees.
fn euler_degrees(rotation: Quat) -> Vec3 {
    let (z, y, x) = rotation.to_euler(EulerRot::ZYX);
    Vec3::new(x.to_degrees(), y.to_degrees(), z.to_degrees())
}

fn object_transform(object: &SceneObject) -> Transform {
    Transform::from_euler_degrees(object.position, object.rotation, object.scale)
}

/// First camera in the scene, or the demo viewpoint when there is none.
pub fn camera_from_objects(scene: &Scene, width: u32, height: u32) -> PerspectiveCamera {
    let (position, rotation, fov) = scene
        .find(ObjectKind::Camera)
        .map(|camera| {
            (
                camera.position,
                object_transform(camera).rotation,
                camera.fov.unwrap_or(DEFAULT_CAMERA_FOV_DEGREES),
            )
        })
        .unwrap_or((
            DEMO_CAMERA_POSITION,
            Quat::from_rotation_x(DEMO_CAMERA_PITCH_DEGREES.to_radians()),
            DEFAULT_CAMERA_FOV_DEGREES,
        ));
    PerspectiveCamera::new(position, rotation)
        .with_fov_degrees(fov)
        .with_viewport(width, height)
}

/// First light in the scene, or the default overhead light.
pub fn light_from_objects(scene: &Scene) -> DirectionalLight {
    let Some(object) = scene.find(ObjectKind::Light) else {
        return DirectionalLight::default();
    };
    let mut light = match object.target {
        Some(target) => DirectionalLight::looking_at(object.position, target),
        None => DirectionalLight {
            transform: Transform::from_euler_degrees(object.position, object.rotation, Vec3::ONE),
            ..DirectionalLight::default()
        },
    };
    light.color = object.color;
    light.projection = match object.projection {
        Some(ProjectionKind::Perspective) => LightProjection::Perspective {
            fov_y_degrees: object.fov.unwrap_or(DEFAULT_LIGHT_FOV_DEGREES),
        },
        Some(ProjectionKind::Orthographic) | None => match object.extent {
            Some(half_extent) => LightProjection::Orthographic { half_extent },
            None => LightProjection::default(),
        },
    };
    light
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MeshKey {
    Cube([u32; 3]),
    Plane([u32; 2]),
    Obj(PathBuf),
}

/// Resolves scene objects into uniform blocks and deduplicated meshes.
pub fn build_render_scene(scene: &Scene, config: &RenderConfig) -> Result<RenderScene> {
    let camera = camera_from_objects(scene, config.width, config.height);
    let light = light_from_objects(scene);

    let mut meshes = Vec::new();
    let mut lookup: HashMap<MeshKey, usize> = HashMap::new();
    let mut draws = Vec::new();
    for object in scene.drawables() {
        let size = object.size;
        let key = match object.kind {
            ObjectKind::Plane => MeshKey::Plane([size.x.to_bits(), size.z.to_bits()]),
            ObjectKind::Mesh => {
                let path = object.mesh.as_deref().unwrap_or_default();
                MeshKey::Obj(scene.resolve_mesh_path(path))
            }
            _ => MeshKey::Cube(size.to_array().map(f32::to_bits)),
        };
        let mesh = match lookup.get(&key) {
            Some(&index) => index,
            None => {
                let mesh = match &key {
                    MeshKey::Plane(_) => Mesh::plane(size.x, size.z),
                    MeshKey::Cube(_) => Mesh::cube(size.x, size.y, size.z),
                    MeshKey::Obj(path) => load_obj(path)
                        .with_context(|| format!("failed to load mesh for `{}`", object.name))?,
                };
                meshes.push(mesh);
                lookup.insert(key, meshes.len() - 1);
                meshes.len() - 1
            }
        };
        debug!("draw {} uses mesh {mesh}", object.name);
        draws.push(Draw {
            name: object.name.clone(),
            mesh,
            object: ObjectUniform::new(object_transform(object).matrix(), object.color),
        });
    }

    Ok(RenderScene {
        camera: camera.uniform(),
        light: light.uniform(),
        meshes,
        draws,
    })
}

pub fn print_scene_summary(scene: &Scene) {
    let lights = scene
        .objects
        .iter()
        .filter(|object| object.kind == ObjectKind::Light)
        .count();
    println!(
        "Loaded scene with {} objects ({} lights)",
        scene.objects.len(),
        lights
    );
    for object in &scene.objects {
        println!(" - {} ({:?})", object.name, object.kind);
    }
}

pub fn print_frame_summary(frame: &Frame) {
    let stats = &frame.stats;
    println!(
        "Shadow pass: {} triangles, {} texels written",
        frame.shadow_map.stats().triangles,
        frame.shadow_map.stats().fragments
    );
    println!(
        "Main pass: {} fragments ({} lit, {} shadowed, {} partial)",
        stats.raster.fragments,
        stats.fully_lit(),
        stats.fully_shadowed(),
        stats.partially_lit()
    );
    for draw in &stats.draws {
        match draw.mean_visibility() {
            Some(visibility) => println!(
                " - {}: {} fragments, mean visibility {:.3}",
                draw.name, draw.fragments, visibility
            ),
            None => println!(" - {}: not visible", draw.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_scene_shares_cube_mesh() {
        let scene = demo_scene();
        let render = build_render_scene(&scene, &RenderConfig::default()).unwrap();
        assert_eq!(render.draws.len(), 4);
        assert_eq!(render.meshes.len(), 2);
        assert_eq!(render.draws[1].mesh, render.draws[2].mesh);
        assert!(render.validate().is_ok());
    }

    #[test]
    fn euler_conversion_round_trips() {
        let rotation = Quat::from_axis_angle(Vec3::new(-1.0, 1.0, 0.0).normalize(), 0.6);
        let object = SceneObject {
            rotation: euler_degrees(rotation),
            ..SceneObject::new("Box", ObjectKind::Cube)
        };
        let rebuilt = object_transform(&object).rotation;
        assert!(rebuilt.angle_between(rotation) < 1e-4);
    }

    #[test]
    fn missing_camera_uses_demo_view() {
        let camera = camera_from_objects(&Scene::default(), 800, 600);
        assert_eq!(camera.transform.translation, DEMO_CAMERA_POSITION);
        assert!((camera.aspect_ratio - 800.0 / 600.0).abs() < 1e-6);
    }

    #[test]
    fn light_projection_follows_object() {
        let mut scene = Scene::default();
        let mut sun = SceneObject::new("Sun", ObjectKind::Light);
        sun.position = Vec3::new(0.0, 10.0, 0.0);
        sun.target = Some(Vec3::ZERO);
        sun.projection = Some(ProjectionKind::Perspective);
        scene.objects.push(sun);
        let light = light_from_objects(&scene);
        assert_eq!(
            light.projection,
            LightProjection::Perspective { fov_y_degrees: 90.0 }
        );
        assert!((light.direction() - Vec3::NEG_Y).length() < 1e-5);

        scene.objects[0].projection = None;
        scene.objects[0].extent = Some(3.0);
        assert_eq!(
            light_from_objects(&scene).projection,
            LightProjection::Orthographic { half_extent: 3.0 }
        );
    }

    #[test]
    fn obj_meshes_load_relative_to_scene() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("tri.obj"),
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n",
        )
        .unwrap();
        let mut scene = Scene {
            base_dir: Some(dir.path().to_path_buf()),
            ..Scene::default()
        };
        let mut tri = SceneObject::new("Tri", ObjectKind::Mesh);
        tri.mesh = Some("tri.obj".into());
        scene.objects.push(tri);
        let render = build_render_scene(&scene, &RenderConfig::default()).unwrap();
        assert_eq!(render.meshes[0].triangle_count(), 1);

        scene.objects[0].mesh = Some("missing.obj".into());
        assert!(build_render_scene(&scene, &RenderConfig::default()).is_err());
    }
}
