use glam::{Mat4, Quat, Vec3};

use crate::transform::Transform;
use crate::uniforms::CameraUniform;

/// Perspective camera producing the main pass view and projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveCamera {
    pub transform: Transform,
    pub fov_y_radians: f32,
    pub aspect_ratio: f32,
    pub near_z: f32,
    pub far_z: f32,
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self {
            transform: Transform::default(),
            fov_y_radians: 60f32.to_radians(),
            aspect_ratio: 800.0 / 600.0,
            near_z: 0.001,
            far_z: 1000.0,
        }
    }
}

impl PerspectiveCamera {
    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            transform: Transform::from_translation(translation).with_rotation(rotation),
            ..Self::default()
        }
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.aspect_ratio = width.max(1) as f32 / height.max(1) as f32;
        self
    }

    pub fn with_fov_degrees(mut self, degrees: f32) -> Self {
        self.fov_y_radians = degrees.clamp(1.0, 179.0).to_radians();
        self
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.transform.view_matrix()
    }

    /// Right-handed projection with a `[0, 1]` depth range.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_radians,
            self.aspect_ratio.max(0.01),
            self.near_z,
            self.far_z,
        )
    }

    pub fn uniform(&self) -> CameraUniform {
        CameraUniform {
            view: self.view_matrix(),
            projection: self.projection_matrix(),
            position: self.transform.translation.extend(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_in_front_of_camera_lands_inside_clip_volume() {
        let camera = PerspectiveCamera::new(Vec3::new(0.0, 0.0, 5.0), Quat::IDENTITY);
        let uniform = camera.uniform();
        let clip = uniform.proj_view() * Vec3::ZERO.extend(1.0);
        assert!(clip.w > 0.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&ndc.z));
    }

    #[test]
    fn viewport_sets_aspect_ratio() {
        let camera = PerspectiveCamera::default().with_viewport(1280, 720);
        assert!((camera.aspect_ratio - 1280.0 / 720.0).abs() < 1e-6);
        let degenerate = PerspectiveCamera::default().with_viewport(0, 0);
        assert_eq!(degenerate.aspect_ratio, 1.0);
    }
}
