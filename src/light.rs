use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::transform::Transform;
use crate::uniforms::GlobalLightUniform;

/// Shape of the shadow frustum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LightProjection {
    /// Parallel rays covering a `2 * half_extent` square.
    Orthographic { half_extent: f32 },
    /// Frustum with a square aspect and the given vertical field of view.
    Perspective { fov_y_degrees: f32 },
}

impl Default for LightProjection {
    fn default() -> Self {
        Self::Orthographic { half_extent: 8.0 }
    }
}

/// Directional light that casts the frame's single shadow map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub transform: Transform,
    pub color: Vec3,
    pub projection: LightProjection,
    pub near_z: f32,
    pub far_z: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        let mut transform = Transform::from_translation(Vec3::new(4.0, 10.0, 3.0));
        transform.look_at(Vec3::ZERO, Vec3::Y);
        Self {
            transform,
            color: Vec3::ONE,
            projection: LightProjection::default(),
            near_z: 0.1,
            far_z: 50.0,
        }
    }
}

impl DirectionalLight {
    /// Places the light at `position` aiming at `target`.
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let mut transform = Transform::from_translation(position);
        transform.look_at(target, Vec3::Y);
        Self {
            transform,
            ..Self::default()
        }
    }

    pub fn with_projection(mut self, projection: LightProjection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    pub fn direction(&self) -> Vec3 {
        self.transform.look()
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.transform.view_matrix()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            LightProjection::Orthographic { half_extent } => {
                let e = half_extent.abs().max(f32::EPSILON);
                Mat4::orthographic_rh(-e, e, -e, e, self.near_z, self.far_z)
            }
            LightProjection::Perspective { fov_y_degrees } => Mat4::perspective_rh(
                fov_y_degrees.clamp(1.0, 179.0).to_radians(),
                1.0,
                self.near_z,
                self.far_z,
            ),
        }
    }

    /// Uniform block shared by the depth pass and the main pass of a frame.
    pub fn uniform(&self) -> GlobalLightUniform {
        GlobalLightUniform {
            proj_view: self.projection_matrix() * self.view_matrix(),
            direction: self.direction().extend(0.0),
            color: self.color.extend(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_projects_to_centre_of_shadow_map() {
        for projection in [
            LightProjection::Orthographic { half_extent: 5.0 },
            LightProjection::Perspective { fov_y_degrees: 90.0 },
        ] {
            let light = DirectionalLight::looking_at(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO)
                .with_projection(projection);
            let clip = light.uniform().proj_view * Vec3::ZERO.extend(1.0);
            assert!(clip.w > 0.0);
            assert!(clip.x.abs() < 1e-4 && clip.y.abs() < 1e-4);
            let depth = clip.z / clip.w;
            assert!(depth > 0.0 && depth < 1.0, "{projection:?} gave depth {depth}");
        }
    }

    #[test]
    fn uniform_carries_direction_and_color() {
        let light = DirectionalLight::looking_at(Vec3::new(0.0, 4.0, 0.0), Vec3::ZERO)
            .with_color(Vec3::new(1.0, 0.5, 0.25));
        let uniform = light.uniform();
        assert!((uniform.direction.truncate() - Vec3::NEG_Y).length() < 1e-5);
        assert_eq!(uniform.direction.w, 0.0);
        assert_eq!(uniform.color.w, 1.0);
    }
}
