use glam::{EulerRot, Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Translation, rotation and scale of a scene entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::default()
        }
    }

    /// Builds a rotation from XYZ Euler angles in degrees, applied Z·Y·X.
    pub fn from_euler_degrees(translation: Vec3, degrees: Vec3, scale: Vec3) -> Self {
        Self {
            translation,
            rotation: Quat::from_euler(
                EulerRot::ZYX,
                degrees.z.to_radians(),
                degrees.y.to_radians(),
                degrees.x.to_radians(),
            ),
            scale,
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation.normalize();
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Viewing direction; entities look down their local -Z axis.
    pub fn look(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn translate_world(&mut self, distance: Vec3) {
        self.translation += distance;
    }

    /// Moves along the local right/up/look axes.
    pub fn translate_local(&mut self, distance: Vec3) {
        let offset = self.right() * distance.x + self.up() * distance.y + self.look() * distance.z;
        self.translate_world(offset);
    }

    pub fn rotate(&mut self, rotation: Quat) {
        self.rotation = (self.rotation * rotation.normalize()).normalize();
    }

    /// Orients the entity so that `look()` points at `target`.
    ///
    /// Leaves the rotation untouched when the target coincides with the
    /// translation.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let Some(forward) = (target - self.translation).try_normalize() else {
            return;
        };
        let up = if forward.cross(up).length_squared() > 1e-6 {
            up
        } else if forward.cross(Vec3::Z).length_squared() > 1e-6 {
            Vec3::Z
        } else {
            Vec3::X
        };
        let right = forward.cross(up).normalize();
        let true_up = right.cross(forward);
        self.rotation = Quat::from_mat3(&Mat3::from_cols(right, true_up, -forward)).normalize();
    }

    /// World-to-local matrix ignoring scale, as used for view transforms.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.translation, self.look(), self.up())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn translate_local_follows_rotation() {
        let mut transform =
            Transform::default().with_rotation(Quat::from_rotation_y(90f32.to_radians()));
        transform.translate_local(Vec3::new(0.0, 0.0, 1.0));
        // Looking down -Z rotated 90 degrees about Y looks down -X.
        assert!(approx(transform.translation, Vec3::new(-1.0, 0.0, 0.0)));
    }

    #[test]
    fn look_at_points_view_direction_at_target() {
        let mut transform = Transform::from_translation(Vec3::new(0.0, 10.0, 0.0));
        transform.look_at(Vec3::ZERO, Vec3::Y);
        assert!(approx(transform.look(), Vec3::NEG_Y));
        let view_space = transform.view_matrix().transform_point3(Vec3::ZERO);
        assert!(approx(view_space, Vec3::new(0.0, 0.0, -10.0)));
    }

    #[test]
    fn euler_degrees_match_axis_rotation() {
        let transform = Transform::from_euler_degrees(Vec3::ZERO, Vec3::new(-90.0, 0.0, 0.0), Vec3::ONE);
        assert!(approx(transform.look(), Vec3::NEG_Y));
    }

    #[test]
    fn matrix_applies_scale_before_translation() {
        let transform = Transform::from_translation(Vec3::X).with_scale(Vec3::splat(2.0));
        let point = transform.matrix().transform_point3(Vec3::ONE);
        assert!(approx(point, Vec3::new(3.0, 2.0, 2.0)));
    }
}
