//! GPU-resident uniform layouts.
//!
//! Each struct mirrors a WGSL uniform block byte for byte and is uploaded
//! with `bytemuck::bytes_of`. The software passes read the same structs, so
//! both paths see identical matrices.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Camera block bound at set 0 of the main pass.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec4,
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            position: Vec4::ZERO,
        }
    }
}

impl CameraUniform {
    pub fn proj_view(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// Per-draw block bound at set 1 in both passes.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectUniform {
    pub world: Mat4,
    pub color: Vec4,
}

impl Default for ObjectUniform {
    fn default() -> Self {
        Self {
            world: Mat4::IDENTITY,
            color: Vec4::ONE,
        }
    }
}

impl ObjectUniform {
    pub fn new(world: Mat4, color: Vec3) -> Self {
        Self {
            world,
            color: color.extend(1.0),
        }
    }
}

/// Directional light block: set 2 in the main pass, set 0 in the depth pass.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GlobalLightUniform {
    pub proj_view: Mat4,
    pub direction: Vec4,
    pub color: Vec4,
}

impl Default for GlobalLightUniform {
    fn default() -> Self {
        Self {
            proj_view: Mat4::IDENTITY,
            direction: Vec4::ZERO,
            color: Vec4::ONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_match_wgsl_sizes() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 144);
        assert_eq!(std::mem::size_of::<ObjectUniform>(), 80);
        assert_eq!(std::mem::size_of::<GlobalLightUniform>(), 96);
    }

    #[test]
    fn object_color_gets_opaque_alpha() {
        let object = ObjectUniform::new(Mat4::IDENTITY, Vec3::new(1.0, 0.2, 0.2));
        assert_eq!(object.color, Vec4::new(1.0, 0.2, 0.2, 1.0));
        let bytes = bytemuck::bytes_of(&object);
        assert_eq!(&bytes[64..68], &1.0f32.to_ne_bytes());
    }
}
