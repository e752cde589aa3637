use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-vertex attributes shared by the shadow-depth and main passes.
///
/// `position` is bound at shader location 0 and `normal` at location 1.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
}

impl Vertex {
    pub const fn new(position: Vec3, normal: Vec3) -> Self {
        Self { position, normal }
    }
}

/// Indexed triangle list in local space.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Axis aligned box centred on the origin with one quad per face.
    pub fn cube(x: f32, y: f32, z: f32) -> Self {
        let (hx, hy, hz) = (0.5 * x, 0.5 * y, 0.5 * z);
        let faces: [(Vec3, [Vec3; 4]); 6] = [
            (
                Vec3::Z,
                [
                    Vec3::new(-hx, -hy, hz),
                    Vec3::new(hx, -hy, hz),
                    Vec3::new(hx, hy, hz),
                    Vec3::new(-hx, hy, hz),
                ],
            ),
            (
                Vec3::NEG_Z,
                [
                    Vec3::new(-hx, hy, -hz),
                    Vec3::new(hx, hy, -hz),
                    Vec3::new(hx, -hy, -hz),
                    Vec3::new(-hx, -hy, -hz),
                ],
            ),
            (
                Vec3::X,
                [
                    Vec3::new(hx, -hy, -hz),
                    Vec3::new(hx, hy, -hz),
                    Vec3::new(hx, hy, hz),
                    Vec3::new(hx, -hy, hz),
                ],
            ),
            (
                Vec3::NEG_X,
                [
                    Vec3::new(-hx, -hy, hz),
                    Vec3::new(-hx, hy, hz),
                    Vec3::new(-hx, hy, -hz),
                    Vec3::new(-hx, -hy, -hz),
                ],
            ),
            (
                Vec3::Y,
                [
                    Vec3::new(hx, hy, -hz),
                    Vec3::new(-hx, hy, -hz),
                    Vec3::new(-hx, hy, hz),
                    Vec3::new(hx, hy, hz),
                ],
            ),
            (
                Vec3::NEG_Y,
                [
                    Vec3::new(hx, -hy, hz),
                    Vec3::new(-hx, -hy, hz),
                    Vec3::new(-hx, -hy, -hz),
                    Vec3::new(hx, -hy, -hz),
                ],
            ),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, corners) in faces {
            let base = vertices.len() as u32;
            vertices.extend(corners.iter().map(|&corner| Vertex::new(corner, normal)));
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        Self { vertices, indices }
    }

    /// Flat quad in the XZ plane facing +Y.
    pub fn plane(width: f32, depth: f32) -> Self {
        let (hw, hd) = (0.5 * width, 0.5 * depth);
        let vertices = vec![
            Vertex::new(Vec3::new(-hw, 0.0, -hd), Vec3::Y),
            Vertex::new(Vec3::new(-hw, 0.0, hd), Vec3::Y),
            Vertex::new(Vec3::new(hw, 0.0, -hd), Vec3::Y),
            Vertex::new(Vec3::new(hw, 0.0, hd), Vec3::Y),
        ];
        Self {
            vertices,
            indices: vec![0, 1, 2, 2, 1, 3],
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Reports the first structural problem, if any.
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.indices.len() % 3 != 0 {
            return Err(MeshError::IncompleteTriangle {
                index_count: self.indices.len(),
            });
        }
        let vertex_count = self.vertices.len();
        if let Some(&index) = self
            .indices
            .iter()
            .find(|&&index| index as usize >= vertex_count)
        {
            return Err(MeshError::IndexOutOfRange {
                index,
                vertex_count,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeshError {
    #[error("index count {index_count} is not a multiple of three")]
    IncompleteTriangle { index_count: usize },
    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
}
