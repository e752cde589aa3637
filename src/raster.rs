//! Triangle setup and scan conversion for the software passes.
//!
//! Clip-space triangles are clipped against the near and far planes, divided
//! into normalized device coordinates and mapped onto the target with the Y
//! axis pointing down, so NDC `(-1, 1)` is the top-left texel. Varyings are
//! interpolated perspective-correctly; depth is interpolated linearly in
//! screen space, the way fixed-function hardware does it.

use std::ops::{Add, AddAssign, Mul};

use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::shadow_map::{CompareFunction, DepthTexture};

/// Values carried from the vertex stage to the fragment stage.
pub trait Interpolate: Copy + Add<Output = Self> + Mul<f32, Output = Self> {}

impl<T> Interpolate for T where T: Copy + Add<Output = T> + Mul<f32, Output = T> {}

/// Varying type for passes that only produce depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DepthOnly;

impl Add for DepthOnly {
    type Output = Self;
    fn add(self, _other: Self) -> Self {
        Self
    }
}

impl Mul<f32> for DepthOnly {
    type Output = Self;
    fn mul(self, _scalar: f32) -> Self {
        Self
    }
}

/// Vertex stage output: homogeneous clip position plus varyings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipVertex<V> {
    pub position: Vec4,
    pub varying: V,
}

impl<V: Interpolate> ClipVertex<V> {
    fn lerp(self, other: Self, t: f32) -> Self {
        Self {
            position: self.position.lerp(other.position, t),
            varying: self.varying * (1.0 - t) + other.varying * t,
        }
    }
}

/// A covered sample that passed the depth test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fragment<V> {
    pub x: u32,
    pub y: u32,
    pub depth: f32,
    pub varying: V,
}

/// Which faces are discarded; front faces wind counter-clockwise in NDC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

/// Depth offset applied before the depth test, in normalized depth units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthBias {
    pub constant: f32,
    pub slope_scale: f32,
    /// Upper bound for the total bias; `0.0` disables clamping.
    pub clamp: f32,
}

impl DepthBias {
    fn offset(&self, max_slope: f32) -> f32 {
        let bias = self.constant + self.slope_scale * max_slope;
        if self.clamp > 0.0 {
            bias.min(self.clamp)
        } else {
            bias
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterState {
    pub cull_mode: CullMode,
    pub depth_compare: CompareFunction,
    pub depth_write: bool,
    pub depth_bias: DepthBias,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::None,
            depth_compare: CompareFunction::Less,
            depth_write: true,
            depth_bias: DepthBias::default(),
        }
    }
}

/// Per-draw counters reported back to the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RasterStats {
    pub triangles: usize,
    pub culled: usize,
    pub clipped_away: usize,
    pub fragments: usize,
}

impl AddAssign for RasterStats {
    fn add_assign(&mut self, other: Self) {
        self.triangles += other.triangles;
        self.culled += other.culled;
        self.clipped_away += other.clipped_away;
        self.fragments += other.fragments;
    }
}

const W_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, Default)]
pub struct Rasterizer {
    pub state: RasterState,
}

impl Rasterizer {
    pub fn new(state: RasterState) -> Self {
        Self { state }
    }

    /// Rasterizes an indexed triangle list into `depth`, calling `shade` for
    /// every fragment that passes the depth test.
    ///
    /// Indices must have been validated by the caller.
    pub fn draw_indexed<V, F>(
        &self,
        vertices: &[ClipVertex<V>],
        indices: &[u32],
        depth: &mut DepthTexture,
        mut shade: F,
    ) -> RasterStats
    where
        V: Interpolate,
        F: FnMut(Fragment<V>),
    {
        let mut stats = RasterStats::default();
        for triangle in indices.chunks_exact(3) {
            stats.triangles += 1;
            let corners = [0, 1, 2].map(|i| vertices[triangle[i] as usize]);
            let polygon = clip_polygon(&corners);
            if polygon.len() < 3 {
                stats.clipped_away += 1;
                continue;
            }
            for i in 1..polygon.len() - 1 {
                let fan = [polygon[0], polygon[i], polygon[i + 1]];
                match self.rasterize(&fan, depth, &mut shade) {
                    Some(fragments) => stats.fragments += fragments,
                    // Every fan of a clipped triangle shares its winding.
                    None => {
                        stats.culled += 1;
                        break;
                    }
                }
            }
        }
        stats
    }

    /// Returns `None` when the triangle is culled. Degenerate triangles
    /// produce no fragments.
    fn rasterize<V, F>(
        &self,
        triangle: &[ClipVertex<V>; 3],
        depth: &mut DepthTexture,
        shade: &mut F,
    ) -> Option<usize>
    where
        V: Interpolate,
        F: FnMut(Fragment<V>),
    {
        let width = depth.width();
        let height = depth.height();
        if width == 0 || height == 0 {
            return Some(0);
        }

        let inv_w = triangle.map(|v| 1.0 / v.position.w);
        let screen: [Vec3; 3] = [0, 1, 2].map(|i| {
            let ndc = triangle[i].position.truncate() * inv_w[i];
            Vec3::new(
                (ndc.x * 0.5 + 0.5) * width as f32,
                (0.5 - ndc.y * 0.5) * height as f32,
                ndc.z,
            )
        });
        if screen.iter().any(|p| !p.is_finite()) {
            return Some(0);
        }

        let area = edge(screen[0].truncate(), screen[1].truncate(), screen[2].truncate());
        if area == 0.0 {
            return Some(0);
        }
        // Y points down on screen, so counter-clockwise in NDC has negative area.
        let front_facing = area < 0.0;
        let culled = match self.state.cull_mode {
            CullMode::None => false,
            CullMode::Back => !front_facing,
            CullMode::Front => front_facing,
        };
        if culled {
            return None;
        }

        let bias = {
            let z = Vec3::new(screen[0].z, screen[1].z, screen[2].z);
            let dz_dx = -z.dot(Vec3::new(
                screen[2].y - screen[1].y,
                screen[0].y - screen[2].y,
                screen[1].y - screen[0].y,
            )) / area;
            let dz_dy = z.dot(Vec3::new(
                screen[2].x - screen[1].x,
                screen[0].x - screen[2].x,
                screen[1].x - screen[0].x,
            )) / area;
            self.state.depth_bias.offset(dz_dx.abs().max(dz_dy.abs()))
        };

        let min_x = screen.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
        let max_x = screen.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max);
        let min_y = screen.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
        let max_y = screen.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);
        let x0 = min_x.floor().max(0.0) as u32;
        let y0 = min_y.floor().max(0.0) as u32;
        let x1 = (max_x.ceil() as i64).clamp(0, i64::from(width)) as u32;
        let y1 = (max_y.ceil() as i64).clamp(0, i64::from(height)) as u32;

        let mut fragments = 0;
        for y in y0..y1 {
            for x in x0..x1 {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let b0 = edge(screen[1].truncate(), screen[2].truncate(), p) / area;
                let b1 = edge(screen[2].truncate(), screen[0].truncate(), p) / area;
                let b2 = edge(screen[0].truncate(), screen[1].truncate(), p) / area;
                if b0 < 0.0 || b1 < 0.0 || b2 < 0.0 {
                    continue;
                }

                let z = b0 * screen[0].z + b1 * screen[1].z + b2 * screen[2].z;
                let z = (z + bias).clamp(0.0, 1.0);
                if !self.state.depth_compare.passes(z, depth.texel(x, y)) {
                    continue;
                }
                if self.state.depth_write {
                    depth.set_texel(x, y, z);
                }

                let p0 = b0 * inv_w[0];
                let p1 = b1 * inv_w[1];
                let p2 = b2 * inv_w[2];
                let norm = 1.0 / (p0 + p1 + p2);
                let varying = triangle[0].varying * (p0 * norm)
                    + triangle[1].varying * (p1 * norm)
                    + triangle[2].varying * (p2 * norm);
                shade(Fragment {
                    x,
                    y,
                    depth: z,
                    varying,
                });
                fragments += 1;
            }
        }
        Some(fragments)
    }
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Sutherland-Hodgman clipping against `w > 0`, `z >= 0` and `z <= w`.
fn clip_polygon<V: Interpolate>(triangle: &[ClipVertex<V>; 3]) -> Vec<ClipVertex<V>> {
    let planes: [fn(Vec4) -> f32; 3] = [
        |p| p.w - W_EPSILON,
        |p| p.z,
        |p| p.w - p.z,
    ];
    let mut polygon = triangle.to_vec();
    for distance in planes {
        if polygon.is_empty() {
            break;
        }
        let mut clipped = Vec::with_capacity(polygon.len() + 1);
        for i in 0..polygon.len() {
            let current = polygon[i];
            let next = polygon[(i + 1) % polygon.len()];
            let d_current = distance(current.position);
            let d_next = distance(next.position);
            if d_current >= 0.0 {
                clipped.push(current);
            }
            // A vertex on the plane is kept as is, never split again.
            if (d_current > 0.0 && d_next < 0.0) || (d_current < 0.0 && d_next > 0.0) {
                let t = d_current / (d_current - d_next);
                clipped.push(current.lerp(next, t));
            }
        }
        polygon = clipped;
    }
    polygon
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32, y: f32, z: f32) -> ClipVertex<f32> {
        ClipVertex {
            position: Vec4::new(x, y, z, 1.0),
            varying: 0.0,
        }
    }

    fn full_screen_quad(z: f32) -> (Vec<ClipVertex<f32>>, Vec<u32>) {
        (
            vec![
                vertex(-1.0, -1.0, z),
                vertex(1.0, -1.0, z),
                vertex(1.0, 1.0, z),
                vertex(-1.0, 1.0, z),
            ],
            vec![0, 1, 2, 2, 3, 0],
        )
    }

    #[test]
    fn full_screen_quad_covers_every_texel_once() {
        let (vertices, indices) = full_screen_quad(0.5);
        let mut depth = DepthTexture::new(8, 4);
        let stats = Rasterizer::default().draw_indexed(&vertices, &indices, &mut depth, |_| {});
        assert_eq!(stats.fragments, 32);
        assert!(depth.texels().iter().all(|&d| (d - 0.5).abs() < 1e-6));
    }

    #[test]
    fn nearer_geometry_wins_depth_test() {
        let (far, indices) = full_screen_quad(0.8);
        let (near, _) = full_screen_quad(0.3);
        let mut depth = DepthTexture::new(4, 4);
        let raster = Rasterizer::default();
        raster.draw_indexed(&near, &indices, &mut depth, |_| {});
        let stats = raster.draw_indexed(&far, &indices, &mut depth, |_| {});
        assert_eq!(stats.fragments, 0);
        assert!(depth.texels().iter().all(|&d| (d - 0.3).abs() < 1e-6));
    }

    #[test]
    fn ndc_top_maps_to_first_row() {
        let vertices = vec![
            vertex(-1.0, 1.0, 0.5),
            vertex(-1.0, 0.0, 0.5),
            vertex(1.0, 1.0, 0.5),
        ];
        let mut depth = DepthTexture::new(4, 4);
        let mut rows = Vec::new();
        Rasterizer::default().draw_indexed(&vertices, &[0, 1, 2], &mut depth, |f| rows.push(f.y));
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|&y| y < 2));
    }

    #[test]
    fn back_faces_are_culled() {
        let (vertices, _) = full_screen_quad(0.5);
        let raster = Rasterizer::new(RasterState {
            cull_mode: CullMode::Back,
            ..RasterState::default()
        });
        let mut depth = DepthTexture::new(4, 4);
        let front = raster.draw_indexed(&vertices, &[0, 1, 2], &mut depth, |_| {});
        assert_eq!(front.culled, 0);
        let back = raster.draw_indexed(&vertices, &[0, 2, 1], &mut depth, |_| {});
        assert_eq!(back.culled, 1);
    }

    #[test]
    fn triangle_behind_near_plane_is_clipped_away() {
        let vertices = vec![
            vertex(-1.0, -1.0, -0.5),
            vertex(1.0, -1.0, -0.5),
            vertex(0.0, 1.0, -0.1),
        ];
        let mut depth = DepthTexture::new(4, 4);
        let stats = Rasterizer::default().draw_indexed(&vertices, &[0, 1, 2], &mut depth, |_| {});
        assert_eq!(stats.clipped_away, 1);
        assert_eq!(stats.fragments, 0);
    }

    #[test]
    fn vertex_on_near_plane_keeps_visible_part() {
        // First vertex sits exactly on `z = 0`, the second is behind it.
        let crossing = vec![
            vertex(-1.0, -1.0, 0.0),
            vertex(1.0, -1.0, -0.5),
            vertex(1.0, 1.0, 0.5),
        ];
        let mut depth = DepthTexture::new(8, 8);
        let mut depths = Vec::new();
        let stats = Rasterizer::default()
            .draw_indexed(&crossing, &[0, 1, 2], &mut depth, |f| depths.push(f.depth));
        assert_eq!(stats.culled, 0);
        assert_eq!(stats.clipped_away, 0);
        assert!(stats.fragments > 0);
        assert!(depths.iter().all(|&d| (0.0..=1.0).contains(&d)));

        // The visible part is exactly the triangle ending at the crossing point.
        let visible = vec![
            vertex(-1.0, -1.0, 0.0),
            vertex(1.0, 0.0, 0.0),
            vertex(1.0, 1.0, 0.5),
        ];
        let mut reference = DepthTexture::new(8, 8);
        let expected = Rasterizer::default().draw_indexed(&visible, &[0, 1, 2], &mut reference, |_| {});
        assert_eq!(stats.fragments, expected.fragments);
        assert_eq!(depth, reference);
    }

    #[test]
    fn vertex_on_far_plane_is_not_duplicated() {
        let vertices = vec![
            vertex(-1.0, -1.0, 1.0),
            vertex(1.0, -1.0, 1.5),
            vertex(0.0, 1.0, 0.5),
        ];
        let polygon = clip_polygon(&[vertices[0], vertices[1], vertices[2]]);
        assert_eq!(polygon.len(), 3);
        for (i, v) in polygon.iter().enumerate() {
            let next = polygon[(i + 1) % polygon.len()];
            assert_ne!(v.position, next.position);
        }
    }

    #[test]
    fn degenerate_triangle_is_not_counted_as_culled() {
        let vertices = vec![
            vertex(-1.0, -1.0, 0.5),
            vertex(0.0, 0.0, 0.5),
            vertex(1.0, 1.0, 0.5),
        ];
        let mut depth = DepthTexture::new(4, 4);
        let stats = Rasterizer::default().draw_indexed(&vertices, &[0, 1, 2], &mut depth, |_| {});
        assert_eq!(stats.culled, 0);
        assert_eq!(stats.fragments, 0);
    }

    #[test]
    fn varyings_are_perspective_correct() {
        // Same screen-space triangle, but the right-hand vertex is twice as
        // far away; the midpoint varying must lean towards the near vertex.
        let vertices = vec![
            ClipVertex {
                position: Vec4::new(-1.0, -1.0, 0.5, 1.0),
                varying: 0.0f32,
            },
            ClipVertex {
                position: Vec4::new(2.0, -2.0, 1.0, 2.0),
                varying: 1.0,
            },
            ClipVertex {
                position: Vec4::new(-1.0, 1.0, 0.5, 1.0),
                varying: 0.0,
            },
        ];
        let mut depth = DepthTexture::new(16, 16);
        let mut samples = Vec::new();
        Rasterizer::default().draw_indexed(&vertices, &[0, 1, 2], &mut depth, |f| {
            if f.y == 15 && f.x == 7 {
                samples.push(f.varying);
            }
        });
        let value = samples[0];
        assert!(value > 0.0 && value < 0.45, "got {value}");
    }

    #[test]
    fn depth_bias_pushes_depth_away() {
        let (vertices, indices) = full_screen_quad(0.5);
        let raster = Rasterizer::new(RasterState {
            depth_bias: DepthBias {
                constant: 0.01,
                ..DepthBias::default()
            },
            ..RasterState::default()
        });
        let mut depth = DepthTexture::new(2, 2);
        raster.draw_indexed(&vertices, &indices, &mut depth, |_| {});
        assert!(depth.texels().iter().all(|&d| (d - 0.51).abs() < 1e-6));
    }
}
