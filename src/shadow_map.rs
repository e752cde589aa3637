//! Depth textures and comparison sampling.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Single-channel `f32` depth texture, row-major with texel (0, 0) at the
/// top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthTexture {
    width: u32,
    height: u32,
    texels: Vec<f32>,
}

impl DepthTexture {
    /// Value depth attachments are cleared to before a pass.
    pub const CLEAR_DEPTH: f32 = 1.0;

    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            texels: vec![Self::CLEAR_DEPTH; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.texels.is_empty()
    }

    pub fn clear(&mut self, depth: f32) {
        self.texels.fill(depth);
    }

    pub fn texel(&self, x: u32, y: u32) -> f32 {
        self.texels[self.index(x, y)]
    }

    pub fn set_texel(&mut self, x: u32, y: u32, depth: f32) {
        let index = self.index(x, y);
        self.texels[index] = depth;
    }

    pub fn texels(&self) -> &[f32] {
        &self.texels
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

/// Comparison applied as `reference OP stored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompareFunction {
    Never,
    Less,
    LessEqual,
    Equal,
    Greater,
    GreaterEqual,
    Always,
}

impl CompareFunction {
    pub fn passes(self, reference: f32, stored: f32) -> bool {
        match self {
            Self::Never => false,
            Self::Less => reference < stored,
            Self::LessEqual => reference <= stored,
            Self::Equal => reference == stored,
            Self::Greater => reference > stored,
            Self::GreaterEqual => reference >= stored,
            Self::Always => true,
        }
    }
}

/// How texel coordinates outside the texture are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressMode {
    ClampToEdge,
    ClampToBorder,
    Repeat,
}

/// Border value used by [`AddressMode::ClampToBorder`].
///
/// For depth textures the white border reads as depth `1.0`, which the
/// default `LessEqual` comparison treats as lit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BorderColor {
    OpaqueWhite,
    OpaqueBlack,
}

impl BorderColor {
    pub fn depth(self) -> f32 {
        match self {
            Self::OpaqueWhite => 1.0,
            Self::OpaqueBlack => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Comparison sampler state bound next to the shadow map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub address_mode: AddressMode,
    pub border_color: BorderColor,
    pub filter: FilterMode,
    pub compare: CompareFunction,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            address_mode: AddressMode::ClampToBorder,
            border_color: BorderColor::OpaqueWhite,
            filter: FilterMode::Linear,
            compare: CompareFunction::LessEqual,
        }
    }
}

/// Software counterpart of a comparison sampler.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ComparisonSampler {
    pub config: SamplerConfig,
}

impl ComparisonSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    /// Compares `reference` against the texels around `uv` and returns the
    /// filtered visibility in `[0, 1]`.
    ///
    /// `reference` is clamped to `[0, 1]` first, so fragments beyond the far
    /// plane compare equal to a cleared texel.
    pub fn sample_compare(&self, texture: &DepthTexture, uv: Vec2, reference: f32) -> f32 {
        if texture.is_empty() {
            return 1.0;
        }
        let reference = reference.clamp(0.0, 1.0);
        let width = texture.width() as f32;
        let height = texture.height() as f32;
        match self.config.filter {
            FilterMode::Nearest => {
                let x = texel_coord(uv.x * width, width).floor() as i64;
                let y = texel_coord(uv.y * height, height).floor() as i64;
                self.tap(texture, x, y, reference)
            }
            FilterMode::Linear => {
                let fx = texel_coord(uv.x * width - 0.5, width);
                let fy = texel_coord(uv.y * height - 0.5, height);
                let x0 = fx.floor();
                let y0 = fy.floor();
                let tx = fx - x0;
                let ty = fy - y0;
                let (x0, y0) = (x0 as i64, y0 as i64);
                let top = lerp(
                    self.tap(texture, x0, y0, reference),
                    self.tap(texture, x0 + 1, y0, reference),
                    tx,
                );
                let bottom = lerp(
                    self.tap(texture, x0, y0 + 1, reference),
                    self.tap(texture, x0 + 1, y0 + 1, reference),
                    tx,
                );
                lerp(top, bottom, ty)
            }
        }
    }

    fn tap(&self, texture: &DepthTexture, x: i64, y: i64, reference: f32) -> f32 {
        let stored = self.fetch(texture, x, y);
        if self.config.compare.passes(reference, stored) {
            1.0
        } else {
            0.0
        }
    }

    fn fetch(&self, texture: &DepthTexture, x: i64, y: i64) -> f32 {
        let width = i64::from(texture.width());
        let height = i64::from(texture.height());
        match self.config.address_mode {
            AddressMode::ClampToEdge => {
                texture.texel(x.clamp(0, width - 1) as u32, y.clamp(0, height - 1) as u32)
            }
            AddressMode::ClampToBorder => {
                if (0..width).contains(&x) && (0..height).contains(&y) {
                    texture.texel(x as u32, y as u32)
                } else {
                    self.config.border_color.depth()
                }
            }
            AddressMode::Repeat => {
                texture.texel(x.rem_euclid(width) as u32, y.rem_euclid(height) as u32)
            }
        }
    }
}

/// Bounds a texel-space coordinate to `[-1, size]`, one texel past either
/// edge. NaN maps to `-1`.
fn texel_coord(coord: f32, size: f32) -> f32 {
    if coord.is_nan() {
        -1.0
    } else {
        coord.clamp(-1.0, size)
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
