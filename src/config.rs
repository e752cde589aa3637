use glam::Vec4;
use serde::{Deserialize, Serialize};

use crate::raster::{CullMode, DepthBias};
use crate::shading::ShadingConfig;
use crate::shadow_map::SamplerConfig;

/// Frame-level settings for both passes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    /// Edge length of the square shadow map in texels.
    pub shadow_map_size: u32,
    pub shading: ShadingConfig,
    pub sampler: SamplerConfig,
    /// Offset applied by the shadow-depth pass to fight self-shadowing.
    pub depth_bias: DepthBias,
    pub main_cull_mode: CullMode,
    pub clear_color: Vec4,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            shadow_map_size: 1024,
            shading: ShadingConfig::default(),
            sampler: SamplerConfig::default(),
            depth_bias: DepthBias {
                constant: 0.0015,
                slope_scale: 1.0,
                clamp: 0.01,
            },
            main_cull_mode: CullMode::Back,
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
        }
    }
}

impl RenderConfig {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadow_map::{AddressMode, BorderColor, CompareFunction};

    #[test]
    fn defaults_match_the_reference_frame() {
        let config = RenderConfig::default();
        assert_eq!((config.width, config.height), (800, 600));
        assert_eq!(config.shadow_map_size, 1024);
        assert_eq!(config.shading.ambient, 0.2);
        assert_eq!(config.sampler.address_mode, AddressMode::ClampToBorder);
        assert_eq!(config.sampler.border_color, BorderColor::OpaqueWhite);
        assert_eq!(config.sampler.compare, CompareFunction::LessEqual);
        assert_eq!(config.main_cull_mode, CullMode::Back);
    }

    #[test]
    fn with_size_keeps_other_settings() {
        let config = RenderConfig {
            shadow_map_size: 64,
            ..RenderConfig::default()
        }
        .with_size(32, 16);
        assert_eq!((config.width, config.height, config.shadow_map_size), (32, 16, 64));
    }
}
