// Rasterizer state
//
// Fill mode and culling from config. Front faces wind clockwise on screen,
// the convention of the left-handed projection used by the camera.

use anyhow::Result;
use ash::vk;

use crate::config::GraphicsConfig;

#[derive(Debug, Clone, Copy)]
pub struct RasterizerState {
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
}

impl RasterizerState {
    pub fn new(config: &GraphicsConfig, supports_wireframe: bool) -> Result<Self> {
        let polygon_mode = match config.fill_mode.to_lowercase().as_str() {
            "wireframe" | "line" => vk::PolygonMode::LINE,
            "solid" | "fill" => vk::PolygonMode::FILL,
            other => anyhow::bail!("Unknown fill mode '{}'", other),
        };

        if polygon_mode == vk::PolygonMode::LINE && !supports_wireframe {
            anyhow::bail!("GPU does not support wireframe rendering (fillModeNonSolid)");
        }

        let cull_mode = match config.cull_mode.to_lowercase().as_str() {
            "back" => vk::CullModeFlags::BACK,
            "front" => vk::CullModeFlags::FRONT,
            "none" => vk::CullModeFlags::NONE,
            other => anyhow::bail!("Unknown cull mode '{}'", other),
        };

        Ok(Self {
            polygon_mode,
            cull_mode,
            front_face: vk::FrontFace::CLOCKWISE,
        })
    }

    pub fn create_info(&self) -> vk::PipelineRasterizationStateCreateInfo {
        vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false) // depth clipping stays on
            .rasterizer_discard_enable(false)
            .polygon_mode(self.polygon_mode)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .depth_bias_enable(false)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_wireframe_with_back_face_culling() {
        let state = RasterizerState::new(&GraphicsConfig::default(), true).unwrap();
        assert_eq!(state.polygon_mode, vk::PolygonMode::LINE);
        assert_eq!(state.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(state.front_face, vk::FrontFace::CLOCKWISE);

        let info = state.create_info();
        assert_eq!(info.depth_clamp_enable, vk::FALSE);
        assert_eq!(info.line_width, 1.0);
    }

    #[test]
    fn wireframe_needs_device_support() {
        assert!(RasterizerState::new(&GraphicsConfig::default(), false).is_err());

        let solid = GraphicsConfig {
            fill_mode: "solid".to_string(),
            ..GraphicsConfig::default()
        };
        let state = RasterizerState::new(&solid, false).unwrap();
        assert_eq!(state.polygon_mode, vk::PolygonMode::FILL);
    }

    #[test]
    fn unknown_modes_are_rejected() {
        let config = GraphicsConfig {
            cull_mode: "sideways".to_string(),
            ..GraphicsConfig::default()
        };
        assert!(RasterizerState::new(&config, true).is_err());
    }
}
