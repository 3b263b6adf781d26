// Shader effect: a named technique made of one or more passes
//
// Each pass is a precompiled vertex + fragment SPIR-V pair. Once the input
// layout and rasterizer state are known, every pass becomes one graphics
// pipeline. The combined world-view-projection matrix reaches the vertex
// shader as a push constant (`matrixWVP` in the GLSL source).

use anyhow::{Context, Result};
use ash::vk;
use glam::Mat4;
use std::collections::BTreeSet;
use std::ffi::CStr;
use std::sync::Arc;

use super::{InputLayout, RasterizerState, RenderPass, ShaderModule, VulkanDevice};
use crate::config::EffectConfig;

const ENTRY_POINT: &CStr = c"main";

/// Size of the push constant block: one 4x4 float matrix
pub const TRANSFORM_SIZE: u32 = std::mem::size_of::<Mat4>() as u32;

pub struct EffectPass {
    pub vertex: ShaderModule,
    pub fragment: ShaderModule,
}

pub struct Effect {
    pub technique: String,
    pub passes: Vec<EffectPass>,
}

impl Effect {
    /// Load every pass of the configured technique
    pub fn load(device: &Arc<VulkanDevice>, config: &EffectConfig) -> Result<Self> {
        if config.passes.is_empty() {
            anyhow::bail!("Technique '{}' has no passes", config.technique);
        }

        let passes = config
            .passes
            .iter()
            .enumerate()
            .map(|(i, pass)| -> Result<EffectPass> {
                Ok(EffectPass {
                    vertex: ShaderModule::load(device, &pass.vertex)
                        .with_context(|| format!("Pass {} vertex stage", i))?,
                    fragment: ShaderModule::load(device, &pass.fragment)
                        .with_context(|| format!("Pass {} fragment stage", i))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "Loaded technique '{}' with {} pass(es)",
            config.technique,
            passes.len()
        );

        Ok(Self {
            technique: config.technique.clone(),
            passes,
        })
    }

    /// Inputs the first pass's vertex shader expects
    pub fn vertex_signature(&self) -> &BTreeSet<u32> {
        &self.passes[0].vertex.input_locations
    }
}

/// Pipelines for every pass of an effect, sharing one layout
pub struct Technique {
    pub layout: vk::PipelineLayout,
    pub pipelines: Vec<vk::Pipeline>,
    device: Arc<VulkanDevice>,
}

impl Technique {
    pub fn new(
        device: &Arc<VulkanDevice>,
        effect: &Effect,
        input_layout: &InputLayout,
        rasterizer: &RasterizerState,
        render_pass: &RenderPass,
    ) -> Result<Self> {
        let push_constant_ranges = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: TRANSFORM_SIZE,
        }];

        let layout_info =
            vk::PipelineLayoutCreateInfo::builder().push_constant_ranges(&push_constant_ranges);

        let layout = unsafe { device.device.create_pipeline_layout(&layout_info, None) }
            .context("Failed to create pipeline layout")?;

        let mut this = Self {
            layout,
            pipelines: Vec::with_capacity(effect.passes.len()),
            device: device.clone(),
        };

        // Fixed-function state shared by all passes
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&input_layout.bindings)
            .vertex_attribute_descriptions(&input_layout.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor are set per frame so resizes don't need new pipelines
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterization = rasterizer.create_info();

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(render_pass.samples);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS) // Closer objects win
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];

        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        for (i, pass) in effect.passes.iter().enumerate() {
            let stages = [
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(vk::ShaderStageFlags::VERTEX)
                    .module(pass.vertex.module)
                    .name(ENTRY_POINT)
                    .build(),
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(vk::ShaderStageFlags::FRAGMENT)
                    .module(pass.fragment.module)
                    .name(ENTRY_POINT)
                    .build(),
            ];

            let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
                .stages(&stages)
                .vertex_input_state(&vertex_input_info)
                .input_assembly_state(&input_assembly)
                .viewport_state(&viewport_state)
                .rasterization_state(&rasterization)
                .multisample_state(&multisampling)
                .depth_stencil_state(&depth_stencil)
                .color_blend_state(&color_blending)
                .dynamic_state(&dynamic_state)
                .layout(layout)
                .render_pass(render_pass.render_pass)
                .subpass(0)
                .build();

            let pipeline = unsafe {
                device
                    .device
                    .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                    .map_err(|(_, e)| e)
                    .with_context(|| {
                        format!("Failed to create pipeline for pass {} of '{}'", i, effect.technique)
                    })?
            };
            this.pipelines.push(pipeline[0]);
        }

        Ok(this)
    }

    /// Record the combined transform for the passes that follow
    pub fn set_transform(&self, cmd: vk::CommandBuffer, world_view_projection: &Mat4) {
        let matrix = world_view_projection.to_cols_array();
        unsafe {
            self.device.device.cmd_push_constants(
                cmd,
                self.layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::cast_slice(&matrix),
            );
        }
    }
}

impl Drop for Technique {
    fn drop(&mut self) {
        unsafe {
            for &pipeline in &self.pipelines {
                self.device.device.destroy_pipeline(pipeline, None);
            }
            self.device.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_fits_the_guaranteed_push_constant_space() {
        // Vulkan guarantees at least 128 bytes of push constants
        assert_eq!(TRANSFORM_SIZE, 64);
        assert!(TRANSFORM_SIZE <= 128);
    }

    #[test]
    fn matrix_bytes_are_column_major() {
        let m = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let cols = m.to_cols_array();
        let bytes: &[u8] = bytemuck::cast_slice(&cols);
        assert_eq!(bytes.len(), TRANSFORM_SIZE as usize);
        // Translation sits in the last column
        assert_eq!(&cols[12..15], &[1.0, 2.0, 3.0]);
    }
}
