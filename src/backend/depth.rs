// Depth-stencil buffer
//
// Matches the color target's sample count so both can share a subpass.

use anyhow::Result;
use ash::vk;
use std::sync::Arc;

use super::{GpuImage, VulkanDevice};

pub struct DepthStencil {
    pub image: GpuImage,
}

impl DepthStencil {
    pub fn new(
        device: &Arc<VulkanDevice>,
        format: vk::Format,
        extent: vk::Extent2D,
        samples: vk::SampleCountFlags,
    ) -> Result<Self> {
        let image = GpuImage::attachment(
            device,
            "depth-stencil",
            extent,
            format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            samples,
            depth_aspect(format),
        )?;

        log::debug!(
            "Created {}x{} depth-stencil buffer ({:?}, {:?})",
            extent.width,
            extent.height,
            format,
            samples
        );

        Ok(Self { image })
    }
}

/// View aspect for a depth format; stencil formats need both bits
pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stencil_formats_get_both_aspects() {
        assert_eq!(
            depth_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(depth_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
    }
}
