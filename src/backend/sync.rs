// Synchronization primitives
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
    device: Arc<VulkanDevice>,
}

impl FrameSync {
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED); // Start signaled

        // Null handles are skipped by the destroy calls if a later create fails
        let mut this = Self {
            image_available: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
            device: device.clone(),
        };

        unsafe {
            this.image_available = device
                .device
                .create_semaphore(&semaphore_info, None)
                .context("Failed to create semaphore")?;
            this.in_flight_fence = device
                .device
                .create_fence(&fence_info, None)
                .context("Failed to create fence")?;
        }

        Ok(this)
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_semaphore(self.image_available, None);
            self.device.device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// Render-finished semaphores, one per swapchain image.
///
/// Presentation holds the semaphore until the image comes back from the
/// presentation engine, so it is tied to the image rather than the frame slot.
pub struct PresentSemaphores {
    pub semaphores: Vec<vk::Semaphore>,
    device: Arc<VulkanDevice>,
}

impl PresentSemaphores {
    pub fn new(device: &Arc<VulkanDevice>, image_count: usize) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let mut this = Self {
            semaphores: Vec::with_capacity(image_count),
            device: device.clone(),
        };

        for _ in 0..image_count {
            let semaphore = unsafe { device.device.create_semaphore(&semaphore_info, None) }
                .context("Failed to create semaphore")?;
            this.semaphores.push(semaphore);
        }

        Ok(this)
    }

    pub fn for_image(&self, image_index: u32) -> Result<vk::Semaphore> {
        semaphore_for_image(&self.semaphores, image_index)
    }
}

impl Drop for PresentSemaphores {
    fn drop(&mut self) {
        unsafe {
            for &semaphore in &self.semaphores {
                self.device.device.destroy_semaphore(semaphore, None);
            }
        }
    }
}

fn semaphore_for_image(semaphores: &[vk::Semaphore], image_index: u32) -> Result<vk::Semaphore> {
    semaphores
        .get(image_index as usize)
        .copied()
        .context("Swapchain image without render-finished semaphore")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn each_image_signals_its_own_semaphore() {
        let semaphores: Vec<_> = (1..=3).map(vk::Semaphore::from_raw).collect();

        assert_eq!(semaphore_for_image(&semaphores, 0).unwrap().as_raw(), 1);
        assert_eq!(semaphore_for_image(&semaphores, 2).unwrap().as_raw(), 3);
        assert_ne!(
            semaphore_for_image(&semaphores, 0).unwrap(),
            semaphore_for_image(&semaphores, 1).unwrap()
        );
    }

    #[test]
    fn image_beyond_the_swapchain_is_an_error() {
        let semaphores: Vec<_> = (1..=2).map(vk::Semaphore::from_raw).collect();
        assert!(semaphore_for_image(&semaphores, 2).is_err());
    }
}
