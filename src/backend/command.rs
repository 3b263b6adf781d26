// Command pools and buffers
//
// One primary command buffer per frame in flight, re-recorded every frame
// because the transform changes each time. `submit_once` covers one-off
// work like buffer uploads.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

pub struct CommandPool {
    pub pool: vk::CommandPool,
    pub buffers: Vec<vk::CommandBuffer>,
    device: Arc<VulkanDevice>,
}

impl CommandPool {
    pub fn new(device: &Arc<VulkanDevice>, buffer_count: u32) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.graphics_queue_family)
            // RESET: each frame resets and re-records its own buffer
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        let mut this = Self {
            pool,
            buffers: Vec::new(),
            device: device.clone(),
        };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(buffer_count);

        this.buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffers")?;

        Ok(this)
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        // Also frees the command buffers
        unsafe {
            self.device.device.destroy_command_pool(self.pool, None);
        }
    }
}

/// Record commands with `record`, submit them and wait for the GPU to finish
pub fn submit_once<F>(device: &Arc<VulkanDevice>, record: F) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer),
{
    let pool_info = vk::CommandPoolCreateInfo::builder()
        .queue_family_index(device.graphics_queue_family)
        .flags(vk::CommandPoolCreateFlags::TRANSIENT);

    let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
        .context("Failed to create transient command pool")?;

    let result = (|| -> Result<()> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let cmd = unsafe { device.device.allocate_command_buffers(&alloc_info) }?[0];

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            device.device.begin_command_buffer(cmd, &begin_info)?;
        }
        record(cmd);
        unsafe {
            device.device.end_command_buffer(cmd)?;

            let command_buffers = [cmd];
            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info.build()], vk::Fence::null())?;
            device.device.queue_wait_idle(device.graphics_queue)?;
        }
        Ok(())
    })();

    unsafe {
        device.device.destroy_command_pool(pool, None);
    }
    result
}
