// Buffer utilities for vertex and index buffers
//
// Model geometry never changes after startup, so it lives in device-local
// memory and is filled once through a host-visible staging buffer.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use super::{command, VulkanDevice};

/// A buffer plus the memory backing it
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl GpuBuffer {
    /// Create a buffer and allocate memory for it
    pub fn new(
        device: &Arc<VulkanDevice>,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .with_context(|| format!("Failed to create buffer '{}'", name))?;

        // Owned from here so a later failure still destroys the buffer
        let mut this = Self {
            buffer,
            allocation: None,
            device: device.clone(),
        };

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .with_context(|| format!("Failed to allocate memory for '{}'", name))?;

        store_then(&mut this.allocation, allocation, |allocation| unsafe {
            device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .context("Failed to bind buffer memory")
        })?;

        Ok(this)
    }

    /// Upload `data` into a new device-local buffer that is never written again
    pub fn immutable<T: bytemuck::Pod>(
        device: &Arc<VulkanDevice>,
        name: &str,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        if data.is_empty() {
            anyhow::bail!("Refusing to create empty buffer '{}'", name);
        }

        let bytes: &[u8] = bytemuck::cast_slice(data);
        let size = bytes.len() as vk::DeviceSize;

        // Staging buffer the CPU can write
        let mut staging = Self::new(
            device,
            &format!("{} (staging)", name),
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;
        staging.write(bytes)?;

        let buffer = Self::new(
            device,
            name,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
        )?;

        command::submit_once(device, |cmd| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            unsafe {
                device
                    .device
                    .cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[region]);
            }
        })
        .with_context(|| format!("Failed to upload '{}'", name))?;

        log::debug!("Uploaded {} bytes to '{}'", size, name);
        Ok(buffer)
    }

    /// Copy bytes into a host-visible buffer
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mapped = self
            .allocation
            .as_mut()
            .and_then(|a| a.mapped_slice_mut())
            .context("Buffer memory is not host visible")?;

        mapped
            .get_mut(..bytes.len())
            .context("Data larger than buffer")?
            .copy_from_slice(bytes);
        Ok(())
    }
}

/// Put `value` in its owner's slot, then run the step that may fail, so the
/// owner's Drop releases it either way
pub(super) fn store_then<T, R>(
    slot: &mut Option<T>,
    value: T,
    step: impl FnOnce(&T) -> Result<R>,
) -> Result<R> {
    let value = slot.insert(value);
    step(value)
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
        }
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator.lock().free(allocation) {
                log::error!("Failed to free buffer memory: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_stays_owned_when_the_step_fails() {
        let mut slot = None;
        let result: Result<()> = store_then(&mut slot, "allocation".to_string(), |value| {
            assert_eq!(value, "allocation");
            anyhow::bail!("bind failed")
        });

        assert!(result.is_err());
        assert_eq!(slot.as_deref(), Some("allocation"));
    }

    #[test]
    fn step_result_is_passed_through() {
        let mut slot = None;
        let len = store_then(&mut slot, vec![1u8, 2, 3], |v| Ok(v.len())).unwrap();
        assert_eq!(len, 3);
        assert!(slot.is_some());
    }
}
