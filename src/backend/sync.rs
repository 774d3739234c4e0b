// Synchronization primitives
//
// Fences (CPU <-> GPU) and semaphores (GPU <-> GPU), each released on drop.
// Owners hold an Arc to the device so the device always outlives them.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use super::VulkanDevice;

/// Image-acquired / render-complete pair for one semaphore slot.
///
/// Slots rotate independently of swapchain images: the driver may hand
/// images back out of order, but a slot is only reused after its present.
pub struct SemaphorePair {
    pub image_acquired: vk::Semaphore,
    pub render_complete: vk::Semaphore,
    device: Arc<VulkanDevice>,
}

impl SemaphorePair {
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self> {
        let info = vk::SemaphoreCreateInfo::default();

        unsafe {
            let image_acquired = device.device.create_semaphore(&info, None)
                .context("Failed to create image-acquired semaphore")?;
            let render_complete = match device.device.create_semaphore(&info, None) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    device.device.destroy_semaphore(image_acquired, None);
                    return Err(e).context("Failed to create render-complete semaphore");
                }
            };

            Ok(Self {
                image_acquired,
                render_complete,
                device: device.clone(),
            })
        }
    }
}

impl Drop for SemaphorePair {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_semaphore(self.image_acquired, None);
            self.device.device.destroy_semaphore(self.render_complete, None);
        }
    }
}

/// Fence guarding reuse of one image's command buffer.
pub struct Fence {
    pub handle: vk::Fence,
    device: Arc<VulkanDevice>,
}

impl Fence {
    /// Created signaled so the first wait on it returns immediately.
    pub fn new_signaled(device: &Arc<VulkanDevice>) -> Result<Self> {
        let info = vk::FenceCreateInfo::default()
            .flags(vk::FenceCreateFlags::SIGNALED);

        let handle = unsafe { device.device.create_fence(&info, None) }
            .context("Failed to create fence")?;

        Ok(Self {
            handle,
            device: device.clone(),
        })
    }

    /// `timeout` in nanoseconds, `u64::MAX` waits forever.
    pub fn wait(&self, timeout: u64) -> ash::prelude::VkResult<()> {
        unsafe { self.device.device.wait_for_fences(&[self.handle], true, timeout) }
    }

    pub fn reset(&self) -> ash::prelude::VkResult<()> {
        unsafe { self.device.device.reset_fences(&[self.handle]) }
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_fence(self.handle, None);
        }
    }
}
