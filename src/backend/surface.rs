// Window surface - one per OS window
//
// Created against the shared instance with ash-window, so the same code
// covers every platform winit runs on. Holds the instance alive until the
// surface is gone.

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::sync::Arc;

use super::device::VulkanInstance;

pub struct WindowSurface {
    pub handle: vk::SurfaceKHR,
    instance: Arc<VulkanInstance>,
}

impl WindowSurface {
    pub fn new(
        instance: &Arc<VulkanInstance>,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Self> {
        let handle = unsafe {
            ash_window::create_surface(&instance.entry, &instance.instance, display, window, None)
        }
        .context("Failed to create window surface")?;

        Ok(Self {
            handle,
            instance: instance.clone(),
        })
    }

    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> Result<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.instance
                .surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.handle)
        }
        .context("Failed to query surface capabilities")
    }

    pub fn formats(&self, physical_device: vk::PhysicalDevice) -> Result<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.instance
                .surface_loader
                .get_physical_device_surface_formats(physical_device, self.handle)
        }
        .context("Failed to query surface formats")
    }

    pub fn present_modes(&self, physical_device: vk::PhysicalDevice) -> Result<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.instance
                .surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.handle)
        }
        .context("Failed to query present modes")
    }
}

impl Drop for WindowSurface {
    fn drop(&mut self) {
        unsafe {
            self.instance.surface_loader.destroy_surface(self.handle, None);
        }
    }
}
