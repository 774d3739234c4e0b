// Vulkan window - the frame target backed by a real swapchain
//
// Owns its surface, the render pass every resource set targets, and the
// current WindowResources, which it swaps out on rebuild.

use anyhow::{Context, Result};
use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

use super::error::InitError;
use super::frame::{DrawPayload, PresentTarget, Presenter};
use super::surface::WindowSurface;
use super::swapchain::{
    create_render_pass, max_frames_in_flight, select_surface_format, SwapchainSettings,
    WindowResources,
};
use super::VulkanDevice;

/// Frame cycle driving a Vulkan window
pub type PresentationContext = Presenter<VulkanWindow>;

/// IMPORTANT: Field order matters for Drop! The swapchain goes before the
/// surface it was created for.
pub struct VulkanWindow {
    resources: Option<WindowResources>,
    render_pass: vk::RenderPass,
    surface_format: vk::SurfaceFormatKHR,
    settings: SwapchainSettings,
    surface: WindowSurface,
    device: Arc<VulkanDevice>,
}

impl VulkanWindow {
    /// No swapchain yet; the first rebuild creates it.
    pub fn new(device: Arc<VulkanDevice>, surface: WindowSurface, settings: SwapchainSettings) -> Result<Self> {
        settings.validate()?;

        if !device.supports_present(&surface)? {
            return Err(InitError::PresentUnsupported.into());
        }

        let formats = surface.formats(device.physical_device)?;
        let surface_format = select_surface_format(&formats).context("Surface reports no formats")?;
        let render_pass = create_render_pass(&device.device, surface_format.format)?;

        log::info!(
            "Window surface: {:?} / {:?}",
            surface_format.format,
            surface_format.color_space
        );

        Ok(Self {
            resources: None,
            render_pass,
            surface_format,
            settings,
            surface,
            device,
        })
    }

    pub fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    /// The pass every frame is recorded in; pipelines drawing into the
    /// window are built against it.
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    /// Most images that can be in flight at once on this surface
    pub fn max_frames_in_flight(&self) -> Result<usize> {
        let caps = self.surface.capabilities(self.device.physical_device)?;
        Ok(max_frames_in_flight(self.settings.min_image_count, &caps))
    }

    /// Takes effect on the next rebuild. Returns whether anything changed.
    pub fn set_settings(&mut self, settings: SwapchainSettings) -> Result<bool> {
        settings.validate()?;
        let changed = settings != self.settings;
        self.settings = settings;
        Ok(changed)
    }

    fn current(&self) -> VkResult<&WindowResources> {
        // Nothing to draw into: same as a surface that went away
        self.resources
            .as_ref()
            .ok_or(vk::Result::ERROR_OUT_OF_DATE_KHR)
    }
}

impl PresentTarget for VulkanWindow {
    fn image_count(&self) -> usize {
        self.resources.as_ref().map_or(0, WindowResources::image_count)
    }

    fn size(&self) -> (u32, u32) {
        self.resources.as_ref().map_or((0, 0), |r| r.requested)
    }

    fn rebuild(&mut self, width: u32, height: u32) -> Result<()> {
        // The old set may still be in flight
        self.device.wait_idle()?;

        let old = self.resources.take();
        let old_swapchain = old
            .as_ref()
            .map_or(vk::SwapchainKHR::null(), |r| r.swapchain);

        let new = WindowResources::new(
            &self.device,
            &self.surface,
            self.render_pass,
            self.surface_format,
            &self.settings,
            width,
            height,
            old_swapchain,
        )
        .with_context(|| format!("Failed to build swapchain resources for {}x{}", width, height));

        // Retired either way
        drop(old);

        self.resources = Some(new?);
        Ok(())
    }

    fn acquire(&mut self, semaphore_index: usize, timeout: u64) -> VkResult<(u32, bool)> {
        self.current()?.acquire(semaphore_index, timeout)
    }

    fn wait_for_fence(&mut self, frame_index: u32, timeout: u64) -> VkResult<()> {
        self.current()?.wait_for_fence(frame_index, timeout)
    }

    fn reset_fence(&mut self, frame_index: u32) -> VkResult<()> {
        self.current()?.reset_fence(frame_index)
    }

    fn record(&mut self, frame_index: u32, clear_color: [f32; 4], payload: &mut dyn DrawPayload) -> Result<()> {
        self.current()?.record(frame_index, clear_color, payload)
    }

    fn submit(&mut self, frame_index: u32, semaphore_index: usize) -> VkResult<()> {
        self.current()?.submit(frame_index, semaphore_index)
    }

    fn present(&mut self, frame_index: u32, semaphore_index: usize) -> VkResult<bool> {
        self.current()?.present(frame_index, semaphore_index)
    }
}

impl Drop for VulkanWindow {
    fn drop(&mut self) {
        log::info!("Destroying window resources...");
        // Resources must not be released while frames are in flight
        let _ = self.device.wait_idle();
        self.resources = None;
        unsafe {
            self.device.device.destroy_render_pass(self.render_pass, None);
        }
        // `surface` drops next, then the device reference
    }
}
