// Swapchain - Window presentation resources
//
// One WindowResources is a complete, consistent set built for a single surface
// size: swapchain + per-image slots + semaphore ring. The render pass they
// target belongs to the window.
// Rebuilding means building a new set (handing over the old swapchain) and
// dropping the old one once the device is idle.

use anyhow::{Context, Result};
use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

use super::error::InitError;
use super::frame::DrawPayload;
use super::surface::WindowSurface;
use super::sync::{Fence, SemaphorePair};
use super::VulkanDevice;

/// Surface formats we can render to, in order of preference
pub const PREFERRED_FORMATS: [vk::Format; 4] = [
    vk::Format::B8G8R8A8_UNORM,
    vk::Format::R8G8B8A8_UNORM,
    vk::Format::B8G8R8_UNORM,
    vk::Format::R8G8B8_UNORM,
];
pub const PREFERRED_COLOR_SPACE: vk::ColorSpaceKHR = vk::ColorSpaceKHR::SRGB_NONLINEAR;

/// Frames assumed in flight when the surface reports no image cap
const UNBOUNDED_FRAMES: u32 = 8;

/// Knobs that shape a resource set. Changing them requires a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainSettings {
    pub min_image_count: u32,
    /// Prefer MAILBOX/IMMEDIATE over FIFO
    pub unlimited_frame_rate: bool,
}

impl SwapchainSettings {
    pub fn validate(&self) -> std::result::Result<(), InitError> {
        if self.min_image_count < 2 {
            return Err(InitError::InvalidMinImageCount(self.min_image_count));
        }
        Ok(())
    }
}

impl Default for SwapchainSettings {
    fn default() -> Self {
        Self {
            min_image_count: 2,
            unlimited_frame_rate: false,
        }
    }
}

/// Per swapchain image: view, framebuffer and the command buffer that draws it
struct FrameSlot {
    view: vk::ImageView,
    framebuffer: vk::Framebuffer,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: Fence,
    device: Arc<VulkanDevice>,
}

impl FrameSlot {
    fn new(
        device: &Arc<VulkanDevice>,
        image: vk::Image,
        format: vk::Format,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        // Null handles are filled in one by one; Drop skips nothing it needs to
        let mut slot = Self {
            view: vk::ImageView::null(),
            framebuffer: vk::Framebuffer::null(),
            command_pool: vk::CommandPool::null(),
            command_buffer: vk::CommandBuffer::null(),
            fence: Fence::new_signaled(device)?,
            device: device.clone(),
        };

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        slot.view = unsafe { device.device.create_image_view(&view_info, None) }
            .context("Failed to create image view")?;

        let attachments = [slot.view];
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        slot.framebuffer = unsafe { device.device.create_framebuffer(&framebuffer_info, None) }
            .context("Failed to create framebuffer")?;

        // Reset as a whole every frame, so no RESET_COMMAND_BUFFER flag
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.queue_family);
        slot.command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(slot.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        slot.command_buffer = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffer")?[0];

        Ok(slot)
    }
}

impl Drop for FrameSlot {
    fn drop(&mut self) {
        unsafe {
            // Destroying the pool frees its command buffer
            self.device.device.destroy_command_pool(self.command_pool, None);
            self.device.device.destroy_framebuffer(self.framebuffer, None);
            self.device.device.destroy_image_view(self.view, None);
        }
    }
}

/// The swapchain resource set for one surface size
pub struct WindowResources {
    pub swapchain: vk::SwapchainKHR,
    /// Actual image size, used as the render area
    pub extent: vk::Extent2D,
    /// Size the set was requested for, compared against the window each frame
    pub requested: (u32, u32),
    render_pass: vk::RenderPass,
    swapchain_loader: ash::khr::swapchain::Device,
    frames: Vec<FrameSlot>,
    semaphores: Vec<SemaphorePair>,
    device: Arc<VulkanDevice>,
}

impl WindowResources {
    /// Build a complete set. `old_swapchain` is the retiring swapchain (or null);
    /// the caller keeps it alive until this returns. `render_pass` belongs to
    /// the window and must outlive the set.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &Arc<VulkanDevice>,
        surface: &WindowSurface,
        render_pass: vk::RenderPass,
        surface_format: vk::SurfaceFormatKHR,
        settings: &SwapchainSettings,
        width: u32,
        height: u32,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<Self> {
        settings.validate()?;

        let caps = surface.capabilities(device.physical_device)?;
        let present_modes = surface.present_modes(device.physical_device)?;

        let present_mode = select_present_mode(
            &present_modes,
            present_mode_preferences(settings.unlimited_frame_rate),
        );
        let image_count = choose_image_count(settings.min_image_count, &caps);
        let extent = choose_extent(&caps, width, height);

        let swapchain_loader = ash::khr::swapchain::Device::new(device.instance(), &device.device);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        // Everything below is released by Drop if a later step fails
        let mut resources = Self {
            swapchain,
            extent,
            requested: (width, height),
            render_pass,
            swapchain_loader,
            frames: Vec::new(),
            semaphores: Vec::new(),
            device: device.clone(),
        };

        let images = unsafe { resources.swapchain_loader.get_swapchain_images(swapchain) }
            .context("Failed to get swapchain images")?;

        for &image in &images {
            resources.frames.push(FrameSlot::new(
                device,
                image,
                surface_format.format,
                render_pass,
                extent,
            )?);
        }
        for _ in 0..images.len() {
            resources.semaphores.push(SemaphorePair::new(device)?);
        }

        log::info!(
            "Created swapchain: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            images.len(),
            surface_format.format,
            present_mode
        );

        Ok(resources)
    }

    pub fn image_count(&self) -> usize {
        self.frames.len()
    }

    pub fn acquire(&self, semaphore_index: usize, timeout: u64) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout,
                self.semaphores[semaphore_index].image_acquired,
                vk::Fence::null(),
            )
        }
    }

    pub fn wait_for_fence(&self, frame_index: u32, timeout: u64) -> VkResult<()> {
        self.frames[frame_index as usize].fence.wait(timeout)
    }

    pub fn reset_fence(&self, frame_index: u32) -> VkResult<()> {
        self.frames[frame_index as usize].fence.reset()
    }

    /// Record one render pass into the image's command buffer.
    /// The caller has waited on the image's fence.
    pub fn record(
        &self,
        frame_index: u32,
        clear_color: [f32; 4],
        payload: &mut dyn DrawPayload,
    ) -> Result<()> {
        let slot = &self.frames[frame_index as usize];
        let device = &self.device.device;
        let command_buffer = slot.command_buffer;

        unsafe {
            device
                .reset_command_pool(slot.command_pool, vk::CommandPoolResetFlags::empty())
                .context("Failed to reset command pool")?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .context("Failed to begin command buffer")?;

            let clear_values = [vk::ClearValue {
                color: vk::ClearColorValue { float32: clear_color },
            }];
            let render_pass_info = vk::RenderPassBeginInfo::default()
                .render_pass(self.render_pass)
                .framebuffer(slot.framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: self.extent,
                })
                .clear_values(&clear_values);

            device.cmd_begin_render_pass(command_buffer, &render_pass_info, vk::SubpassContents::INLINE);
            // Close the pass even if the payload fails, so the buffer stays resettable
            let drawn = payload.record(command_buffer, self.extent);
            device.cmd_end_render_pass(command_buffer);

            device
                .end_command_buffer(command_buffer)
                .context("Failed to end command buffer")?;

            drawn
        }
    }

    pub fn submit(&self, frame_index: u32, semaphore_index: usize) -> VkResult<()> {
        let slot = &self.frames[frame_index as usize];
        let pair = &self.semaphores[semaphore_index];

        let wait_semaphores = [pair.image_acquired];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [slot.command_buffer];
        let signal_semaphores = [pair.render_complete];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device
                .queue_submit(self.device.queue, &[submit_info], slot.fence.handle)
        }
    }

    pub fn present(&self, frame_index: u32, semaphore_index: usize) -> VkResult<bool> {
        let wait_semaphores = [self.semaphores[semaphore_index].render_complete];
        let swapchains = [self.swapchain];
        let image_indices = [frame_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(self.device.queue, &present_info) }
    }
}

impl Drop for WindowResources {
    fn drop(&mut self) {
        // Views and framebuffers before the swapchain owning their images
        self.frames.clear();
        self.semaphores.clear();
        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Single colour attachment, cleared and stored, ending in PRESENT_SRC.
/// Depends only on the format, so one pass serves every rebuild of a window.
pub fn create_render_pass(device: &ash::Device, format: vk::Format) -> Result<vk::RenderPass> {
    let attachments = [vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];

    let color_refs = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)];

    // The image-acquired wait happens at this stage, so the layout
    // transition must not start before it
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe { device.create_render_pass(&create_info, None) }.context("Failed to create render pass")
}

/// Pick a surface format. `None` only if the surface reports nothing.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let first = *available.first()?;

    // A lone UNDEFINED entry means the surface takes any format
    if available.len() == 1 && first.format == vk::Format::UNDEFINED {
        return Some(vk::SurfaceFormatKHR {
            format: PREFERRED_FORMATS[0],
            color_space: PREFERRED_COLOR_SPACE,
        });
    }

    PREFERRED_FORMATS
        .iter()
        .find_map(|&format| {
            available
                .iter()
                .find(|f| f.format == format && f.color_space == PREFERRED_COLOR_SPACE)
                .copied()
        })
        .or(Some(first))
}

pub fn present_mode_preferences(unlimited_frame_rate: bool) -> &'static [vk::PresentModeKHR] {
    if unlimited_frame_rate {
        &[
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO,
        ]
    } else {
        &[vk::PresentModeKHR::FIFO]
    }
}

/// First preference the surface supports; FIFO is always available
pub fn select_present_mode(
    available: &[vk::PresentModeKHR],
    preferences: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    preferences
        .iter()
        .copied()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// max(requested, surface minimum), capped by the surface maximum (0 = no cap)
pub fn choose_image_count(min_image_count: u32, caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = min_image_count.max(caps.min_image_count);
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

/// Upper bound on images in flight for a surface, for consumers that size
/// per-frame buffers once. Unbounded surfaces get `UNBOUNDED_FRAMES` headroom.
pub fn max_frames_in_flight(min_image_count: u32, caps: &vk::SurfaceCapabilitiesKHR) -> usize {
    let count = choose_image_count(min_image_count, caps);
    if caps.max_image_count > 0 {
        caps.max_image_count as usize
    } else {
        count.max(UNBOUNDED_FRAMES) as usize
    }
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    // Surface size is defined by the swapchain
    vk::Extent2D {
        width: width
            .max(caps.min_image_extent.width)
            .min(caps.max_image_extent.width),
        height: height
            .max(caps.min_image_extent.height)
            .min(caps.max_image_extent.height),
    }
}
