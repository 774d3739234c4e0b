// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation (window-system extensions, portability, validation)
// - Physical device + graphics/present queue family selection
// - Logical device + queue creation
// - Upload command pool for the GUI renderer
//
// Surfaces are not owned here: every window creates its own WindowSurface
// against the shared VulkanInstance, and checks present support for it.
//
// Teardown runs in reverse: upload pool, device, then (once the last surface
// and device let go of it) debug messenger and instance.

use anyhow::{Context, Result};
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

use super::error::InitError;
use super::surface::WindowSurface;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance-level handles, shared by the device and every window surface
pub struct VulkanInstance {
    pub entry: Entry,
    pub instance: ash::Instance,
    pub surface_loader: ash::khr::surface::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create the instance for windows on `display`
    ///
    /// # Arguments
    /// * `display` - Raw display handle; decides the window-system extensions
    /// * `app_name` - Reported to the driver
    /// * `enable_validation` - Khronos validation + debug messenger, if installed
    pub fn new(display: RawDisplayHandle, app_name: &str, enable_validation: bool) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan instance: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        // Step 2: Create instance
        let (instance, validation) = Self::create_instance(&entry, app_name, display, enable_validation)?;
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        // From here on, early returns release whatever was created
        let mut this = Self {
            entry,
            instance,
            surface_loader,
            debug_utils: None,
        };

        // Step 3: Debug messenger
        if validation {
            this.debug_utils = Some(Self::setup_debug_messenger(&this.entry, &this.instance)?);
        }

        Ok(Arc::new(this))
    }

    /// Returns the instance and whether validation ended up enabled
    fn create_instance(
        entry: &Entry,
        app_name: &str,
        display: RawDisplayHandle,
        enable_validation: bool,
    ) -> Result<(ash::Instance, bool)> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = c"swapframe";

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        // Window-system extensions (VK_KHR_surface + platform surface)
        let mut extensions: Vec<*const c_char> = ash_window::enumerate_required_extensions(display)
            .context("Window system is not supported by Vulkan")?
            .to_vec();

        let available = unsafe { entry.enumerate_instance_extension_properties(None) }
            .context("Failed to enumerate instance extensions")?;

        let mut flags = vk::InstanceCreateFlags::empty();
        if is_extension_available(&available, ash::khr::get_physical_device_properties2::NAME) {
            extensions.push(ash::khr::get_physical_device_properties2::NAME.as_ptr());
        }
        if is_extension_available(&available, ash::khr::portability_enumeration::NAME) {
            extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
            flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }

        // Validation layers
        let mut layer_names = Vec::new();
        let mut validation = false;
        if enable_validation {
            let layers = unsafe { entry.enumerate_instance_layer_properties() }
                .context("Failed to enumerate instance layers")?;
            let has_layer = layers
                .iter()
                .any(|l| l.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER));

            if has_layer {
                layer_names.push(VALIDATION_LAYER.as_ptr());
                extensions.push(ash::ext::debug_utils::NAME.as_ptr());
                validation = true;
            } else {
                log::warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
            }
        }

        let create_info = vk::InstanceCreateInfo::default()
            .flags(flags)
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        Ok((instance, validation))
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(messenger_severities())
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to create debug messenger")?;

        Ok((debug_utils, messenger))
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,

    // Single queue, validated for graphics + present to the first window
    pub queue: vk::Queue,
    pub queue_family: u32,

    /// Short-lived transfer command buffers (GUI font and texture uploads)
    pub upload_pool: vk::CommandPool,

    instance: Arc<VulkanInstance>,
}

impl VulkanDevice {
    /// Create the device able to present to `surface`
    ///
    /// # Arguments
    /// * `instance` - Shared instance the surface was created from
    /// * `surface` - Window the selected queue family must present to
    pub fn new(instance: Arc<VulkanInstance>, surface: &WindowSurface) -> Result<Arc<Self>> {
        // Step 4: Pick GPU + queue family able to present to the surface
        let (physical_device, queue_family) = Self::pick_physical_device(&instance, surface.handle)?;

        // Step 5: Logical device
        let (device, queue) =
            Self::create_logical_device(&instance.instance, physical_device, queue_family)?;

        let properties = unsafe { instance.instance.get_physical_device_properties(physical_device) };

        log::info!(
            "Selected GPU: {} ({:?})",
            properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            properties.device_type
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        let mut this = Self {
            device,
            physical_device,
            queue,
            queue_family,
            upload_pool: vk::CommandPool::null(),
            instance,
        };

        // Step 6: Upload command pool
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family);
        this.upload_pool = unsafe { this.device.create_command_pool(&pool_info, None) }
            .context("Failed to create upload command pool")?;

        Ok(Arc::new(this))
    }

    pub fn entry(&self) -> &Entry {
        &self.instance.entry
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance.instance
    }

    /// Whether the device queue can present to `surface`. Checked for every
    /// window, not only the one the device was picked for.
    pub fn supports_present(&self, surface: &WindowSurface) -> Result<bool> {
        unsafe {
            self.instance.surface_loader.get_physical_device_surface_support(
                self.physical_device,
                self.queue_family,
                surface.handle,
            )
        }
        .context("Failed to query surface support")
    }

    fn pick_physical_device(
        instance: &VulkanInstance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let devices = unsafe { instance.instance.enumerate_physical_devices() }
            .context("Failed to enumerate GPUs")?;

        if devices.is_empty() {
            return Err(InitError::NoVulkanDevice.into());
        }

        let mut best_device = None;
        let mut best_score = 0;

        for device in devices {
            let props = unsafe { instance.instance.get_physical_device_properties(device) };
            let queue_families = unsafe {
                instance.instance.get_physical_device_queue_family_properties(device)
            };

            // One family must do both: the frame cycle submits and presents on one queue
            let family = find_graphics_present_family(&queue_families, |i| unsafe {
                instance
                    .surface_loader
                    .get_physical_device_surface_support(device, i, surface)
                    .unwrap_or(false)
            });

            let Some(family) = family else {
                log::debug!("Skipping GPU without a graphics+present queue family");
                continue;
            };

            let score = device_type_score(props.device_type);
            if score > best_score {
                best_score = score;
                best_device = Some((device, family));
            }
        }

        best_device.ok_or_else(|| InitError::NoGraphicsPresentQueue.into())
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<(ash::Device, vk::Queue)> {
        let available = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .context("Failed to enumerate device extensions")?;

        if !is_extension_available(&available, ash::khr::swapchain::NAME) {
            return Err(InitError::MissingExtension(
                ash::khr::swapchain::NAME.to_string_lossy().into_owned(),
            )
            .into());
        }

        let mut extensions = vec![ash::khr::swapchain::NAME.as_ptr()];
        if is_extension_available(&available, ash::khr::portability_subset::NAME) {
            extensions.push(ash::khr::portability_subset::NAME.as_ptr());
        }

        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        Ok((device, queue))
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }
            .context("Failed to wait for device idle")
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        let _ = self.wait_idle();

        unsafe {
            self.device.destroy_command_pool(self.upload_pool, None);
            self.device.destroy_device(None);
        }
        // `instance` is released once the last surface lets go of it too
    }
}

fn is_extension_available(available: &[vk::ExtensionProperties], name: &CStr) -> bool {
    available
        .iter()
        .any(|p| p.extension_name_as_c_str().is_ok_and(|n| n == name))
}

/// First GRAPHICS family that can also present, per `can_present`
fn find_graphics_present_family(
    families: &[vk::QueueFamilyProperties],
    mut can_present: impl FnMut(u32) -> bool,
) -> Option<u32> {
    families
        .iter()
        .enumerate()
        .filter(|(_, props)| props.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(i, _)| i as u32)
        .find(|&i| can_present(i))
}

/// Prefer discrete GPUs, then integrated, then anything else
fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        _ => 1,
    }
}

/// Everything the validation layer reports; the callback maps severity to a log level
fn messenger_severities() -> vk::DebugUtilsMessageSeverityFlagsEXT {
    vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
}

fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::Level::Error,
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::Level::Warn,
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::Level::Debug,
        _ => log::Level::Trace,
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    log::log!(severity_level(message_severity), "[Vulkan] {}", message.to_string_lossy());

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extension(name: &CStr) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        for (dst, &src) in props.extension_name.iter_mut().zip(name.to_bytes()) {
            *dst = src as c_char;
        }
        props
    }

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_extension_lookup() {
        let available = [
            extension(ash::khr::swapchain::NAME),
            extension(ash::khr::portability_subset::NAME),
        ];
        assert!(is_extension_available(&available, ash::khr::swapchain::NAME));
        assert!(is_extension_available(&available, ash::khr::portability_subset::NAME));
        assert!(!is_extension_available(&available, ash::ext::debug_utils::NAME));
        assert!(!is_extension_available(&[], ash::khr::swapchain::NAME));
    }

    #[test]
    fn test_discrete_gpu_preferred() {
        let discrete = device_type_score(vk::PhysicalDeviceType::DISCRETE_GPU);
        let integrated = device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU);
        let cpu = device_type_score(vk::PhysicalDeviceType::CPU);
        assert!(discrete > integrated);
        assert!(integrated > cpu);
        assert!(cpu > 0);
    }

    #[test]
    fn test_queue_family_must_present_to_the_surface() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];

        // Graphics family 1 cannot present to this surface, family 2 can
        assert_eq!(find_graphics_present_family(&families, |i| i == 2), Some(2));
        assert_eq!(find_graphics_present_family(&families, |_| true), Some(1));
        // Presenting alone is not enough
        assert_eq!(find_graphics_present_family(&families, |i| i == 0), None);
        assert_eq!(find_graphics_present_family(&[], |_| true), None);
    }

    #[test]
    fn test_messenger_reports_every_severity() {
        let severities = messenger_severities();
        for severity in [
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        ] {
            assert!(severities.contains(severity));
        }
    }

    #[test]
    fn test_severity_maps_to_log_level() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;
        assert_eq!(severity_level(Severity::ERROR), log::Level::Error);
        assert_eq!(severity_level(Severity::WARNING), log::Level::Warn);
        assert_eq!(severity_level(Severity::INFO), log::Level::Debug);
        assert_eq!(severity_level(Severity::VERBOSE), log::Level::Trace);
    }
}
