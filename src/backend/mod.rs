// Backend module - Vulkan presentation layer
//
// Layers, bottom up:
//   device    -> instance, GPU, queue, upload pool
//   surface   -> one presentable surface per OS window
//   swapchain -> one resource set per surface size
//   window    -> owns surface + render pass + current set, rebuilds on request
//   frame     -> acquire / record / submit / present protocol

pub mod device;
pub mod error;
pub mod frame;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod window;

pub use device::{VulkanDevice, VulkanInstance};
pub use error::FrameError;
pub use frame::{DrawPayload, FrameStatus, LoopAction};
pub use surface::WindowSurface;
pub use swapchain::SwapchainSettings;
pub use window::{PresentationContext, VulkanWindow};
