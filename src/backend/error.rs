// Error taxonomy for the presentation backend
//
// Three classes of failure:
// - configuration faults during setup (no device / queue family / extension)
// - transient presentation faults (out-of-date, suboptimal) -> never an error,
//   reported as SurfaceStatus so the outer loop can rebuild when convenient
// - unexpected driver faults -> FrameError, fatal for the frame loop
//
// Every raw vk::Result produced on the frame path goes through `checkpoint`.

use ash::vk;
use thiserror::Error;

/// Setup failures. Unrecoverable: the renderer cannot start.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("no Vulkan-capable GPU found")]
    NoVulkanDevice,

    #[error("no queue family supports both graphics and presentation to the window surface")]
    NoGraphicsPresentQueue,

    #[error("the device queue cannot present to this window's surface")]
    PresentUnsupported,

    #[error("required extension {0} is not available")]
    MissingExtension(String),

    #[error("min_image_count must be at least 2 (got {0})")]
    InvalidMinImageCount(u32),
}

/// Frame-loop failures. Anything reaching the caller as a FrameError is fatal.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("{op} failed: {result:?}")]
    Device { op: &'static str, result: vk::Result },

    #[error("{op} timed out")]
    Timeout { op: &'static str },

    #[error("driver returned image index {index}, but the swapchain has {count} images")]
    InvalidImageIndex { index: u32, count: usize },

    #[error("failed to record frame commands: {0:#}")]
    Record(anyhow::Error),

    #[error("failed to rebuild swapchain resources: {0:#}")]
    Rebuild(anyhow::Error),
}

/// Non-fatal outcome of a swapchain operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    /// Swapchain matches the surface.
    Current,
    /// Operation succeeded but the swapchain should be rebuilt.
    Suboptimal,
    /// Operation did not happen; the swapchain must be rebuilt first.
    OutOfDate,
}

impl SurfaceStatus {
    pub fn is_stale(self) -> bool {
        !matches!(self, SurfaceStatus::Current)
    }
}

/// Classify a raw Vulkan result. The only place frame-path severity is decided.
pub fn checkpoint(result: vk::Result, op: &'static str) -> Result<SurfaceStatus, FrameError> {
    match result {
        vk::Result::SUCCESS => Ok(SurfaceStatus::Current),
        vk::Result::SUBOPTIMAL_KHR => {
            log::debug!("[vulkan] {}: swapchain suboptimal", op);
            Ok(SurfaceStatus::Suboptimal)
        }
        vk::Result::ERROR_OUT_OF_DATE_KHR => {
            log::debug!("[vulkan] {}: swapchain out of date", op);
            Ok(SurfaceStatus::OutOfDate)
        }
        vk::Result::TIMEOUT | vk::Result::NOT_READY => {
            log::error!("[vulkan] {}: timed out ({:?})", op, result);
            Err(FrameError::Timeout { op })
        }
        other => {
            log::error!("[vulkan] {}: {:?}", op, other);
            Err(FrameError::Device { op, result: other })
        }
    }
}

/// For operations whose only acceptable outcome is success: any failure,
/// including a stale surface, is fatal.
pub fn require<T>(result: ash::prelude::VkResult<T>, op: &'static str) -> Result<T, FrameError> {
    match result {
        Ok(value) => Ok(value),
        Err(code) => {
            checkpoint(code, op)?;
            Err(FrameError::Device { op, result: code })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_current() {
        assert_eq!(checkpoint(vk::Result::SUCCESS, "op").unwrap(), SurfaceStatus::Current);
    }

    #[test]
    fn test_transient_faults_are_not_errors() {
        let sub = checkpoint(vk::Result::SUBOPTIMAL_KHR, "present").unwrap();
        let ood = checkpoint(vk::Result::ERROR_OUT_OF_DATE_KHR, "present").unwrap();
        assert_eq!(sub, SurfaceStatus::Suboptimal);
        assert_eq!(ood, SurfaceStatus::OutOfDate);
        assert!(sub.is_stale());
        assert!(ood.is_stale());
        assert!(!SurfaceStatus::Current.is_stale());
    }

    #[test]
    fn test_timeout_is_reported_as_timeout() {
        match checkpoint(vk::Result::TIMEOUT, "wait_for_fences") {
            Err(FrameError::Timeout { op }) => assert_eq!(op, "wait_for_fences"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            checkpoint(vk::Result::NOT_READY, "acquire"),
            Err(FrameError::Timeout { .. })
        ));
    }

    #[test]
    fn test_driver_faults_are_fatal() {
        match checkpoint(vk::Result::ERROR_DEVICE_LOST, "queue_submit") {
            Err(FrameError::Device { op, result }) => {
                assert_eq!(op, "queue_submit");
                assert_eq!(result, vk::Result::ERROR_DEVICE_LOST);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(checkpoint(vk::Result::ERROR_SURFACE_LOST_KHR, "acquire").is_err());
    }

    #[test]
    fn test_require_rejects_every_failure() {
        assert_eq!(require(Ok(7u32), "op").unwrap(), 7);
        assert!(matches!(
            require::<u32>(Err(vk::Result::ERROR_OUT_OF_DATE_KHR), "queue_submit"),
            Err(FrameError::Device { result: vk::Result::ERROR_OUT_OF_DATE_KHR, .. })
        ));
        assert!(matches!(
            require::<()>(Err(vk::Result::TIMEOUT), "wait_for_fences"),
            Err(FrameError::Timeout { .. })
        ));
    }
}
