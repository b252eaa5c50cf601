//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
///
/// Recoverable presentation conditions (stale or suboptimal swapchain,
/// acquisition timeouts) are never reported through this type; they are
/// returned as outcomes by the swapchain so the frame loop can skip a frame.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// The logical device was lost. Never retried.
    #[error("Device lost")]
    DeviceLost,

    /// A host wait on the GPU exceeded its timeout.
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// None of the candidate depth formats supports optimal-tiling depth attachments.
    #[error("No supported depth format")]
    NoSupportedDepthFormat,

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// `end_frame` was called without a successful `begin_frame`.
    #[error("No frame in progress")]
    FrameNotInProgress,

    /// `begin_frame` was called again before the open frame was ended.
    #[error("A frame is already in progress")]
    FrameInProgress,
}

impl RhiError {
    /// Classifies a raw Vulkan result, mapping device loss to [`RhiError::DeviceLost`].
    pub fn from_vk(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            other => Self::VulkanError(other),
        }
    }

    /// Returns true if the error leaves the device unusable.
    pub fn is_device_lost(&self) -> bool {
        matches!(
            self,
            Self::DeviceLost | Self::VulkanError(vk::Result::ERROR_DEVICE_LOST)
        )
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_lost_is_classified() {
        let err = RhiError::from_vk(vk::Result::ERROR_DEVICE_LOST);
        assert!(matches!(err, RhiError::DeviceLost));
        assert!(err.is_device_lost());
    }

    #[test]
    fn test_other_results_stay_vulkan_errors() {
        let err = RhiError::from_vk(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        assert!(matches!(
            err,
            RhiError::VulkanError(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
        ));
        assert!(!err.is_device_lost());
    }
}
