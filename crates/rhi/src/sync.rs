//! Synchronization primitives for Vulkan.
//!
//! This module provides wrappers for Vulkan synchronization objects:
//! - [`Semaphore`] - GPU-to-GPU synchronization (between queue operations)
//! - [`Fence`] - GPU-to-CPU synchronization (for host waiting)
//! - [`FrameSync`] - Per-frame synchronization primitives for rendering
//!
//! # Overview
//!
//! - **Semaphores** order operations on the GPU. Image acquisition signals the
//!   image-available semaphore that the frame's submission waits on; the
//!   submission signals the queue-complete semaphore that presentation waits on.
//!
//! - **Fences** let the CPU know when a submission has retired. A [`Fence`]
//!   caches its signaled state, so waiting on a fence that is already known to be
//!   signaled costs nothing.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::gpu::GpuDevice;
//! use renderer_rhi::sync::{Semaphore, Fence};
//!
//! # fn example(device: Arc<dyn GpuDevice>) -> Result<(), renderer_rhi::RhiError> {
//! let image_available = Semaphore::new(device.clone())?;
//!
//! // Start signaled so the first frame does not block
//! let mut in_flight_fence = Fence::new(device.clone(), true)?;
//!
//! if in_flight_fence.wait(u64::MAX)? {
//!     in_flight_fence.reset()?;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::gpu::GpuDevice;

/// Vulkan semaphore wrapper.
///
/// Semaphores are used for GPU-to-GPU synchronization between queue operations.
/// They are created unsignaled and live as long as their frame slot.
pub struct Semaphore {
    device: Arc<dyn GpuDevice>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new semaphore in the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<dyn GpuDevice>) -> RhiResult<Self> {
        let semaphore = device.create_semaphore()?;

        debug!("Created semaphore");

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.semaphore);
        debug!("Destroyed semaphore");
    }
}

/// Vulkan fence wrapper with a cached signaled flag.
///
/// The flag is set when a wait completes and cleared by [`Fence::reset`]. While
/// it is set, [`Fence::wait`] returns immediately without calling into the
/// device.
///
/// # Thread Safety
///
/// Waiting and resetting take `&mut self`; the frame loop owns its fences and
/// drives them from a single thread.
pub struct Fence {
    device: Arc<dyn GpuDevice>,
    fence: vk::Fence,
    signaled: bool,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - If true, creates the fence in the signaled state.
    ///   A frame slot's fence starts signaled so its first wait does not block.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<dyn GpuDevice>, signaled: bool) -> RhiResult<Self> {
        let fence = device.create_fence(signaled)?;

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self {
            device,
            fence,
            signaled,
        })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Returns the cached signaled state without querying the device.
    #[inline]
    pub fn is_known_signaled(&self) -> bool {
        self.signaled
    }

    /// Waits for the fence to become signaled.
    ///
    /// Returns `Ok(true)` once the fence is signaled and `Ok(false)` if the
    /// timeout elapsed first. A fence already known to be signaled returns
    /// `Ok(true)` without touching the device.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Timeout in nanoseconds. Use `u64::MAX` for infinite wait.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] if the device was lost, or
    /// [`RhiError::VulkanError`] for any other failure. Both are fatal.
    pub fn wait(&mut self, timeout: u64) -> RhiResult<bool> {
        if self.signaled {
            return Ok(true);
        }

        match self.device.wait_for_fence(self.fence, timeout) {
            Ok(()) => {
                self.signaled = true;
                Ok(true)
            }
            Err(vk::Result::TIMEOUT) => {
                warn!("Fence wait timed out after {} ns", timeout);
                Ok(false)
            }
            Err(vk::Result::ERROR_DEVICE_LOST) => {
                error!("Fence wait failed: device lost");
                Err(RhiError::DeviceLost)
            }
            Err(e) => {
                error!("Fence wait failed: {:?}", e);
                Err(RhiError::VulkanError(e))
            }
        }
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// Only meaningful on a signaled fence that no pending submission
    /// references. Resetting a fence that is not known to be signaled is a
    /// usage error; it is logged and the fence is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset operation fails.
    pub fn reset(&mut self) -> RhiResult<()> {
        if !self.signaled {
            warn!("Attempted to reset a fence that is not signaled; ignoring");
            return Ok(());
        }

        self.device.reset_fence(self.fence)?;
        self.signaled = false;
        Ok(())
    }

    /// Polls the device for the fence status without blocking.
    ///
    /// Refreshes the cached flag when the fence has become signaled.
    ///
    /// # Errors
    ///
    /// Returns an error if the status query fails.
    pub fn is_signaled(&mut self) -> RhiResult<bool> {
        if !self.signaled {
            self.signaled = self.device.fence_status(self.fence)?;
        }
        Ok(self.signaled)
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.device.destroy_fence(self.fence);
        debug!("Destroyed fence");
    }
}

/// Maximum number of frames that can be processed concurrently.
///
/// Using 2 allows the CPU to prepare the next frame while the GPU
/// renders the current one.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Per-frame-slot synchronization primitives.
///
/// # Usage Pattern
///
/// ```text
/// 1. Wait for in_flight_fence (CPU waits for the slot's previous submission)
/// 2. Acquire swapchain image (signals image_available)
/// 3. Reset in_flight_fence
/// 4. Submit command buffer:
///    - Wait on image_available at COLOR_ATTACHMENT_OUTPUT
///    - Signal queue_complete
///    - Signal in_flight_fence on completion
/// 5. Present (waits on queue_complete)
/// ```
pub struct FrameSync {
    image_available_semaphore: Semaphore,
    queue_complete_semaphore: Semaphore,
    in_flight_fence: Fence,
}

impl FrameSync {
    /// Creates a new set of frame synchronization primitives.
    ///
    /// The in-flight fence is created in the signaled state so the first
    /// frame can proceed without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if any synchronization object creation fails.
    pub fn new(device: Arc<dyn GpuDevice>) -> RhiResult<Self> {
        let image_available_semaphore = Semaphore::new(device.clone())?;
        let queue_complete_semaphore = Semaphore::new(device.clone())?;
        let in_flight_fence = Fence::new(device, true)?;

        Ok(Self {
            image_available_semaphore,
            queue_complete_semaphore,
            in_flight_fence,
        })
    }

    /// Creates one set of primitives per frame slot.
    ///
    /// # Errors
    ///
    /// Returns an error if any synchronization object creation fails.
    pub fn new_per_frame(device: &Arc<dyn GpuDevice>, count: usize) -> RhiResult<Vec<Self>> {
        let frames = (0..count)
            .map(|_| Self::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;

        info!("Created synchronization primitives for {} frame(s)", count);
        Ok(frames)
    }

    /// Semaphore signaled by swapchain image acquisition.
    #[inline]
    pub fn image_available_semaphore(&self) -> &Semaphore {
        &self.image_available_semaphore
    }

    /// Semaphore signaled when the frame's submission completes; waited on by presentation.
    #[inline]
    pub fn queue_complete_semaphore(&self) -> &Semaphore {
        &self.queue_complete_semaphore
    }

    /// Fence signaled when the frame's submission retires.
    #[inline]
    pub fn in_flight_fence(&self) -> &Fence {
        &self.in_flight_fence
    }

    #[inline]
    pub fn in_flight_fence_mut(&mut self) -> &mut Fence {
        &mut self.in_flight_fence
    }

    #[inline]
    pub fn image_available_handle(&self) -> vk::Semaphore {
        self.image_available_semaphore.handle()
    }

    #[inline]
    pub fn queue_complete_handle(&self) -> vk::Semaphore {
        self.queue_complete_semaphore.handle()
    }

    #[inline]
    pub fn in_flight_fence_handle(&self) -> vk::Fence {
        self.in_flight_fence.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::SubmitDesc;
    use crate::mock::MockDevice;

    fn mock() -> (Arc<MockDevice>, Arc<dyn GpuDevice>) {
        let mock = Arc::new(MockDevice::new());
        let device: Arc<dyn GpuDevice> = mock.clone();
        (mock, device)
    }

    #[test]
    fn test_max_frames_in_flight_constant() {
        assert_eq!(MAX_FRAMES_IN_FLIGHT, 2);
    }

    #[test]
    fn test_fence_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSync>();
    }

    #[test]
    fn test_signaled_fence_wait_skips_device() {
        let (mock, device) = mock();
        let mut fence = Fence::new(device, true).unwrap();

        assert!(fence.wait(u64::MAX).unwrap());
        assert!(fence.wait(u64::MAX).unwrap());
        assert_eq!(mock.fence_wait_count(), 0);
    }

    #[test]
    fn test_second_wait_is_free() {
        let (mock, device) = mock();
        let mut fence = Fence::new(device.clone(), false).unwrap();

        device
            .queue_submit(device.graphics_queue(), &SubmitDesc::default(), fence.handle())
            .unwrap();

        assert!(fence.wait(u64::MAX).unwrap());
        assert!(fence.wait(u64::MAX).unwrap());
        assert_eq!(mock.fence_wait_count(), 1);
    }

    #[test]
    fn test_wait_timeout_is_not_an_error() {
        let (_mock, device) = mock();
        // Never submitted, so the wait can only time out.
        let mut fence = Fence::new(device, false).unwrap();

        assert!(!fence.wait(1_000).unwrap());
        assert!(!fence.is_known_signaled());
    }

    #[test]
    fn test_device_lost_is_fatal() {
        let (mock, device) = mock();
        let mut fence = Fence::new(device.clone(), false).unwrap();
        device
            .queue_submit(device.graphics_queue(), &SubmitDesc::default(), fence.handle())
            .unwrap();

        mock.fail_next_fence_wait(vk::Result::ERROR_DEVICE_LOST);
        assert!(matches!(fence.wait(u64::MAX), Err(RhiError::DeviceLost)));
    }

    #[test]
    fn test_reset_unsignaled_fence_is_ignored() {
        let (mock, device) = mock();
        let mut fence = Fence::new(device, false).unwrap();

        fence.reset().unwrap();
        assert_eq!(mock.fence_reset_count(), 0);
    }

    #[test]
    fn test_reset_clears_cached_state() {
        let (mock, device) = mock();
        let mut fence = Fence::new(device, true).unwrap();

        fence.reset().unwrap();
        assert!(!fence.is_known_signaled());
        assert!(!fence.is_signaled().unwrap());
        assert_eq!(mock.fence_reset_count(), 1);
    }

    #[test]
    fn test_frame_sync_starts_signaled() {
        let (mock, device) = mock();
        let frames = FrameSync::new_per_frame(&device, MAX_FRAMES_IN_FLIGHT).unwrap();

        assert_eq!(frames.len(), MAX_FRAMES_IN_FLIGHT);
        assert!(frames.iter().all(|f| f.in_flight_fence().is_known_signaled()));
        assert_eq!(mock.live_fences(), 2);
        assert_eq!(mock.live_semaphores(), 4);

        drop(frames);
        assert_eq!(mock.live_fences(), 0);
        assert_eq!(mock.live_semaphores(), 0);
    }
}
