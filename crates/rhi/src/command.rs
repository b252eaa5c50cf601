//! Command pool and command buffer management.
//!
//! # Overview
//!
//! - [`CommandPool`] owns a VkCommandPool for one queue family
//! - [`CommandBuffer`] owns a VkCommandBuffer and tracks its recording state
//!
//! # State Machine
//!
//! ```text
//! NotAllocated -> Ready -> Recording <-> InRenderPass
//!                   ^          |
//!                   |          v
//!                   |    RecordingEnded -> Submitted
//!                   +---------- reset ---------+
//! ```
//!
//! `reset` returns a buffer to `Ready` from any allocated state; `free`
//! returns it to `NotAllocated`. Re-recording a buffer whose last submission
//! has not retired is a usage error: callers must wait on the submission's
//! fence first.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::gpu::GpuDevice;
//! use renderer_rhi::command::{CommandPool, CommandBuffer};
//!
//! # fn example(device: Arc<dyn GpuDevice>) -> Result<(), renderer_rhi::RhiError> {
//! let queue_family = device.queue_families().graphics_family.unwrap_or(0);
//! let pool = CommandPool::new(device.clone(), queue_family)?;
//!
//! let mut cmd = CommandBuffer::allocate(device.clone(), &pool, true)?;
//! cmd.begin(false, false, false)?;
//! // ... record rendering commands ...
//! cmd.end()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::gpu::{GpuDevice, SubmitDesc};

/// Vulkan command pool wrapper.
///
/// Each pool is associated with a queue family and can only allocate command
/// buffers that will be submitted to queues of that family.
pub struct CommandPool {
    device: Arc<dyn GpuDevice>,
    pool: vk::CommandPool,
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a new command pool for the specified queue family.
    ///
    /// The pool is created with the `RESET_COMMAND_BUFFER` flag, allowing
    /// individual command buffers to be reset without resetting the entire pool.
    ///
    /// # Errors
    ///
    /// Returns an error if command pool creation fails.
    pub fn new(device: Arc<dyn GpuDevice>, queue_family_index: u32) -> RhiResult<Self> {
        let flags = vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER;
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(flags);

        let pool = device.create_command_pool(&create_info)?;

        info!(
            "Command pool created for queue family {} ({:?})",
            queue_family_index, flags
        );

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    /// Returns the Vulkan command pool handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Returns the queue family index this pool belongs to.
    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        self.device.destroy_command_pool(self.pool);
        info!(
            "Command pool destroyed for queue family {}",
            self.queue_family_index
        );
    }
}

/// Recording state of a [`CommandBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    /// No native handle is held.
    NotAllocated,
    /// Allocated or reset; ready to begin recording.
    Ready,
    /// Between `begin` and `end`, outside a render pass.
    Recording,
    /// Inside a render pass.
    InRenderPass,
    /// Recording finished; ready to submit.
    RecordingEnded,
    /// Handed to a queue. Only a reset makes it recordable again.
    Submitted,
}

/// Vulkan command buffer with an explicit recording state.
///
/// The buffer owns its native handle and frees it back to its pool on drop,
/// so it must not outlive the [`CommandPool`] it was allocated from.
pub struct CommandBuffer {
    device: Arc<dyn GpuDevice>,
    pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
    primary: bool,
    state: CommandBufferState,
}

impl CommandBuffer {
    /// Allocates a command buffer from `pool`.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `pool` - The command pool to allocate from
    /// * `primary` - Primary or secondary level
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn allocate(
        device: Arc<dyn GpuDevice>,
        pool: &CommandPool,
        primary: bool,
    ) -> RhiResult<Self> {
        let level = if primary {
            vk::CommandBufferLevel::PRIMARY
        } else {
            vk::CommandBufferLevel::SECONDARY
        };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool.handle())
            .level(level)
            .command_buffer_count(1);

        let buffer = device
            .allocate_command_buffers(&alloc_info)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RhiError::InvalidHandle("command buffer allocation returned nothing".to_string())
            })?;

        Ok(Self {
            device,
            pool: pool.handle(),
            buffer,
            primary,
            state: CommandBufferState::Ready,
        })
    }

    /// Allocates `count` primary command buffers from `pool`.
    ///
    /// # Errors
    ///
    /// Returns an error if any allocation fails.
    pub fn allocate_many(
        device: &Arc<dyn GpuDevice>,
        pool: &CommandPool,
        count: usize,
    ) -> RhiResult<Vec<Self>> {
        let buffers = (0..count)
            .map(|_| Self::allocate(device.clone(), pool, true))
            .collect::<RhiResult<Vec<_>>>()?;

        debug!("Allocated {} command buffer(s)", buffers.len());
        Ok(buffers)
    }

    /// Returns the raw Vulkan command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Returns the current recording state.
    #[inline]
    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    /// Returns true for primary-level buffers.
    #[inline]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    // =========================================================================
    // Recording Control
    // =========================================================================

    /// Begins recording.
    ///
    /// # Arguments
    ///
    /// * `single_use` - Recorded once and submitted once (`ONE_TIME_SUBMIT`)
    /// * `render_pass_continue` - Secondary buffer entirely inside a render pass
    /// * `simultaneous_use` - May be pending on several queues at once
    ///
    /// # Errors
    ///
    /// Returns an error if the device rejects the call.
    pub fn begin(
        &mut self,
        single_use: bool,
        render_pass_continue: bool,
        simultaneous_use: bool,
    ) -> RhiResult<()> {
        self.expect_state(CommandBufferState::Ready, "begin");

        let mut flags = vk::CommandBufferUsageFlags::empty();
        if single_use {
            flags |= vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT;
        }
        if render_pass_continue {
            flags |= vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE;
        }
        if simultaneous_use {
            flags |= vk::CommandBufferUsageFlags::SIMULTANEOUS_USE;
        }

        self.device.begin_command_buffer(self.buffer, flags)?;
        self.state = CommandBufferState::Recording;
        Ok(())
    }

    /// Ends recording. The buffer is then ready for submission.
    ///
    /// # Errors
    ///
    /// Returns an error if the device rejects the call.
    pub fn end(&mut self) -> RhiResult<()> {
        self.expect_state(CommandBufferState::Recording, "end");

        self.device.end_command_buffer(self.buffer)?;
        self.state = CommandBufferState::RecordingEnded;
        Ok(())
    }

    /// Records that the buffer has been handed to a queue.
    pub fn mark_submitted(&mut self) {
        self.expect_state(CommandBufferState::RecordingEnded, "mark_submitted");
        self.state = CommandBufferState::Submitted;
    }

    /// Resets the buffer so it can be recorded again.
    ///
    /// The fence of the buffer's last submission must have signaled.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&mut self) -> RhiResult<()> {
        if self.state == CommandBufferState::NotAllocated {
            warn!("Attempted to reset a command buffer that is not allocated");
            return Ok(());
        }

        self.device.reset_command_buffer(self.buffer)?;
        self.state = CommandBufferState::Ready;
        Ok(())
    }

    /// Returns the handle to the pool. Safe to call in any state.
    pub fn free(&mut self) {
        if self.state == CommandBufferState::NotAllocated {
            return;
        }

        self.device.free_command_buffers(self.pool, &[self.buffer]);
        self.buffer = vk::CommandBuffer::null();
        self.state = CommandBufferState::NotAllocated;
    }

    pub(crate) fn set_state(&mut self, state: CommandBufferState) {
        self.state = state;
    }

    fn expect_state(&self, expected: CommandBufferState, operation: &str) {
        if self.state != expected {
            warn!(
                "Command buffer {}: expected {:?}, found {:?}",
                operation, expected, self.state
            );
        }
    }

    // =========================================================================
    // Single-Use Helpers
    // =========================================================================

    /// Allocates a primary buffer and begins single-use recording.
    ///
    /// Intended for one-off work outside the frame loop, such as uploads.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation or begin fails.
    pub fn begin_single_use(device: Arc<dyn GpuDevice>, pool: &CommandPool) -> RhiResult<Self> {
        let mut buffer = Self::allocate(device, pool, true)?;
        buffer.begin(true, false, false)?;
        Ok(buffer)
    }

    /// Ends recording, submits to `queue` without a fence, waits for the queue
    /// to go idle, then frees the buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if ending, submission or the queue wait fails. The
    /// buffer is freed in every case.
    pub fn end_single_use(mut self, queue: vk::Queue) -> RhiResult<()> {
        self.end()?;

        let command_buffers = [self.buffer];
        let submit = SubmitDesc {
            command_buffers: &command_buffers,
            ..Default::default()
        };
        self.device.queue_submit(queue, &submit, vk::Fence::null())?;
        self.mark_submitted();

        self.device.queue_wait_idle(queue)?;
        self.free();
        Ok(())
    }

    // =========================================================================
    // Dynamic State
    // =========================================================================

    /// Sets the viewport dynamically.
    pub fn set_viewport(&self, viewport: &vk::Viewport) {
        self.device.cmd_set_viewport(self.buffer, viewport);
    }

    /// Sets the scissor rectangle dynamically.
    pub fn set_scissor(&self, scissor: &vk::Rect2D) {
        self.device.cmd_set_scissor(self.buffer, scissor);
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        self.free();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDevice;

    fn setup() -> (Arc<MockDevice>, Arc<dyn GpuDevice>, CommandPool) {
        let mock = Arc::new(MockDevice::new());
        let device: Arc<dyn GpuDevice> = mock.clone();
        let pool = CommandPool::new(device.clone(), 0).unwrap();
        (mock, device, pool)
    }

    #[test]
    fn test_command_buffer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandBuffer>();
        assert_send::<CommandPool>();
    }

    #[test]
    fn test_full_state_cycle() {
        let (_mock, device, pool) = setup();
        let mut cmd = CommandBuffer::allocate(device, &pool, true).unwrap();
        assert_eq!(cmd.state(), CommandBufferState::Ready);

        cmd.begin(false, false, false).unwrap();
        assert_eq!(cmd.state(), CommandBufferState::Recording);

        cmd.end().unwrap();
        assert_eq!(cmd.state(), CommandBufferState::RecordingEnded);

        cmd.mark_submitted();
        assert_eq!(cmd.state(), CommandBufferState::Submitted);

        cmd.reset().unwrap();
        assert_eq!(cmd.state(), CommandBufferState::Ready);

        cmd.free();
        assert_eq!(cmd.state(), CommandBufferState::NotAllocated);
        assert_eq!(cmd.handle(), vk::CommandBuffer::null());
    }

    #[test]
    fn test_begin_flags_combine() {
        let (mock, device, pool) = setup();
        let mut cmd = CommandBuffer::allocate(device, &pool, false).unwrap();
        assert!(!cmd.is_primary());

        cmd.begin(true, true, true).unwrap();
        assert_eq!(
            mock.last_begin_flags(),
            Some(
                vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
                    | vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE
                    | vk::CommandBufferUsageFlags::SIMULTANEOUS_USE
            )
        );
    }

    #[test]
    fn test_drop_frees_handle() {
        let (mock, device, pool) = setup();
        let buffers = CommandBuffer::allocate_many(&device, &pool, 3).unwrap();
        assert_eq!(mock.live_command_buffers(), 3);

        drop(buffers);
        assert_eq!(mock.live_command_buffers(), 0);
    }

    #[test]
    fn test_free_twice_is_harmless() {
        let (mock, device, pool) = setup();
        let mut cmd = CommandBuffer::allocate(device, &pool, true).unwrap();

        cmd.free();
        cmd.free();
        drop(cmd);
        assert_eq!(mock.live_command_buffers(), 0);
    }

    #[test]
    fn test_single_use_round_trip() {
        let (mock, device, pool) = setup();
        let cmd = CommandBuffer::begin_single_use(device.clone(), &pool).unwrap();
        assert_eq!(cmd.state(), CommandBufferState::Recording);
        assert_eq!(
            mock.last_begin_flags(),
            Some(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
        );

        cmd.end_single_use(device.graphics_queue()).unwrap();

        assert_eq!(mock.submission_count(), 1);
        assert_eq!(mock.outstanding_submissions(), 0);
        assert_eq!(mock.live_command_buffers(), 0);
    }
}
