//! Frame pacing and swapchain lifecycle.
//!
//! This module provides the [`FrameController`] struct that drives the
//! per-frame loop. It handles:
//!
//! - Frame-slot synchronization (fences and semaphore pairs)
//! - Per-image command buffers and their recording state
//! - Swapchain image acquisition and presentation
//! - Transparent swapchain recreation on resize or stale surfaces
//!
//! # Overview
//!
//! Up to [`MAX_FRAMES_IN_FLIGHT`] frames are processed concurrently:
//!
//! 1. While the GPU renders frame N, the CPU records frame N+1
//! 2. Each frame slot owns its semaphores and fence
//! 3. Command buffers are per swapchain image and are only re-recorded once
//!    the fence of the slot that last used the image has signaled
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::gpu::GpuDevice;
//! use renderer_rhi::vk;
//! use renderer_renderer::{FrameConfig, FrameController};
//!
//! # fn example(device: Arc<dyn GpuDevice>, surface: vk::SurfaceKHR) -> renderer_rhi::RhiResult<()> {
//! let mut frames = FrameController::new(device, surface, 1280, 720, FrameConfig::default())?;
//!
//! loop {
//!     let delta_time = 1.0 / 60.0;
//!     if frames.begin_frame(delta_time)? {
//!         // Record draws into frames.current_command_buffer()...
//!         frames.end_frame(delta_time)?;
//!     }
//!     # break;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, trace};

use renderer_rhi::command::{CommandBuffer, CommandPool};
use renderer_rhi::gpu::{GpuDevice, SubmitDesc};
use renderer_rhi::render_pass::RenderPass;
use renderer_rhi::swapchain::{
    AcquireOutcome, PresentOutcome, Swapchain, choose_extent, choose_surface_format,
};
use renderer_rhi::sync::{FrameSync, MAX_FRAMES_IN_FLIGHT};
use renderer_rhi::{RhiError, RhiResult, depth_buffer};

use crate::config::FrameConfig;

/// Drives begin/end of frames against a swapchain.
///
/// # Synchronization Flow
///
/// ```text
/// begin_frame:
///   1. Wait on frames[current_frame].in_flight_fence
///   2. Acquire swapchain image (signals image_available)
///   3. Wait on the fence of the slot that last used this image, if any
///   4. Reset + begin the image's command buffer, begin the render pass
/// end_frame:
///   5. End the render pass and the command buffer
///   6. Reset in_flight_fence, submit:
///      - Wait on image_available at COLOR_ATTACHMENT_OUTPUT
///      - Signal queue_complete and in_flight_fence
///   7. Present (waits on queue_complete), advance current_frame
/// ```
///
/// # Resource Destruction Order
///
/// `Drop` waits for the device to go idle, then fields are dropped in
/// declaration order: command buffers, command pool, swapchain (framebuffers,
/// depth, views, handle), render pass, frame sync objects.
pub struct FrameController {
    device: Arc<dyn GpuDevice>,
    config: FrameConfig,

    /// One per swapchain image.
    command_buffers: Vec<CommandBuffer>,
    command_pool: CommandPool,
    swapchain: Swapchain,
    render_pass: RenderPass,
    /// One per frame slot.
    frames: Vec<FrameSync>,

    /// For each swapchain image, the frame slot whose fence last claimed it.
    images_in_flight: Vec<Option<usize>>,
    current_frame: usize,
    image_index: u32,
    frame_in_progress: bool,
    recreating: bool,

    /// Latest requested framebuffer size.
    width: u32,
    height: u32,
    framebuffer_size_generation: u64,
    last_handled_generation: u64,

    frame_count: u64,
    elapsed_time: f32,
    stats_frames: u32,
    stats_time: f32,
}

impl FrameController {
    /// Creates the render pass, swapchain, command buffers and frame sync
    /// objects for `surface`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The surface has no formats or present modes
    /// - No depth format supports depth attachments
    /// - The device has no graphics queue family
    /// - Any Vulkan object creation fails
    pub fn new(
        device: Arc<dyn GpuDevice>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        config: FrameConfig,
    ) -> RhiResult<Self> {
        let support = device.surface_support(surface)?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let depth_format = depth_buffer::find_depth_format(device.as_ref())?;
        let extent = choose_extent(&support.capabilities, width, height);

        let mut render_pass = RenderPass::new(
            device.clone(),
            surface_format.format,
            depth_format,
            full_rect(extent),
            config.clear_values(),
        )?;

        let swapchain = Swapchain::new(device.clone(), surface, width, height, &render_pass)?;
        render_pass.set_render_area(full_rect(swapchain.extent()));

        let graphics_family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;
        let command_buffers =
            CommandBuffer::allocate_many(&device, &command_pool, swapchain.image_count())?;

        let frames = FrameSync::new_per_frame(&device, MAX_FRAMES_IN_FLIGHT)?;
        let images_in_flight = vec![None; swapchain.image_count()];

        info!(
            "Frame controller initialized: {} swapchain images, {} frames in flight",
            swapchain.image_count(),
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            device,
            config,
            command_buffers,
            command_pool,
            swapchain,
            render_pass,
            frames,
            images_in_flight,
            current_frame: 0,
            image_index: 0,
            frame_in_progress: false,
            recreating: false,
            width,
            height,
            framebuffer_size_generation: 0,
            last_handled_generation: 0,
            frame_count: 0,
            elapsed_time: 0.0,
            stats_frames: 0,
            stats_time: 0.0,
        })
    }

    /// Prepares the next frame for recording.
    ///
    /// Returns `Ok(false)` when the frame should be skipped: a recreation is in
    /// progress, a pending resize was just handled, the swapchain was out of
    /// date, or no image became available before the acquire timeout. On
    /// `Ok(true)` the current command buffer is recording inside the render
    /// pass with viewport and scissor set.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::FrameInProgress`] if the previous frame was not
    /// ended, [`RhiError::Timeout`] if a fence wait times out and any other
    /// error the device reports. All errors except `FrameInProgress` are fatal.
    pub fn begin_frame(&mut self, delta_time: f32) -> RhiResult<bool> {
        if self.frame_in_progress {
            return Err(RhiError::FrameInProgress);
        }

        if self.recreating {
            debug!("Swapchain recreation in progress, skipping frame");
            self.device.wait_idle()?;
            return Ok(false);
        }

        // The device idle wait happens inside the swapchain rebuild.
        if self.framebuffer_size_generation != self.last_handled_generation {
            debug!("Resize pending, recreating swapchain before acquire");
            self.recreate_swapchain()?;
            return Ok(false);
        }

        let slot = self.current_frame;
        if !self.frames[slot]
            .in_flight_fence_mut()
            .wait(self.config.fence_timeout)?
        {
            error!("In-flight fence of frame slot {} timed out", slot);
            return Err(RhiError::Timeout(format!(
                "in-flight fence of frame slot {}",
                slot
            )));
        }

        let outcome = self.swapchain.acquire_next_image(
            self.config.acquire_timeout,
            self.frames[slot].image_available_handle(),
        )?;

        let image_index = match outcome {
            AcquireOutcome::Acquired { image_index, .. } => image_index,
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date, recreating");
                self.recreate_swapchain()?;
                return Ok(false);
            }
            AcquireOutcome::NotReady => return Ok(false),
        };

        let image = image_index as usize;
        self.wait_for_image_fence(image)?;

        let extent = self.swapchain.extent();
        let framebuffer = self.swapchain.framebuffer(image);

        let command_buffer = &mut self.command_buffers[image];
        command_buffer.reset()?;
        command_buffer.begin(false, false, false)?;
        command_buffer.set_viewport(&flipped_viewport(extent));
        command_buffer.set_scissor(&full_rect(extent));
        self.render_pass.begin(command_buffer, framebuffer);

        self.image_index = image_index;
        self.frame_in_progress = true;

        trace!(
            "Began frame {} (slot {}, image {}, dt {:.3}ms)",
            self.frame_count,
            slot,
            image_index,
            delta_time * 1000.0
        );
        Ok(true)
    }

    /// Finishes recording, submits and presents the current frame.
    ///
    /// Triggers a swapchain recreation after presenting if the swapchain
    /// reported itself stale or suboptimal.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::FrameNotInProgress`] without a preceding successful
    /// [`begin_frame`](Self::begin_frame). Submission and presentation
    /// failures are fatal.
    pub fn end_frame(&mut self, delta_time: f32) -> RhiResult<()> {
        if !self.frame_in_progress {
            return Err(RhiError::FrameNotInProgress);
        }
        self.frame_in_progress = false;

        let slot = self.current_frame;
        let image = self.image_index as usize;

        let Some(command_buffer) = self.command_buffers.get_mut(image) else {
            error!(
                "Image {} has no command buffer ({} images)",
                image,
                self.command_buffers.len()
            );
            return Err(RhiError::InvalidHandle(format!(
                "command buffer for swapchain image {}",
                image
            )));
        };
        self.render_pass.end(command_buffer);
        command_buffer.end()?;

        self.wait_for_image_fence(image)?;
        self.images_in_flight[image] = Some(slot);

        self.frames[slot].in_flight_fence_mut().reset()?;

        let frame = &self.frames[slot];
        let command_buffers = [self.command_buffers[image].handle()];
        let wait_semaphores = [frame.image_available_handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.queue_complete_handle()];

        let submit = SubmitDesc {
            command_buffers: &command_buffers,
            wait_semaphores: &wait_semaphores,
            wait_stages: &wait_stages,
            signal_semaphores: &signal_semaphores,
        };

        if let Err(e) = self.device.queue_submit(
            self.device.graphics_queue(),
            &submit,
            frame.in_flight_fence_handle(),
        ) {
            error!("Failed to submit frame {}: {}", self.frame_count, e);
            return Err(e);
        }
        self.command_buffers[image].mark_submitted();

        let outcome = self.swapchain.present(
            self.device.present_queue(),
            self.image_index,
            signal_semaphores[0],
        )?;

        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;
        self.record_frame_time(delta_time);

        if matches!(outcome, PresentOutcome::NeedsRecreate) {
            debug!("Swapchain needs recreation after present");
            self.recreate_swapchain()?;
        }

        Ok(())
    }

    /// Records a new framebuffer size. The swapchain is rebuilt at the start
    /// of the next frame.
    pub fn on_resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.framebuffer_size_generation = self.framebuffer_size_generation.wrapping_add(1);
        debug!(
            "Framebuffer resized to {}x{} (generation {})",
            width, height, self.framebuffer_size_generation
        );
    }

    /// Rebuilds the swapchain and per-image command buffers at the latest
    /// requested size.
    ///
    /// The render pass is rebuilt first when the surface's preferred format no
    /// longer matches its color attachment, so the new framebuffers always
    /// pair with the active pass.
    ///
    /// Returns `Ok(false)` if a recreation is already in progress, a frame is
    /// being recorded, or either dimension is zero.
    ///
    /// # Errors
    ///
    /// Returns an error if recreation fails. The controller then keeps
    /// skipping frames.
    pub fn recreate_swapchain(&mut self) -> RhiResult<bool> {
        if self.recreating {
            debug!("Swapchain recreation already in progress");
            return Ok(false);
        }

        if self.frame_in_progress {
            debug!(
                "Frame {} is being recorded, deferring swapchain recreation",
                self.frame_count
            );
            return Ok(false);
        }

        if self.width == 0 || self.height == 0 {
            debug!(
                "Framebuffer is {}x{}, deferring swapchain recreation",
                self.width, self.height
            );
            return Ok(false);
        }

        self.recreating = true;
        self.images_in_flight.iter_mut().for_each(|slot| *slot = None);

        let replacement_pass = self.render_pass_for_surface()?;
        let render_pass = replacement_pass.as_ref().unwrap_or(&self.render_pass);
        if !self.swapchain.recreate(self.width, self.height, render_pass)? {
            self.recreating = false;
            return Ok(false);
        }
        if let Some(render_pass) = replacement_pass {
            // The old pass is only destroyed once no framebuffer refers to it.
            self.render_pass = render_pass;
        }

        let extent = self.swapchain.extent();
        self.render_pass.set_render_area(full_rect(extent));
        self.last_handled_generation = self.framebuffer_size_generation;

        self.command_buffers.clear();
        self.command_buffers = CommandBuffer::allocate_many(
            &self.device,
            &self.command_pool,
            self.swapchain.image_count(),
        )?;
        self.images_in_flight = vec![None; self.swapchain.image_count()];
        self.image_index = 0;

        self.recreating = false;

        info!(
            "Swapchain recreated: {}x{}, {} images",
            extent.width,
            extent.height,
            self.swapchain.image_count()
        );
        Ok(true)
    }

    /// Returns a new render pass if the surface now prefers a different color
    /// format than the current pass was built for.
    fn render_pass_for_surface(&self) -> RhiResult<Option<RenderPass>> {
        let support = self.device.surface_support(self.swapchain.surface())?;
        if !support.is_adequate() {
            // Swapchain creation reports the inadequate surface.
            return Ok(None);
        }

        let format = choose_surface_format(&support.formats).format;
        if format == self.render_pass.color_format() {
            return Ok(None);
        }

        info!(
            "Surface format changed from {:?} to {:?}, rebuilding render pass",
            self.render_pass.color_format(),
            format
        );
        RenderPass::new(
            self.device.clone(),
            format,
            self.render_pass.depth_format(),
            self.render_pass.render_area(),
            self.render_pass.clear_values(),
        )
        .map(Some)
    }

    /// Waits for the fence of the slot that last submitted work for `image`.
    fn wait_for_image_fence(&mut self, image: usize) -> RhiResult<()> {
        let Some(slot) = self.images_in_flight.get(image).copied().flatten() else {
            return Ok(());
        };

        if !self.frames[slot]
            .in_flight_fence_mut()
            .wait(self.config.fence_timeout)?
        {
            error!("Fence of frame slot {} guarding image {} timed out", slot, image);
            return Err(RhiError::Timeout(format!(
                "fence of frame slot {} guarding image {}",
                slot, image
            )));
        }
        Ok(())
    }

    fn record_frame_time(&mut self, delta_time: f32) {
        self.frame_count += 1;
        self.elapsed_time += delta_time;
        self.stats_frames += 1;
        self.stats_time += delta_time;

        if self.stats_time >= 1.0 {
            debug!(
                "{} frames in {:.2}s ({:.1} fps)",
                self.stats_frames,
                self.stats_time,
                self.stats_frames as f32 / self.stats_time
            );
            self.stats_frames = 0;
            self.stats_time = 0.0;
        }
    }

    /// Waits for all GPU work to complete.
    pub fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    /// Returns the current frame slot (0 to MAX_FRAMES_IN_FLIGHT - 1).
    #[inline]
    pub fn current_frame_index(&self) -> usize {
        self.current_frame
    }

    /// Returns the swapchain image acquired by the last successful `begin_frame`.
    #[inline]
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Returns the command buffer of the current swapchain image.
    pub fn current_command_buffer(&self) -> &CommandBuffer {
        &self.command_buffers[self.image_index as usize]
    }

    pub fn current_command_buffer_mut(&mut self) -> &mut CommandBuffer {
        &mut self.command_buffers[self.image_index as usize]
    }

    /// Returns the per-image command buffers.
    pub fn command_buffers(&self) -> &[CommandBuffer] {
        &self.command_buffers
    }

    /// Returns the per-slot synchronization objects.
    pub fn frames(&self) -> &[FrameSync] {
        &self.frames
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    #[inline]
    pub fn framebuffer_extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Returns the frame slot whose fence last claimed swapchain image `image`.
    pub fn image_fence_slot(&self, image: usize) -> Option<usize> {
        self.images_in_flight.get(image).copied().flatten()
    }

    /// Number of frames submitted and presented so far.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Sum of the `delta_time` values of all completed frames, in seconds.
    #[inline]
    pub fn elapsed_time(&self) -> f32 {
        self.elapsed_time
    }

    #[inline]
    pub fn is_recreating(&self) -> bool {
        self.recreating
    }

    #[inline]
    pub fn is_frame_in_progress(&self) -> bool {
        self.frame_in_progress
    }

    #[inline]
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    #[inline]
    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }
}

impl Drop for FrameController {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during drop: {:?}", e);
        }
        // Buffers go back to the pool before the pool itself is destroyed.
        self.command_buffers.clear();
        info!(
            "Frame controller destroyed after {} frames ({:.2}s)",
            self.frame_count, self.elapsed_time
        );
    }
}

/// Viewport covering `extent` with Y pointing up.
fn flipped_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: extent.height as f32,
        width: extent.width as f32,
        height: -(extent.height as f32),
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

fn full_rect(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}
