//! In-memory [`GpuDevice`] for testing without GPU hardware.
//!
//! The mock hands out unique handles, tracks which ones are alive and keeps a
//! log of submissions and presents. Submitted work retires in queue order
//! when something waits for it: waiting on a fence retires every submission
//! up to and including the one that signals it, and a device or queue idle
//! wait retires everything.
//!
//! Acquire, present, fence-wait and swapchain-creation results can be scripted to drive the
//! recoverable and fatal paths of the frame loop.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use ash::vk;
use ash::vk::Handle;
use tracing::{trace, warn};

use crate::error::{RhiError, RhiResult};
use crate::gpu::{GpuDevice, SubmitDesc};
use crate::physical_device::QueueFamilyIndices;
use crate::swapchain::SwapchainSupportDetails;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Fence,
    Semaphore,
    CommandPool,
    CommandBuffer,
    Swapchain,
    ImageView,
    Image,
    RenderPass,
    Framebuffer,
}

#[derive(Debug, Default)]
struct MockFence {
    signaled: bool,
    /// Submission that will signal this fence when it retires.
    pending: Option<usize>,
}

#[derive(Debug)]
struct MockSwapchain {
    image_count: u32,
    next_image: u32,
}

/// A recorded queue submission.
#[derive(Debug, Clone)]
pub struct SubmitRecord {
    /// Submission order, starting at 0.
    pub id: usize,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub wait_semaphores: Vec<vk::Semaphore>,
    pub wait_stages: Vec<vk::PipelineStageFlags>,
    pub signal_semaphores: Vec<vk::Semaphore>,
    pub fence: vk::Fence,
}

#[derive(Debug)]
struct MockState {
    next_handle: u64,
    live: HashMap<u64, Kind>,
    invalid_destroys: usize,

    support: SwapchainSupportDetails,
    depth_formats: Vec<vk::Format>,

    fences: HashMap<u64, MockFence>,
    fence_waits: usize,
    fence_resets: usize,
    fence_wait_failures: VecDeque<vk::Result>,

    submissions: Vec<SubmitRecord>,
    pending: VecDeque<(usize, vk::Fence)>,
    retired: Vec<usize>,
    max_outstanding: usize,
    wait_idle_calls: usize,

    swapchains: HashMap<u64, MockSwapchain>,
    swapchains_created: usize,
    last_swapchain_extent: vk::Extent2D,
    last_swapchain_format: vk::Format,
    last_old_swapchain: vk::SwapchainKHR,
    swapchain_failures: VecDeque<vk::Result>,
    acquire_results: VecDeque<Result<bool, vk::Result>>,
    present_results: VecDeque<Result<bool, vk::Result>>,
    presented: Vec<u32>,

    last_begin_flags: Option<vk::CommandBufferUsageFlags>,
    render_pass_begins: usize,
    last_render_pass_framebuffer: vk::Framebuffer,
    last_viewport: Option<vk::Viewport>,
    last_scissor: Option<vk::Rect2D>,
}

impl MockState {
    fn allocate(&mut self, kind: Kind) -> u64 {
        self.next_handle += 1;
        let raw = self.next_handle;
        self.live.insert(raw, kind);
        trace!("MockDevice: created {:?} {:#x}", kind, raw);
        raw
    }

    fn release(&mut self, raw: u64, kind: Kind) {
        if raw == 0 {
            return;
        }
        match self.live.remove(&raw) {
            Some(found) if found == kind => {}
            other => {
                warn!(
                    "MockDevice: destroying {:?} {:#x} that is not live (found {:?})",
                    kind,
                    raw,
                    other
                );
                self.invalid_destroys += 1;
            }
        }
    }

    fn count(&self, kind: Kind) -> usize {
        self.live.values().filter(|&&k| k == kind).count()
    }

    /// Retires pending submissions in order, up to and including `last`.
    fn retire_through(&mut self, last: usize) {
        while let Some(&(id, fence)) = self.pending.front() {
            if id > last {
                break;
            }
            self.pending.pop_front();
            self.retired.push(id);
            if let Some(state) = self.fences.get_mut(&fence.as_raw()) {
                state.signaled = true;
                state.pending = None;
            }
        }
    }

    fn retire_all(&mut self) {
        if let Some(&(last, _)) = self.pending.back() {
            self.retire_through(last);
        }
    }
}

/// In-memory device used by tests.
#[derive(Debug)]
pub struct MockDevice {
    state: Mutex<MockState>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
}

impl MockDevice {
    /// Creates a device whose surface reports 2 to 3 images, a free-form
    /// extent, B8G8R8A8_SRGB and FIFO/MAILBOX, and D32_SFLOAT depth support.
    pub fn new() -> Self {
        let support = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 3,
                current_extent: vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                max_image_array_layers: 1,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };

        Self {
            state: Mutex::new(MockState {
                next_handle: 0x100,
                live: HashMap::new(),
                invalid_destroys: 0,
                support,
                depth_formats: vec![vk::Format::D32_SFLOAT],
                fences: HashMap::new(),
                fence_waits: 0,
                fence_resets: 0,
                fence_wait_failures: VecDeque::new(),
                submissions: Vec::new(),
                pending: VecDeque::new(),
                retired: Vec::new(),
                max_outstanding: 0,
                wait_idle_calls: 0,
                swapchains: HashMap::new(),
                swapchains_created: 0,
                last_swapchain_extent: vk::Extent2D::default(),
                last_swapchain_format: vk::Format::UNDEFINED,
                last_old_swapchain: vk::SwapchainKHR::null(),
                swapchain_failures: VecDeque::new(),
                acquire_results: VecDeque::new(),
                present_results: VecDeque::new(),
                presented: Vec::new(),
                last_begin_flags: None,
                render_pass_begins: 0,
                last_render_pass_framebuffer: vk::Framebuffer::null(),
                last_viewport: None,
                last_scissor: None,
            }),
            graphics_queue: vk::Queue::from_raw(0x10),
            present_queue: vk::Queue::from_raw(0x10),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Sets the surface's min and max image counts (0 max means unbounded).
    pub fn set_image_count_range(&self, min: u32, max: u32) {
        let mut state = self.state();
        state.support.capabilities.min_image_count = min;
        state.support.capabilities.max_image_count = max;
    }

    /// Fixes the surface's current extent, or `None` to let the swapchain choose.
    pub fn set_current_extent(&self, extent: Option<vk::Extent2D>) {
        self.state().support.capabilities.current_extent = extent.unwrap_or(vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        });
    }

    pub fn set_surface_formats(&self, formats: Vec<vk::SurfaceFormatKHR>) {
        self.state().support.formats = formats;
    }

    pub fn set_present_modes(&self, present_modes: Vec<vk::PresentModeKHR>) {
        self.state().support.present_modes = present_modes;
    }

    /// Formats reported as usable optimal-tiling depth attachments.
    pub fn set_depth_formats(&self, formats: &[vk::Format]) {
        self.state().depth_formats = formats.to_vec();
    }

    /// Queues a result for the next acquire. `Ok(suboptimal)` still hands out
    /// the next image in round-robin order.
    pub fn push_acquire_result(&self, result: Result<bool, vk::Result>) {
        self.state().acquire_results.push_back(result);
    }

    /// Queues a result for the next present. `Ok(true)` reports suboptimal.
    pub fn push_present_result(&self, result: Result<bool, vk::Result>) {
        self.state().present_results.push_back(result);
    }

    /// Makes the next swapchain creation fail with `result`.
    pub fn fail_next_swapchain_creation(&self, result: vk::Result) {
        self.state().swapchain_failures.push_back(result);
    }

    /// Makes the next fence wait fail with `result` without retiring anything.
    pub fn fail_next_fence_wait(&self, result: vk::Result) {
        self.state().fence_wait_failures.push_back(result);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Number of fence waits that reached the device.
    pub fn fence_wait_count(&self) -> usize {
        self.state().fence_waits
    }

    pub fn fence_reset_count(&self) -> usize {
        self.state().fence_resets
    }

    /// Number of device-wide idle waits.
    pub fn wait_idle_count(&self) -> usize {
        self.state().wait_idle_calls
    }

    pub fn swapchains_created(&self) -> usize {
        self.state().swapchains_created
    }

    /// Format of the most recently created swapchain.
    pub fn last_swapchain_format(&self) -> vk::Format {
        self.state().last_swapchain_format
    }

    pub fn last_swapchain_extent(&self) -> vk::Extent2D {
        self.state().last_swapchain_extent
    }

    /// `old_swapchain` passed to the most recent swapchain creation.
    pub fn last_old_swapchain(&self) -> vk::SwapchainKHR {
        self.state().last_old_swapchain
    }

    pub fn submissions(&self) -> Vec<SubmitRecord> {
        self.state().submissions.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.state().submissions.len()
    }

    /// Submissions not yet retired.
    pub fn outstanding_submissions(&self) -> usize {
        self.state().pending.len()
    }

    /// Highest number of submissions ever outstanding at once.
    pub fn max_outstanding_submissions(&self) -> usize {
        self.state().max_outstanding
    }

    /// Ids of retired submissions, in retirement order.
    pub fn retired_submissions(&self) -> Vec<usize> {
        self.state().retired.clone()
    }

    /// Image indices passed to every present call, in order.
    pub fn presented_images(&self) -> Vec<u32> {
        self.state().presented.clone()
    }

    pub fn last_begin_flags(&self) -> Option<vk::CommandBufferUsageFlags> {
        self.state().last_begin_flags
    }

    pub fn render_pass_begins(&self) -> usize {
        self.state().render_pass_begins
    }

    pub fn last_render_pass_framebuffer(&self) -> vk::Framebuffer {
        self.state().last_render_pass_framebuffer
    }

    pub fn last_viewport(&self) -> Option<vk::Viewport> {
        self.state().last_viewport
    }

    pub fn last_scissor(&self) -> Option<vk::Rect2D> {
        self.state().last_scissor
    }

    /// Destroy calls on handles that were not alive or had the wrong type.
    pub fn invalid_destroys(&self) -> usize {
        self.state().invalid_destroys
    }

    pub fn live_fences(&self) -> usize {
        self.state().count(Kind::Fence)
    }

    pub fn live_semaphores(&self) -> usize {
        self.state().count(Kind::Semaphore)
    }

    pub fn live_command_pools(&self) -> usize {
        self.state().count(Kind::CommandPool)
    }

    pub fn live_command_buffers(&self) -> usize {
        self.state().count(Kind::CommandBuffer)
    }

    pub fn live_swapchains(&self) -> usize {
        self.state().count(Kind::Swapchain)
    }

    pub fn live_image_views(&self) -> usize {
        self.state().count(Kind::ImageView)
    }

    /// Attachment images only; swapchain images belong to their swapchain.
    pub fn live_images(&self) -> usize {
        self.state().count(Kind::Image)
    }

    pub fn live_render_passes(&self) -> usize {
        self.state().count(Kind::RenderPass)
    }

    pub fn live_framebuffers(&self) -> usize {
        self.state().count(Kind::Framebuffer)
    }

    /// Total number of live handles of any type.
    pub fn live_handles(&self) -> usize {
        self.state().live.len()
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for MockDevice {
    fn queue_families(&self) -> QueueFamilyIndices {
        QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        }
    }

    fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    fn wait_idle(&self) -> RhiResult<()> {
        let mut state = self.state();
        state.wait_idle_calls += 1;
        state.retire_all();
        Ok(())
    }

    fn queue_wait_idle(&self, _queue: vk::Queue) -> RhiResult<()> {
        self.state().retire_all();
        Ok(())
    }

    fn queue_submit(
        &self,
        _queue: vk::Queue,
        submit: &SubmitDesc<'_>,
        fence: vk::Fence,
    ) -> RhiResult<()> {
        let mut state = self.state();
        let id = state.submissions.len();

        if fence != vk::Fence::null() {
            let Some(fence_state) = state.fences.get_mut(&fence.as_raw()) else {
                return Err(RhiError::InvalidHandle(format!("unknown fence {:?}", fence)));
            };
            if fence_state.signaled || fence_state.pending.is_some() {
                // Submitting with a fence that is not unsignaled is invalid usage.
                return Err(RhiError::VulkanError(vk::Result::ERROR_VALIDATION_FAILED_EXT));
            }
            fence_state.pending = Some(id);
        }

        state.submissions.push(SubmitRecord {
            id,
            command_buffers: submit.command_buffers.to_vec(),
            wait_semaphores: submit.wait_semaphores.to_vec(),
            wait_stages: submit.wait_stages.to_vec(),
            signal_semaphores: submit.signal_semaphores.to_vec(),
            fence,
        });
        state.pending.push_back((id, fence));
        state.max_outstanding = state.max_outstanding.max(state.pending.len());
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> RhiResult<vk::Fence> {
        let mut state = self.state();
        let raw = state.allocate(Kind::Fence);
        state.fences.insert(
            raw,
            MockFence {
                signaled,
                pending: None,
            },
        );
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state();
        state.fences.remove(&fence.as_raw());
        state.release(fence.as_raw(), Kind::Fence);
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout: u64) -> Result<(), vk::Result> {
        let mut state = self.state();
        state.fence_waits += 1;

        if let Some(failure) = state.fence_wait_failures.pop_front() {
            return Err(failure);
        }

        let (signaled, pending) = match state.fences.get(&fence.as_raw()) {
            Some(f) => (f.signaled, f.pending),
            None => return Err(vk::Result::ERROR_UNKNOWN),
        };

        if signaled {
            return Ok(());
        }
        match pending {
            Some(id) => {
                state.retire_through(id);
                Ok(())
            }
            // Nothing will ever signal it.
            None => Err(vk::Result::TIMEOUT),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> RhiResult<()> {
        let mut state = self.state();
        state.fence_resets += 1;
        match state.fences.get_mut(&fence.as_raw()) {
            Some(f) if f.pending.is_some() => {
                Err(RhiError::VulkanError(vk::Result::ERROR_VALIDATION_FAILED_EXT))
            }
            Some(f) => {
                f.signaled = false;
                Ok(())
            }
            None => Err(RhiError::InvalidHandle(format!("unknown fence {:?}", fence))),
        }
    }

    fn fence_status(&self, fence: vk::Fence) -> RhiResult<bool> {
        self.state()
            .fences
            .get(&fence.as_raw())
            .map(|f| f.signaled)
            .ok_or_else(|| RhiError::InvalidHandle(format!("unknown fence {:?}", fence)))
    }

    fn create_semaphore(&self) -> RhiResult<vk::Semaphore> {
        Ok(vk::Semaphore::from_raw(self.state().allocate(Kind::Semaphore)))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state().release(semaphore.as_raw(), Kind::Semaphore);
    }

    fn create_command_pool(
        &self,
        _create_info: &vk::CommandPoolCreateInfo<'_>,
    ) -> RhiResult<vk::CommandPool> {
        Ok(vk::CommandPool::from_raw(
            self.state().allocate(Kind::CommandPool),
        ))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.state().release(pool.as_raw(), Kind::CommandPool);
    }

    fn allocate_command_buffers(
        &self,
        allocate_info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> RhiResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state();
        Ok((0..allocate_info.command_buffer_count)
            .map(|_| vk::CommandBuffer::from_raw(state.allocate(Kind::CommandBuffer)))
            .collect())
    }

    fn free_command_buffers(&self, _pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let mut state = self.state();
        for buffer in buffers {
            state.release(buffer.as_raw(), Kind::CommandBuffer);
        }
    }

    fn begin_command_buffer(
        &self,
        _buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> RhiResult<()> {
        self.state().last_begin_flags = Some(flags);
        Ok(())
    }

    fn end_command_buffer(&self, _buffer: vk::CommandBuffer) -> RhiResult<()> {
        Ok(())
    }

    fn reset_command_buffer(&self, _buffer: vk::CommandBuffer) -> RhiResult<()> {
        Ok(())
    }

    fn cmd_set_viewport(&self, _buffer: vk::CommandBuffer, viewport: &vk::Viewport) {
        self.state().last_viewport = Some(*viewport);
    }

    fn cmd_set_scissor(&self, _buffer: vk::CommandBuffer, scissor: &vk::Rect2D) {
        self.state().last_scissor = Some(*scissor);
    }

    fn cmd_begin_render_pass(
        &self,
        _buffer: vk::CommandBuffer,
        begin_info: &vk::RenderPassBeginInfo<'_>,
    ) {
        let mut state = self.state();
        state.render_pass_begins += 1;
        state.last_render_pass_framebuffer = begin_info.framebuffer;
    }

    fn cmd_end_render_pass(&self, _buffer: vk::CommandBuffer) {}

    fn surface_support(&self, _surface: vk::SurfaceKHR) -> RhiResult<SwapchainSupportDetails> {
        Ok(self.state().support.clone())
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        let mut properties = vk::FormatProperties::default();
        if self.state().depth_formats.contains(&format) {
            properties.optimal_tiling_features = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
        }
        properties
    }

    fn create_swapchain(
        &self,
        create_info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> RhiResult<vk::SwapchainKHR> {
        let mut state = self.state();

        let old = create_info.old_swapchain;
        if old != vk::SwapchainKHR::null() && !state.swapchains.contains_key(&old.as_raw()) {
            return Err(RhiError::InvalidHandle(format!(
                "unknown old swapchain {:?}",
                old
            )));
        }

        if let Some(failure) = state.swapchain_failures.pop_front() {
            return Err(RhiError::from_vk(failure));
        }

        let raw = state.allocate(Kind::Swapchain);
        state.swapchains.insert(
            raw,
            MockSwapchain {
                image_count: create_info.min_image_count,
                next_image: 0,
            },
        );
        state.swapchains_created += 1;
        state.last_swapchain_extent = create_info.image_extent;
        state.last_swapchain_format = create_info.image_format;
        state.last_old_swapchain = old;
        Ok(vk::SwapchainKHR::from_raw(raw))
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state();
        state.swapchains.remove(&swapchain.as_raw());
        state.release(swapchain.as_raw(), Kind::Swapchain);
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RhiResult<Vec<vk::Image>> {
        let mut state = self.state();
        let count = state
            .swapchains
            .get(&swapchain.as_raw())
            .map(|s| s.image_count)
            .ok_or_else(|| RhiError::InvalidHandle(format!("unknown swapchain {:?}", swapchain)))?;

        // Presentation-engine images are not tracked as live attachment images.
        Ok((0..count)
            .map(|_| {
                state.next_handle += 1;
                vk::Image::from_raw(state.next_handle)
            })
            .collect())
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout: u64,
        _semaphore: vk::Semaphore,
    ) -> Result<(u32, bool), vk::Result> {
        let mut state = self.state();
        let suboptimal = match state.acquire_results.pop_front() {
            Some(Err(e)) => return Err(e),
            Some(Ok(suboptimal)) => suboptimal,
            None => false,
        };

        let Some(chain) = state.swapchains.get_mut(&swapchain.as_raw()) else {
            return Err(vk::Result::ERROR_SURFACE_LOST_KHR);
        };
        let image_index = chain.next_image;
        chain.next_image = (chain.next_image + 1) % chain.image_count.max(1);
        Ok((image_index, suboptimal))
    }

    fn queue_present(
        &self,
        _queue: vk::Queue,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        _wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool, vk::Result> {
        let mut state = self.state();
        state.presented.push(image_index);
        state.present_results.pop_front().unwrap_or(Ok(false))
    }

    fn create_image_view(
        &self,
        _create_info: &vk::ImageViewCreateInfo<'_>,
    ) -> RhiResult<vk::ImageView> {
        Ok(vk::ImageView::from_raw(self.state().allocate(Kind::ImageView)))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state().release(view.as_raw(), Kind::ImageView);
    }

    fn create_attachment_image(
        &self,
        _create_info: &vk::ImageCreateInfo<'_>,
        _name: &str,
    ) -> RhiResult<vk::Image> {
        Ok(vk::Image::from_raw(self.state().allocate(Kind::Image)))
    }

    fn destroy_attachment_image(&self, image: vk::Image) {
        self.state().release(image.as_raw(), Kind::Image);
    }

    fn create_render_pass(
        &self,
        _create_info: &vk::RenderPassCreateInfo<'_>,
    ) -> RhiResult<vk::RenderPass> {
        Ok(vk::RenderPass::from_raw(
            self.state().allocate(Kind::RenderPass),
        ))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state().release(render_pass.as_raw(), Kind::RenderPass);
    }

    fn create_framebuffer(
        &self,
        _create_info: &vk::FramebufferCreateInfo<'_>,
    ) -> RhiResult<vk::Framebuffer> {
        Ok(vk::Framebuffer::from_raw(
            self.state().allocate(Kind::Framebuffer),
        ))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state().release(framebuffer.as_raw(), Kind::Framebuffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_wait_retires_in_queue_order() {
        let device = MockDevice::new();
        let first = device.create_fence(false).unwrap();
        let second = device.create_fence(false).unwrap();
        let queue = device.graphics_queue();

        device.queue_submit(queue, &SubmitDesc::default(), first).unwrap();
        device.queue_submit(queue, &SubmitDesc::default(), second).unwrap();
        assert_eq!(device.outstanding_submissions(), 2);

        device.wait_for_fence(first, u64::MAX).unwrap();
        assert_eq!(device.retired_submissions(), vec![0]);

        device.wait_for_fence(second, u64::MAX).unwrap();
        assert_eq!(device.retired_submissions(), vec![0, 1]);
        assert_eq!(device.max_outstanding_submissions(), 2);
    }

    #[test]
    fn test_submit_with_signaled_fence_is_rejected() {
        let device = MockDevice::new();
        let fence = device.create_fence(true).unwrap();

        assert!(
            device
                .queue_submit(device.graphics_queue(), &SubmitDesc::default(), fence)
                .is_err()
        );
    }

    #[test]
    fn test_destroying_unknown_handle_is_counted() {
        let device = MockDevice::new();
        let fence = device.create_fence(false).unwrap();

        device.destroy_fence(fence);
        device.destroy_fence(fence);
        assert_eq!(device.invalid_destroys(), 1);
        assert_eq!(device.live_handles(), 0);
    }
}
