//! The device seam the frame loop is written against.
//!
//! Every RAII wrapper in this crate holds an `Arc<dyn GpuDevice>` and issues
//! its Vulkan calls through it. [`crate::device::Device`] implements the trait
//! on top of `ash`; the `mock` feature provides an in-memory implementation
//! that lets the frame loop run without a GPU.
//!
//! Calls whose result codes carry control-flow meaning (fence waits, image
//! acquisition and presentation) return the raw `vk::Result` so the caller can
//! classify it. Everything else is converted to [`RhiError`].
//!
//! [`RhiError`]: crate::RhiError

use ash::vk;

use crate::error::RhiResult;
use crate::physical_device::QueueFamilyIndices;
use crate::swapchain::SwapchainSupportDetails;

/// A single queue submission.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitDesc<'a> {
    /// Command buffers to execute, in order.
    pub command_buffers: &'a [vk::CommandBuffer],
    /// Semaphores waited on before execution.
    pub wait_semaphores: &'a [vk::Semaphore],
    /// Pipeline stage at which each wait semaphore is waited on.
    pub wait_stages: &'a [vk::PipelineStageFlags],
    /// Semaphores signaled once execution completes.
    pub signal_semaphores: &'a [vk::Semaphore],
}

/// Logical device operations used by the swapchain and frame loop.
///
/// Destruction entry points never fail; callers must only destroy handles
/// that are no longer referenced by pending GPU work.
pub trait GpuDevice: Send + Sync {
    // =========================================================================
    // Queues
    // =========================================================================

    /// Queue family indices the device was created with.
    fn queue_families(&self) -> QueueFamilyIndices;

    /// Queue used for graphics submissions.
    fn graphics_queue(&self) -> vk::Queue;

    /// Queue used for presentation.
    fn present_queue(&self) -> vk::Queue;

    /// Blocks until all queues are idle.
    fn wait_idle(&self) -> RhiResult<()>;

    /// Blocks until `queue` is idle.
    fn queue_wait_idle(&self, queue: vk::Queue) -> RhiResult<()>;

    /// Submits a batch to `queue`, signaling `fence` (which may be null) on completion.
    fn queue_submit(
        &self,
        queue: vk::Queue,
        submit: &SubmitDesc<'_>,
        fence: vk::Fence,
    ) -> RhiResult<()>;

    // =========================================================================
    // Synchronization
    // =========================================================================

    fn create_fence(&self, signaled: bool) -> RhiResult<vk::Fence>;

    fn destroy_fence(&self, fence: vk::Fence);

    /// Waits for `fence`. `Err(vk::Result::TIMEOUT)` when the timeout elapses.
    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> Result<(), vk::Result>;

    fn reset_fence(&self, fence: vk::Fence) -> RhiResult<()>;

    /// Non-blocking status query.
    fn fence_status(&self, fence: vk::Fence) -> RhiResult<bool>;

    fn create_semaphore(&self) -> RhiResult<vk::Semaphore>;

    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    // =========================================================================
    // Command Pools and Buffers
    // =========================================================================

    fn create_command_pool(
        &self,
        create_info: &vk::CommandPoolCreateInfo<'_>,
    ) -> RhiResult<vk::CommandPool>;

    fn destroy_command_pool(&self, pool: vk::CommandPool);

    fn allocate_command_buffers(
        &self,
        allocate_info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> RhiResult<Vec<vk::CommandBuffer>>;

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);

    fn begin_command_buffer(
        &self,
        buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> RhiResult<()>;

    fn end_command_buffer(&self, buffer: vk::CommandBuffer) -> RhiResult<()>;

    fn reset_command_buffer(&self, buffer: vk::CommandBuffer) -> RhiResult<()>;

    fn cmd_set_viewport(&self, buffer: vk::CommandBuffer, viewport: &vk::Viewport);

    fn cmd_set_scissor(&self, buffer: vk::CommandBuffer, scissor: &vk::Rect2D);

    fn cmd_begin_render_pass(
        &self,
        buffer: vk::CommandBuffer,
        begin_info: &vk::RenderPassBeginInfo<'_>,
    );

    fn cmd_end_render_pass(&self, buffer: vk::CommandBuffer);

    // =========================================================================
    // Surface and Swapchain
    // =========================================================================

    /// Capabilities, formats and present modes of `surface` on this device.
    fn surface_support(&self, surface: vk::SurfaceKHR) -> RhiResult<SwapchainSupportDetails>;

    /// Format properties used to probe attachment support.
    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties;

    fn create_swapchain(
        &self,
        create_info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> RhiResult<vk::SwapchainKHR>;

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RhiResult<Vec<vk::Image>>;

    /// Returns `(image_index, suboptimal)`.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> Result<(u32, bool), vk::Result>;

    /// Presents `image_index` once `wait_semaphores` are signaled. Returns the suboptimal flag.
    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool, vk::Result>;

    // =========================================================================
    // Images and Attachments
    // =========================================================================

    fn create_image_view(
        &self,
        create_info: &vk::ImageViewCreateInfo<'_>,
    ) -> RhiResult<vk::ImageView>;

    fn destroy_image_view(&self, view: vk::ImageView);

    /// Creates a device-local image and binds freshly allocated memory to it.
    fn create_attachment_image(
        &self,
        create_info: &vk::ImageCreateInfo<'_>,
        name: &str,
    ) -> RhiResult<vk::Image>;

    /// Destroys an image created by [`GpuDevice::create_attachment_image`] and frees its memory.
    fn destroy_attachment_image(&self, image: vk::Image);

    fn create_render_pass(
        &self,
        create_info: &vk::RenderPassCreateInfo<'_>,
    ) -> RhiResult<vk::RenderPass>;

    fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    fn create_framebuffer(
        &self,
        create_info: &vk::FramebufferCreateInfo<'_>,
    ) -> RhiResult<vk::Framebuffer>;

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);
}
