//! Render pass and framebuffer wrappers.
//!
//! The main pass has one subpass with a color attachment that ends up in
//! `PRESENT_SRC_KHR` and a depth attachment that is cleared every frame and
//! never stored.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::command::{CommandBuffer, CommandBufferState};
use crate::error::RhiResult;
use crate::gpu::GpuDevice;

/// Clear values applied when the render pass begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValues {
    /// RGBA clear color.
    pub color: [f32; 4],
    /// Depth clear value, usually 1.0.
    pub depth: f32,
    /// Stencil clear value.
    pub stencil: u32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.2, 1.0],
            depth: 1.0,
            stencil: 0,
        }
    }
}

/// Single-subpass color + depth render pass.
pub struct RenderPass {
    device: Arc<dyn GpuDevice>,
    render_pass: vk::RenderPass,
    color_format: vk::Format,
    depth_format: vk::Format,
    render_area: vk::Rect2D,
    clear: ClearValues,
}

impl RenderPass {
    /// Creates the render pass.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `color_format` - Swapchain image format
    /// * `depth_format` - Format of the shared depth attachment
    /// * `render_area` - Area cleared and rendered to on begin
    /// * `clear` - Clear color, depth and stencil values
    ///
    /// # Errors
    ///
    /// Returns an error if render pass creation fails.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        color_format: vk::Format,
        depth_format: vk::Format,
        render_area: vk::Rect2D,
        clear: ClearValues,
    ) -> RhiResult<Self> {
        let color_attachment = vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

        let color_attachment_ref = vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let depth_attachment = vk::AttachmentDescription::default()
            .format(depth_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let depth_attachment_ref = vk::AttachmentReference::default()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(std::slice::from_ref(&color_attachment_ref))
            .depth_stencil_attachment(&depth_attachment_ref);

        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );

        let attachments = [color_attachment, depth_attachment];
        let subpasses = [subpass];
        let dependencies = [dependency];
        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = device.create_render_pass(&create_info)?;

        info!(
            "Render pass created (color {:?}, depth {:?})",
            color_format, depth_format
        );

        Ok(Self {
            device,
            render_pass,
            color_format,
            depth_format,
            render_area,
            clear,
        })
    }

    /// Begins the pass on `framebuffer` and moves `command_buffer` into
    /// [`CommandBufferState::InRenderPass`].
    pub fn begin(&self, command_buffer: &mut CommandBuffer, framebuffer: vk::Framebuffer) {
        if command_buffer.state() != CommandBufferState::Recording {
            warn!(
                "Beginning render pass on a command buffer in state {:?}",
                command_buffer.state()
            );
        }

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear.color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.clear.depth,
                    stencil: self.clear.stencil,
                },
            },
        ];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(self.render_area)
            .clear_values(&clear_values);

        self.device
            .cmd_begin_render_pass(command_buffer.handle(), &begin_info);
        command_buffer.set_state(CommandBufferState::InRenderPass);
    }

    /// Ends the pass and returns `command_buffer` to [`CommandBufferState::Recording`].
    pub fn end(&self, command_buffer: &mut CommandBuffer) {
        if command_buffer.state() != CommandBufferState::InRenderPass {
            warn!(
                "Ending render pass on a command buffer in state {:?}",
                command_buffer.state()
            );
        }

        self.device.cmd_end_render_pass(command_buffer.handle());
        command_buffer.set_state(CommandBufferState::Recording);
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    #[inline]
    pub fn render_area(&self) -> vk::Rect2D {
        self.render_area
    }

    /// Updates the area used by subsequent `begin` calls, typically after a resize.
    pub fn set_render_area(&mut self, render_area: vk::Rect2D) {
        self.render_area = render_area;
    }

    #[inline]
    pub fn clear_values(&self) -> ClearValues {
        self.clear
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        self.device.destroy_render_pass(self.render_pass);
        debug!("Render pass destroyed");
    }
}

/// Framebuffer binding a set of attachments to a render pass.
pub struct Framebuffer {
    device: Arc<dyn GpuDevice>,
    framebuffer: vk::Framebuffer,
    attachments: Vec<vk::ImageView>,
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Creates a framebuffer over `attachments`, in render pass attachment order.
    ///
    /// # Errors
    ///
    /// Returns an error if framebuffer creation fails.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        render_pass: &RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = device.create_framebuffer(&create_info)?;

        Ok(Self {
            device,
            framebuffer,
            attachments: attachments.to_vec(),
            extent,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    #[inline]
    pub fn attachments(&self) -> &[vk::ImageView] {
        &self.attachments
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.device.destroy_framebuffer(self.framebuffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandPool;
    use crate::mock::MockDevice;

    fn area(width: u32, height: u32) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D { width, height },
        }
    }

    #[test]
    fn test_begin_and_end_drive_command_buffer_state() {
        let mock = Arc::new(MockDevice::new());
        let device: Arc<dyn GpuDevice> = mock.clone();
        let pool = CommandPool::new(device.clone(), 0).unwrap();
        let render_pass = RenderPass::new(
            device.clone(),
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::D32_SFLOAT,
            area(800, 600),
            ClearValues::default(),
        )
        .unwrap();

        let mut cmd = CommandBuffer::allocate(device, &pool, true).unwrap();
        cmd.begin(false, false, false).unwrap();

        render_pass.begin(&mut cmd, vk::Framebuffer::null());
        assert_eq!(cmd.state(), CommandBufferState::InRenderPass);
        assert_eq!(mock.render_pass_begins(), 1);

        render_pass.end(&mut cmd);
        assert_eq!(cmd.state(), CommandBufferState::Recording);
    }

    #[test]
    fn test_render_area_update() {
        let device: Arc<dyn GpuDevice> = Arc::new(MockDevice::new());
        let mut render_pass = RenderPass::new(
            device,
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::D32_SFLOAT,
            area(800, 600),
            ClearValues::default(),
        )
        .unwrap();

        render_pass.set_render_area(area(1024, 768));
        assert_eq!(render_pass.render_area().extent.width, 1024);
        assert_eq!(render_pass.render_area().extent.height, 768);
    }

    #[test]
    fn test_framebuffer_keeps_attachments() {
        let mock = Arc::new(MockDevice::new());
        let device: Arc<dyn GpuDevice> = mock.clone();
        let render_pass = RenderPass::new(
            device.clone(),
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::D32_SFLOAT,
            area(800, 600),
            ClearValues::default(),
        )
        .unwrap();

        let views = [vk::ImageView::null(), vk::ImageView::null()];
        let framebuffer =
            Framebuffer::new(device, &render_pass, &views, area(800, 600).extent).unwrap();
        assert_eq!(framebuffer.attachments().len(), 2);
        assert_eq!(mock.live_framebuffers(), 1);

        drop(framebuffer);
        assert_eq!(mock.live_framebuffers(), 0);
    }
}
