//! Main renderer orchestration.
//!
//! This module provides the [`Renderer`] struct that owns the Vulkan
//! instance, surface and device for a window and drives a
//! [`FrameController`] against them.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use tracing::{debug, info};

use renderer_platform::{Surface, Window};
use renderer_rhi::command::CommandBuffer;
use renderer_rhi::device::Device;
use renderer_rhi::gpu::GpuDevice;
use renderer_rhi::instance::Instance;
use renderer_rhi::physical_device::select_physical_device;
use renderer_rhi::{RhiError, RhiResult};

use crate::config::FrameConfig;
use crate::frame_controller::FrameController;

/// Main renderer that manages all Vulkan resources for one window.
///
/// # Resource Destruction Order
///
/// Vulkan resources must be destroyed in the correct order:
/// 1. Wait for all GPU work to complete
/// 2. Destroy the frame controller (command buffers, swapchain, render pass, sync objects)
/// 3. Destroy device
/// 4. Destroy surface
/// 5. Destroy instance
///
/// ManuallyDrop is used to ensure correct destruction order.
pub struct Renderer {
    /// Vulkan instance (destroyed last).
    instance: ManuallyDrop<Instance>,
    /// Window surface (destroyed after the device, before the instance).
    surface: ManuallyDrop<Surface>,
    /// Logical device (destroyed once the controller releases its references).
    device: ManuallyDrop<Arc<Device>>,
    /// Frame loop state (destroyed first).
    frames: ManuallyDrop<FrameController>,
    /// Last size passed to [`resize`](Self::resize).
    width: u32,
    height: u32,
}

impl Renderer {
    /// Creates a new renderer for the given window with the default frame configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan resource creation fails.
    pub fn new(window: &Window) -> RhiResult<Self> {
        Self::with_config(window, FrameConfig::default())
    }

    /// Creates a new renderer for the given window.
    ///
    /// # Arguments
    ///
    /// * `window` - The window to render to
    /// * `config` - Clear values and wait timeouts for the frame loop
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan resource creation fails.
    pub fn with_config(window: &Window, config: FrameConfig) -> RhiResult<Self> {
        let width = window.width();
        let height = window.height();

        info!("Initializing Vulkan renderer ({}x{})", width, height);

        let surface_extensions = window
            .required_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        // Create Vulkan instance with validation in debug builds
        let enable_validation = cfg!(debug_assertions);
        let instance = Instance::new(c"Vulkan Renderer", &surface_extensions, enable_validation)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;

        let device = Device::new(&instance, &physical_device_info)?;

        let gpu: Arc<dyn GpuDevice> = device.clone();
        let frames = FrameController::new(gpu, surface.handle(), width, height, config)?;

        info!(
            "Renderer initialized on {} ({})",
            physical_device_info.device_name(),
            physical_device_info.device_type_name()
        );

        Ok(Self {
            instance: ManuallyDrop::new(instance),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            frames: ManuallyDrop::new(frames),
            width,
            height,
        })
    }

    /// Notifies the renderer that the window has been resized.
    ///
    /// The actual swapchain recreation happens at the start of the next frame.
    /// A zero dimension is forwarded as well so frames are skipped while the
    /// window is minimized.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == self.width && height == self.height {
            return;
        }

        debug!(
            "Resize triggered: {}x{} -> {}x{}",
            self.width, self.height, width, height
        );
        self.width = width;
        self.height = height;
        self.frames.on_resize(width, height);
    }

    /// Starts a frame. Returns `Ok(false)` if the frame should be skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a fatal Vulkan failure occurs.
    pub fn begin_frame(&mut self, delta_time: f32) -> RhiResult<bool> {
        self.frames.begin_frame(delta_time)
    }

    /// Submits and presents the frame started by [`begin_frame`](Self::begin_frame).
    ///
    /// # Errors
    ///
    /// Returns an error if submission or presentation fails.
    pub fn end_frame(&mut self, delta_time: f32) -> RhiResult<()> {
        self.frames.end_frame(delta_time)
    }

    /// Command buffer being recorded for the current frame.
    pub fn command_buffer(&mut self) -> &mut CommandBuffer {
        self.frames.current_command_buffer_mut()
    }

    #[inline]
    pub fn frame_controller(&self) -> &FrameController {
        &self.frames
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Waits for all GPU work to complete.
    pub fn wait_idle(&self) -> RhiResult<()> {
        self.frames.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        info!("Shutting down renderer");

        // SAFETY: Each field is dropped exactly once, in dependency order.
        // The controller waits for the device to go idle before releasing
        // anything, and holds the only other reference to the device.
        unsafe {
            ManuallyDrop::drop(&mut self.frames);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }
    }
}
