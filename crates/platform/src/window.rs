//! Presentation target: a winit window plus the Vulkan surface that presents to it.
//!
//! The frame loop only needs three things from the platform layer: the
//! instance extensions a surface requires, the surface itself, and the
//! current framebuffer size (which is 0x0 while the window is minimized).

use std::ffi::{CStr, c_char};

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use tracing::{debug, info};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use renderer_core::{Error, Result};

/// Owned `VkSurfaceKHR`, destroyed on drop.
///
/// The instance that created it must outlive this value.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Loader used to query capabilities, formats and present modes of this surface.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: The handle was created by `Window::create_surface` from the
        // instance behind `surface_loader` and is destroyed only here.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        debug!("Vulkan surface destroyed");
    }
}

/// A resizable window tracking its framebuffer size in physical pixels.
pub struct Window {
    window: WinitWindow,
    framebuffer_size: PhysicalSize<u32>,
}

impl Window {
    /// Opens a resizable window. The tracked size is what the platform
    /// actually granted, which can differ from the request under DPI scaling.
    pub fn new(event_loop: &ActiveEventLoop, width: u32, height: u32, title: &str) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;
        let framebuffer_size = window.inner_size();

        info!(
            "Window created: {}x{} (requested {}x{})",
            framebuffer_size.width, framebuffer_size.height, width, height
        );

        Ok(Self {
            window,
            framebuffer_size,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.framebuffer_size.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.framebuffer_size.height
    }

    /// Records a new framebuffer size from a resize event. Zero is kept as is.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.framebuffer_size = PhysicalSize::new(width, height);
        debug!("Window resized: {}x{}", width, height);
    }

    /// True while either dimension is zero, e.g. when minimized.
    pub fn is_minimized(&self) -> bool {
        self.framebuffer_size.width == 0 || self.framebuffer_size.height == 0
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Instance extensions needed to create a surface for this window.
    ///
    /// The returned pointers reference static strings owned by the loader.
    ///
    /// # Errors
    /// Returns an error if the display handle is unavailable or the platform
    /// is not supported by `ash-window`.
    pub fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let (display, _) = self.raw_handles()?;
        let extensions = ash_window::enumerate_required_extensions(display)
            .map_err(|e| Error::Vulkan(format!("Failed to enumerate surface extensions: {}", e)))?;

        debug!(
            "Surface extensions: {:?}",
            extensions
                .iter()
                // SAFETY: ash-window returns pointers to static nul-terminated names.
                .map(|&ext| unsafe { CStr::from_ptr(ext) })
                .collect::<Vec<_>>()
        );

        Ok(extensions.to_vec())
    }

    /// Creates the surface the swapchain will present to.
    ///
    /// # Errors
    /// Returns an error if the window handles are unavailable or surface
    /// creation fails.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let (display, window) = self.raw_handles()?;

        // SAFETY: `entry` and `instance` are live, and the handles come from a
        // window that outlives this call. `Surface::drop` destroys the result.
        let handle = unsafe { ash_window::create_surface(entry, instance, display, window, None) }
            .map_err(|e| Error::Vulkan(format!("Failed to create Vulkan surface: {}", e)))?;

        info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader: ash::khr::surface::Instance::new(entry, instance),
        })
    }

    fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)> {
        let display = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Display handle unavailable: {}", e)))?;
        let window = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("Window handle unavailable: {}", e)))?;
        Ok((display.as_raw(), window.as_raw()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Surface>();
    }
}
