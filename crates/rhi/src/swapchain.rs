//! Swapchain management.
//!
//! This module handles VkSwapchainKHR creation, image acquisition, presentation,
//! and recreation together with the per-image resources that depend on it.
//!
//! # Overview
//!
//! The [`Swapchain`] owns, for one swapchain generation:
//! - The swapchain handle (its images are owned by the presentation engine)
//! - One color image view per image
//! - One shared depth attachment
//! - One framebuffer per image view, paired with the main render pass
//!
//! Image, view and framebuffer counts are always equal.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::gpu::GpuDevice;
//! use renderer_rhi::render_pass::RenderPass;
//! use renderer_rhi::swapchain::{AcquireOutcome, Swapchain};
//! use ash::vk;
//!
//! # fn example(
//! #     device: Arc<dyn GpuDevice>,
//! #     surface: vk::SurfaceKHR,
//! #     render_pass: &RenderPass,
//! #     semaphore: vk::Semaphore,
//! # ) -> Result<(), renderer_rhi::RhiError> {
//! let mut swapchain = Swapchain::new(device, surface, 800, 600, render_pass)?;
//!
//! match swapchain.acquire_next_image(u64::MAX, semaphore)? {
//!     AcquireOutcome::Acquired { image_index, .. } => {
//!         // ... record into swapchain.framebuffer(image_index as usize) ...
//!     }
//!     AcquireOutcome::OutOfDate => {
//!         swapchain.recreate(800, 600, render_pass)?;
//!     }
//!     AcquireOutcome::NotReady => {}
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, warn};

use crate::depth_buffer::{DepthBuffer, find_depth_format};
use crate::error::{RhiError, RhiResult};
use crate::gpu::GpuDevice;
use crate::render_pass::{Framebuffer, RenderPass};

/// Swapchain surface support details.
///
/// Contains information about what the surface supports for swapchain creation.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Checks if the swapchain support is adequate for rendering.
    ///
    /// Returns true if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Result of [`Swapchain::acquire_next_image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired. A suboptimal swapchain can still be rendered to.
    Acquired { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface and must be recreated
    /// before anything is rendered.
    OutOfDate,
    /// No image became available before the timeout; try again next frame.
    NotReady,
}

/// Result of [`Swapchain::present`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// The image was presented (or dropped) but the swapchain is stale or
    /// suboptimal and should be recreated.
    NeedsRecreate,
}

/// Vulkan swapchain and its per-image resources.
///
/// # Thread Safety
///
/// The swapchain is driven from the frame loop's thread only.
pub struct Swapchain {
    device: Arc<dyn GpuDevice>,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    /// Owned by the presentation engine; never destroyed individually.
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    depth: Option<DepthBuffer>,
    framebuffers: Vec<Framebuffer>,
    format: vk::Format,
    color_space: vk::ColorSpaceKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Creates a new swapchain with its views, depth attachment and framebuffers.
    ///
    /// This function creates a swapchain with:
    /// - Preferred format: B8G8R8A8_SRGB with SRGB_NONLINEAR color space
    /// - Preferred present mode: MAILBOX, fallback to FIFO (vsync)
    /// - One image more than the surface minimum, capped by its maximum
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Surface queries fail
    /// - No format or present mode is available
    /// - No depth format supports depth attachments
    /// - Swapchain, view, depth or framebuffer creation fails
    pub fn new(
        device: Arc<dyn GpuDevice>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        render_pass: &RenderPass,
    ) -> RhiResult<Self> {
        Self::create_internal(
            device,
            surface,
            width,
            height,
            render_pass,
            vk::SwapchainKHR::null(),
        )
    }

    /// Creates a new swapchain, optionally retiring an old one.
    fn create_internal(
        device: Arc<dyn GpuDevice>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        render_pass: &RenderPass,
        old_swapchain: vk::SwapchainKHR,
    ) -> RhiResult<Self> {
        let support = device.surface_support(surface)?;

        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = determine_image_count(&support.capabilities);

        if surface_format.format != render_pass.color_format() {
            error!(
                "Swapchain format {:?} differs from render pass color format {:?}",
                surface_format.format,
                render_pass.color_format()
            );
            return Err(RhiError::SwapchainError(format!(
                "render pass color format {:?} does not match surface format {:?}",
                render_pass.color_format(),
                surface_format.format
            )));
        }

        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            present_mode,
            image_count
        );

        let queue_families = device.queue_families();
        let (graphics_family, present_family) =
            match (queue_families.graphics_family, queue_families.present_family) {
                (Some(graphics), Some(present)) => (graphics, present),
                _ => {
                    return Err(RhiError::SwapchainError(
                        "Device has no graphics or present queue family".to_string(),
                    ));
                }
            };
        let queue_family_indices = [graphics_family, present_family];

        let (sharing_mode, queue_family_indices_slice) = if graphics_family != present_family {
            debug!(
                "Using CONCURRENT sharing mode between graphics ({}) and present ({}) queues",
                graphics_family, present_family
            );
            (vk::SharingMode::CONCURRENT, queue_family_indices.as_slice())
        } else {
            debug!("Using EXCLUSIVE sharing mode (same queue family for graphics and present)");
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(queue_family_indices_slice)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = device.create_swapchain(&create_info)?;

        // From here on, `Drop` cleans up whatever has been created if a later step fails.
        let mut this = Self {
            device: device.clone(),
            surface,
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            depth: None,
            framebuffers: Vec::new(),
            format: surface_format.format,
            color_space: surface_format.color_space,
            extent,
            present_mode,
        };

        this.images = device.swapchain_images(swapchain)?;
        info!("Swapchain created with {} images", this.images.len());

        this.image_views = create_image_views(device.as_ref(), &this.images, this.format)?;

        let depth_format = find_depth_format(device.as_ref())?;
        let depth = DepthBuffer::new(device.clone(), extent, depth_format)?;
        let depth_view = depth.image_view();
        this.depth = Some(depth);

        this.framebuffers = this
            .image_views
            .iter()
            .map(|&view| {
                Framebuffer::new(device.clone(), render_pass, &[view, depth_view], extent)
            })
            .collect::<RhiResult<Vec<_>>>()?;
        debug!("Created {} framebuffers", this.framebuffers.len());

        Ok(this)
    }

    /// Recreates the swapchain for a new surface size.
    ///
    /// Returns `Ok(false)` without touching any resource when either dimension
    /// is zero (a minimized window). Otherwise waits for the device to go idle,
    /// tears down framebuffers, the depth attachment and image views, creates
    /// the new swapchain from the old one and destroys the old handle.
    ///
    /// # Errors
    ///
    /// Returns an error if recreation fails. The swapchain is unusable afterwards.
    pub fn recreate(
        &mut self,
        width: u32,
        height: u32,
        render_pass: &RenderPass,
    ) -> RhiResult<bool> {
        if width == 0 || height == 0 {
            debug!(
                "Skipping swapchain recreation for zero-sized surface ({}x{})",
                width, height
            );
            return Ok(false);
        }

        self.device.wait_idle()?;

        info!("Recreating swapchain for new size: {}x{}", width, height);

        self.destroy_attachments();

        let old_swapchain = self.swapchain;
        let result = Self::create_internal(
            self.device.clone(),
            self.surface,
            width,
            height,
            render_pass,
            old_swapchain,
        );

        // The old handle is retired either way.
        self.device.destroy_swapchain(old_swapchain);
        self.swapchain = vk::SwapchainKHR::null();
        self.images.clear();

        let mut new_swapchain = result?;

        self.swapchain = new_swapchain.swapchain;
        self.images = std::mem::take(&mut new_swapchain.images);
        self.image_views = std::mem::take(&mut new_swapchain.image_views);
        self.depth = new_swapchain.depth.take();
        self.framebuffers = std::mem::take(&mut new_swapchain.framebuffers);
        self.format = new_swapchain.format;
        self.color_space = new_swapchain.color_space;
        self.extent = new_swapchain.extent;
        self.present_mode = new_swapchain.present_mode;

        // Leave nothing for the temporary's Drop to destroy.
        new_swapchain.swapchain = vk::SwapchainKHR::null();

        Ok(true)
    }

    /// Acquires the next swapchain image, signaling `semaphore` when it is ready.
    ///
    /// # Errors
    ///
    /// Out-of-date and timeout conditions are reported as outcomes. Any other
    /// failure is returned as an error and is fatal.
    pub fn acquire_next_image(
        &self,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> RhiResult<AcquireOutcome> {
        match self
            .device
            .acquire_next_image(self.swapchain, timeout, semaphore)
        {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    debug!("Acquired image {} from a suboptimal swapchain", image_index);
                }
                Ok(AcquireOutcome::Acquired {
                    image_index,
                    suboptimal,
                })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during acquire");
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => {
                debug!("No swapchain image available before timeout");
                Ok(AcquireOutcome::NotReady)
            }
            Err(e) => {
                error!("Failed to acquire swapchain image: {:?}", e);
                Err(RhiError::from_vk(e))
            }
        }
    }

    /// Presents `image_index` on `queue` after `wait_semaphore` is signaled.
    ///
    /// # Errors
    ///
    /// Out-of-date and suboptimal results are reported as
    /// [`PresentOutcome::NeedsRecreate`]. Any other failure is fatal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<PresentOutcome> {
        match self
            .device
            .queue_present(queue, self.swapchain, image_index, &[wait_semaphore])
        {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain stale or suboptimal after present");
                Ok(PresentOutcome::NeedsRecreate)
            }
            Err(e) => {
                error!("Failed to present swapchain image: {:?}", e);
                Err(RhiError::from_vk(e))
            }
        }
    }

    /// Returns the swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Returns the surface the swapchain presents to.
    #[inline]
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Returns the swapchain image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the swapchain color space.
    #[inline]
    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.color_space
    }

    /// Returns the swapchain extent (resolution).
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the present mode.
    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Returns the swapchain image at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index]
    }

    /// Returns the image view at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }

    /// Returns the framebuffer for the image at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn framebuffer(&self, index: usize) -> vk::Framebuffer {
        self.framebuffers[index].handle()
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    #[inline]
    pub fn framebuffers(&self) -> &[Framebuffer] {
        &self.framebuffers
    }

    /// Returns the shared depth attachment.
    #[inline]
    pub fn depth_buffer(&self) -> Option<&DepthBuffer> {
        self.depth.as_ref()
    }

    /// Returns the depth attachment format, if the depth buffer exists.
    #[inline]
    pub fn depth_format(&self) -> Option<vk::Format> {
        self.depth.as_ref().map(DepthBuffer::format)
    }

    /// Destroys framebuffers, the depth attachment and image views, in that order.
    fn destroy_attachments(&mut self) {
        self.framebuffers.clear();
        self.depth = None;
        for &image_view in &self.image_views {
            self.device.destroy_image_view(image_view);
        }
        self.image_views.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_attachments();

        // Skip if the handle was moved out by `recreate`.
        if self.swapchain != vk::SwapchainKHR::null() {
            self.device.destroy_swapchain(self.swapchain);

            info!(
                "Swapchain destroyed (was {}x{}, {} images)",
                self.extent.width,
                self.extent.height,
                self.images.len()
            );
        }
    }
}

/// Chooses the best surface format from the available formats.
///
/// Prefers B8G8R8A8_SRGB with SRGB_NONLINEAR, then B8G8R8A8_UNORM with
/// SRGB_NONLINEAR, then the first available format. `formats` must not be empty.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    // Prefer SRGB format for correct gamma handling
    let preferred = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });

    if let Some(&format) = preferred {
        debug!("Selected preferred surface format: B8G8R8A8_SRGB with SRGB_NONLINEAR");
        return format;
    }

    // Second choice: B8G8R8A8_UNORM with SRGB color space
    let alternative = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_UNORM && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });

    if let Some(&format) = alternative {
        warn!("Using fallback surface format: B8G8R8A8_UNORM with SRGB_NONLINEAR");
        return format;
    }

    // Last resort: use the first available format
    warn!(
        "Using first available surface format: {:?}",
        formats[0].format
    );
    formats[0]
}

/// Chooses the best present mode from the available modes.
///
/// Prefers MAILBOX (triple buffering, no tearing, low latency).
/// Falls back to FIFO (vsync, guaranteed to be available).
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    // MAILBOX: Triple buffering - no tearing, low latency
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        debug!("Selected MAILBOX present mode (triple buffering)");
        return vk::PresentModeKHR::MAILBOX;
    }

    // FIFO: VSync - no tearing, may have latency
    // FIFO support is mandatory
    debug!("Selected FIFO present mode (vsync)");
    vk::PresentModeKHR::FIFO
}

/// Chooses the swapchain extent (resolution).
///
/// If the current extent is not set (width/height are u32::MAX),
/// clamps the requested size to the surface's min/max extents.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    // If current extent is defined, use it
    if capabilities.current_extent.width != u32::MAX {
        debug!(
            "Using current surface extent: {}x{}",
            capabilities.current_extent.width, capabilities.current_extent.height
        );
        return capabilities.current_extent;
    }

    // Otherwise, clamp the requested size to the surface's limits
    let extent = vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };

    debug!(
        "Calculated extent: {}x{} (requested: {}x{}, min: {}x{}, max: {}x{})",
        extent.width,
        extent.height,
        width,
        height,
        capabilities.min_image_extent.width,
        capabilities.min_image_extent.height,
        capabilities.max_image_extent.width,
        capabilities.max_image_extent.height
    );

    extent
}

/// Determines the optimal number of swapchain images.
///
/// Prefers one more than the minimum (for triple buffering),
/// but respects the maximum if set.
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;

    // If max_image_count is 0, there's no maximum
    let image_count = if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    };

    debug!(
        "Image count: {} (min: {}, max: {})",
        image_count,
        capabilities.min_image_count,
        if capabilities.max_image_count == 0 {
            "unlimited".to_string()
        } else {
            capabilities.max_image_count.to_string()
        }
    );

    image_count
}

/// Creates image views for swapchain images.
fn create_image_views(
    device: &dyn GpuDevice,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        match device.create_image_view(&create_info) {
            Ok(image_view) => image_views.push(image_view),
            Err(e) => {
                for &view in &image_views {
                    device.destroy_image_view(view);
                }
                return Err(RhiError::SwapchainError(format!(
                    "Failed to create image view {}: {}",
                    i, e
                )));
            }
        }
    }

    debug!("Created {} image views", image_views.len());
    Ok(image_views)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDevice;
    use crate::render_pass::ClearValues;

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let selected = choose_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_choose_surface_format_fallback() {
        let formats = vec![vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];

        let selected = choose_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_present_mode_prefers_mailbox() {
        let modes = vec![
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];

        let selected = choose_present_mode(&modes);
        assert_eq!(selected, vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn test_choose_present_mode_fallback_to_fifo() {
        let modes = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];

        let selected = choose_present_mode(&modes);
        assert_eq!(selected, vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!(extent.width, 1920);
        assert_eq!(extent.height, 1080);
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        // Test clamping to max
        let extent = choose_extent(&capabilities, 3000, 3000);
        assert_eq!(extent.width, 2000);
        assert_eq!(extent.height, 2000);

        // Test clamping to min
        let extent = choose_extent(&capabilities, 50, 50);
        assert_eq!(extent.width, 100);
        assert_eq!(extent.height, 100);

        // Test within range
        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn test_determine_image_count() {
        // Test with max limit
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 3);

        // Test with higher max limit
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 3);

        // Test with no max limit
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0, // 0 means no limit
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 3);
    }

    #[test]
    fn test_swapchain_support_details_is_adequate() {
        let adequate = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_formats = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(!no_formats.is_adequate());

        let no_modes = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![],
        };
        assert!(!no_modes.is_adequate());
    }

    // =========================================================================
    // Lifecycle against the in-memory device
    // =========================================================================

    fn setup(
        min_images: u32,
        max_images: u32,
    ) -> (Arc<MockDevice>, Arc<dyn GpuDevice>, RenderPass) {
        let mock = Arc::new(MockDevice::new());
        mock.set_image_count_range(min_images, max_images);
        let device: Arc<dyn GpuDevice> = mock.clone();
        let render_pass = RenderPass::new(
            device.clone(),
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::D32_SFLOAT,
            vk::Rect2D::default(),
            ClearValues::default(),
        )
        .unwrap();
        (mock, device, render_pass)
    }

    fn create(device: &Arc<dyn GpuDevice>, render_pass: &RenderPass) -> Swapchain {
        Swapchain::new(device.clone(), vk::SurfaceKHR::null(), 800, 600, render_pass).unwrap()
    }

    #[test]
    fn test_create_builds_one_framebuffer_per_image() {
        let (mock, device, render_pass) = setup(2, 3);
        let swapchain = create(&device, &render_pass);

        assert_eq!(swapchain.image_count(), 3);
        assert_eq!(swapchain.image_views().len(), 3);
        assert_eq!(swapchain.framebuffers().len(), 3);
        assert_eq!(swapchain.extent().width, 800);
        assert_eq!(swapchain.extent().height, 600);
        assert_eq!(swapchain.format(), vk::Format::B8G8R8A8_SRGB);
        assert_eq!(swapchain.depth_format(), Some(vk::Format::D32_SFLOAT));

        // Three color views plus the depth view.
        assert_eq!(mock.live_image_views(), 4);
        assert_eq!(mock.live_images(), 1);

        for (i, framebuffer) in swapchain.framebuffers().iter().enumerate() {
            assert_eq!(framebuffer.attachments()[0], swapchain.image_view(i));
        }
    }

    #[test]
    fn test_zero_sized_recreate_is_a_no_op() {
        let (mock, device, render_pass) = setup(2, 3);
        let mut swapchain = create(&device, &render_pass);
        let handle = swapchain.handle();

        assert!(!swapchain.recreate(0, 0, &render_pass).unwrap());
        assert!(!swapchain.recreate(1024, 0, &render_pass).unwrap());

        assert_eq!(swapchain.handle(), handle);
        assert_eq!(swapchain.framebuffers().len(), 3);
        assert_eq!(mock.swapchains_created(), 1);
        assert_eq!(mock.wait_idle_count(), 0);
    }

    #[test]
    fn test_recreate_retires_old_swapchain() {
        let (mock, device, render_pass) = setup(2, 3);
        let mut swapchain = create(&device, &render_pass);
        let old_handle = swapchain.handle();

        assert!(swapchain.recreate(1024, 768, &render_pass).unwrap());

        assert_ne!(swapchain.handle(), old_handle);
        assert_eq!(mock.last_old_swapchain(), old_handle);
        assert_eq!(mock.live_swapchains(), 1);
        assert_eq!(mock.wait_idle_count(), 1);
        assert_eq!(swapchain.extent().width, 1024);
        assert_eq!(swapchain.extent().height, 768);
        assert_eq!(swapchain.image_count(), swapchain.framebuffers().len());
        assert_eq!(mock.live_framebuffers(), 3);
        assert_eq!(mock.live_image_views(), 4);
        assert_eq!(mock.live_images(), 1);
    }

    #[test]
    fn test_drop_releases_everything() {
        let (mock, device, render_pass) = setup(2, 3);
        let swapchain = create(&device, &render_pass);
        drop(swapchain);

        assert_eq!(mock.live_swapchains(), 0);
        assert_eq!(mock.live_framebuffers(), 0);
        assert_eq!(mock.live_image_views(), 0);
        assert_eq!(mock.live_images(), 0);
    }

    #[test]
    fn test_acquire_outcomes() {
        let (mock, device, render_pass) = setup(2, 3);
        let swapchain = create(&device, &render_pass);
        let semaphore = vk::Semaphore::null();

        mock.push_acquire_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        mock.push_acquire_result(Err(vk::Result::TIMEOUT));
        mock.push_acquire_result(Ok(true));
        mock.push_acquire_result(Err(vk::Result::ERROR_DEVICE_LOST));

        assert_eq!(
            swapchain.acquire_next_image(u64::MAX, semaphore).unwrap(),
            AcquireOutcome::OutOfDate
        );
        assert_eq!(
            swapchain.acquire_next_image(0, semaphore).unwrap(),
            AcquireOutcome::NotReady
        );
        assert_eq!(
            swapchain.acquire_next_image(u64::MAX, semaphore).unwrap(),
            AcquireOutcome::Acquired {
                image_index: 0,
                suboptimal: true
            }
        );
        assert!(matches!(
            swapchain.acquire_next_image(u64::MAX, semaphore),
            Err(RhiError::DeviceLost)
        ));
    }

    #[test]
    fn test_present_outcomes() {
        let (mock, device, render_pass) = setup(2, 3);
        let swapchain = create(&device, &render_pass);
        let queue = device.present_queue();
        let semaphore = vk::Semaphore::null();

        assert_eq!(
            swapchain.present(queue, 0, semaphore).unwrap(),
            PresentOutcome::Presented
        );

        mock.push_present_result(Ok(true));
        assert_eq!(
            swapchain.present(queue, 1, semaphore).unwrap(),
            PresentOutcome::NeedsRecreate
        );

        mock.push_present_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        assert_eq!(
            swapchain.present(queue, 2, semaphore).unwrap(),
            PresentOutcome::NeedsRecreate
        );

        mock.push_present_result(Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY));
        assert!(swapchain.present(queue, 0, semaphore).is_err());

        assert_eq!(mock.presented_images(), vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_defined_current_extent_is_used_verbatim() {
        let (mock, device, render_pass) = setup(2, 3);
        let fixed = vk::Extent2D {
            width: 1920,
            height: 1080,
        };
        mock.set_current_extent(Some(fixed));

        let mut swapchain = create(&device, &render_pass);
        assert_eq!(swapchain.extent(), fixed);
        assert_eq!(mock.last_swapchain_extent(), fixed);

        assert!(swapchain.recreate(640, 480, &render_pass).unwrap());
        assert_eq!(swapchain.extent(), fixed);
        for framebuffer in swapchain.framebuffers() {
            assert_eq!(framebuffer.extent(), fixed);
        }
    }

    #[test]
    fn test_unorm_format_is_chosen_without_srgb() {
        let (mock, device, _) = setup(2, 3);
        mock.set_surface_formats(vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ]);
        let render_pass = RenderPass::new(
            device.clone(),
            vk::Format::B8G8R8A8_UNORM,
            vk::Format::D32_SFLOAT,
            vk::Rect2D::default(),
            ClearValues::default(),
        )
        .unwrap();

        let swapchain = create(&device, &render_pass);
        assert_eq!(swapchain.format(), vk::Format::B8G8R8A8_UNORM);
        assert_eq!(mock.last_swapchain_format(), vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn test_render_pass_with_other_color_format_is_rejected() {
        let (mock, device, render_pass) = setup(2, 3);
        mock.set_surface_formats(vec![vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }]);

        assert!(matches!(
            Swapchain::new(device, vk::SurfaceKHR::null(), 800, 600, &render_pass),
            Err(RhiError::SwapchainError(_))
        ));
        assert_eq!(mock.live_swapchains(), 0);
        assert_eq!(mock.live_framebuffers(), 0);
    }

    #[test]
    fn test_failed_recreate_retires_old_swapchain() {
        let (mock, device, render_pass) = setup(2, 3);
        let mut swapchain = create(&device, &render_pass);
        mock.fail_next_swapchain_creation(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);

        assert!(matches!(
            swapchain.recreate(1024, 768, &render_pass),
            Err(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
        ));
        assert_eq!(swapchain.handle(), vk::SwapchainKHR::null());
        assert!(swapchain.framebuffers().is_empty());
        assert_eq!(mock.live_swapchains(), 0);
        assert_eq!(mock.live_image_views(), 0);

        drop(swapchain);
        assert_eq!(mock.invalid_destroys(), 0);
    }

    #[test]
    fn test_inadequate_surface_is_rejected() {
        let (mock, device, render_pass) = setup(2, 3);
        mock.set_present_modes(Vec::new());

        assert!(matches!(
            Swapchain::new(device, vk::SurfaceKHR::null(), 800, 600, &render_pass),
            Err(RhiError::SwapchainError(_))
        ));
    }
}
