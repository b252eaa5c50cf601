//! Depth attachment shared by every swapchain framebuffer.
//!
//! # Overview
//!
//! - [`DepthBuffer`] owns a device-local VkImage, its memory and a depth view
//! - [`find_depth_format`] probes the device for the first usable depth format
//!
//! Only one depth image exists per swapchain generation: frames in flight are
//! serialized on the graphics queue, so they can share it.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::gpu::GpuDevice;

/// Depth formats probed in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Returns the first candidate whose optimal-tiling features include
/// `DEPTH_STENCIL_ATTACHMENT`.
///
/// # Errors
///
/// Returns [`RhiError::NoSupportedDepthFormat`] if no candidate qualifies.
pub fn find_depth_format(device: &dyn GpuDevice) -> RhiResult<vk::Format> {
    find_supported_format(
        device,
        &DEPTH_FORMAT_CANDIDATES,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    )
    .ok_or(RhiError::NoSupportedDepthFormat)
}

fn find_supported_format(
    device: &dyn GpuDevice,
    candidates: &[vk::Format],
    features: vk::FormatFeatureFlags,
) -> Option<vk::Format> {
    let format = candidates.iter().copied().find(|&format| {
        device
            .format_properties(format)
            .optimal_tiling_features
            .contains(features)
    });

    match format {
        Some(format) => debug!("Selected depth format {:?}", format),
        None => error!("None of {:?} supports {:?}", candidates, features),
    }
    format
}

/// Returns true if `format` carries a stencil aspect.
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

/// Depth image, memory and view.
///
/// # Resource Destruction
///
/// Resources are destroyed in the following order:
/// 1. Image view
/// 2. Image and its memory allocation
pub struct DepthBuffer {
    device: Arc<dyn GpuDevice>,
    image: vk::Image,
    image_view: vk::ImageView,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl DepthBuffer {
    /// Creates a depth buffer with the specified dimensions and format.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Either dimension is zero
    /// - Image creation or memory allocation fails
    /// - Image view creation fails
    pub fn new(
        device: Arc<dyn GpuDevice>,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidHandle(
                "Depth buffer dimensions must be greater than 0".to_string(),
            ));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = device.create_attachment_image(&image_info, "depth_buffer")?;

        let mut aspect_mask = vk::ImageAspectFlags::DEPTH;
        if has_stencil_component(format) {
            aspect_mask |= vk::ImageAspectFlags::STENCIL;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect_mask)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let image_view = match device.create_image_view(&view_info) {
            Ok(view) => view,
            Err(e) => {
                device.destroy_attachment_image(image);
                return Err(e);
            }
        };

        info!(
            "Created depth buffer: {}x{} ({:?})",
            extent.width, extent.height, format
        );

        Ok(Self {
            device,
            image,
            image_view,
            format,
            extent,
        })
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        self.device.destroy_image_view(self.image_view);
        self.device.destroy_attachment_image(self.image);

        debug!(
            "Destroyed depth buffer: {}x{}",
            self.extent.width, self.extent.height
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDevice;

    #[test]
    fn test_prefers_first_supported_candidate() {
        let mock = MockDevice::new();
        mock.set_depth_formats(&[vk::Format::D24_UNORM_S8_UINT, vk::Format::D32_SFLOAT]);

        assert_eq!(find_depth_format(&mock).unwrap(), vk::Format::D32_SFLOAT);
    }

    #[test]
    fn test_falls_back_to_stencil_formats() {
        let mock = MockDevice::new();
        mock.set_depth_formats(&[vk::Format::D24_UNORM_S8_UINT]);

        assert_eq!(
            find_depth_format(&mock).unwrap(),
            vk::Format::D24_UNORM_S8_UINT
        );
    }

    #[test]
    fn test_no_supported_depth_format() {
        let mock = MockDevice::new();
        mock.set_depth_formats(&[vk::Format::D16_UNORM]);

        assert!(matches!(
            find_depth_format(&mock),
            Err(RhiError::NoSupportedDepthFormat)
        ));
    }

    #[test]
    fn test_stencil_component() {
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
    }

    #[test]
    fn test_zero_extent_rejected() {
        let device: Arc<dyn GpuDevice> = Arc::new(MockDevice::new());
        let extent = vk::Extent2D {
            width: 0,
            height: 600,
        };

        assert!(DepthBuffer::new(device, extent, vk::Format::D32_SFLOAT).is_err());
    }

    #[test]
    fn test_drop_releases_image_and_view() {
        let mock = Arc::new(MockDevice::new());
        let device: Arc<dyn GpuDevice> = mock.clone();
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };

        let depth = DepthBuffer::new(device, extent, vk::Format::D32_SFLOAT).unwrap();
        assert_eq!(mock.live_images(), 1);
        assert_eq!(mock.live_image_views(), 1);

        drop(depth);
        assert_eq!(mock.live_images(), 0);
        assert_eq!(mock.live_image_views(), 0);
    }
}
