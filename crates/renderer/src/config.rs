//! Frame loop configuration.

use renderer_rhi::render_pass::ClearValues;

/// Tunables for [`FrameController`](crate::FrameController).
///
/// # Example
///
/// ```
/// use renderer_renderer::FrameConfig;
///
/// let config = FrameConfig::default()
///     .with_clear_color([0.1, 0.1, 0.15, 1.0])
///     .with_fence_timeout(1_000_000_000);
/// assert_eq!(config.fence_timeout, 1_000_000_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameConfig {
    /// RGBA color the swapchain image is cleared to.
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub clear_stencil: u32,
    /// Timeout in nanoseconds for waiting on a frame slot's fence.
    /// Expiry is fatal.
    pub fence_timeout: u64,
    /// Timeout in nanoseconds for acquiring a swapchain image.
    /// Expiry skips the frame.
    pub acquire_timeout: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        let clear = ClearValues::default();
        Self {
            clear_color: clear.color,
            clear_depth: clear.depth,
            clear_stencil: clear.stencil,
            fence_timeout: u64::MAX,
            acquire_timeout: u64::MAX,
        }
    }
}

impl FrameConfig {
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_clear_depth(mut self, depth: f32) -> Self {
        self.clear_depth = depth;
        self
    }

    pub fn with_clear_stencil(mut self, stencil: u32) -> Self {
        self.clear_stencil = stencil;
        self
    }

    pub fn with_fence_timeout(mut self, timeout: u64) -> Self {
        self.fence_timeout = timeout;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: u64) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Clear values handed to the render pass.
    pub fn clear_values(&self) -> ClearValues {
        ClearValues {
            color: self.clear_color,
            depth: self.clear_depth,
            stencil: self.clear_stencil,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_wait_forever() {
        let config = FrameConfig::default();
        assert_eq!(config.fence_timeout, u64::MAX);
        assert_eq!(config.acquire_timeout, u64::MAX);
        assert_eq!(config.clear_values(), ClearValues::default());
    }

    #[test]
    fn test_builders_override_fields() {
        let config = FrameConfig::default()
            .with_clear_color([1.0, 0.5, 0.25, 1.0])
            .with_clear_depth(0.0)
            .with_clear_stencil(7)
            .with_fence_timeout(10)
            .with_acquire_timeout(20);

        assert_eq!(config.clear_color, [1.0, 0.5, 0.25, 1.0]);
        assert_eq!(config.fence_timeout, 10);
        assert_eq!(config.acquire_timeout, 20);

        let clear = config.clear_values();
        assert_eq!(clear.depth, 0.0);
        assert_eq!(clear.stencil, 7);
    }
}
