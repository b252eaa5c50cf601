//! Frame loop and Vulkan wiring.
//!
//! This crate drives the per-frame loop on top of the RHI:
//! - Frame-slot synchronization and per-image command buffers
//! - Swapchain acquisition, presentation and recreation
//! - Renderer setup for a platform window

pub mod config;
pub mod frame_controller;
pub mod renderer;

pub use config::FrameConfig;
pub use frame_controller::FrameController;
pub use renderer::Renderer;

/// Maximum number of frames that can be in flight simultaneously.
pub use renderer_rhi::sync::MAX_FRAMES_IN_FLIGHT;
