//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance and device creation
//! - Synchronization primitives (fences and semaphores)
//! - Command pools and the command buffer state machine
//! - Render passes, framebuffers and depth attachments
//! - Swapchain creation, recreation, acquire and present
//!
//! Everything above the instance talks to the GPU through the [`gpu::GpuDevice`]
//! trait. [`device::Device`] implements it over `ash`; with the `mock` feature
//! enabled, [`mock::MockDevice`] implements it in memory for tests.

mod error;

pub mod command;
pub mod depth_buffer;
pub mod device;
pub mod gpu;
pub mod instance;
pub mod physical_device;
pub mod render_pass;
pub mod swapchain;
pub mod sync;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{RhiError, RhiResult};
pub use gpu::{GpuDevice, SubmitDesc};

// Re-export ash types that users might need
pub use ash::vk;
