//! Vulkan Renderer - Main Entry Point
//!
//! Opens a window and runs the frame loop: every redraw begins a frame,
//! clears the swapchain image and presents it. Resizes and stale swapchains
//! are handled by the renderer; fatal GPU errors end the event loop.

use anyhow::Result;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use renderer_core::Timer;
use renderer_platform::Window;
use renderer_renderer::{FrameConfig, Renderer};

const WINDOW_WIDTH: u32 = 1280;
const WINDOW_HEIGHT: u32 = 720;
const WINDOW_TITLE: &str = "Vulkan Renderer";

struct App {
    window: Option<Window>,
    renderer: Option<Renderer>,
    timer: Timer,
}

impl App {
    fn new() -> Self {
        Self {
            window: None,
            renderer: None,
            timer: Timer::new(),
        }
    }

    /// Runs one frame. Returns false on a fatal error.
    fn redraw(&mut self) -> bool {
        let delta = self.timer.delta_secs();

        let Some(renderer) = self.renderer.as_mut() else {
            return true;
        };

        match renderer.begin_frame(delta) {
            Ok(true) => {}
            Ok(false) => return true,
            Err(e) => {
                error!("Failed to begin frame: {}", e);
                return false;
            }
        }

        // The render pass clears the image; nothing else is recorded.

        if let Err(e) = renderer.end_frame(delta) {
            error!("Failed to end frame: {}", e);
            return false;
        }
        true
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, WINDOW_WIDTH, WINDOW_HEIGHT, WINDOW_TITLE) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        let config = FrameConfig::default().with_clear_color([0.1, 0.1, 0.15, 1.0]);
        match Renderer::with_config(&window, config) {
            Ok(renderer) => {
                info!("Initialization complete, entering main loop");
                self.renderer = Some(renderer);
                self.window = Some(window);
                self.timer.reset();
            }
            Err(e) => {
                error!("Failed to create renderer: {:?}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                    && event.state.is_pressed()
                {
                    info!("Escape pressed, shutting down");
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(size) => {
                info!("Window resized to {}x{}", size.width, size.height);
                if let Some(ref mut window) = self.window {
                    window.resize(size.width, size.height);
                }
                if let Some(ref mut renderer) = self.renderer {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if !self.redraw() {
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(ref window) = self.window else {
            return;
        };

        // Sleep until the next event while minimized; there is nothing to present.
        if window.is_minimized() {
            event_loop.set_control_flow(ControlFlow::Wait);
        } else {
            event_loop.set_control_flow(ControlFlow::Poll);
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.take() {
            info!(
                "Rendered {} frames in {:.2}s",
                renderer.frame_controller().frame_count(),
                self.timer.elapsed_secs()
            );
            drop(renderer);
        }
        self.window = None;
    }
}

fn main() -> Result<()> {
    renderer_core::init_logging();
    info!("Starting Vulkan Renderer");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    event_loop.run_app(&mut app)?;

    Ok(())
}
