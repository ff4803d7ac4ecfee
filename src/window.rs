//! Window management using winit

use crate::scene::CameraInput;
use std::collections::HashSet;
use std::sync::Arc;
use winit::{
    dpi::PhysicalSize,
    error::OsError,
    event::{ElementState, WindowEvent},
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Window as WinitWindow, WindowBuilder},
};

/// Wrapper around winit window with keyboard and size state
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    resized: bool,
    close_requested: bool,
    pressed: HashSet<KeyCode>,
}

impl Window {
    /// Create a new window with the given title and dimensions
    pub fn new(event_loop: &EventLoop<()>, title: &str, width: u32, height: u32) -> Result<Self, OsError> {
        let window = Arc::new(
            WindowBuilder::new()
                .with_title(title)
                .with_inner_size(PhysicalSize::new(width, height))
                .build(event_loop)?,
        );

        Ok(Self {
            window,
            width,
            height,
            resized: false,
            close_requested: false,
            pressed: HashSet::new(),
        })
    }

    /// Get the raw window for backend initialization
    pub fn window(&self) -> &WinitWindow {
        &self.window
    }

    /// Get arc reference to window
    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    /// Get current window dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Check if window was resized since last frame
    pub fn was_resized(&self) -> bool {
        self.resized
    }

    /// Clear the resize flag
    pub fn clear_resize_flag(&mut self) {
        self.resized = false;
    }

    /// Check if close was requested
    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    /// Handle window events
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
                self.resized = true;
            }
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => {
                            self.pressed.insert(code);
                        }
                        ElementState::Released => {
                            self.pressed.remove(&code);
                        }
                    }
                }
            }
            WindowEvent::Focused(false) => self.pressed.clear(),
            _ => {}
        }
    }

    /// Camera controls held this frame
    pub fn camera_input(&self) -> CameraInput {
        CameraInput {
            forward: self.is_pressed(KeyCode::KeyW),
            backward: self.is_pressed(KeyCode::KeyS),
            left: self.is_pressed(KeyCode::KeyA),
            right: self.is_pressed(KeyCode::KeyD),
            up: self.is_pressed(KeyCode::KeyE),
            down: self.is_pressed(KeyCode::KeyQ),
            yaw_increase: self.is_pressed(KeyCode::KeyV),
            yaw_decrease: self.is_pressed(KeyCode::KeyC),
            pitch_increase: self.is_pressed(KeyCode::KeyR),
            pitch_decrease: self.is_pressed(KeyCode::KeyF),
        }
    }

    /// Request a redraw
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}
