//! egui GUI integration
//!
//! The debug window and the overlay that paints it with the wgpu backend.

mod debug_ui;
mod overlay;

pub use self::debug_ui::debug_window;
pub use self::overlay::{DebugOverlay, OverlayFrame};
