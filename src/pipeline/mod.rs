//! Deferred rendering pipeline
//!
//! This module implements the deferred frame:
//! 1. Geometry pass - Renders entities to multiple render targets
//! 2. Shading pass - Fullscreen pass combining the targets with the lights
//! 3. Present - Draws the selected target to the screen

pub mod frame;
pub mod render_targets;
pub mod vao_cache;

pub use frame::*;
pub use render_targets::*;
pub use vao_cache::*;
