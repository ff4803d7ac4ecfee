//! Backend abstraction layer
//!
//! Provides the backend trait, the wgpu implementation and a recording
//! backend that executes nothing and remembers every call.

pub mod debug_messages;
pub mod recording;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use debug_messages::*;
pub use recording::{CreationCounters, RecordedCommand, RecordingBackend};
pub use traits::*;
pub use types::*;
