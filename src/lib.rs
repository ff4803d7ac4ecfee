//! Deferred Engine - a small deferred renderer built on wgpu
//!
//! Every frame renders the scene's entities into five render targets
//! (color, albedo, normals, position, depth), combines them with the scene
//! lights in a full-screen shading pass and presents the target selected in
//! the debug UI.
//!
//! # Features
//! - One linear uniform buffer sub-allocated per frame
//! - Vertex array bindings resolved lazily per (mesh, submesh, program)
//! - Multiplexed GLSL programs validated with naga and hot reloaded on change
//! - glTF model import with flattened node hierarchies
//! - A recording backend for running the whole frame without a GPU

pub mod backend;
pub mod egui_integration;
pub mod engine;
pub mod pipeline;
pub mod resources;
pub mod scene;
pub mod window;

pub use egui_integration::DebugOverlay;
pub use engine::{Engine, EngineError, GEOMETRY_PROGRAM, SHADING_PROGRAM, TEXTURED_PROGRAM};
pub use window::Window;

// Re-export wgpu backend for direct access
pub use backend::wgpu_backend::WgpuBackend;

use std::path::PathBuf;

/// Configuration for initializing the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable vsync
    pub vsync: bool,
    /// Root directory of the demo content
    pub assets_dir: PathBuf,
    /// Multiplexed shader file, relative to `assets_dir`
    pub shader_path: PathBuf,
    /// Model placed in the scene, relative to `assets_dir`. Procedural content only when unset.
    pub model_path: Option<PathBuf>,
    /// Clear color of the geometry pass
    pub clear_color: [f32; 4],
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "Deferred Renderer".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            assets_dir: PathBuf::from("assets"),
            shader_path: PathBuf::from("shaders/deferred.glsl"),
            model_path: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl EngineConfig {
    /// Full path of the shader file
    pub fn shader_file(&self) -> PathBuf {
        self.assets_dir.join(&self.shader_path)
    }

    /// Full path of the model file, if one is configured
    pub fn model_file(&self) -> Option<PathBuf> {
        self.model_path.as_ref().map(|p| self.assets_dir.join(p))
    }
}
