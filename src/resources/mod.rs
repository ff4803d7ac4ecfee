//! Resource management
//!
//! Handles loading and management of meshes, textures, materials, shader
//! programs and the per-frame uniform buffer.

mod assets;
mod gltf_importer;
mod linear_buffer;
mod material;
mod mesh;
mod model_loader;
mod shader;
mod texture;
mod vertex_layout;

pub use assets::*;
pub use gltf_importer::*;
pub use linear_buffer::*;
pub use material::*;
pub use mesh::*;
pub use model_loader::*;
pub use shader::*;
pub use texture::*;
pub use vertex_layout::*;
