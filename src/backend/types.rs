//! Common types shared between backends

use crate::backend::traits::{BufferHandle, FramebufferHandle, TextureHandle};
use std::fmt;

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Depth24Plus,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth24Plus | TextureFormat::Depth32Float)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Depth24Plus
            | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float => 8,
        }
    }
}

/// Texture usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureUsage(u32);

impl TextureUsage {
    pub const COPY_SRC: Self = Self(1 << 0);
    pub const COPY_DST: Self = Self(1 << 1);
    pub const TEXTURE_BINDING: Self = Self(1 << 2);
    pub const RENDER_ATTACHMENT: Self = Self(1 << 3);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage(u32);

impl BufferUsage {
    pub const COPY_DST: Self = Self(1 << 0);
    pub const INDEX: Self = Self(1 << 1);
    pub const VERTEX: Self = Self(1 << 2);
    pub const UNIFORM: Self = Self(1 << 3);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Texture descriptor
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        }
    }
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
}

/// Filter mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Address mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
}

/// Sampler descriptor
#[derive(Debug, Clone)]
pub struct SamplerDescriptor {
    pub label: Option<String>,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub address_mode: AddressMode,
}

impl SamplerDescriptor {
    /// Nearest filtering, clamped. Used for render targets.
    pub fn nearest_clamp(label: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            address_mode: AddressMode::ClampToEdge,
        }
    }

    /// Linear filtering, clamped. Used for material textures.
    pub fn linear_clamp(label: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            address_mode: AddressMode::ClampToEdge,
        }
    }
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            address_mode: AddressMode::ClampToEdge,
        }
    }
}

/// Device limits queried once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Required alignment of a bound uniform range's offset
    pub uniform_block_alignment: u32,
    /// Largest uniform block that can be bound
    pub max_uniform_block_size: u32,
    /// Number of simultaneous color attachments
    pub max_color_attachments: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            uniform_block_alignment: 256,
            max_uniform_block_size: 64 * 1024,
            max_color_attachments: 8,
        }
    }
}

/// Adapter description strings shown in the debug UI
#[derive(Debug, Clone, Default)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: String,
    pub driver: String,
    pub backend: String,
    pub shading_language: String,
}

/// Offscreen framebuffer descriptor. Color attachment `i` is draw buffer `i`.
#[derive(Debug, Clone)]
pub struct FramebufferDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<TextureHandle>,
    pub depth_attachment: Option<TextureHandle>,
}

/// Attachment properties used to evaluate framebuffer completeness
#[derive(Debug, Clone, Copy)]
pub struct AttachmentInfo {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub renderable: bool,
}

/// Result of a framebuffer completeness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    Undefined,
    IncompleteAttachment,
    MissingAttachment,
    IncompleteDrawBuffer,
    IncompleteReadBuffer,
    Unsupported,
    IncompleteMultisample,
    IncompleteLayerTargets,
    Unknown(u32),
}

impl FramebufferStatus {
    pub fn is_complete(&self) -> bool {
        *self == FramebufferStatus::Complete
    }

    /// Evaluate completeness for backends without a native check.
    pub fn evaluate(
        color: &[AttachmentInfo],
        depth: Option<&AttachmentInfo>,
        max_color_attachments: u32,
    ) -> Self {
        if color.is_empty() && depth.is_none() {
            return FramebufferStatus::MissingAttachment;
        }
        if color.len() as u32 > max_color_attachments {
            return FramebufferStatus::IncompleteDrawBuffer;
        }
        if color
            .iter()
            .any(|a| !a.renderable || a.format.is_depth())
        {
            return FramebufferStatus::IncompleteAttachment;
        }
        if let Some(d) = depth {
            if !d.renderable || !d.format.is_depth() {
                return FramebufferStatus::IncompleteAttachment;
            }
        }

        let mut sizes = color.iter().chain(depth).map(|a| (a.width, a.height));
        if let Some(first) = sizes.next() {
            if sizes.any(|s| s != first) {
                return FramebufferStatus::IncompleteAttachment;
            }
        }

        FramebufferStatus::Complete
    }
}

impl fmt::Display for FramebufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramebufferStatus::Complete => write!(f, "FRAMEBUFFER_COMPLETE"),
            FramebufferStatus::Undefined => write!(f, "FRAMEBUFFER_UNDEFINED"),
            FramebufferStatus::IncompleteAttachment => {
                write!(f, "FRAMEBUFFER_INCOMPLETE_ATTACHMENT")
            }
            FramebufferStatus::MissingAttachment => {
                write!(f, "FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT")
            }
            FramebufferStatus::IncompleteDrawBuffer => {
                write!(f, "FRAMEBUFFER_INCOMPLETE_DRAW_BUFFER")
            }
            FramebufferStatus::IncompleteReadBuffer => {
                write!(f, "FRAMEBUFFER_INCOMPLETE_READ_BUFFER")
            }
            FramebufferStatus::Unsupported => write!(f, "FRAMEBUFFER_UNSUPPORTED"),
            FramebufferStatus::IncompleteMultisample => {
                write!(f, "FRAMEBUFFER_INCOMPLETE_MULTISAMPLE")
            }
            FramebufferStatus::IncompleteLayerTargets => {
                write!(f, "FRAMEBUFFER_INCOMPLETE_LAYER_TARGETS")
            }
            FramebufferStatus::Unknown(code) => write!(f, "unknown framebuffer status {code}"),
        }
    }
}

/// Program sources, one per stage, already prefixed with version and defines
#[derive(Debug, Clone)]
pub struct ProgramDescriptor {
    pub name: String,
    pub vertex_source: String,
    pub fragment_source: String,
}

/// One float attribute read by a vertex array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexArrayAttribute {
    pub location: u32,
    pub component_count: u8,
    /// Absolute byte offset into the vertex buffer
    pub offset: u64,
}

/// Vertex array descriptor
///
/// `base_offset` is where the submesh's vertices start in the shared buffer;
/// every attribute offset is absolute and at least `base_offset`.
#[derive(Debug, Clone)]
pub struct VertexArrayDescriptor {
    pub label: Option<String>,
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub stride: u32,
    pub base_offset: u64,
    pub attributes: Vec<VertexArrayAttribute>,
}

/// Where a pass renders to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTarget {
    Framebuffer(FramebufferHandle),
    Screen,
}

/// Pass descriptor
#[derive(Debug, Clone)]
pub struct PassDescriptor {
    pub label: Option<String>,
    pub target: PassTarget,
    /// Color attachment slots written by the pass. Ignored for the screen.
    pub draw_buffers: Vec<u32>,
    /// Clear color for the draw buffers, `None` keeps the previous contents
    pub clear_color: Option<[f32; 4]>,
    /// Clear value for the depth attachment, `None` keeps the previous contents
    pub clear_depth: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba8(width: u32, height: u32) -> AttachmentInfo {
        AttachmentInfo {
            width,
            height,
            format: TextureFormat::Rgba8Unorm,
            renderable: true,
        }
    }

    fn depth(width: u32, height: u32) -> AttachmentInfo {
        AttachmentInfo {
            width,
            height,
            format: TextureFormat::Depth24Plus,
            renderable: true,
        }
    }

    #[test]
    fn test_complete_framebuffer() {
        let colors = [rgba8(64, 32), rgba8(64, 32)];
        let status = FramebufferStatus::evaluate(&colors, Some(&depth(64, 32)), 8);
        assert!(status.is_complete());
    }

    #[test]
    fn test_missing_attachment() {
        assert_eq!(
            FramebufferStatus::evaluate(&[], None, 8),
            FramebufferStatus::MissingAttachment
        );
    }

    #[test]
    fn test_size_mismatch_is_incomplete() {
        let colors = [rgba8(64, 32), rgba8(32, 32)];
        assert_eq!(
            FramebufferStatus::evaluate(&colors, None, 8),
            FramebufferStatus::IncompleteAttachment
        );
    }

    #[test]
    fn test_depth_format_in_color_slot() {
        let colors = [rgba8(8, 8), depth(8, 8)];
        assert_eq!(
            FramebufferStatus::evaluate(&colors, None, 8),
            FramebufferStatus::IncompleteAttachment
        );
    }

    #[test]
    fn test_non_renderable_attachment() {
        let mut color = rgba8(8, 8);
        color.renderable = false;
        assert_eq!(
            FramebufferStatus::evaluate(&[color], None, 8),
            FramebufferStatus::IncompleteAttachment
        );
    }

    #[test]
    fn test_too_many_draw_buffers() {
        let colors = [rgba8(8, 8); 5];
        assert_eq!(
            FramebufferStatus::evaluate(&colors, None, 4),
            FramebufferStatus::IncompleteDrawBuffer
        );
    }

    #[test]
    fn test_status_display() {
        assert_eq!(
            FramebufferStatus::IncompleteAttachment.to_string(),
            "FRAMEBUFFER_INCOMPLETE_ATTACHMENT"
        );
        assert_eq!(
            FramebufferStatus::Unknown(7).to_string(),
            "unknown framebuffer status 7"
        );
    }
}
