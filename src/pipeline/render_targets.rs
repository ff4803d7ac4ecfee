//! Deferred render target set
//!
//! Five color targets and one depth buffer, all at display resolution,
//! attached to a single framebuffer:
//!
//! | slot   | target          | format        |
//! |--------|-----------------|---------------|
//! | COLOR0 | final color     | RGBA8         |
//! | COLOR1 | albedo          | RGBA8         |
//! | COLOR2 | normals         | RGBA8         |
//! | COLOR3 | position        | RGBA8         |
//! | COLOR4 | depth as color  | RGBA16F       |
//! | DEPTH  | hardware depth  | Depth24Plus   |

use crate::backend::traits::*;
use crate::backend::types::*;

/// One of the color targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    Color,
    Albedo,
    Normal,
    Position,
    Depth,
}

impl RenderTarget {
    pub const ALL: [RenderTarget; 5] = [
        RenderTarget::Color,
        RenderTarget::Albedo,
        RenderTarget::Normal,
        RenderTarget::Position,
        RenderTarget::Depth,
    ];

    /// Color attachment slot in the framebuffer
    pub fn slot(&self) -> u32 {
        match self {
            RenderTarget::Color => 0,
            RenderTarget::Albedo => 1,
            RenderTarget::Normal => 2,
            RenderTarget::Position => 3,
            RenderTarget::Depth => 4,
        }
    }

    pub fn format(&self) -> TextureFormat {
        match self {
            RenderTarget::Depth => TextureFormat::Rgba16Float,
            _ => TextureFormat::Rgba8Unorm,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            RenderTarget::Color => "Color Target",
            RenderTarget::Albedo => "Albedo Target",
            RenderTarget::Normal => "Normal Target",
            RenderTarget::Position => "Position Target",
            RenderTarget::Depth => "Depth Color Target",
        }
    }
}

/// Texture and sampler of one target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetTexture {
    pub texture: TextureHandle,
    pub sampler: SamplerHandle,
}

/// Offscreen framebuffer with its attachments
#[derive(Debug)]
pub struct RenderTargets {
    pub width: u32,
    pub height: u32,
    pub framebuffer: FramebufferHandle,
    pub depth_attachment: TextureHandle,
    targets: [TargetTexture; 5],
    status: FramebufferStatus,
}

impl RenderTargets {
    /// Create every target at `width` x `height` and attach them.
    ///
    /// Completeness is checked once. An incomplete framebuffer is logged
    /// with its reason and returned anyway.
    pub fn create<B: GraphicsBackend>(backend: &mut B, width: u32, height: u32) -> BackendResult<Self> {
        let mut targets = Vec::with_capacity(RenderTarget::ALL.len());
        for target in RenderTarget::ALL {
            let texture = backend.create_texture(&TextureDescriptor {
                label: Some(target.label().into()),
                width,
                height,
                format: target.format(),
                usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            })?;
            let sampler = backend.create_sampler(&SamplerDescriptor::nearest_clamp(target.label()))?;
            targets.push(TargetTexture { texture, sampler });
        }
        let targets: [TargetTexture; 5] = targets
            .try_into()
            .map_err(|_| BackendError::TextureCreationFailed("render target count".into()))?;

        let depth_attachment = backend.create_texture(&TextureDescriptor {
            label: Some("Depth Attachment".into()),
            width,
            height,
            format: TextureFormat::Depth24Plus,
            usage: TextureUsage::RENDER_ATTACHMENT,
        })?;

        let framebuffer = backend.create_framebuffer(&FramebufferDescriptor {
            label: Some("Deferred Framebuffer".into()),
            color_attachments: targets.iter().map(|t| t.texture).collect(),
            depth_attachment: Some(depth_attachment),
        })?;

        let status = backend.check_framebuffer_status(framebuffer);
        if status.is_complete() {
            log::info!("Render targets created ({}x{})", width, height);
        } else {
            log::error!("Framebuffer incomplete: {}", status);
        }

        Ok(Self {
            width,
            height,
            framebuffer,
            depth_attachment,
            targets,
            status,
        })
    }

    pub fn get(&self, target: RenderTarget) -> TargetTexture {
        self.targets[target.slot() as usize]
    }

    /// Result of the completeness check done at creation
    pub fn status(&self) -> FramebufferStatus {
        self.status
    }

    /// Draw buffers written by the geometry pass
    pub fn geometry_draw_buffers() -> Vec<u32> {
        RenderTarget::ALL.iter().map(|t| t.slot()).collect()
    }

    pub fn release<B: GraphicsBackend>(self, backend: &mut B) {
        backend.destroy_framebuffer(self.framebuffer);
        backend.destroy_texture(self.depth_attachment);
        for target in self.targets {
            backend.destroy_texture(target.texture);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn test_targets_are_complete() {
        let mut backend = RecordingBackend::new(320, 200);
        let targets = RenderTargets::create(&mut backend, 320, 200).unwrap();

        assert!(targets.status().is_complete());
        assert_eq!(backend.counters().textures, 6);
        assert_eq!(backend.counters().framebuffers, 1);

        let depth = backend
            .texture_descriptor(targets.get(RenderTarget::Depth).texture)
            .unwrap();
        assert_eq!(depth.format, TextureFormat::Rgba16Float);
        assert_eq!((depth.width, depth.height), (320, 200));
    }

    #[test]
    fn test_too_many_attachments_is_reported() {
        let limits = DeviceLimits {
            max_color_attachments: 4,
            ..Default::default()
        };
        let mut backend = RecordingBackend::with_limits(64, 64, limits);
        let targets = RenderTargets::create(&mut backend, 64, 64).unwrap();
        assert_eq!(targets.status(), FramebufferStatus::IncompleteDrawBuffer);
    }

    #[test]
    fn test_release_frees_everything() {
        let mut backend = RecordingBackend::new(64, 64);
        let targets = RenderTargets::create(&mut backend, 64, 64).unwrap();
        targets.release(&mut backend);
        assert_eq!(backend.live_resource_count(), 0);
    }
}
