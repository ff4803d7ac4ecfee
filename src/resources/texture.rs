//! Texture loading and management

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::resources::assets::TextureId;
use image::GenericImageView;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Could not open image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Unsupported number of channels ({channels}) in {name}")]
    UnsupportedChannelCount { name: String, channels: u8 },
    #[error("Pixel data of {name} is {actual} bytes, expected {expected}")]
    SizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Decoded RGBA8 pixels ready for upload
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Decode an image file, flipped so the first row is the bottom one
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TextureError> {
        let path = path.as_ref();
        let name = path.to_string_lossy().into_owned();

        let img = image::open(path)
            .map_err(|source| TextureError::Decode {
                path: path.to_path_buf(),
                source,
            })?
            .flipv();

        let (width, height) = img.dimensions();
        match img.color().channel_count() {
            3 => Self::from_pixels(&name, width, height, 3, img.to_rgb8().as_raw()),
            4 => Self::from_pixels(&name, width, height, 4, img.to_rgba8().as_raw()),
            channels => Err(TextureError::UnsupportedChannelCount { name, channels }),
        }
    }

    /// Build from tightly packed RGB8 or RGBA8 pixels. RGB is expanded to RGBA.
    pub fn from_pixels(
        name: &str,
        width: u32,
        height: u32,
        channels: u8,
        pixels: &[u8],
    ) -> Result<Self, TextureError> {
        if channels != 3 && channels != 4 {
            return Err(TextureError::UnsupportedChannelCount {
                name: name.to_string(),
                channels,
            });
        }

        let expected = width as usize * height as usize * channels as usize;
        if pixels.len() != expected {
            return Err(TextureError::SizeMismatch {
                name: name.to_string(),
                expected,
                actual: pixels.len(),
            });
        }

        let data = if channels == 4 {
            pixels.to_vec()
        } else {
            pixels
                .chunks_exact(3)
                .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], 255])
                .collect()
        };

        Ok(Self {
            width,
            height,
            data,
            name: name.to_string(),
        })
    }

    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255], "white")
    }

    pub fn black() -> Self {
        Self::solid_color([0, 0, 0, 255], "black")
    }

    /// Flat tangent-space normal
    pub fn default_normal() -> Self {
        Self::solid_color([128, 128, 255, 255], "normal")
    }

    pub fn magenta() -> Self {
        Self::solid_color([255, 0, 255, 255], "magenta")
    }

    /// Create a checkerboard texture
    pub fn checkerboard(size: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((size * size * 4) as usize);

        for y in 0..size {
            for x in 0..size {
                let is_even = ((x / 8) + (y / 8)) % 2 == 0;
                let color = if is_even { color1 } else { color2 };
                data.extend_from_slice(&color);
            }
        }

        Self {
            width: size,
            height: size,
            data,
            name: "checkerboard".to_string(),
        }
    }
}

/// Uploaded texture with its sampler
#[derive(Debug, Clone)]
pub struct GpuTexture {
    pub handle: TextureHandle,
    pub sampler: SamplerHandle,
    pub width: u32,
    pub height: u32,
    pub name: String,
}

impl GpuTexture {
    /// Create and upload texture to GPU
    pub fn create<B: GraphicsBackend>(backend: &mut B, data: &TextureData) -> BackendResult<Self> {
        let handle = backend.create_texture(&TextureDescriptor {
            label: Some(data.name.clone()),
            width: data.width,
            height: data.height,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        backend.write_texture(handle, &data.data, data.width, data.height);

        let sampler = backend.create_sampler(&SamplerDescriptor::linear_clamp(&data.name))?;

        Ok(Self {
            handle,
            sampler,
            width: data.width,
            height: data.height,
            name: data.name.clone(),
        })
    }
}

/// Built-in textures created at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinTextures {
    pub white: TextureId,
    pub black: TextureId,
    pub normal: TextureId,
    pub magenta: TextureId,
    pub dice: TextureId,
}

/// Texture table. Loads are deduplicated by path.
#[derive(Debug, Default)]
pub struct TextureLibrary {
    textures: Vec<GpuTexture>,
    by_path: HashMap<PathBuf, TextureId>,
    /// Stands in for files that fail to load, set by [`Self::create_builtins`]
    fallback: Option<TextureId>,
}

impl TextureLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn get(&self, id: TextureId) -> Option<&GpuTexture> {
        self.textures.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GpuTexture> {
        self.textures.iter()
    }

    /// Upload decoded pixels as a new table entry
    pub fn add<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        data: &TextureData,
    ) -> BackendResult<TextureId> {
        let texture = GpuTexture::create(backend, data)?;
        self.textures.push(texture);
        Ok(TextureId(self.textures.len() - 1))
    }

    /// Load an image file, returning the existing entry for a known path
    pub fn try_load<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        path: &Path,
    ) -> Result<TextureId, TextureError> {
        if let Some(id) = self.by_path.get(path) {
            return Ok(*id);
        }

        let data = TextureData::from_file(path)?;
        let id = self.add(backend, &data)?;
        self.by_path.insert(path.to_path_buf(), id);
        log::debug!("Loaded texture {} ({}x{})", path.display(), data.width, data.height);
        Ok(id)
    }

    /// Like [`Self::try_load`], but logs the failure and returns the
    /// magenta built-in instead. `None` only before the built-ins exist.
    pub fn load<B: GraphicsBackend>(&mut self, backend: &mut B, path: &Path) -> Option<TextureId> {
        match self.try_load(backend, path) {
            Ok(id) => Some(id),
            Err(e) => {
                log::error!("{}", e);
                self.fallback
            }
        }
    }

    pub fn create_builtins<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
    ) -> BackendResult<BuiltinTextures> {
        let builtins = BuiltinTextures {
            white: self.add(backend, &TextureData::white())?,
            black: self.add(backend, &TextureData::black())?,
            normal: self.add(backend, &TextureData::default_normal())?,
            magenta: self.add(backend, &TextureData::magenta())?,
            dice: self.add(
                backend,
                &TextureData::checkerboard(64, [230, 230, 230, 255], [40, 40, 40, 255]),
            )?,
        };
        self.fallback = Some(builtins.magenta);
        Ok(builtins)
    }

    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        for texture in self.textures.drain(..) {
            backend.destroy_texture(texture.handle);
        }
        self.by_path.clear();
        self.fallback = None;
    }
}
