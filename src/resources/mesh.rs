//! Mesh data structures and generation
//!
//! A [`Mesh`] keeps every submesh's vertices and indices back to back in
//! one shared vertex buffer and one shared index buffer. Each [`Submesh`]
//! remembers where its data starts in those buffers.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::resources::assets::{MaterialId, MeshId};
use crate::resources::vertex_layout::VertexLayout;
use glam::{Vec2, Vec3};

/// Contiguous run of vertices and indices with one layout and one material
#[derive(Debug, Clone)]
pub struct Submesh {
    pub layout: VertexLayout,
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    /// Byte offset of the first vertex in the shared vertex buffer
    pub vertex_offset: u64,
    /// Byte offset of the first index in the shared index buffer
    pub index_offset: u64,
}

impl Submesh {
    pub fn vertex_count(&self) -> usize {
        match self.layout.floats_per_vertex() {
            0 => 0,
            n => self.vertices.len() / n,
        }
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

/// GPU buffers shared by all submeshes of a mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshBuffers {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
}

/// A set of submeshes sharing one vertex buffer and one index buffer
#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: String,
    pub submeshes: Vec<Submesh>,
    pub index_format: IndexFormat,
    buffers: Option<MeshBuffers>,
    vertex_bytes: u64,
    index_bytes: u64,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self::with_index_format(name, IndexFormat::Uint32)
    }

    pub fn with_index_format(name: &str, index_format: IndexFormat) -> Self {
        Self {
            name: name.to_string(),
            submeshes: Vec::new(),
            index_format,
            buffers: None,
            vertex_bytes: 0,
            index_bytes: 0,
        }
    }

    /// Append a submesh after the existing ones. Returns its index.
    pub fn add_submesh(&mut self, layout: VertexLayout, vertices: Vec<f32>, indices: Vec<u32>) -> usize {
        let vertex_offset = self.vertex_bytes;
        let index_offset = self.index_bytes;
        self.vertex_bytes += (vertices.len() * std::mem::size_of::<f32>()) as u64;
        self.index_bytes += indices.len() as u64 * self.index_format.size();

        self.submeshes.push(Submesh {
            layout,
            vertices,
            indices,
            vertex_offset,
            index_offset,
        });
        self.submeshes.len() - 1
    }

    /// Shared buffers, once uploaded
    pub fn buffers(&self) -> Option<MeshBuffers> {
        self.buffers
    }

    pub fn vertex_bytes(&self) -> u64 {
        self.vertex_bytes
    }

    pub fn index_bytes(&self) -> u64 {
        self.index_bytes
    }

    /// Concatenated vertex data of every submesh
    pub fn vertex_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.vertex_bytes as usize);
        for submesh in &self.submeshes {
            data.extend_from_slice(bytemuck::cast_slice(&submesh.vertices));
        }
        data
    }

    /// Concatenated index data of every submesh, in the mesh's index format
    pub fn index_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.index_bytes as usize);
        for submesh in &self.submeshes {
            match self.index_format {
                IndexFormat::Uint32 => data.extend_from_slice(bytemuck::cast_slice(&submesh.indices)),
                IndexFormat::Uint16 => {
                    for index in &submesh.indices {
                        data.extend_from_slice(&(*index as u16).to_ne_bytes());
                    }
                }
            }
        }
        data
    }

    /// Create the shared GPU buffers
    pub fn upload<B: GraphicsBackend>(&mut self, backend: &mut B) -> BackendResult<MeshBuffers> {
        if let Some(buffers) = self.buffers {
            return Ok(buffers);
        }

        let vertex_buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{} vertices", self.name)),
                size: self.vertex_bytes,
                usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
            },
            &self.vertex_data(),
        )?;
        let index_buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{} indices", self.name)),
                size: self.index_bytes,
                usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
            },
            &self.index_data(),
        )?;

        log::debug!(
            "Uploaded mesh '{}': {} submeshes, {} vertex bytes, {} index bytes",
            self.name,
            self.submeshes.len(),
            self.vertex_bytes,
            self.index_bytes
        );

        let buffers = MeshBuffers {
            vertex_buffer,
            index_buffer,
        };
        self.buffers = Some(buffers);
        Ok(buffers)
    }

    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        if let Some(buffers) = self.buffers.take() {
            backend.destroy_buffer(buffers.vertex_buffer);
            backend.destroy_buffer(buffers.index_buffer);
        }
    }

    /// Layout shared by the procedural shapes: position, normal, uv
    pub fn standard_layout() -> VertexLayout {
        VertexLayout::builder()
            .attribute(0, 3)
            .attribute(1, 3)
            .attribute(2, 2)
            .build()
    }

    /// Full-screen quad in clip space: position (3) and uv (2), 16-bit indices
    pub fn screen_quad() -> Self {
        let mut mesh = Mesh::with_index_format("screen quad", IndexFormat::Uint16);
        let layout = VertexLayout::builder().attribute(0, 3).attribute(1, 2).build();

        #[rustfmt::skip]
        let vertices = vec![
            -1.0, -1.0, 0.0,  0.0, 0.0,
             1.0, -1.0, 0.0,  1.0, 0.0,
             1.0,  1.0, 0.0,  1.0, 1.0,
            -1.0,  1.0, 0.0,  0.0, 1.0,
        ];
        mesh.add_submesh(layout, vertices, vec![0, 1, 2, 0, 2, 3]);
        mesh
    }

    /// Square on the XZ plane facing +Y
    pub fn plane(size: f32) -> Self {
        let mut mesh = Mesh::new("plane");
        let h = size / 2.0;
        let corners = [
            (Vec3::new(-h, 0.0, h), Vec2::new(0.0, 0.0)),
            (Vec3::new(h, 0.0, h), Vec2::new(1.0, 0.0)),
            (Vec3::new(h, 0.0, -h), Vec2::new(1.0, 1.0)),
            (Vec3::new(-h, 0.0, -h), Vec2::new(0.0, 1.0)),
        ];

        let mut vertices = Vec::with_capacity(corners.len() * 8);
        for (position, uv) in corners {
            push_vertex(&mut vertices, position, Vec3::Y, uv);
        }
        mesh.add_submesh(Self::standard_layout(), vertices, vec![0, 1, 2, 0, 2, 3]);
        mesh
    }

    /// Create a UV sphere
    pub fn sphere(radius: f32, rings: u32, sectors: u32) -> Self {
        let mut mesh = Mesh::new("sphere");
        let rings = rings.max(2);
        let sectors = sectors.max(3);

        let sector_angle = 2.0 * std::f32::consts::PI / sectors as f32;
        let ring_angle = std::f32::consts::PI / rings as f32;

        let mut vertices = Vec::with_capacity(((rings + 1) * (sectors + 1) * 8) as usize);
        for ring in 0..=rings {
            let phi = ring as f32 * ring_angle;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for sector in 0..=sectors {
                let theta = sector as f32 * sector_angle;
                let normal = Vec3::new(ring_radius * theta.cos(), y, ring_radius * theta.sin());
                let uv = Vec2::new(
                    sector as f32 / sectors as f32,
                    ring as f32 / rings as f32,
                );
                push_vertex(&mut vertices, normal * radius, normal, uv);
            }
        }

        let mut indices = Vec::with_capacity((rings * sectors * 6) as usize);
        for ring in 0..rings {
            for sector in 0..sectors {
                let current = ring * (sectors + 1) + sector;
                let next = current + sectors + 1;

                indices.extend_from_slice(&[
                    current,
                    next,
                    current + 1,
                    current + 1,
                    next,
                    next + 1,
                ]);
            }
        }

        mesh.add_submesh(Self::standard_layout(), vertices, indices);
        mesh
    }
}

fn push_vertex(out: &mut Vec<f32>, position: Vec3, normal: Vec3, uv: Vec2) {
    out.extend_from_slice(&position.to_array());
    out.extend_from_slice(&normal.to_array());
    out.extend_from_slice(&uv.to_array());
}

/// A mesh plus one material per submesh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub mesh: MeshId,
    /// Parallel to the mesh's submeshes
    pub materials: Vec<MaterialId>,
}
