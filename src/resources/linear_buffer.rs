//! Sub-allocated linear uniform buffer
//!
//! One shared buffer holds every uniform block of a frame. Blocks are pushed
//! back to back with a write cursor (`head`); each push aligns the cursor
//! first. The contents live in a host shadow copy, allocated once with the
//! buffer, and are uploaded in one write on [`LinearBuffer::unmap`].
//! Alignment padding is zeroed as the cursor skips over it, so bytes from
//! an earlier frame never show up between blocks.

use crate::backend::traits::*;
use crate::backend::types::*;
use glam::{Mat4, Vec3, Vec4};

/// Alignment of vectors and matrices inside a uniform block
pub const VEC4_ALIGNMENT: u64 = 16;

/// Round `value` up to the next multiple of `alignment`.
///
/// # Panics
/// If `alignment` is not a power of two.
pub fn align(value: u64, alignment: u64) -> u64 {
    assert!(
        alignment.is_power_of_two(),
        "alignment {alignment} is not a power of two"
    );
    (value + alignment - 1) & !(alignment - 1)
}

/// Linear byte arena backed by a GPU uniform buffer
#[derive(Debug)]
pub struct LinearBuffer {
    buffer: BufferHandle,
    size: u64,
    head: u64,
    shadow: Vec<u8>,
    mapped: bool,
}

impl LinearBuffer {
    /// Allocate a uniform buffer of `capacity` bytes
    pub fn create<B: GraphicsBackend>(backend: &mut B, capacity: u64) -> BackendResult<Self> {
        let buffer = backend.create_buffer(&BufferDescriptor {
            label: Some("Linear Uniform Buffer".into()),
            size: capacity,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?;
        log::info!("Linear uniform buffer created ({} bytes)", capacity);

        Ok(Self {
            buffer,
            size: capacity,
            head: 0,
            shadow: vec![0; capacity as usize],
            mapped: false,
        })
    }

    pub fn handle(&self) -> BufferHandle {
        self.buffer
    }

    /// Capacity in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current write cursor
    pub fn head(&self) -> u64 {
        self.head
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Open the buffer for writing and reset the cursor
    pub fn map(&mut self) {
        assert!(!self.mapped, "linear buffer is already mapped");
        self.head = 0;
        self.mapped = true;
    }

    /// Advance the cursor to the next multiple of `alignment`, zeroing the
    /// bytes skipped
    pub fn align_head(&mut self, alignment: u64) {
        let start = self.head;
        let end = align(start, alignment);
        assert!(
            end <= self.size,
            "linear buffer overflow: head {} past capacity {}",
            end,
            self.size
        );
        self.shadow[start as usize..end as usize].fill(0);
        self.head = end;
    }

    /// Align, copy `bytes` at the cursor and advance past them.
    /// Returns the offset the data was written at.
    pub fn push_aligned(&mut self, bytes: &[u8], alignment: u64) -> u64 {
        assert!(self.mapped, "push into an unmapped linear buffer");
        self.align_head(alignment);

        let start = self.head;
        let end = start + bytes.len() as u64;
        assert!(
            end <= self.size,
            "linear buffer overflow: {} bytes at {} exceed capacity {}",
            bytes.len(),
            start,
            self.size
        );

        self.shadow[start as usize..end as usize].copy_from_slice(bytes);
        self.head = end;
        start
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> u64 {
        self.push_aligned(bytes, 1)
    }

    pub fn push_u32(&mut self, value: u32) -> u64 {
        self.push_aligned(bytemuck::bytes_of(&value), 4)
    }

    /// 12 bytes, aligned like a vec4
    pub fn push_vec3(&mut self, value: Vec3) -> u64 {
        self.push_aligned(bytemuck::bytes_of(&value.to_array()), VEC4_ALIGNMENT)
    }

    pub fn push_vec4(&mut self, value: Vec4) -> u64 {
        self.push_aligned(bytemuck::bytes_of(&value.to_array()), VEC4_ALIGNMENT)
    }

    /// Column-major, four vec4 columns
    pub fn push_mat4(&mut self, value: &Mat4) -> u64 {
        self.push_aligned(bytemuck::bytes_of(&value.to_cols_array()), VEC4_ALIGNMENT)
    }

    /// Bytes written since `map`, padding included
    pub fn mapped_bytes(&self) -> Option<&[u8]> {
        self.mapped.then(|| &self.shadow[..self.head as usize])
    }

    /// Upload everything written since `map` and close the buffer
    pub fn unmap<B: GraphicsBackend>(&mut self, backend: &mut B) {
        assert!(self.mapped, "unmap of a linear buffer that is not mapped");
        self.mapped = false;
        if self.head > 0 {
            backend.write_buffer(self.buffer, 0, &self.shadow[..self.head as usize]);
        }
    }

    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        backend.destroy_buffer(self.buffer);
    }
}
