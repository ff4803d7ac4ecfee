//! Attribute binding cache
//!
//! A vertex array wires a submesh's region of the shared vertex buffer to
//! the input locations of one program. They are built lazily on the first
//! draw of a (mesh, submesh, program) combination and reused afterwards.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::resources::{Mesh, MeshId, Program, ShaderInputLayout};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaoError {
    #[error("submesh {submesh} has no vertex attribute at location {location}")]
    MissingAttribute { submesh: usize, location: u8 },
    #[error("submesh {submesh} does not exist")]
    MissingSubmesh { submesh: usize },
    #[error("mesh has not been uploaded")]
    NotUploaded,
}

/// Identity of a cached binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VaoKey {
    pub mesh: MeshId,
    pub submesh: usize,
    pub program: ProgramHandle,
}

/// Describe the vertex array feeding `inputs` from one submesh.
///
/// Every input must have an attribute at the same location in the
/// submesh's layout. Attributes the program doesn't read are left out.
pub fn build_vertex_array_descriptor(
    mesh: &Mesh,
    submesh_index: usize,
    inputs: &ShaderInputLayout,
) -> Result<VertexArrayDescriptor, VaoError> {
    let submesh = mesh
        .submeshes
        .get(submesh_index)
        .ok_or(VaoError::MissingSubmesh {
            submesh: submesh_index,
        })?;
    let buffers = mesh.buffers().ok_or(VaoError::NotUploaded)?;

    let attributes = inputs
        .inputs
        .iter()
        .map(|input| {
            let attribute = submesh
                .layout
                .find(input.location)
                .ok_or(VaoError::MissingAttribute {
                    submesh: submesh_index,
                    location: input.location,
                })?;
            Ok(VertexArrayAttribute {
                location: input.location as u32,
                component_count: attribute.component_count,
                offset: attribute.offset as u64 + submesh.vertex_offset,
            })
        })
        .collect::<Result<Vec<_>, VaoError>>()?;

    Ok(VertexArrayDescriptor {
        label: Some(format!("{} #{}", mesh.name, submesh_index)),
        vertex_buffer: buffers.vertex_buffer,
        index_buffer: buffers.index_buffer,
        stride: submesh.layout.stride as u32,
        base_offset: submesh.vertex_offset,
        attributes,
    })
}

/// Vertex arrays keyed by (mesh, submesh, program)
#[derive(Debug, Default)]
pub struct VaoCache {
    entries: HashMap<VaoKey, VertexArrayHandle>,
}

impl VaoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &VaoKey) -> Option<VertexArrayHandle> {
        self.entries.get(key).copied()
    }

    /// Return the binding of `submesh_index` for `program`, creating it on first use.
    ///
    /// # Panics
    /// If the program reads a location the submesh doesn't provide. Such a
    /// mesh and program can't be drawn together.
    pub fn resolve<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        mesh_id: MeshId,
        mesh: &Mesh,
        submesh_index: usize,
        program: &Program,
    ) -> BackendResult<VertexArrayHandle> {
        let key = VaoKey {
            mesh: mesh_id,
            submesh: submesh_index,
            program: program.handle,
        };
        if let Some(handle) = self.entries.get(&key) {
            return Ok(*handle);
        }

        let descriptor = match build_vertex_array_descriptor(mesh, submesh_index, &program.input_layout) {
            Ok(descriptor) => descriptor,
            Err(VaoError::MissingAttribute { submesh, location }) => panic!(
                "mesh '{}' submesh {} has no vertex attribute at location {} required by program {}",
                mesh.name, submesh, location, program.name
            ),
            Err(e) => return Err(BackendError::VertexArrayCreationFailed(e.to_string())),
        };

        let handle = backend.create_vertex_array(&descriptor)?;
        log::debug!(
            "Created vertex array for mesh '{}' submesh {} and program {}",
            mesh.name,
            submesh_index,
            program.name
        );
        self.entries.insert(key, handle);
        Ok(handle)
    }

    /// Destroy every binding built for `program`. Returns how many were dropped.
    pub fn invalidate_program<B: GraphicsBackend>(&mut self, backend: &mut B, program: ProgramHandle) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, handle| {
            if key.program == program {
                backend.destroy_vertex_array(*handle);
                false
            } else {
                true
            }
        });
        before - self.entries.len()
    }

    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        for (_, handle) in self.entries.drain() {
            backend.destroy_vertex_array(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::resources::{ShaderInput, VertexLayout};

    fn inputs(locations: &[(u8, u8)]) -> ShaderInputLayout {
        ShaderInputLayout::new(
            locations
                .iter()
                .map(|(location, component_count)| ShaderInput {
                    location: *location,
                    component_count: *component_count,
                    name: format!("in{location}"),
                })
                .collect(),
        )
    }

    #[test]
    fn test_offsets_are_absolute() {
        let mut backend = RecordingBackend::new(64, 64);
        let mut mesh = Mesh::new("pair");
        let layout = VertexLayout::builder().attribute(0, 3).attribute(1, 2).build();
        mesh.add_submesh(layout.clone(), vec![0.0; 15], vec![0, 1, 2]);
        mesh.add_submesh(layout, vec![0.0; 15], vec![0, 1, 2]);
        mesh.upload(&mut backend).unwrap();

        let desc = build_vertex_array_descriptor(&mesh, 1, &inputs(&[(0, 3), (1, 2)])).unwrap();
        assert_eq!(desc.base_offset, 60);
        assert_eq!(desc.stride, 20);
        assert_eq!(desc.attributes[0].offset, 60);
        assert_eq!(desc.attributes[1].offset, 72);
    }

    #[test]
    fn test_missing_location_is_reported() {
        let mut backend = RecordingBackend::new(64, 64);
        let mut mesh = Mesh::screen_quad();
        mesh.upload(&mut backend).unwrap();

        let err = build_vertex_array_descriptor(&mesh, 0, &inputs(&[(0, 3), (4, 3)])).unwrap_err();
        assert_eq!(
            err,
            VaoError::MissingAttribute {
                submesh: 0,
                location: 4
            }
        );
    }

    #[test]
    fn test_not_uploaded() {
        let mesh = Mesh::screen_quad();
        assert_eq!(
            build_vertex_array_descriptor(&mesh, 0, &inputs(&[(0, 3)])).unwrap_err(),
            VaoError::NotUploaded
        );
    }
}
