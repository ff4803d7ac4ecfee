//! Arena tables for meshes, models, materials and textures

use crate::backend::traits::*;
use crate::resources::material::Material;
use crate::resources::mesh::{Mesh, Model};
use crate::resources::model_loader::*;
use crate::resources::texture::TextureLibrary;
use glam::Vec3;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub usize);

#[derive(Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("{path} contains no geometry")]
    Empty { path: PathBuf },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Owner of all loaded content. Ids index into the tables and stay valid
/// for the store's lifetime.
#[derive(Debug, Default)]
pub struct AssetStore {
    pub meshes: Vec<Mesh>,
    pub models: Vec<Model>,
    pub materials: Vec<Material>,
    pub textures: TextureLibrary,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id.0)
    }

    pub fn model(&self, id: ModelId) -> Option<&Model> {
        self.models.get(id.0)
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0)
    }

    /// Upload a mesh and add it to the table
    pub fn add_mesh<B: GraphicsBackend>(&mut self, backend: &mut B, mut mesh: Mesh) -> BackendResult<MeshId> {
        mesh.upload(backend)?;
        self.meshes.push(mesh);
        Ok(MeshId(self.meshes.len() - 1))
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.push(material);
        MaterialId(self.materials.len() - 1)
    }

    /// Add a model using one material for every submesh of `mesh`
    pub fn add_model(&mut self, mesh: MeshId, material: MaterialId) -> ModelId {
        let submeshes = self.meshes.get(mesh.0).map_or(0, |m| m.submeshes.len());
        self.models.push(Model {
            mesh,
            materials: vec![material; submeshes],
        });
        ModelId(self.models.len() - 1)
    }

    fn convert_material<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        imported: &ImportedMaterial,
        directory: &Path,
    ) -> Material {
        let mut load = |path: &Option<PathBuf>| {
            path.as_ref()
                .and_then(|p| self.textures.load(backend, &directory.join(p)))
        };

        Material {
            name: imported.name.clone(),
            albedo: Vec3::from(imported.diffuse),
            emissive: Vec3::from(imported.emissive),
            smoothness: 0.0,
            albedo_texture: load(&imported.diffuse_texture),
            emissive_texture: load(&imported.emissive_texture),
            specular_texture: load(&imported.specular_texture),
            normals_texture: load(&imported.normals_texture),
            bump_texture: load(&imported.height_texture),
        }
        .with_shininess(imported.shininess)
    }

    /// Import a scene file and flatten it into one mesh and one model.
    ///
    /// Imported materials are appended after the existing ones, and the
    /// model's material list is parallel to the mesh's submeshes. On
    /// failure nothing is added.
    pub fn load_model<B: GraphicsBackend, I: SceneImporter + ?Sized>(
        &mut self,
        backend: &mut B,
        importer: &I,
        path: &Path,
    ) -> Result<ModelId, ModelError> {
        let scene = importer.import(path).map_err(|e| {
            log::error!("{}", e);
            e
        })?;

        let flat = flatten_scene(&scene);
        if flat.is_empty() {
            return Err(ModelError::Empty {
                path: path.to_path_buf(),
            });
        }

        let name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("model");
        let mut mesh = Mesh::new(name);
        let mut scene_materials = Vec::with_capacity(flat.len());
        for submesh in flat {
            scene_materials.push(submesh.material_index);
            mesh.add_submesh(submesh.layout, submesh.vertices, submesh.indices);
        }
        mesh.upload(backend)?;

        let base = self.materials.len();
        let directory = path.parent().unwrap_or(Path::new("")).to_path_buf();
        for imported in &scene.materials {
            let material = self.convert_material(backend, imported, &directory);
            self.materials.push(material);
        }
        if scene.materials.is_empty() {
            self.materials.push(Material::default());
        }

        let materials = scene_materials
            .into_iter()
            .map(|index| {
                if index >= scene.materials.len() {
                    log::warn!("Submesh references missing material {}, using the first", index);
                    MaterialId(base)
                } else {
                    MaterialId(base + index)
                }
            })
            .collect();

        log::info!(
            "Loaded model {} ({} submeshes, {} materials)",
            path.display(),
            mesh.submeshes.len(),
            scene.materials.len()
        );

        self.meshes.push(mesh);
        self.models.push(Model {
            mesh: MeshId(self.meshes.len() - 1),
            materials,
        });
        Ok(ModelId(self.models.len() - 1))
    }

    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        self.models.clear();
        self.materials.clear();
        for mesh in &mut self.meshes {
            mesh.release(backend);
        }
        self.meshes.clear();
        self.textures.release(backend);
    }
}
