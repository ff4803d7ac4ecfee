//! Scene import interface and node tree flattening
//!
//! Importers return an [`ImportedScene`]: a node tree referencing meshes,
//! and a material list. The tree is walked once and flattened into
//! submeshes plus a parallel list of material indices.

use crate::resources::vertex_layout::VertexLayout;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Failed to import {path}: {reason}")]
    Failed { path: PathBuf, reason: String },
    #[error("Scene {path} has no root node")]
    NoRoot { path: PathBuf },
}

/// Node of the imported hierarchy. Transforms are already baked into vertices.
#[derive(Debug, Clone, Default)]
pub struct ImportedNode {
    pub name: String,
    /// Indices into [`ImportedScene::meshes`]
    pub meshes: Vec<usize>,
    /// Indices into [`ImportedScene::nodes`]
    pub children: Vec<usize>,
}

/// Triangulated mesh with smooth normals
#[derive(Debug, Clone, Default)]
pub struct ImportedMesh {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tex_coords: Option<Vec<[f32; 2]>>,
    pub tangents: Option<Vec<[f32; 3]>>,
    pub bitangents: Option<Vec<[f32; 3]>>,
    pub indices: Vec<u32>,
    /// Index into [`ImportedScene::materials`]
    pub material_index: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ImportedMaterial {
    pub name: String,
    pub diffuse: [f32; 3],
    pub emissive: [f32; 3],
    pub shininess: f32,
    pub diffuse_texture: Option<PathBuf>,
    pub emissive_texture: Option<PathBuf>,
    pub specular_texture: Option<PathBuf>,
    pub normals_texture: Option<PathBuf>,
    pub height_texture: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportedScene {
    pub nodes: Vec<ImportedNode>,
    pub root: usize,
    pub meshes: Vec<ImportedMesh>,
    pub materials: Vec<ImportedMaterial>,
}

/// Source of scene data
pub trait SceneImporter {
    fn import(&self, path: &Path) -> Result<ImportedScene, ImportError>;
}

/// One flattened submesh, interleaved
#[derive(Debug, Clone)]
pub struct FlatSubmesh {
    pub layout: VertexLayout,
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    /// Material index within the imported scene
    pub material_index: usize,
}

/// Interleave an imported mesh:
/// position, normal, then uv if present, then tangent and bitangent if present
pub fn interleave_mesh(mesh: &ImportedMesh) -> FlatSubmesh {
    let tex_coords = mesh
        .tex_coords
        .as_ref()
        .filter(|uvs| uvs.len() == mesh.positions.len());
    let tangent_space = match (&mesh.tangents, &mesh.bitangents) {
        (Some(t), Some(b)) if t.len() == mesh.positions.len() && b.len() == mesh.positions.len() => {
            Some((t, b))
        }
        _ => None,
    };

    let mut builder = VertexLayout::builder().attribute(0, 3).attribute(1, 3);
    if tex_coords.is_some() {
        builder = builder.attribute(2, 2);
    }
    if tangent_space.is_some() {
        builder = builder.attribute(3, 3).attribute(4, 3);
    }
    let layout = builder.build();

    let mut vertices = Vec::with_capacity(mesh.positions.len() * layout.floats_per_vertex());
    for (i, position) in mesh.positions.iter().enumerate() {
        vertices.extend_from_slice(position);
        vertices.extend_from_slice(&mesh.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]));
        if let Some(uvs) = tex_coords {
            vertices.extend_from_slice(&uvs[i]);
        }
        if let Some((tangents, bitangents)) = tangent_space {
            vertices.extend_from_slice(&tangents[i]);
            let [x, y, z] = bitangents[i];
            vertices.extend_from_slice(&[-x, -y, -z]);
        }
    }

    FlatSubmesh {
        layout,
        vertices,
        indices: mesh.indices.clone(),
        material_index: mesh.material_index,
    }
}

/// Walk the node tree in pre-order (node meshes, then children in order)
/// with an explicit stack, collecting one submesh per mesh reference.
pub fn flatten_scene(scene: &ImportedScene) -> Vec<FlatSubmesh> {
    let mut submeshes = Vec::new();
    let mut visited = vec![false; scene.nodes.len()];
    let mut stack = vec![scene.root];

    while let Some(index) = stack.pop() {
        let Some(node) = scene.nodes.get(index) else {
            log::warn!("Skipping missing node {}", index);
            continue;
        };
        if std::mem::replace(&mut visited[index], true) {
            log::warn!("Node {} ({}) is referenced twice, skipping", index, node.name);
            continue;
        }

        for mesh_index in &node.meshes {
            match scene.meshes.get(*mesh_index) {
                Some(mesh) => submeshes.push(interleave_mesh(mesh)),
                None => log::warn!("Node {} references missing mesh {}", node.name, mesh_index),
            }
        }

        stack.extend(node.children.iter().rev());
    }

    submeshes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle(material_index: usize, name: &str) -> ImportedMesh {
        ImportedMesh {
            name: name.to_string(),
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            indices: vec![0, 1, 2],
            material_index,
            ..Default::default()
        }
    }

    #[test]
    fn test_layout_grows_with_attributes() {
        let mut mesh = triangle(0, "plain");
        assert_eq!(interleave_mesh(&mesh).layout.stride, 24);

        mesh.tex_coords = Some(vec![[0.0, 0.0]; 3]);
        assert_eq!(interleave_mesh(&mesh).layout.stride, 32);

        mesh.tangents = Some(vec![[1.0, 0.0, 0.0]; 3]);
        mesh.bitangents = Some(vec![[0.0, 1.0, 0.0]; 3]);
        let flat = interleave_mesh(&mesh);
        assert_eq!(flat.layout.stride, 56);
        assert_eq!(flat.layout.find(4).map(|a| a.offset), Some(44));
        // Bitangent is stored negated
        assert_eq!(&flat.vertices[11..14], &[0.0, -1.0, 0.0]);
    }

    #[test]
    fn test_pre_order_walk() {
        // root -> [a -> [c], b]
        let scene = ImportedScene {
            nodes: vec![
                ImportedNode {
                    name: "root".into(),
                    meshes: vec![0],
                    children: vec![1, 2],
                },
                ImportedNode {
                    name: "a".into(),
                    meshes: vec![1],
                    children: vec![3],
                },
                ImportedNode {
                    name: "b".into(),
                    meshes: vec![3],
                    children: vec![],
                },
                ImportedNode {
                    name: "c".into(),
                    meshes: vec![2],
                    children: vec![],
                },
            ],
            root: 0,
            meshes: (0..4).map(|i| triangle(i, &format!("m{i}"))).collect(),
            materials: vec![ImportedMaterial::default(); 4],
        };

        let order: Vec<usize> = flatten_scene(&scene)
            .iter()
            .map(|s| s.material_index)
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let depth = 10_000;
        let nodes = (0..depth)
            .map(|i| ImportedNode {
                name: format!("n{i}"),
                meshes: vec![0],
                children: if i + 1 < depth { vec![i + 1] } else { vec![] },
            })
            .collect();
        let scene = ImportedScene {
            nodes,
            root: 0,
            meshes: vec![triangle(0, "shared")],
            materials: vec![ImportedMaterial::default()],
        };
        assert_eq!(flatten_scene(&scene).len(), depth);
    }
}
