//! glTF scene importer

use crate::resources::model_loader::*;
use glam::{Mat3, Mat4, Quat, Vec2, Vec3};
use std::path::{Path, PathBuf};

/// Imports `.gltf` / `.glb` files.
///
/// Node transforms are baked into the vertices, texture coordinates are
/// flipped to match bottom-up image rows, missing normals are generated
/// and tangent space is computed for meshes with texture coordinates.
#[derive(Debug, Default, Clone, Copy)]
pub struct GltfImporter;

fn transform_to_mat4(transform: gltf::scene::Transform) -> Mat4 {
    match transform {
        gltf::scene::Transform::Matrix { matrix } => Mat4::from_cols_array_2d(&matrix),
        gltf::scene::Transform::Decomposed {
            translation,
            rotation,
            scale,
        } => Mat4::from_scale_rotation_translation(
            Vec3::from(scale),
            Quat::from_xyzw(rotation[0], rotation[1], rotation[2], rotation[3]),
            Vec3::from(translation),
        ),
    }
}

fn texture_path(texture: Option<gltf::texture::Texture>) -> Option<PathBuf> {
    match texture?.source().source() {
        gltf::image::Source::Uri { uri, .. } => Some(PathBuf::from(uri)),
        gltf::image::Source::View { .. } => {
            log::warn!("Embedded glTF images are not supported, texture skipped");
            None
        }
    }
}

fn import_material(material: &gltf::Material) -> ImportedMaterial {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, _] = pbr.base_color_factor();

    ImportedMaterial {
        name: material.name().unwrap_or("unnamed").to_string(),
        diffuse: [r, g, b],
        emissive: material.emissive_factor(),
        shininess: (1.0 - pbr.roughness_factor()) * 256.0,
        diffuse_texture: texture_path(pbr.base_color_texture().map(|info| info.texture())),
        emissive_texture: texture_path(material.emissive_texture().map(|info| info.texture())),
        specular_texture: None,
        normals_texture: texture_path(material.normal_texture().map(|n| n.texture())),
        height_texture: None,
    }
}

/// glTF's default material: white, fully rough
fn default_material() -> ImportedMaterial {
    ImportedMaterial {
        name: "default".into(),
        diffuse: [1.0, 1.0, 1.0],
        ..Default::default()
    }
}

/// Append the default material at `default_index` when some mesh has no
/// material of its own, or when the file defines none at all
fn append_default_material(scene: &mut ImportedScene, default_index: usize) {
    let referenced = scene.meshes.iter().any(|m| m.material_index == default_index);
    if referenced || scene.materials.is_empty() {
        scene.materials.push(default_material());
    }
}

/// Area-weighted smooth normals
fn generate_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let (Some(pa), Some(pb), Some(pc)) = (positions.get(a), positions.get(b), positions.get(c)) else {
            continue;
        };
        let (pa, pb, pc) = (Vec3::from(*pa), Vec3::from(*pb), Vec3::from(*pc));
        let face = (pb - pa).cross(pc - pa);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }
    normals
        .into_iter()
        .map(|n| n.try_normalize().unwrap_or(Vec3::Y).to_array())
        .collect()
}

/// Per-vertex tangent and bitangent from uv derivatives
fn generate_tangent_space(
    positions: &[[f32; 3]],
    normals: &[[f32; 3]],
    uvs: &[[f32; 2]],
    indices: &[u32],
) -> (Vec<[f32; 3]>, Vec<[f32; 3]>) {
    let mut tangents = vec![Vec3::ZERO; positions.len()];
    let mut bitangents = vec![Vec3::ZERO; positions.len()];

    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if a.max(b).max(c) >= positions.len() {
            continue;
        }
        let (pa, pb, pc) = (
            Vec3::from(positions[a]),
            Vec3::from(positions[b]),
            Vec3::from(positions[c]),
        );
        let (ua, ub, uc) = (Vec2::from(uvs[a]), Vec2::from(uvs[b]), Vec2::from(uvs[c]));

        let (e1, e2) = (pb - pa, pc - pa);
        let (d1, d2) = (ub - ua, uc - ua);
        let det = d1.x * d2.y - d2.x * d1.y;
        if det.abs() < f32::EPSILON {
            continue;
        }
        let r = 1.0 / det;
        let tangent = (e1 * d2.y - e2 * d1.y) * r;
        let bitangent = (e2 * d1.x - e1 * d2.x) * r;

        for i in [a, b, c] {
            tangents[i] += tangent;
            bitangents[i] += bitangent;
        }
    }

    let tangents = tangents
        .iter()
        .zip(normals)
        .map(|(t, n)| {
            let n = Vec3::from(*n);
            // Gram-Schmidt against the normal
            (*t - n * n.dot(*t))
                .try_normalize()
                .unwrap_or_else(|| n.any_orthonormal_vector())
                .to_array()
        })
        .collect();
    let bitangents = bitangents
        .into_iter()
        .map(|b| b.try_normalize().unwrap_or(Vec3::Z).to_array())
        .collect();

    (tangents, bitangents)
}

fn import_primitive(
    primitive: &gltf::Primitive,
    buffers: &[gltf::buffer::Data],
    world: &Mat4,
    name: String,
    default_index: usize,
) -> Option<ImportedMesh> {
    if primitive.mode() != gltf::mesh::Mode::Triangles {
        log::warn!("Skipping non-triangle primitive in {}", name);
        return None;
    }

    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data.0[..]));
    let positions: Vec<[f32; 3]> = reader
        .read_positions()?
        .map(|p| world.transform_point3(Vec3::from(p)).to_array())
        .collect();
    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };

    let normal_matrix = Mat3::from_mat4(*world).inverse().transpose();
    let normals = match reader.read_normals() {
        Some(normals) => normals
            .map(|n| {
                (normal_matrix * Vec3::from(n))
                    .try_normalize()
                    .unwrap_or(Vec3::Y)
                    .to_array()
            })
            .collect(),
        None => generate_normals(&positions, &indices),
    };

    let tex_coords: Option<Vec<[f32; 2]>> = reader
        .read_tex_coords(0)
        .map(|uvs| uvs.into_f32().map(|[u, v]| [u, 1.0 - v]).collect());

    let (tangents, bitangents) = match &tex_coords {
        Some(uvs) if uvs.len() == positions.len() => {
            let (t, b) = generate_tangent_space(&positions, &normals, uvs, &indices);
            (Some(t), Some(b))
        }
        _ => (None, None),
    };

    Some(ImportedMesh {
        name,
        positions,
        normals,
        tex_coords,
        tangents,
        bitangents,
        indices,
        material_index: primitive.material().index().unwrap_or(default_index),
    })
}

impl SceneImporter for GltfImporter {
    fn import(&self, path: &Path) -> Result<ImportedScene, ImportError> {
        let failed = |reason: String| ImportError::Failed {
            path: path.to_path_buf(),
            reason,
        };

        let mut gltf = gltf::Gltf::open(path).map_err(|e| failed(e.to_string()))?;
        let base = path.parent();
        let blob = gltf.blob.take();
        let buffers = gltf::import_buffers(&gltf.document, base, blob).map_err(|e| failed(e.to_string()))?;
        let document = &gltf.document;

        let gltf_scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or_else(|| ImportError::NoRoot {
                path: path.to_path_buf(),
            })?;

        let mut scene = ImportedScene {
            nodes: vec![ImportedNode {
                name: gltf_scene.name().unwrap_or("scene").to_string(),
                ..Default::default()
            }],
            root: 0,
            meshes: Vec::new(),
            materials: document.materials().map(|m| import_material(&m)).collect(),
        };
        // Primitives without a material point one past the file's materials
        let default_index = scene.materials.len();

        // (gltf node, parent imported node, parent world transform)
        let mut stack: Vec<(gltf::Node, usize, Mat4)> = gltf_scene
            .nodes()
            .map(|node| (node, 0, Mat4::IDENTITY))
            .collect();
        stack.reverse();

        while let Some((node, parent, parent_world)) = stack.pop() {
            let world = parent_world * transform_to_mat4(node.transform());
            let index = scene.nodes.len();
            let name = node.name().unwrap_or("node").to_string();
            scene.nodes.push(ImportedNode {
                name: name.clone(),
                ..Default::default()
            });
            scene.nodes[parent].children.push(index);

            if let Some(mesh) = node.mesh() {
                for primitive in mesh.primitives() {
                    let mesh_name = format!("{}/{}", name, primitive.index());
                    let imported =
                        import_primitive(&primitive, &buffers, &world, mesh_name, default_index);
                    if let Some(imported) = imported {
                        scene.nodes[index].meshes.push(scene.meshes.len());
                        scene.meshes.push(imported);
                    }
                }
            }

            let children: Vec<_> = node.children().collect();
            stack.extend(children.into_iter().rev().map(|child| (child, index, world)));
        }
        append_default_material(&mut scene, default_index);

        log::info!(
            "Imported {}: {} nodes, {} meshes, {} materials",
            path.display(),
            scene.nodes.len(),
            scene.meshes.len(),
            scene.materials.len()
        );
        Ok(scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_normals_face_up() {
        let positions = [[0.0, 0.0, 0.0], [0.0, 0.0, -1.0], [1.0, 0.0, 0.0]];
        let normals = generate_normals(&positions, &[0, 2, 1]);
        for n in normals {
            assert!((Vec3::from(n) - Vec3::Y).length() < 1e-5);
        }
    }

    #[test]
    fn test_tangent_follows_u() {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let normals = [[0.0, 0.0, 1.0]; 3];
        let uvs = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let (tangents, bitangents) = generate_tangent_space(&positions, &normals, &uvs, &[0, 1, 2]);
        assert!((Vec3::from(tangents[0]) - Vec3::X).length() < 1e-5);
        assert!((Vec3::from(bitangents[0]) - Vec3::Y).length() < 1e-5);
    }

    fn mesh_with_material(material_index: usize) -> ImportedMesh {
        ImportedMesh {
            name: "tri".into(),
            positions: vec![[0.0; 3]; 3],
            normals: vec![[0.0, 1.0, 0.0]; 3],
            tex_coords: None,
            tangents: None,
            bitangents: None,
            indices: vec![0, 1, 2],
            material_index,
        }
    }

    fn scene_with(materials: usize, meshes: &[usize]) -> ImportedScene {
        ImportedScene {
            materials: (0..materials)
                .map(|i| ImportedMaterial {
                    name: format!("m{i}"),
                    ..Default::default()
                })
                .collect(),
            meshes: meshes.iter().map(|&i| mesh_with_material(i)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_unassigned_primitive_gets_default_material() {
        let mut scene = scene_with(2, &[1, 2]);
        append_default_material(&mut scene, 2);

        assert_eq!(scene.materials.len(), 3);
        assert_eq!(scene.materials[2].name, "default");
        assert_eq!(scene.materials[2].diffuse, [1.0, 1.0, 1.0]);
        // Meshes with their own material are untouched
        assert_eq!(scene.meshes[0].material_index, 1);
        assert_eq!(scene.materials[0].name, "m0");
    }

    #[test]
    fn test_default_material_only_when_needed() {
        let mut scene = scene_with(2, &[0, 1]);
        append_default_material(&mut scene, 2);
        assert_eq!(scene.materials.len(), 2);

        let mut empty = scene_with(0, &[]);
        append_default_material(&mut empty, 0);
        assert_eq!(empty.materials.len(), 1);
    }

    #[test]
    fn test_missing_file_is_an_import_error() {
        let result = GltfImporter.import(Path::new("missing/model.gltf"));
        assert!(matches!(result, Err(ImportError::Failed { .. })));
    }
}
