//! Model import into the asset store

mod common;

use common::{imported_scene, imported_triangle, recording_backend, test_assets, FakeImporter};
use deferred_engine::backend::RecordingBackend;
use deferred_engine::resources::*;
use deferred_engine::Engine;
use std::path::{Path, PathBuf};

fn store_with_existing_material() -> (RecordingBackend, AssetStore) {
    let backend = recording_backend();
    let mut assets = AssetStore::new();
    assets.add_material(Material::new("existing"));
    (backend, assets)
}

#[test]
fn test_material_ids_are_offset_by_existing_materials() {
    let (mut backend, mut assets) = store_with_existing_material();
    let importer = FakeImporter {
        scene: Some(imported_scene(2, &[1, 0, 1])),
    };

    let model = assets
        .load_model(&mut backend, &importer, Path::new("models/scene.gltf"))
        .unwrap();

    let model = assets.model(model).unwrap();
    assert_eq!(
        model.materials,
        vec![MaterialId(2), MaterialId(1), MaterialId(2)]
    );
    assert_eq!(assets.materials.len(), 3);
    assert_eq!(assets.material(MaterialId(1)).unwrap().name, "material0");
}

#[test]
fn test_model_materials_stay_in_imported_range() {
    let (mut backend, mut assets) = store_with_existing_material();
    let importer = FakeImporter {
        scene: Some(imported_scene(3, &[0, 2, 7, 1])),
    };
    let base = assets.materials.len();

    let model = assets
        .load_model(&mut backend, &importer, Path::new("scene.gltf"))
        .unwrap();

    let model = assets.model(model).unwrap();
    let mesh = assets.mesh(model.mesh).unwrap();
    assert_eq!(model.materials.len(), mesh.submeshes.len());
    for material in &model.materials {
        assert!((base..base + 3).contains(&material.0), "{material:?} out of range");
    }
    // Out of range index falls back to the first imported material
    assert_eq!(model.materials[2], MaterialId(base));
}

#[test]
fn test_submeshes_follow_tree_order() {
    let (mut backend, mut assets) = store_with_existing_material();
    let mut scene = imported_scene(1, &[0, 0]);
    scene.meshes[1] = ImportedMesh {
        tex_coords: Some(vec![[0.0, 0.0]; 3]),
        ..imported_triangle("textured", 0)
    };
    let importer = FakeImporter { scene: Some(scene) };

    let model = assets
        .load_model(&mut backend, &importer, Path::new("scene.gltf"))
        .unwrap();

    let mesh = assets.mesh(assets.model(model).unwrap().mesh).unwrap();
    assert_eq!(mesh.submeshes.len(), 2);
    assert_eq!(mesh.submeshes[0].layout.stride, 24);
    assert_eq!(mesh.submeshes[1].layout.stride, 32);
    assert_eq!(mesh.submeshes[1].vertex_offset, 72);
    assert!(mesh.buffers().is_some());
}

#[test]
fn test_failed_import_adds_nothing() {
    let (mut backend, mut assets) = store_with_existing_material();
    let counters = backend.counters();

    let result = assets.load_model(
        &mut backend,
        &FakeImporter { scene: None },
        Path::new("missing.gltf"),
    );

    assert!(matches!(result, Err(ModelError::Import(_))));
    assert_eq!(assets.meshes.len(), 0);
    assert_eq!(assets.models.len(), 0);
    assert_eq!(assets.materials.len(), 1);
    assert_eq!(backend.counters(), counters);
}

#[test]
fn test_scene_without_geometry_is_rejected() {
    let (mut backend, mut assets) = store_with_existing_material();
    let importer = FakeImporter {
        scene: Some(imported_scene(2, &[])),
    };

    let result = assets.load_model(&mut backend, &importer, Path::new("empty.gltf"));

    assert!(matches!(result, Err(ModelError::Empty { .. })));
    assert_eq!(assets.models.len(), 0);
    assert_eq!(assets.materials.len(), 1);
}

#[test]
fn test_engine_places_imported_model_in_scene() {
    let (_dir, mut config) = test_assets();
    config.model_path = Some(PathBuf::from("models/scene.gltf"));
    let importer = FakeImporter {
        scene: Some(imported_scene(1, &[0])),
    };

    let engine = Engine::with_importer(recording_backend(), config, &importer).unwrap();

    let entities = &engine.scene().entities;
    assert_eq!(entities.len(), 3);
    assert_eq!(entities[2].world_matrix.w_axis.x, 4.0);
}

#[test]
fn test_engine_skips_model_that_fails_to_import() {
    let (_dir, mut config) = test_assets();
    config.model_path = Some(PathBuf::from("models/broken.gltf"));

    let engine =
        Engine::with_importer(recording_backend(), config, &FakeImporter { scene: None }).unwrap();

    assert_eq!(engine.scene().entities.len(), 2);
    assert_eq!(engine.scene().lights.len(), 2);
}
