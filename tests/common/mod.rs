//! Common utilities for integration tests.
//!
//! Everything runs on the recording backend, so no GPU is needed.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use deferred_engine::backend::*;
use deferred_engine::resources::*;
use deferred_engine::EngineConfig;
use tempfile::TempDir;

/// Surface size used by the engine tests
pub const WIDTH: u32 = 320;
pub const HEIGHT: u32 = 240;

/// Minimal versions of the three engine programs
pub const TEST_SHADER: &str = r#"
#ifdef GEOMETRY_PASS
#ifdef VERTEX
layout(location = 0) in vec3 aPosition;
layout(location = 1) in vec3 aNormal;
layout(location = 2) in vec2 aTexCoord;
layout(location = 0) out vec2 vTexCoord;
void main() {
    vTexCoord = aTexCoord + aNormal.xy * 0.0;
    gl_Position = vec4(aPosition, 1.0);
}
#endif
#ifdef FRAGMENT
layout(location = 0) in vec2 vTexCoord;
layout(location = 0) out vec4 oColor;
void main() {
    oColor = vec4(vTexCoord, 0.0, 1.0);
}
#endif
#endif

#ifdef SHADING_PASS
#ifdef VERTEX
layout(location = 0) in vec3 aPosition;
layout(location = 1) in vec2 aTexCoord;
layout(location = 0) out vec2 vTexCoord;
void main() {
    vTexCoord = aTexCoord;
    gl_Position = vec4(aPosition, 1.0);
}
#endif
#ifdef FRAGMENT
layout(location = 0) in vec2 vTexCoord;
layout(location = 0) out vec4 oColor;
void main() {
    oColor = vec4(vTexCoord, 1.0, 1.0);
}
#endif
#endif

#ifdef TEXTURED_GEOMETRY
#ifdef VERTEX
layout(location = 0) in vec3 aPosition;
layout(location = 1) in vec2 aTexCoord;
layout(location = 0) out vec2 vTexCoord;
void main() {
    vTexCoord = aTexCoord;
    gl_Position = vec4(aPosition, 1.0);
}
#endif
#ifdef FRAGMENT
layout(location = 0) in vec2 vTexCoord;
layout(location = 0) out vec4 oColor;
void main() {
    oColor = vec4(vTexCoord, 0.5, 1.0);
}
#endif
#endif
"#;

pub fn recording_backend() -> RecordingBackend {
    RecordingBackend::new(WIDTH, HEIGHT)
}

/// Write `source` as the shader file of a fresh assets directory
pub fn write_shader(dir: &Path, source: &str) -> PathBuf {
    let shaders = dir.join("shaders");
    std::fs::create_dir_all(&shaders).unwrap();
    let path = shaders.join("test.glsl");
    std::fs::write(&path, source).unwrap();
    path
}

/// Assets directory holding [`TEST_SHADER`] and a config pointing at it
pub fn test_assets() -> (TempDir, EngineConfig) {
    let dir = tempfile::tempdir().unwrap();
    write_shader(dir.path(), TEST_SHADER);
    let config = EngineConfig {
        width: WIDTH,
        height: HEIGHT,
        assets_dir: dir.path().to_path_buf(),
        shader_path: PathBuf::from("shaders/test.glsl"),
        ..Default::default()
    };
    (dir, config)
}

/// Move the file's modified time into the future so hot reload picks it up
pub fn touch_future(path: &Path, seconds: u64) {
    let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(seconds))
        .unwrap();
}

/// Layout with one float attribute group per `(location, component_count)`
pub fn layout_with(locations: &[(u8, u8)]) -> VertexLayout {
    locations
        .iter()
        .fold(VertexLayout::builder(), |builder, (location, count)| {
            builder.attribute(*location, *count)
        })
        .build()
}

/// Uploaded single-triangle mesh providing `locations`
pub fn uploaded_mesh(backend: &mut RecordingBackend, locations: &[(u8, u8)]) -> Mesh {
    let layout = layout_with(locations);
    let floats = layout.floats_per_vertex() * 3;
    let mut mesh = Mesh::new("triangle");
    mesh.add_submesh(layout, vec![0.0; floats], vec![0, 1, 2]);
    mesh.upload(backend).unwrap();
    mesh
}

/// Program whose vertex stage reads `locations`
pub fn program_reading(backend: &mut RecordingBackend, name: &str, locations: &[(u8, u8)]) -> Program {
    let handle = backend
        .create_program(&ProgramDescriptor {
            name: name.to_string(),
            vertex_source: String::new(),
            fragment_source: String::new(),
        })
        .unwrap();
    Program {
        name: name.to_string(),
        path: PathBuf::from("memory"),
        handle,
        input_layout: ShaderInputLayout::new(
            locations
                .iter()
                .map(|(location, component_count)| ShaderInput {
                    location: *location,
                    component_count: *component_count,
                    name: format!("in{location}"),
                })
                .collect(),
        ),
        last_modified: None,
        reload_failed: false,
        last_error: None,
    }
}

/// Importer returning a prepared scene, or failing when it has none
pub struct FakeImporter {
    pub scene: Option<ImportedScene>,
}

impl SceneImporter for FakeImporter {
    fn import(&self, path: &Path) -> Result<ImportedScene, ImportError> {
        self.scene.clone().ok_or_else(|| ImportError::Failed {
            path: path.to_path_buf(),
            reason: "no scene".into(),
        })
    }
}

/// Triangle mesh with positions and normals only
pub fn imported_triangle(name: &str, material_index: usize) -> ImportedMesh {
    ImportedMesh {
        name: name.to_string(),
        positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        normals: vec![[0.0, 0.0, 1.0]; 3],
        indices: vec![0, 1, 2],
        material_index,
        ..Default::default()
    }
}

/// Scene with `materials` materials and one triangle per entry of `material_indices`,
/// spread over a root with two children
pub fn imported_scene(materials: usize, material_indices: &[usize]) -> ImportedScene {
    let meshes: Vec<_> = material_indices
        .iter()
        .enumerate()
        .map(|(i, material)| imported_triangle(&format!("mesh{i}"), *material))
        .collect();
    let split = meshes.len() / 2;

    ImportedScene {
        nodes: vec![
            ImportedNode {
                name: "root".into(),
                meshes: Vec::new(),
                children: vec![1, 2],
            },
            ImportedNode {
                name: "left".into(),
                meshes: (0..split).collect(),
                children: Vec::new(),
            },
            ImportedNode {
                name: "right".into(),
                meshes: (split..meshes.len()).collect(),
                children: Vec::new(),
            },
        ],
        root: 0,
        meshes,
        materials: (0..materials)
            .map(|i| ImportedMaterial {
                name: format!("material{i}"),
                diffuse: [1.0, 1.0, 1.0],
                shininess: 128.0,
                ..Default::default()
            })
            .collect(),
    }
}
