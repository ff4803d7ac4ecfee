//! Passes that fail part way leave the renderer ready for the next frame

mod common;

use common::{recording_backend, write_shader, TEST_SHADER};
use deferred_engine::backend::*;
use deferred_engine::pipeline::*;
use deferred_engine::resources::*;
use deferred_engine::scene::Entity;
use deferred_engine::{GEOMETRY_PROGRAM, SHADING_PROGRAM, TEXTURED_PROGRAM};
use glam::{Mat4, Vec3};
use rstest::rstest;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    targets: RenderTargets,
    assets: AssetStore,
    programs: ProgramLibrary,
    pass_programs: PassPrograms,
    builtins: BuiltinTextures,
    screen_quad: MeshId,
    uniforms: LinearBuffer,
    global_params: UniformRange,
    entities: Vec<Entity>,
}

impl Fixture {
    fn new(backend: &mut RecordingBackend) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = write_shader(dir.path(), TEST_SHADER);

        let targets = RenderTargets::create(backend, 64, 64).unwrap();
        let mut assets = AssetStore::new();
        let builtins = assets.textures.create_builtins(backend).unwrap();
        let screen_quad = assets.add_mesh(backend, Mesh::screen_quad()).unwrap();

        let mut programs = ProgramLibrary::new();
        let pass_programs = PassPrograms {
            geometry: programs.load(backend, &path, GEOMETRY_PROGRAM).unwrap(),
            shading: programs.load(backend, &path, SHADING_PROGRAM).unwrap(),
            textured: programs.load(backend, &path, TEXTURED_PROGRAM).unwrap(),
        };

        let material = assets.add_material(Material::new("plain"));
        let plane = assets.add_mesh(backend, Mesh::plane(4.0)).unwrap();
        let model = assets.add_model(plane, material);

        let uniforms = LinearBuffer::create(backend, 4096).unwrap();
        let mut fixture = Self {
            _dir: dir,
            targets,
            assets,
            programs,
            pass_programs,
            builtins,
            screen_quad,
            uniforms,
            global_params: UniformRange::default(),
            entities: vec![Entity::new(model)],
        };
        fixture.stream(backend);
        fixture
    }

    fn stream(&mut self, backend: &mut RecordingBackend) {
        self.global_params = stream_frame_uniforms(
            backend,
            &mut self.uniforms,
            Vec3::ZERO,
            Mat4::IDENTITY,
            &[],
            &mut self.entities,
        );
    }

    fn resources(&self) -> FrameResources<'_> {
        FrameResources {
            targets: &self.targets,
            assets: &self.assets,
            programs: &self.programs,
            pass_programs: self.pass_programs,
            builtins: &self.builtins,
            screen_quad: self.screen_quad,
            uniforms: self.uniforms.handle(),
            global_params: self.global_params,
            entities: &self.entities,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

fn run_passes(
    renderer: &mut DeferredRenderer,
    backend: &mut RecordingBackend,
    res: &FrameResources,
) -> BackendResult<()> {
    renderer.geometry_pass(backend, res)?;
    renderer.shading_pass(backend, res)?;
    renderer.present_pass(backend, res)
}

fn run_frame(
    renderer: &mut DeferredRenderer,
    backend: &mut RecordingBackend,
    res: &FrameResources,
) -> BackendResult<()> {
    backend.begin_frame()?;
    let result = run_passes(renderer, backend, res);
    // Panics if a failed pass was left open
    backend.end_frame()?;
    result
}

#[rstest]
#[case::geometry(|p: &mut PassPrograms| p.geometry = ProgramId(99))]
#[case::shading(|p: &mut PassPrograms| p.shading = ProgramId(99))]
#[case::present(|p: &mut PassPrograms| p.textured = ProgramId(99))]
fn test_missing_program_aborts_frame_cleanly(#[case] break_programs: fn(&mut PassPrograms)) {
    let mut backend = recording_backend();
    let fixture = Fixture::new(&mut backend);
    let mut renderer = DeferredRenderer::new();
    renderer.initialize();

    let mut broken = fixture.resources();
    break_programs(&mut broken.pass_programs);
    assert!(run_frame(&mut renderer, &mut backend, &broken).is_err());
    assert_eq!(renderer.phase(), FramePhase::Initialized);

    run_frame(&mut renderer, &mut backend, &fixture.resources()).unwrap();
    assert_eq!(renderer.phase(), FramePhase::Present);
}

#[test]
fn test_missing_screen_quad_aborts_before_shading_pass() {
    let mut backend = recording_backend();
    let fixture = Fixture::new(&mut backend);
    let mut renderer = DeferredRenderer::new();
    renderer.initialize();

    let mut broken = fixture.resources();
    broken.screen_quad = MeshId(99);
    assert!(run_frame(&mut renderer, &mut backend, &broken).is_err());

    let passes = backend
        .commands()
        .iter()
        .filter(|c| matches!(c, RecordedCommand::BeginPass { .. }))
        .count();
    assert_eq!(passes, 1);
    assert_eq!(renderer.phase(), FramePhase::Initialized);
}

#[test]
fn test_vertex_array_failure_closes_geometry_pass() {
    let mut backend = recording_backend();
    let mut fixture = Fixture::new(&mut backend);

    // Never uploaded, so no vertex array can be built for it
    fixture.assets.meshes.push(Mesh::plane(1.0));
    let mesh = MeshId(fixture.assets.meshes.len() - 1);
    let material = fixture.assets.add_material(Material::default());
    let model = fixture.assets.add_model(mesh, material);
    fixture.entities.push(Entity::new(model));
    fixture.stream(&mut backend);

    let mut renderer = DeferredRenderer::new();
    renderer.initialize();
    backend.begin_frame().unwrap();

    let result = renderer.geometry_pass(&mut backend, &fixture.resources());

    assert!(matches!(result, Err(BackendError::VertexArrayCreationFailed(_))));
    assert_eq!(backend.commands().last(), Some(&RecordedCommand::EndPass));
    assert_eq!(renderer.phase(), FramePhase::Initialized);
    backend.end_frame().unwrap();
}
