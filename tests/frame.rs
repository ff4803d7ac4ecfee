//! Frame orchestration tests against the recording backend

mod common;

use common::{recording_backend, test_assets, FakeImporter, HEIGHT, WIDTH};
use deferred_engine::backend::*;
use deferred_engine::pipeline::*;
use deferred_engine::resources::compile_program;
use deferred_engine::scene::CameraInput;
use deferred_engine::Engine;
use glam::Vec3;
use rstest::rstest;

fn engine() -> (tempfile::TempDir, Engine<RecordingBackend>) {
    let (dir, config) = test_assets();
    let engine = Engine::with_importer(recording_backend(), config, &FakeImporter { scene: None }).unwrap();
    (dir, engine)
}

fn pass_starts(commands: &[RecordedCommand]) -> Vec<(PassTarget, Vec<u32>, bool)> {
    commands
        .iter()
        .filter_map(|command| match command {
            RecordedCommand::BeginPass {
                target,
                draw_buffers,
                clear_color,
                ..
            } => Some((*target, draw_buffers.clone(), clear_color.is_some())),
            _ => None,
        })
        .collect()
}

#[test]
fn test_engine_starts_initialized() {
    let (_dir, engine) = engine();

    assert_eq!(engine.renderer().phase(), FramePhase::Initialized);
    assert!(engine.render_targets().unwrap().status().is_complete());
    assert_eq!(engine.scene().entities.len(), 2);
    assert_eq!(engine.scene().lights.len(), 2);
    assert_eq!(engine.programs().len(), 3);
}

#[test]
fn test_uniform_layout_with_three_lights() {
    let (_dir, mut engine) = engine();
    engine
        .scene_mut()
        .add_point_light(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, 0.0, 1.0), 10.0);

    engine.update(0.016, &CameraInput::default());

    assert_eq!(engine.global_params(), UniformRange { offset: 0, size: 160 });
    let offsets: Vec<_> = engine
        .scene()
        .entities
        .iter()
        .map(|e| (e.local_params_offset, e.local_params_size))
        .collect();
    assert_eq!(offsets, vec![(256, 128), (512, 128)]);

    let uniforms = engine.uniforms().unwrap();
    let contents = engine.backend().buffer_contents(uniforms.handle()).unwrap();
    assert_eq!(u32::from_le_bytes(contents[12..16].try_into().unwrap()), 3);
}

#[test]
fn test_update_rewrites_the_same_layout_each_frame() {
    let (_dir, mut engine) = engine();

    engine.update(0.016, &CameraInput::default());
    let first: Vec<_> = engine.scene().entities.iter().map(|e| e.local_params_offset).collect();
    engine.update(0.016, &CameraInput::default());
    let second: Vec<_> = engine.scene().entities.iter().map(|e| e.local_params_offset).collect();

    assert_eq!(first, second);
    assert_eq!(engine.global_params().size, 16 + 2 * LIGHT_STRIDE);
}

#[test]
fn test_passes_run_in_order() {
    let (_dir, mut engine) = engine();
    engine.update(0.016, &CameraInput::default());

    engine.render_frame().unwrap();

    let framebuffer = engine.render_targets().unwrap().framebuffer;
    let starts = pass_starts(engine.backend().commands());
    assert_eq!(
        starts,
        vec![
            (PassTarget::Framebuffer(framebuffer), vec![0, 1, 2, 3, 4], true),
            (PassTarget::Framebuffer(framebuffer), vec![0], false),
            (PassTarget::Screen, Vec::new(), true),
        ]
    );
    assert_eq!(engine.renderer().phase(), FramePhase::Present);
    assert_eq!(engine.backend().frames_presented(), 1);
}

#[test]
fn test_geometry_pass_binds_entity_blocks() {
    let (_dir, mut engine) = engine();
    engine.update(0.016, &CameraInput::default());
    let buffer = engine.uniforms().unwrap().handle();

    engine.render_frame().unwrap();

    let entity_binds: Vec<_> = engine
        .backend()
        .commands()
        .iter()
        .filter_map(|command| match command {
            RecordedCommand::BindUniformRange { slot: 1, buffer: b, offset, size } if *b == buffer => {
                Some((*offset, *size))
            }
            _ => None,
        })
        .collect();
    assert_eq!(entity_binds, vec![(256, ENTITY_BLOCK_SIZE), (512, ENTITY_BLOCK_SIZE)]);
}

#[test]
fn test_screen_quad_draw() {
    let (_dir, mut engine) = engine();
    engine.update(0.016, &CameraInput::default());

    engine.render_frame().unwrap();

    let commands = engine.backend().commands();
    let present = commands
        .iter()
        .rposition(|c| matches!(c, RecordedCommand::BeginPass { target: PassTarget::Screen, .. }))
        .unwrap();
    let draws: Vec<_> = commands[present..]
        .iter()
        .filter(|c| matches!(c, RecordedCommand::DrawIndexed { .. }))
        .collect();
    assert_eq!(
        draws,
        vec![&RecordedCommand::DrawIndexed {
            topology: PrimitiveTopology::TriangleList,
            count: 6,
            format: IndexFormat::Uint16,
            byte_offset: 0,
        }]
    );
    assert!(commands[present..].contains(&RecordedCommand::SetViewport {
        x: 0.0,
        y: 0.0,
        width: WIDTH as f32,
        height: HEIGHT as f32,
    }));
}

#[test]
fn test_shading_pass_disables_depth_writes_around_quad() {
    let (_dir, mut engine) = engine();
    engine.update(0.016, &CameraInput::default());

    engine.render_frame().unwrap();

    let writes: Vec<_> = engine
        .backend()
        .commands()
        .iter()
        .filter_map(|c| match c {
            RecordedCommand::SetDepthWrite(enabled) => Some(*enabled),
            _ => None,
        })
        .collect();
    assert_eq!(writes, vec![false, true]);
}

#[rstest]
#[case(DisplayMode::FinalColor, RenderTarget::Color)]
#[case(DisplayMode::Normals, RenderTarget::Normal)]
#[case(DisplayMode::Depth, RenderTarget::Depth)]
fn test_present_shows_selected_target(#[case] mode: DisplayMode, #[case] target: RenderTarget) {
    let (_dir, mut engine) = engine();
    engine.set_display_mode(mode);
    engine.update(0.016, &CameraInput::default());

    engine.render_frame().unwrap();

    let expected = engine.render_targets().unwrap().get(target);
    let last_bind = engine
        .backend()
        .commands()
        .iter()
        .rev()
        .find_map(|c| match c {
            RecordedCommand::BindTexture { unit: 0, texture, .. } => Some(*texture),
            _ => None,
        });
    assert_eq!(last_bind, Some(expected.texture));
}

#[test]
fn test_vertex_arrays_are_built_once() {
    let (_dir, mut engine) = engine();

    for _ in 0..3 {
        engine.update(0.016, &CameraInput::default());
        engine.render_frame().unwrap();
    }

    // floor, sphere, and the quad for the shading and present programs
    assert_eq!(engine.backend().counters().vertex_arrays, 4);
    assert_eq!(engine.renderer().vao_cache().len(), 4);
}

#[test]
fn test_resize_keeps_render_target_size() {
    let (_dir, mut engine) = engine();

    engine.resize(640, 480);

    assert_eq!(engine.backend().surface_size(), (640, 480));
    let targets = engine.render_targets().unwrap();
    assert_eq!((targets.width, targets.height), (WIDTH, HEIGHT));
    assert!((engine.scene().camera.aspect - 640.0 / 480.0).abs() < 1e-6);
}

#[test]
fn test_shutdown_releases_everything() {
    let (_dir, mut engine) = engine();
    engine.update(0.016, &CameraInput::default());
    engine.render_frame().unwrap();

    let backend = engine.shutdown();

    assert_eq!(backend.live_resource_count(), 0);
}

#[test]
fn test_demo_shader_compiles() {
    let source = include_str!("../assets/shaders/deferred.glsl");

    let geometry = compile_program("GEOMETRY_PASS", source).unwrap();
    let shading = compile_program("SHADING_PASS", source).unwrap();
    let textured = compile_program("TEXTURED_GEOMETRY", source).unwrap();

    let locations = |layout: &deferred_engine::resources::ShaderInputLayout| {
        layout.locations().collect::<Vec<_>>()
    };
    assert_eq!(locations(&geometry.input_layout), vec![0, 1, 2]);
    assert_eq!(locations(&shading.input_layout), vec![0, 1]);
    assert_eq!(locations(&textured.input_layout), vec![0, 1]);
}
