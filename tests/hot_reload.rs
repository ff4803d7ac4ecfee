//! Shader hot reload tests

mod common;

use common::{recording_backend, test_assets, touch_future, write_shader, FakeImporter, TEST_SHADER};
use deferred_engine::resources::ProgramLibrary;
use deferred_engine::scene::CameraInput;
use deferred_engine::{Engine, GEOMETRY_PROGRAM};

const BROKEN_SHADER: &str = "void main( {\n";

#[test]
fn test_unchanged_file_is_not_reloaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_shader(dir.path(), TEST_SHADER);
    let mut backend = recording_backend();
    let mut programs = ProgramLibrary::new();
    programs.load(&mut backend, &path, GEOMETRY_PROGRAM).unwrap();

    assert!(programs.hot_reload(&mut backend).is_empty());
    assert_eq!(backend.counters().programs, 1);
}

#[test]
fn test_failed_reload_keeps_previous_program() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_shader(dir.path(), TEST_SHADER);
    let mut backend = recording_backend();
    let mut programs = ProgramLibrary::new();
    let id = programs.load(&mut backend, &path, GEOMETRY_PROGRAM).unwrap();
    let original = programs.get(id).unwrap().handle;

    write_shader(dir.path(), BROKEN_SHADER);
    touch_future(&path, 10);
    let replaced = programs.hot_reload(&mut backend);

    assert!(replaced.is_empty());
    let program = programs.get(id).unwrap();
    assert_eq!(program.handle, original);
    assert!(program.reload_failed);
    assert!(program.last_error.is_some());
    assert!(backend.program(original).is_some());

    // The broken file is not retried until it changes again
    assert!(programs.hot_reload(&mut backend).is_empty());
    assert_eq!(backend.counters().programs, 1);
}

#[test]
fn test_fixed_file_replaces_program() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_shader(dir.path(), TEST_SHADER);
    let mut backend = recording_backend();
    let mut programs = ProgramLibrary::new();
    let id = programs.load(&mut backend, &path, GEOMETRY_PROGRAM).unwrap();
    let original = programs.get(id).unwrap().handle;

    write_shader(dir.path(), BROKEN_SHADER);
    touch_future(&path, 10);
    programs.hot_reload(&mut backend);

    write_shader(dir.path(), TEST_SHADER);
    touch_future(&path, 20);
    let replaced = programs.hot_reload(&mut backend);

    assert_eq!(replaced.len(), 1);
    assert_eq!(replaced[0].id, id);
    assert_eq!(replaced[0].old, original);
    let program = programs.get(id).unwrap();
    assert_eq!(program.handle, replaced[0].new);
    assert!(!program.reload_failed);
    assert!(program.last_error.is_none());
    assert!(backend.program(original).is_none());
}

#[test]
fn test_engine_rebuilds_vertex_arrays_after_reload() {
    let (dir, config) = test_assets();
    let mut engine =
        Engine::with_importer(recording_backend(), config, &FakeImporter { scene: None }).unwrap();
    engine.update(0.016, &CameraInput::default());
    engine.render_frame().unwrap();
    assert_eq!(engine.renderer().vao_cache().len(), 4);

    let path = write_shader(dir.path(), TEST_SHADER);
    touch_future(&path, 10);
    engine.update(0.016, &CameraInput::default());

    assert!(engine.renderer().vao_cache().is_empty());
    assert_eq!(engine.backend().counters().programs, 6);

    engine.render_frame().unwrap();
    assert_eq!(engine.renderer().vao_cache().len(), 4);
    assert_eq!(engine.backend().counters().vertex_arrays, 8);
}

#[test]
fn test_engine_keeps_rendering_after_failed_reload() {
    let (dir, config) = test_assets();
    let mut engine =
        Engine::with_importer(recording_backend(), config, &FakeImporter { scene: None }).unwrap();
    engine.update(0.016, &CameraInput::default());
    engine.render_frame().unwrap();

    let path = write_shader(dir.path(), BROKEN_SHADER);
    touch_future(&path, 10);
    engine.update(0.016, &CameraInput::default());

    let failures = engine.reload_failures();
    assert_eq!(failures.len(), 3);
    assert_eq!(failures[0].program, GEOMETRY_PROGRAM);
    assert_eq!(engine.renderer().vao_cache().len(), 4);

    engine.render_frame().unwrap();
    assert_eq!(engine.backend().frames_presented(), 2);
}
