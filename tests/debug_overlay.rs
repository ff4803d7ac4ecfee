//! Debug overlay UI built against the recording backend

mod common;

use common::{recording_backend, test_assets, FakeImporter};
use deferred_engine::backend::{DebugMessage, MessageSource, MessageType, Severity};
use deferred_engine::egui_integration::OverlayFrame;
use deferred_engine::pipeline::DisplayMode;
use deferred_engine::scene::CameraInput;
use deferred_engine::Engine;

#[test]
fn test_overlay_frame_builds_without_gpu() {
    let (_dir, config) = test_assets();
    let mut engine =
        Engine::with_importer(recording_backend(), config, &FakeImporter { scene: None }).unwrap();
    engine.set_display_mode(DisplayMode::Depth);
    engine.update(0.016, &CameraInput::default());

    let ctx = egui::Context::default();
    let messages = vec![DebugMessage::new(
        MessageSource::Api,
        MessageType::Performance,
        Severity::Medium,
        "buffer reallocated",
    )];
    let frame = OverlayFrame::prepare(&ctx, egui::RawInput::default(), &mut engine, &messages);

    // The font atlas goes up with the first frame
    assert!(frame.texture_uploads() >= 1);
    assert_eq!(engine.display_mode(), DisplayMode::Depth);

    // Building the UI leaves the frame itself untouched
    engine.render_frame().unwrap();
    assert_eq!(engine.backend().frames_presented(), 1);
}
