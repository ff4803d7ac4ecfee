//! Debug window: performance, adapter, camera and display mode

use crate::backend::debug_messages::{DebugMessage, Severity};
use crate::backend::traits::GraphicsBackend;
use crate::engine::Engine;
use crate::pipeline::DisplayMode;

/// Draw the debug window for `engine`. `messages` are recent backend diagnostics.
pub fn debug_window<B: GraphicsBackend>(ctx: &egui::Context, engine: &mut Engine<B>, messages: &[DebugMessage]) {
    let fps = engine.fps();
    let info = engine.backend().adapter_info();
    let failures = engine.reload_failures();
    let mut display_mode = engine.display_mode();

    egui::Window::new("Info")
        .default_pos([10.0, 10.0])
        .default_size([260.0, 320.0])
        .show(ctx, |ui| {
            ui.heading("Performance");
            ui.label(format!("FPS: {:.1}", fps));
            ui.label(format!(
                "Frame time: {:.2} ms",
                if fps > 0.0 { 1000.0 / fps } else { 0.0 }
            ));
            ui.separator();

            ui.heading("Adapter");
            ui.label(format!("Name: {}", info.name));
            ui.label(format!("Vendor: {}", info.vendor));
            ui.label(format!("Driver: {}", info.driver));
            ui.label(format!("Backend: {}", info.backend));
            ui.label(format!("Shading language: {}", info.shading_language));
            ui.separator();

            ui.heading("Camera");
            let camera = &mut engine.scene_mut().camera;
            ui.horizontal(|ui| {
                ui.label("Position");
                ui.add(egui::DragValue::new(&mut camera.position.x).speed(0.1).prefix("x: "));
                ui.add(egui::DragValue::new(&mut camera.position.y).speed(0.1).prefix("y: "));
                ui.add(egui::DragValue::new(&mut camera.position.z).speed(0.1).prefix("z: "));
            });
            ui.horizontal(|ui| {
                ui.label("Pitch/Yaw/Roll");
                ui.add(egui::DragValue::new(&mut camera.pitch).speed(0.1));
                ui.add(egui::DragValue::new(&mut camera.yaw).speed(0.1));
                ui.add(egui::DragValue::new(&mut camera.roll).speed(0.1));
            });
            ui.separator();

            egui::ComboBox::from_label("Render target")
                .selected_text(display_mode.label())
                .show_ui(ui, |ui| {
                    for mode in DisplayMode::ALL {
                        ui.selectable_value(&mut display_mode, mode, mode.label());
                    }
                });

            if !failures.is_empty() {
                ui.separator();
                ui.heading("Shader reload failures");
                for failure in &failures {
                    ui.colored_label(egui::Color32::LIGHT_RED, &failure.program);
                    ui.label(egui::RichText::new(&failure.error).monospace().small());
                }
            }

            if !messages.is_empty() {
                ui.separator();
                ui.collapsing(format!("Backend messages ({})", messages.len()), |ui| {
                    for message in messages {
                        let color = match message.severity {
                            Severity::High => egui::Color32::LIGHT_RED,
                            Severity::Medium | Severity::Low => egui::Color32::YELLOW,
                            Severity::Notification => egui::Color32::GRAY,
                        };
                        ui.colored_label(
                            color,
                            format!("[{}] {}: {}", message.severity, message.source, message.text),
                        );
                    }
                });
            }
        });

    engine.set_display_mode(display_mode);
}
