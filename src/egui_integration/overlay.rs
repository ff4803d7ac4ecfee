//! Debug overlay drawn over the presented frame
//!
//! The UI is built before the frame is recorded and painted into the same
//! encoder right after the present pass.

use egui::ViewportId;
use egui_wgpu::ScreenDescriptor;
use winit::event::WindowEvent;
use winit::window::Window;

use super::debug_ui::debug_window;
use crate::backend::debug_messages::DebugMessage;
use crate::backend::traits::GraphicsBackend;
use crate::backend::wgpu_backend::WgpuBackend;
use crate::engine::Engine;

/// Tessellated debug window for one frame
pub struct OverlayFrame {
    platform_output: egui::PlatformOutput,
    paint_jobs: Vec<egui::ClippedPrimitive>,
    textures_delta: egui::TexturesDelta,
    pixels_per_point: f32,
}

impl OverlayFrame {
    /// Run the debug window for `engine` and tessellate the result.
    /// Works on any backend, nothing touches the GPU here.
    pub fn prepare<B: GraphicsBackend>(
        ctx: &egui::Context,
        raw_input: egui::RawInput,
        engine: &mut Engine<B>,
        messages: &[DebugMessage],
    ) -> Self {
        let output = ctx.run(raw_input, |ctx| debug_window(ctx, engine, messages));
        Self {
            platform_output: output.platform_output,
            paint_jobs: ctx.tessellate(output.shapes, output.pixels_per_point),
            textures_delta: output.textures_delta,
            pixels_per_point: output.pixels_per_point,
        }
    }

    /// Textures egui wants created or updated before painting
    pub fn texture_uploads(&self) -> usize {
        self.textures_delta.set.len()
    }
}

/// Debug window state: winit input, the egui-wgpu renderer and the frame
/// waiting to be painted
pub struct DebugOverlay {
    ctx: egui::Context,
    winit_state: egui_winit::State,
    renderer: egui_wgpu::Renderer,
    visible: bool,
    pending: Option<OverlayFrame>,
}

impl DebugOverlay {
    pub fn new(engine: &Engine<WgpuBackend>, window: &Window) -> Self {
        let ctx = egui::Context::default();
        let winit_state = egui_winit::State::new(
            ctx.clone(),
            ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
        );
        let backend = engine.backend();
        let renderer = egui_wgpu::Renderer::new(backend.device(), backend.wgpu_surface_format(), None, 1);

        Self {
            ctx,
            winit_state,
            renderer,
            visible: true,
            pending: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
        log::debug!("Debug overlay {}", if self.visible { "shown" } else { "hidden" });
    }

    /// Feed a window event to egui. Returns true when egui consumed it.
    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.winit_state.on_window_event(window, event).consumed
    }

    /// Camera keys are ignored while a text field has focus
    pub fn wants_keyboard_input(&self) -> bool {
        self.visible && self.ctx.wants_keyboard_input()
    }

    /// Build this frame's debug window from the engine state and the
    /// backend's recent diagnostics. Does nothing while hidden.
    pub fn build(&mut self, window: &Window, engine: &mut Engine<WgpuBackend>) {
        if !self.visible {
            return;
        }
        let messages = engine.backend().debug_messages().recent();
        let raw_input = self.winit_state.take_egui_input(window);
        let mut frame = OverlayFrame::prepare(&self.ctx, raw_input, engine, &messages);

        // Cursor and clipboard changes
        let platform_output = std::mem::take(&mut frame.platform_output);
        self.winit_state.handle_platform_output(window, platform_output);
        self.pending = Some(frame);
    }

    /// Paint the frame built by [`Self::build`] into the open encoder.
    /// Each built frame is painted once.
    pub fn paint(&mut self, backend: &mut WgpuBackend) {
        let Some(frame) = self.pending.take() else {
            return;
        };
        let (width, height) = backend.surface_size();
        let screen = ScreenDescriptor {
            size_in_pixels: [width, height],
            pixels_per_point: frame.pixels_per_point,
        };

        let (device, queue, encoder) = backend.device_queue_encoder();
        for (id, delta) in &frame.textures_delta.set {
            self.renderer.update_texture(device, queue, *id, delta);
        }
        if let Some(encoder) = encoder {
            self.renderer
                .update_buffers(device, queue, encoder, &frame.paint_jobs, &screen);
        }

        backend.render_egui(&self.renderer, &frame.paint_jobs, &screen);

        for id in &frame.textures_delta.free {
            self.renderer.free_texture(id);
        }
    }
}
