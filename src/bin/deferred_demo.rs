//! Deferred renderer demo
//!
//! Run with:
//!   cargo run --bin deferred-demo
//!   cargo run --bin deferred-demo -- --model models/scene.gltf
//!
//! Controls:
//!   WASD     - Move camera
//!   QE       - Move down/up
//!   V/C      - Turn yaw
//!   R/F      - Turn pitch
//!   F1       - Toggle debug UI
//!   Escape   - Exit
//!
//! Edit `assets/shaders/deferred.glsl` while running to hot reload the programs.

use clap::Parser;
use deferred_engine::{
    backend::{BackendError, GraphicsBackend},
    DebugOverlay, Engine, EngineConfig, WgpuBackend, Window,
};
use std::path::PathBuf;
use std::time::Instant;
use winit::{
    event::{ElementState, Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    keyboard::{KeyCode, PhysicalKey},
};

#[derive(Parser, Debug)]
#[command(name = "deferred-demo", about = "Deferred rendering demo")]
struct Args {
    /// Window width
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Window height
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Disable vsync
    #[arg(long)]
    no_vsync: bool,

    /// Directory holding shaders, textures and models
    #[arg(long, default_value = "assets")]
    assets: PathBuf,

    /// Model to place in the scene, relative to the assets directory
    #[arg(long)]
    model: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> EngineConfig {
        EngineConfig {
            width: self.width,
            height: self.height,
            vsync: !self.no_vsync,
            assets_dir: self.assets,
            model_path: self.model,
            ..Default::default()
        }
    }
}

struct AppState {
    overlay: DebugOverlay,
    last_frame: Instant,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {}", e);
            return;
        }
    };

    let mut window = match Window::new(&event_loop, &config.title, config.width, config.height) {
        Ok(window) => window,
        Err(e) => {
            log::error!("Failed to create window: {}", e);
            return;
        }
    };

    let backend = match WgpuBackend::new(window.window_arc(), config.vsync) {
        Ok(backend) => backend,
        Err(e) => {
            log::error!("Failed to create backend: {}", e);
            return;
        }
    };

    let engine = match Engine::new(backend, config) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("Failed to create engine: {}", e);
            return;
        }
    };

    let mut state = AppState {
        overlay: DebugOverlay::new(&engine, window.window()),
        last_frame: Instant::now(),
    };
    let mut engine = Some(engine);

    let result = event_loop.run(move |event, elwt: &EventLoopWindowTarget<()>| {
        elwt.set_control_flow(ControlFlow::Poll);
        let Some(running) = engine.as_mut() else {
            return;
        };

        match event {
            Event::WindowEvent { event, .. } => {
                state.overlay.on_window_event(window.window(), &event);
                window.handle_event(&event);

                match &event {
                    WindowEvent::CloseRequested => elwt.exit(),
                    WindowEvent::Resized(size) => running.resize(size.width, size.height),
                    WindowEvent::KeyboardInput { event, .. }
                        if event.state == ElementState::Pressed && !event.repeat =>
                    {
                        match event.physical_key {
                            PhysicalKey::Code(KeyCode::Escape) => elwt.exit(),
                            PhysicalKey::Code(KeyCode::F1) => state.overlay.toggle(),
                            _ => {}
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        if let Err(e) = render_frame(running, &mut state, &window) {
                            log::error!("Render error: {}", e);
                            elwt.exit();
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                let now = Instant::now();
                let dt = (now - state.last_frame).as_secs_f32();
                state.last_frame = now;

                let input = if state.overlay.wants_keyboard_input() {
                    Default::default()
                } else {
                    window.camera_input()
                };
                running.update(dt, &input);
                window.request_redraw();
            }
            Event::LoopExiting => {
                if let Some(engine) = engine.take() {
                    engine.shutdown();
                }
            }
            _ => {}
        }
    });

    if let Err(e) = result {
        log::error!("Event loop failed: {}", e);
    }
}

fn render_frame(
    engine: &mut Engine<WgpuBackend>,
    state: &mut AppState,
    window: &Window,
) -> Result<(), BackendError> {
    state.overlay.build(window.window(), engine);

    if let Err(e) = engine.backend_mut().begin_frame() {
        log::warn!("Skipping frame: {}", e);
        let (width, height) = window.dimensions();
        engine.resize(width, height);
        return Ok(());
    }

    engine.render()?;

    state.overlay.paint(engine.backend_mut());

    engine.backend_mut().end_frame()
}
