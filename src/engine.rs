//! Main engine orchestrator
//!
//! [`Engine`] owns the backend and every resource of the demo. It is built
//! in a fixed order (render targets, static geometry, shader programs, scene
//! content) and [`Engine::shutdown`] tears it down in reverse.

use crate::backend::traits::*;
use crate::pipeline::*;
use crate::resources::*;
use crate::scene::*;
use crate::EngineConfig;
use glam::Vec3;
use std::path::Path;
use thiserror::Error;

/// Name of the program writing the render targets
pub const GEOMETRY_PROGRAM: &str = "GEOMETRY_PASS";
/// Name of the program combining the render targets with the lights
pub const SHADING_PROGRAM: &str = "SHADING_PASS";
/// Name of the program drawing one texture on a quad
pub const TEXTURED_PROGRAM: &str = "TEXTURED_GEOMETRY";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Shader(#[from] ShaderError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// A program whose last reload failed and is still running its previous version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadFailure {
    pub program: String,
    pub error: String,
}

/// The deferred renderer with its backend, content and scene
pub struct Engine<B: GraphicsBackend> {
    backend: B,
    config: EngineConfig,

    render_targets: Option<RenderTargets>,
    uniforms: Option<LinearBuffer>,
    assets: AssetStore,
    builtins: BuiltinTextures,
    screen_quad: MeshId,
    programs: ProgramLibrary,
    pass_programs: PassPrograms,

    scene: Scene,
    controller: FreeFlyController,
    renderer: DeferredRenderer,
    global_params: UniformRange,

    fps: f32,
}

impl<B: GraphicsBackend> Engine<B> {
    /// Create the engine, importing a configured model with glTF
    pub fn new(backend: B, config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_importer(backend, config, &GltfImporter)
    }

    /// Create the engine with a custom scene importer
    pub fn with_importer(
        mut backend: B,
        config: EngineConfig,
        importer: &dyn SceneImporter,
    ) -> Result<Self, EngineError> {
        let info = backend.adapter_info();
        let limits = backend.limits();
        log::info!("Adapter: {} ({}, {})", info.name, info.backend, info.driver);
        log::info!(
            "Uniform block alignment {}, max uniform block size {}, max color attachments {}",
            limits.uniform_block_alignment,
            limits.max_uniform_block_size,
            limits.max_color_attachments
        );

        // Render targets
        let (width, height) = backend.surface_size();
        let render_targets = RenderTargets::create(&mut backend, width, height)?;

        // Static geometry and defaults
        let uniforms = LinearBuffer::create(&mut backend, limits.max_uniform_block_size as u64)?;
        let mut assets = AssetStore::new();
        let builtins = assets.textures.create_builtins(&mut backend)?;
        let screen_quad = assets.add_mesh(&mut backend, Mesh::screen_quad())?;

        // Programs
        let shader_file = config.shader_file();
        let mut programs = ProgramLibrary::new();
        let pass_programs = PassPrograms {
            geometry: programs.load(&mut backend, &shader_file, GEOMETRY_PROGRAM)?,
            shading: programs.load(&mut backend, &shader_file, SHADING_PROGRAM)?,
            textured: programs.load(&mut backend, &shader_file, TEXTURED_PROGRAM)?,
        };

        let mut engine = Self {
            backend,
            config,
            render_targets: Some(render_targets),
            uniforms: Some(uniforms),
            assets,
            builtins,
            screen_quad,
            programs,
            pass_programs,
            scene: Scene::new(),
            controller: FreeFlyController::new(),
            renderer: DeferredRenderer::new(),
            global_params: UniformRange::default(),
            fps: 0.0,
        };

        // Scene content
        engine.populate_scene(importer)?;
        engine.scene.camera.set_aspect(width as f32, height as f32);
        engine.renderer.initialize();

        log::info!(
            "Engine initialized: {} entities, {} lights",
            engine.scene.entities.len(),
            engine.scene.lights.len()
        );
        Ok(engine)
    }

    fn populate_scene(&mut self, importer: &dyn SceneImporter) -> Result<(), EngineError> {
        let backend = &mut self.backend;
        let assets = &mut self.assets;

        let floor_material = assets.add_material(
            Material::new("floor").with_albedo_texture(self.builtins.dice),
        );
        let floor_mesh = assets.add_mesh(backend, Mesh::plane(40.0))?;
        let floor = assets.add_model(floor_mesh, floor_material);
        self.scene.add_entity(Entity::new(floor));

        let orange = assets
            .textures
            .add(backend, &TextureData::solid_color([230, 140, 60, 255], "orange"))?;
        let sphere_material = assets.add_material(
            Material::new("sphere")
                .with_albedo(Vec3::new(0.9, 0.55, 0.25))
                .with_albedo_texture(orange),
        );
        let sphere_mesh = assets.add_mesh(backend, Mesh::sphere(1.0, 24, 32))?;
        let sphere = assets.add_model(sphere_mesh, sphere_material);
        self.scene.add_entity(
            Entity::new(sphere)
                .with_translation(Vec3::new(-4.0, 2.0, 0.0))
                .with_scale(Vec3::splat(2.0)),
        );

        if let Some(model_file) = self.config.model_file() {
            match assets.load_model(backend, importer, &model_file) {
                Ok(model) => {
                    self.scene
                        .add_entity(Entity::new(model).with_translation(Vec3::new(4.0, 0.0, 0.0)));
                }
                Err(e) => log::error!("Skipping model {}: {}", model_file.display(), e),
            }
        }

        self.scene.add_point_light(Vec3::new(5.0, 2.0, 5.0), Vec3::ONE, 30.0);
        self.scene
            .add_point_light(Vec3::new(-20.0, 2.0, 5.0), Vec3::new(1.0, 0.0, 0.0), 30.0);
        Ok(())
    }

    /// Advance one frame: camera, shader hot reload, uniform streaming
    pub fn update(&mut self, dt: f32, input: &CameraInput) {
        if dt > 0.0 {
            self.fps = 1.0 / dt;
        }

        self.controller.update(&mut self.scene.camera, input, dt);
        self.scene.camera.update_vectors();

        for replaced in self.programs.hot_reload(&mut self.backend) {
            let dropped = self.renderer.invalidate_program(&mut self.backend, replaced.old);
            log::debug!("Dropped {} vertex arrays of replaced program {}", dropped, replaced.id.0);
        }

        let Some(uniforms) = self.uniforms.as_mut() else {
            return;
        };
        let camera = &self.scene.camera;
        self.global_params = stream_frame_uniforms(
            &mut self.backend,
            uniforms,
            camera.position,
            camera.view_projection_matrix(),
            &self.scene.lights,
            &mut self.scene.entities,
        );
    }

    /// Record the geometry, shading and present passes into the current frame
    pub fn render(&mut self) -> BackendResult<()> {
        let (Some(targets), Some(uniforms)) = (self.render_targets.as_ref(), self.uniforms.as_ref()) else {
            return Err(BackendError::InvalidHandle("engine has been shut down".into()));
        };

        let resources = FrameResources {
            targets,
            assets: &self.assets,
            programs: &self.programs,
            pass_programs: self.pass_programs,
            builtins: &self.builtins,
            screen_quad: self.screen_quad,
            uniforms: uniforms.handle(),
            global_params: self.global_params,
            entities: &self.scene.entities,
            clear_color: self.config.clear_color,
        };

        self.renderer.geometry_pass(&mut self.backend, &resources)?;
        self.renderer.shading_pass(&mut self.backend, &resources)?;
        self.renderer.present_pass(&mut self.backend, &resources)
    }

    /// Begin a frame, render it and present it
    pub fn render_frame(&mut self) -> BackendResult<()> {
        self.backend.begin_frame()?;
        self.render()?;
        self.backend.end_frame()
    }

    /// Resize the surface. Render targets keep their initial size.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.backend.resize(width, height);
        let (w, h) = self.backend.surface_size();
        self.scene.camera.set_aspect(w as f32, h as f32);
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    pub fn programs(&self) -> &ProgramLibrary {
        &self.programs
    }

    pub fn pass_programs(&self) -> PassPrograms {
        self.pass_programs
    }

    pub fn renderer(&self) -> &DeferredRenderer {
        &self.renderer
    }

    pub fn render_targets(&self) -> Option<&RenderTargets> {
        self.render_targets.as_ref()
    }

    pub fn uniforms(&self) -> Option<&LinearBuffer> {
        self.uniforms.as_ref()
    }

    /// Range of the global block written by the last update
    pub fn global_params(&self) -> UniformRange {
        self.global_params
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.renderer.display_mode
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        self.renderer.display_mode = mode;
    }

    /// Frames per second of the last update
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Programs still running a previous version after a failed reload
    pub fn reload_failures(&self) -> Vec<ReloadFailure> {
        self.programs
            .iter()
            .filter(|p| p.reload_failed)
            .map(|p| ReloadFailure {
                program: p.name.clone(),
                error: p.last_error.clone().unwrap_or_default(),
            })
            .collect()
    }

    /// Shader file the programs are loaded from
    pub fn shader_file(&self) -> &Path {
        self.programs
            .iter()
            .next()
            .map_or(Path::new(""), |p| p.path.as_path())
    }

    /// Release everything in reverse creation order and hand back the backend
    pub fn shutdown(mut self) -> B {
        self.renderer.release(&mut self.backend);
        self.scene = Scene::new();
        self.programs.release(&mut self.backend);
        self.assets.release(&mut self.backend);
        if let Some(uniforms) = self.uniforms.take() {
            uniforms.destroy(&mut self.backend);
        }
        if let Some(targets) = self.render_targets.take() {
            targets.release(&mut self.backend);
        }
        log::info!("Engine shut down");
        self.backend
    }
}
