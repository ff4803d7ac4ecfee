//! Frame orchestration
//!
//! Per frame the engine streams the uniform blocks into the linear buffer,
//! then runs three passes in a fixed order:
//!
//! 1. geometry: every entity into the five render targets
//! 2. shading: full-screen quad combining the targets into the color target
//! 3. present: the target picked by [`DisplayMode`] onto the screen
//!
//! [`FramePhase`] enforces the order.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::render_targets::{RenderTarget, RenderTargets};
use crate::pipeline::vao_cache::VaoCache;
use crate::resources::*;
use crate::scene::{Entity, Light};
use glam::{Mat4, Vec3};

/// Size of one light in the global block (std140 struct stride)
pub const LIGHT_STRIDE: u64 = 48;

/// Size of an entity block: world matrix and world-view-projection matrix
pub const ENTITY_BLOCK_SIZE: u64 = 2 * std::mem::size_of::<Mat4>() as u64;

/// Which texture the present pass puts on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DisplayMode {
    #[default]
    FinalColor,
    Albedo,
    Normals,
    Positions,
    Depth,
}

impl DisplayMode {
    pub const ALL: [DisplayMode; 5] = [
        DisplayMode::FinalColor,
        DisplayMode::Albedo,
        DisplayMode::Normals,
        DisplayMode::Positions,
        DisplayMode::Depth,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DisplayMode::FinalColor => "Final Color",
            DisplayMode::Albedo => "Albedo",
            DisplayMode::Normals => "Normals",
            DisplayMode::Positions => "Position",
            DisplayMode::Depth => "Depth",
        }
    }

    pub fn target(&self) -> RenderTarget {
        match self {
            DisplayMode::FinalColor => RenderTarget::Color,
            DisplayMode::Albedo => RenderTarget::Albedo,
            DisplayMode::Normals => RenderTarget::Normal,
            DisplayMode::Positions => RenderTarget::Position,
            DisplayMode::Depth => RenderTarget::Depth,
        }
    }
}

/// Position in the frame state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePhase {
    #[default]
    Uninitialized,
    Initialized,
    GeometryPass,
    ShadingPass,
    Present,
}

impl FramePhase {
    pub fn can_advance_to(self, next: FramePhase) -> bool {
        use FramePhase::*;
        matches!(
            (self, next),
            (Uninitialized, Initialized)
                | (Initialized, GeometryPass)
                | (Present, GeometryPass)
                | (GeometryPass, ShadingPass)
                | (ShadingPass, Present)
        )
    }

    /// Move to `next`.
    ///
    /// # Panics
    /// On any transition other than init followed by geometry, shading, present.
    pub fn advance(&mut self, next: FramePhase) {
        assert!(
            self.can_advance_to(next),
            "invalid frame phase transition {:?} -> {:?}",
            self,
            next
        );
        *self = next;
    }
}

/// Byte range of a uniform block in the linear buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UniformRange {
    pub offset: u64,
    pub size: u64,
}

/// Push the global block: camera position, light count, then the light array.
///
/// The buffer must be mapped.
pub fn push_global_params(buffer: &mut LinearBuffer, camera_position: Vec3, lights: &[Light]) -> UniformRange {
    let offset = buffer.push_vec3(camera_position);
    buffer.push_u32(lights.len() as u32);

    for light in lights {
        buffer.align_head(VEC4_ALIGNMENT);
        buffer.push_vec3(light.color);
        buffer.push_u32(light.kind.as_u32());
        buffer.push_vec3(light.direction);
        buffer.push_u32(light.range as u32);
        buffer.push_vec3(light.position);
    }
    buffer.align_head(VEC4_ALIGNMENT);

    UniformRange {
        offset,
        size: buffer.head() - offset,
    }
}

/// Push one block per entity and store its range on the entity.
///
/// The buffer must be mapped.
pub fn push_entity_params(
    buffer: &mut LinearBuffer,
    entities: &mut [Entity],
    view_projection: Mat4,
    block_alignment: u64,
) {
    for entity in entities {
        buffer.align_head(block_alignment);
        let offset = buffer.push_mat4(&entity.world_matrix);
        buffer.push_mat4(&(view_projection * entity.world_matrix));
        entity.local_params_offset = offset;
        entity.local_params_size = buffer.head() - offset;
    }
}

/// Map, stream every block of the frame, unmap. Returns the global block's range.
pub fn stream_frame_uniforms<B: GraphicsBackend>(
    backend: &mut B,
    buffer: &mut LinearBuffer,
    camera_position: Vec3,
    view_projection: Mat4,
    lights: &[Light],
    entities: &mut [Entity],
) -> UniformRange {
    let alignment = u64::from(backend.limits().uniform_block_alignment);
    buffer.map();
    let global = push_global_params(buffer, camera_position, lights);
    push_entity_params(buffer, entities, view_projection, alignment);
    buffer.unmap(backend);
    global
}

/// Programs used by the three passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassPrograms {
    pub geometry: ProgramId,
    pub shading: ProgramId,
    pub textured: ProgramId,
}

/// Everything the passes read
pub struct FrameResources<'a> {
    pub targets: &'a RenderTargets,
    pub assets: &'a AssetStore,
    pub programs: &'a ProgramLibrary,
    pub pass_programs: PassPrograms,
    pub builtins: &'a BuiltinTextures,
    pub screen_quad: MeshId,
    pub uniforms: BufferHandle,
    pub global_params: UniformRange,
    pub entities: &'a [Entity],
    pub clear_color: [f32; 4],
}

impl FrameResources<'_> {
    fn program(&self, id: ProgramId) -> BackendResult<&Program> {
        self.programs
            .get(id)
            .ok_or_else(|| BackendError::InvalidHandle(format!("program {}", id.0)))
    }

    fn quad(&self) -> BackendResult<&Mesh> {
        self.assets
            .mesh(self.screen_quad)
            .ok_or_else(|| BackendError::InvalidHandle("screen quad".into()))
    }

    fn texture_or(&self, texture: Option<TextureId>, fallback: TextureId) -> Option<&GpuTexture> {
        texture
            .and_then(|id| self.assets.textures.get(id))
            .or_else(|| self.assets.textures.get(fallback))
    }
}

/// Drives the passes of a frame and owns the attribute binding cache
#[derive(Debug, Default)]
pub struct DeferredRenderer {
    phase: FramePhase,
    pub display_mode: DisplayMode,
    vao_cache: VaoCache,
}

impl DeferredRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn initialize(&mut self) {
        self.phase.advance(FramePhase::Initialized);
    }

    pub fn vao_cache(&self) -> &VaoCache {
        &self.vao_cache
    }

    pub fn vao_cache_mut(&mut self) -> &mut VaoCache {
        &mut self.vao_cache
    }

    fn bind_texture<B: GraphicsBackend>(backend: &mut B, unit: u32, texture: Option<&GpuTexture>) {
        if let Some(texture) = texture {
            backend.bind_texture(unit, texture.handle, texture.sampler);
        }
    }

    /// Abandon the current frame. The next frame starts over at the geometry pass.
    fn abort_frame(&mut self, error: BackendError) -> BackendError {
        log::error!("Frame aborted in {:?}: {}", self.phase, error);
        if self.phase != FramePhase::Uninitialized {
            self.phase = FramePhase::Initialized;
        }
        error
    }

    /// Close the pass opened by the caller whatever `result` is
    fn finish_pass<B: GraphicsBackend>(&mut self, backend: &mut B, result: BackendResult<()>) -> BackendResult<()> {
        backend.end_pass();
        result.map_err(|e| self.abort_frame(e))
    }

    /// Draw every entity into the render targets
    pub fn geometry_pass<B: GraphicsBackend>(&mut self, backend: &mut B, res: &FrameResources) -> BackendResult<()> {
        let program = res
            .program(res.pass_programs.geometry)
            .map_err(|e| self.abort_frame(e))?;
        self.phase.advance(FramePhase::GeometryPass);

        backend.begin_pass(&PassDescriptor {
            label: Some("Geometry Pass".into()),
            target: PassTarget::Framebuffer(res.targets.framebuffer),
            draw_buffers: RenderTargets::geometry_draw_buffers(),
            clear_color: Some(res.clear_color),
            clear_depth: Some(1.0),
        });
        backend.set_viewport(0.0, 0.0, res.targets.width as f32, res.targets.height as f32);
        backend.use_program(program.handle);
        backend.bind_uniform_range(0, res.uniforms, res.global_params.offset, res.global_params.size);

        let result = self.draw_entities(backend, res, program);
        self.finish_pass(backend, result)
    }

    fn draw_entities<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        res: &FrameResources,
        program: &Program,
    ) -> BackendResult<()> {
        for entity in res.entities {
            let Some(model) = res.assets.model(entity.model) else {
                log::warn!("Entity references missing model {}", entity.model.0);
                continue;
            };
            let Some(mesh) = res.assets.mesh(model.mesh) else {
                continue;
            };

            backend.bind_uniform_range(1, res.uniforms, entity.local_params_offset, ENTITY_BLOCK_SIZE);

            for (index, submesh) in mesh.submeshes.iter().enumerate() {
                let vao = self.vao_cache.resolve(backend, model.mesh, mesh, index, program)?;
                backend.bind_vertex_array(vao);

                let material = model.materials.get(index).and_then(|id| res.assets.material(*id));
                let (albedo, normals, bump) = match material {
                    Some(m) => (m.albedo_texture, m.normals_texture, m.bump_texture),
                    None => (None, None, None),
                };
                Self::bind_texture(backend, 0, res.texture_or(albedo, res.builtins.white));
                Self::bind_texture(backend, 1, res.texture_or(normals, res.builtins.normal));
                Self::bind_texture(backend, 2, res.texture_or(bump, res.builtins.black));

                backend.draw_indexed(
                    PrimitiveTopology::TriangleList,
                    submesh.index_count(),
                    mesh.index_format,
                    submesh.index_offset,
                );
            }
        }
        Ok(())
    }

    fn draw_quad<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        res: &FrameResources,
        quad: &Mesh,
        program: &Program,
    ) -> BackendResult<()> {
        let vao = self.vao_cache.resolve(backend, res.screen_quad, quad, 0, program)?;
        backend.bind_vertex_array(vao);
        let count = quad.submeshes.first().map_or(0, |s| s.index_count());
        backend.draw_indexed(PrimitiveTopology::TriangleList, count, quad.index_format, 0);
        Ok(())
    }

    /// Combine the geometry targets into the color target
    pub fn shading_pass<B: GraphicsBackend>(&mut self, backend: &mut B, res: &FrameResources) -> BackendResult<()> {
        let (program, quad) = res
            .program(res.pass_programs.shading)
            .and_then(|program| Ok((program, res.quad()?)))
            .map_err(|e| self.abort_frame(e))?;
        self.phase.advance(FramePhase::ShadingPass);

        backend.begin_pass(&PassDescriptor {
            label: Some("Shading Pass".into()),
            target: PassTarget::Framebuffer(res.targets.framebuffer),
            draw_buffers: vec![RenderTarget::Color.slot()],
            clear_color: None,
            clear_depth: None,
        });
        backend.set_viewport(0.0, 0.0, res.targets.width as f32, res.targets.height as f32);
        backend.use_program(program.handle);
        backend.bind_uniform_range(0, res.uniforms, res.global_params.offset, res.global_params.size);

        let inputs = [
            RenderTarget::Albedo,
            RenderTarget::Normal,
            RenderTarget::Position,
            RenderTarget::Depth,
        ];
        for (unit, target) in inputs.into_iter().enumerate() {
            let texture = res.targets.get(target);
            backend.bind_texture(unit as u32, texture.texture, texture.sampler);
        }

        backend.set_depth_write(false);
        let result = self.draw_quad(backend, res, quad, program);
        backend.set_depth_write(true);

        self.finish_pass(backend, result)
    }

    /// Put the selected target on screen
    pub fn present_pass<B: GraphicsBackend>(&mut self, backend: &mut B, res: &FrameResources) -> BackendResult<()> {
        let (program, quad) = res
            .program(res.pass_programs.textured)
            .and_then(|program| Ok((program, res.quad()?)))
            .map_err(|e| self.abort_frame(e))?;
        self.phase.advance(FramePhase::Present);
        let (width, height) = backend.surface_size();

        backend.begin_pass(&PassDescriptor {
            label: Some("Present Pass".into()),
            target: PassTarget::Screen,
            draw_buffers: Vec::new(),
            clear_color: Some([0.0, 0.0, 0.0, 1.0]),
            clear_depth: Some(1.0),
        });
        backend.set_viewport(0.0, 0.0, width as f32, height as f32);
        backend.use_program(program.handle);

        let displayed = res.targets.get(self.display_mode.target());
        backend.bind_texture(0, displayed.texture, displayed.sampler);
        let result = self.draw_quad(backend, res, quad, program);

        self.finish_pass(backend, result)
    }

    /// Drop the bindings built for a program that was replaced
    pub fn invalidate_program<B: GraphicsBackend>(&mut self, backend: &mut B, program: ProgramHandle) -> usize {
        self.vao_cache.invalidate_program(backend, program)
    }

    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        self.vao_cache.release(backend);
        self.phase = FramePhase::Uninitialized;
    }
}
