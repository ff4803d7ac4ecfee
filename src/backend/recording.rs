//! Recording backend for tests and headless runs.
//!
//! This backend doesn't touch a GPU. Resources are kept as plain data
//! (buffer contents, descriptors) and every command is appended to a list,
//! so callers can inspect exactly what the engine asked the backend to do.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::HashMap;

/// A command issued between `begin_pass` and `end_pass`
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    BeginPass {
        label: Option<String>,
        target: PassTarget,
        draw_buffers: Vec<u32>,
        clear_color: Option<[f32; 4]>,
        clear_depth: Option<f32>,
    },
    EndPass,
    SetViewport { x: f32, y: f32, width: f32, height: f32 },
    SetDepthWrite(bool),
    UseProgram(ProgramHandle),
    BindUniformRange { slot: u32, buffer: BufferHandle, offset: u64, size: u64 },
    BindTexture { unit: u32, texture: TextureHandle, sampler: SamplerHandle },
    BindVertexArray(VertexArrayHandle),
    DrawIndexed { topology: PrimitiveTopology, count: u32, format: IndexFormat, byte_offset: u64 },
    Draw { topology: PrimitiveTopology, first: u32, count: u32 },
}

/// Number of creation calls per resource kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreationCounters {
    pub buffers: u32,
    pub textures: u32,
    pub samplers: u32,
    pub framebuffers: u32,
    pub programs: u32,
    pub vertex_arrays: u32,
}

/// Recording GPU backend.
#[derive(Debug)]
pub struct RecordingBackend {
    limits: DeviceLimits,
    surface: (u32, u32),
    next_id: u64,
    buffers: HashMap<u64, Vec<u8>>,
    textures: HashMap<u64, TextureDescriptor>,
    framebuffers: HashMap<u64, FramebufferDescriptor>,
    programs: HashMap<u64, ProgramDescriptor>,
    vertex_arrays: HashMap<u64, VertexArrayDescriptor>,
    commands: Vec<RecordedCommand>,
    counters: CreationCounters,
    in_pass: bool,
    in_frame: bool,
    frames_presented: u32,
}

impl RecordingBackend {
    /// Create a recording backend with default limits
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_limits(width, height, DeviceLimits::default())
    }

    pub fn with_limits(width: u32, height: u32, limits: DeviceLimits) -> Self {
        Self {
            limits,
            surface: (width, height),
            next_id: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            vertex_arrays: HashMap::new(),
            commands: Vec::new(),
            counters: CreationCounters::default(),
            in_pass: false,
            in_frame: false,
            frames_presented: 0,
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, command: RecordedCommand) {
        assert!(self.in_pass, "{command:?} recorded outside of a pass");
        self.commands.push(command);
    }

    /// Commands recorded so far
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Take the recorded commands, leaving the list empty
    pub fn take_commands(&mut self) -> Vec<RecordedCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn counters(&self) -> CreationCounters {
        self.counters
    }

    /// Current contents of a buffer
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(Vec::as_slice)
    }

    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0)
    }

    pub fn vertex_array(&self, vertex_array: VertexArrayHandle) -> Option<&VertexArrayDescriptor> {
        self.vertex_arrays.get(&vertex_array.0)
    }

    pub fn program(&self, program: ProgramHandle) -> Option<&ProgramDescriptor> {
        self.programs.get(&program.0)
    }

    /// Number of resources still alive, across all kinds
    pub fn live_resource_count(&self) -> usize {
        self.buffers.len()
            + self.textures.len()
            + self.framebuffers.len()
            + self.programs.len()
            + self.vertex_arrays.len()
    }

    pub fn frames_presented(&self) -> u32 {
        self.frames_presented
    }

    fn attachment_info(&self, texture: TextureHandle) -> Option<AttachmentInfo> {
        self.textures.get(&texture.0).map(|desc| AttachmentInfo {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            renderable: desc.usage.contains(TextureUsage::RENDER_ATTACHMENT),
        })
    }
}

impl GraphicsBackend for RecordingBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.surface = (width, height);
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn adapter_info(&self) -> AdapterInfo {
        AdapterInfo {
            name: "Recording Backend".to_string(),
            vendor: "none".to_string(),
            driver: "none".to_string(),
            backend: "recording".to_string(),
            shading_language: "GLSL 450".to_string(),
        }
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        self.in_frame = true;
        Ok(FrameContext {
            width: self.surface.0,
            height: self.surface.1,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        assert!(!self.in_pass, "frame ended inside a pass");
        self.in_frame = false;
        self.frames_presented += 1;
        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        TextureFormat::Bgra8UnormSrgb
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        log::trace!(
            "RecordingBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        let id = self.allocate_id();
        self.buffers.insert(id, vec![0; desc.size as usize]);
        self.counters.buffers += 1;
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        log::trace!(
            "RecordingBackend: creating buffer {:?} with {} bytes",
            desc.label,
            data.len()
        );
        let id = self.allocate_id();
        self.buffers.insert(id, data.to_vec());
        self.counters.buffers += 1;
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let Some(contents) = self.buffers.get_mut(&buffer.0) else {
            log::error!("RecordingBackend: write to unknown buffer {:?}", buffer);
            return;
        };
        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            log::error!(
                "RecordingBackend: write of {} bytes at {} overflows buffer of {} bytes",
                data.len(),
                offset,
                contents.len()
            );
            return;
        }
        contents[start..end].copy_from_slice(data);
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        log::trace!(
            "RecordingBackend: creating texture {:?} ({}x{} {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        let id = self.allocate_id();
        self.textures.insert(id, desc.clone());
        self.counters.textures += 1;
        Ok(TextureHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32) {
        if !self.textures.contains_key(&texture.0) {
            log::error!("RecordingBackend: write to unknown texture {:?}", texture);
            return;
        }
        debug_assert_eq!(data.len(), (width * height * 4) as usize);
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        log::trace!("RecordingBackend: creating sampler {:?}", desc.label);
        let id = self.allocate_id();
        self.counters.samplers += 1;
        Ok(SamplerHandle(id))
    }

    fn create_framebuffer(
        &mut self,
        desc: &FramebufferDescriptor,
    ) -> BackendResult<FramebufferHandle> {
        log::trace!(
            "RecordingBackend: creating framebuffer {:?} ({} color attachments)",
            desc.label,
            desc.color_attachments.len()
        );
        let id = self.allocate_id();
        self.framebuffers.insert(id, desc.clone());
        self.counters.framebuffers += 1;
        Ok(FramebufferHandle(id))
    }

    fn check_framebuffer_status(&self, framebuffer: FramebufferHandle) -> FramebufferStatus {
        let Some(desc) = self.framebuffers.get(&framebuffer.0) else {
            return FramebufferStatus::Undefined;
        };

        let colors: Option<Vec<AttachmentInfo>> = desc
            .color_attachments
            .iter()
            .map(|t| self.attachment_info(*t))
            .collect();
        let Some(colors) = colors else {
            return FramebufferStatus::Undefined;
        };
        let depth = match desc.depth_attachment {
            Some(t) => match self.attachment_info(t) {
                Some(info) => Some(info),
                None => return FramebufferStatus::Undefined,
            },
            None => None,
        };

        FramebufferStatus::evaluate(&colors, depth.as_ref(), self.limits.max_color_attachments)
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        log::trace!("RecordingBackend: creating program {}", desc.name);
        let id = self.allocate_id();
        self.programs.insert(id, desc.clone());
        self.counters.programs += 1;
        Ok(ProgramHandle(id))
    }

    fn create_vertex_array(
        &mut self,
        desc: &VertexArrayDescriptor,
    ) -> BackendResult<VertexArrayHandle> {
        if !self.buffers.contains_key(&desc.vertex_buffer.0)
            || !self.buffers.contains_key(&desc.index_buffer.0)
        {
            return Err(BackendError::VertexArrayCreationFailed(format!(
                "{:?} references a missing buffer",
                desc.label
            )));
        }
        log::trace!(
            "RecordingBackend: creating vertex array {:?} ({} attributes)",
            desc.label,
            desc.attributes.len()
        );
        let id = self.allocate_id();
        self.vertex_arrays.insert(id, desc.clone());
        self.counters.vertex_arrays += 1;
        Ok(VertexArrayHandle(id))
    }

    fn begin_pass(&mut self, desc: &PassDescriptor) {
        assert!(!self.in_pass, "begin_pass called inside a pass");
        assert!(self.in_frame, "begin_pass called outside a frame");
        self.in_pass = true;
        self.record(RecordedCommand::BeginPass {
            label: desc.label.clone(),
            target: desc.target,
            draw_buffers: desc.draw_buffers.clone(),
            clear_color: desc.clear_color,
            clear_depth: desc.clear_depth,
        });
    }

    fn end_pass(&mut self) {
        self.record(RecordedCommand::EndPass);
        self.in_pass = false;
    }

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.record(RecordedCommand::SetViewport { x, y, width, height });
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.record(RecordedCommand::SetDepthWrite(enabled));
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.record(RecordedCommand::UseProgram(program));
    }

    fn bind_uniform_range(&mut self, slot: u32, buffer: BufferHandle, offset: u64, size: u64) {
        self.record(RecordedCommand::BindUniformRange {
            slot,
            buffer,
            offset,
            size,
        });
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle, sampler: SamplerHandle) {
        self.record(RecordedCommand::BindTexture {
            unit,
            texture,
            sampler,
        });
    }

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        self.record(RecordedCommand::BindVertexArray(vertex_array));
    }

    fn draw_indexed(
        &mut self,
        topology: PrimitiveTopology,
        count: u32,
        format: IndexFormat,
        byte_offset: u64,
    ) {
        self.record(RecordedCommand::DrawIndexed {
            topology,
            count,
            format,
            byte_offset,
        });
    }

    fn draw(&mut self, topology: PrimitiveTopology, first: u32, count: u32) {
        self.record(RecordedCommand::Draw {
            topology,
            first,
            count,
        });
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer.0);
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
    }

    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        self.vertex_arrays.remove(&vertex_array.0);
    }
}
