//! wgpu backend implementation
//!
//! Pass commands are buffered between `begin_pass` and `end_pass`. At
//! `end_pass` every draw is resolved against the state bound before it:
//! program + vertex array + target formats + depth write select a cached
//! render pipeline, uniform ranges and texture units select cached bind
//! groups. Only then is the wgpu render pass opened and replayed.
//!
//! Fixed binding model shared with the GLSL sources:
//! - `set = 0, binding = 0`: uniform slot 0
//! - `set = 1, binding = 0`: uniform slot 1
//! - `set = 2, binding = 2u / 2u + 1`: texture / sampler of unit `u`

use crate::backend::debug_messages::*;
use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// Texture units available to programs
pub const MAX_TEXTURE_UNITS: usize = 4;

/// Uniform block slots available to programs
pub const MAX_UNIFORM_SLOTS: usize = 2;

/// Size of the zeroed buffer bound to unused uniform slots
const DEFAULT_UNIFORM_SIZE: u64 = 1024;

/// Buffered pass command
#[derive(Clone)]
enum RenderCommand {
    SetViewport { x: f32, y: f32, width: f32, height: f32 },
    SetDepthWrite(bool),
    UseProgram(ProgramHandle),
    BindUniformRange { slot: u32, buffer: BufferHandle, offset: u64 },
    BindTexture { unit: u32, texture: TextureHandle, sampler: SamplerHandle },
    BindVertexArray(VertexArrayHandle),
    DrawIndexed { topology: PrimitiveTopology, count: u32, format: IndexFormat, byte_offset: u64 },
    Draw { topology: PrimitiveTopology, first: u32, count: u32 },
}

/// Pending pass with buffered commands
struct PendingPass {
    descriptor: PassDescriptor,
    commands: Vec<RenderCommand>,
}

struct GpuTexture {
    #[allow(dead_code)]
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: TextureFormat,
    usage: TextureUsage,
}

struct GpuProgram {
    name: String,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: u64,
    vertex_array: u64,
    topology: PrimitiveTopology,
    color_formats: Vec<TextureFormat>,
    depth_format: Option<TextureFormat>,
    depth_write: bool,
}

/// (buffer, offset) of a bound uniform range
type UniformBindingKey = (u64, u64);

/// (texture, sampler) per unit
type TextureBindingKey = [Option<(u64, u64)>; MAX_TEXTURE_UNITS];

#[derive(Clone, Copy)]
enum ColorTarget {
    Texture(u64),
    Surface,
}

struct PassTargets {
    colors: Vec<ColorTarget>,
    depth: Option<u64>,
    color_formats: Vec<TextureFormat>,
    depth_format: Option<TextureFormat>,
}

enum DrawCall {
    Indexed { count: u32, format: IndexFormat, byte_offset: u64 },
    Direct { first: u32, count: u32 },
}

struct ResolvedDraw {
    pipeline: PipelineKey,
    uniforms: [Option<UniformBindingKey>; MAX_UNIFORM_SLOTS],
    textures: TextureBindingKey,
    vertex_array: u64,
    call: DrawCall,
}

enum ResolvedCommand {
    Viewport { x: f32, y: f32, width: f32, height: f32 },
    Draw(ResolvedDraw),
}

/// Bound state while resolving buffered commands
struct DrawState {
    program: Option<ProgramHandle>,
    vertex_array: Option<VertexArrayHandle>,
    depth_write: bool,
    uniforms: [Option<UniformBindingKey>; MAX_UNIFORM_SLOTS],
    textures: TextureBindingKey,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            program: None,
            vertex_array: None,
            depth_write: true,
            uniforms: [None; MAX_UNIFORM_SLOTS],
            textures: [None; MAX_TEXTURE_UNITS],
        }
    }
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    current_texture: Option<wgpu::SurfaceTexture>,
    current_view: Option<wgpu::TextureView>,
    debug_messages: DebugMessageLog,

    // Fixed binding model
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    default_uniform_group: wgpu::BindGroup,
    default_texture: (u64, u64),

    // Resource storage
    buffers: HashMap<u64, wgpu::Buffer>,
    textures: HashMap<u64, GpuTexture>,
    samplers: HashMap<u64, wgpu::Sampler>,
    framebuffers: HashMap<u64, FramebufferDescriptor>,
    programs: HashMap<u64, GpuProgram>,
    vertex_arrays: HashMap<u64, VertexArrayDescriptor>,

    // Derived object caches
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    uniform_groups: HashMap<UniformBindingKey, wgpu::BindGroup>,
    texture_groups: HashMap<TextureBindingKey, wgpu::BindGroup>,

    next_id: u64,

    // Command encoding
    encoder: Option<wgpu::CommandEncoder>,
    pending_pass: Option<PendingPass>,
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Depth24Plus => wgpu::TextureFormat::Depth24Plus,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }

    fn convert_texture_format_back(format: wgpu::TextureFormat) -> TextureFormat {
        match format {
            wgpu::TextureFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
            wgpu::TextureFormat::Rgba8UnormSrgb => TextureFormat::Rgba8UnormSrgb,
            wgpu::TextureFormat::Bgra8Unorm => TextureFormat::Bgra8Unorm,
            wgpu::TextureFormat::Bgra8UnormSrgb => TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba16Float => TextureFormat::Rgba16Float,
            wgpu::TextureFormat::Depth24Plus => TextureFormat::Depth24Plus,
            wgpu::TextureFormat::Depth32Float => TextureFormat::Depth32Float,
            _ => TextureFormat::Bgra8UnormSrgb,
        }
    }

    fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
        let mut result = wgpu::BufferUsages::empty();
        if usage.contains(BufferUsage::COPY_DST) {
            result |= wgpu::BufferUsages::COPY_DST;
        }
        if usage.contains(BufferUsage::INDEX) {
            result |= wgpu::BufferUsages::INDEX;
        }
        if usage.contains(BufferUsage::VERTEX) {
            result |= wgpu::BufferUsages::VERTEX;
        }
        if usage.contains(BufferUsage::UNIFORM) {
            result |= wgpu::BufferUsages::UNIFORM;
        }
        result
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_SRC) {
            result |= wgpu::TextureUsages::COPY_SRC;
        }
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        result
    }

    fn convert_float_format(component_count: u8) -> Option<wgpu::VertexFormat> {
        match component_count {
            1 => Some(wgpu::VertexFormat::Float32),
            2 => Some(wgpu::VertexFormat::Float32x2),
            3 => Some(wgpu::VertexFormat::Float32x3),
            4 => Some(wgpu::VertexFormat::Float32x4),
            _ => None,
        }
    }

    fn convert_topology(topology: PrimitiveTopology) -> wgpu::PrimitiveTopology {
        match topology {
            PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
            PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        }
    }

    fn convert_index_format(format: IndexFormat) -> wgpu::IndexFormat {
        match format {
            IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
            IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
        }
    }

    fn convert_filter_mode(mode: FilterMode) -> wgpu::FilterMode {
        match mode {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }

    fn convert_address_mode(mode: AddressMode) -> wgpu::AddressMode {
        match mode {
            AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
        }
    }

    fn classify_error(error: &wgpu::Error) -> DebugMessage {
        match error {
            wgpu::Error::OutOfMemory { .. } => DebugMessage::new(
                MessageSource::Api,
                MessageType::Error,
                Severity::High,
                error.to_string(),
            ),
            wgpu::Error::Validation { description, .. } => DebugMessage::new(
                MessageSource::Api,
                MessageType::UndefinedBehavior,
                Severity::High,
                description.clone(),
            ),
            #[allow(unreachable_patterns)]
            _ => DebugMessage::new(
                MessageSource::Other,
                MessageType::Other,
                Severity::Medium,
                error.to_string(),
            ),
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl WgpuBackend {
    /// Create the backend for a window. Blocks on adapter and device requests.
    pub fn new(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, vsync))
    }

    pub async fn new_async(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        // Five simultaneous color targets exceed the default per-sample byte budget
        let adapter_limits = adapter.limits();
        let required_limits = wgpu::Limits {
            max_color_attachment_bytes_per_sample: adapter_limits
                .max_color_attachment_bytes_per_sample,
            ..wgpu::Limits::default()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Deferred Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits,
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        let debug_messages = DebugMessageLog::new();
        let sink = debug_messages.clone();
        device.on_uncaptured_error(Box::new(move |error| {
            sink.push(Self::classify_error(&error));
        }));

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| {
                BackendError::SurfaceCreationFailed("Surface reports no formats".into())
            })?;

        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Uniform Block Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_entries: Vec<wgpu::BindGroupLayoutEntry> = (0..MAX_TEXTURE_UNITS as u32)
            .flat_map(|unit| {
                [
                    wgpu::BindGroupLayoutEntry {
                        binding: unit * 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: unit * 2 + 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ]
            })
            .collect();
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Texture Unit Layout"),
            entries: &texture_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Program Layout"),
            bind_group_layouts: &[&uniform_layout, &uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let default_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Default Uniform Block"),
            size: DEFAULT_UNIFORM_SIZE,
            usage: wgpu::BufferUsages::UNIFORM,
            mapped_at_creation: false,
        });
        let default_uniform_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Default Uniform Group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: default_uniform_buffer.as_entire_binding(),
            }],
        });

        let mut backend = Self {
            instance,
            surface,
            adapter,
            device,
            queue,
            surface_config,
            current_texture: None,
            current_view: None,
            debug_messages,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            default_uniform_group,
            default_texture: (0, 0),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            samplers: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            vertex_arrays: HashMap::new(),
            pipelines: HashMap::new(),
            uniform_groups: HashMap::new(),
            texture_groups: HashMap::new(),
            next_id: 1,
            encoder: None,
            pending_pass: None,
        };

        let white = backend.create_texture(&TextureDescriptor {
            label: Some("Default Unit Texture".into()),
            ..Default::default()
        })?;
        backend.write_texture(white, &[255, 255, 255, 255], 1, 1);
        let sampler = backend.create_sampler(&SamplerDescriptor::default())?;
        backend.default_texture = (white.0, sampler.0);

        Ok(backend)
    }

    /// Messages reported by the device since startup
    pub fn debug_messages(&self) -> &DebugMessageLog {
        &self.debug_messages
    }

    fn resolve_targets(&self, desc: &PassDescriptor) -> BackendResult<PassTargets> {
        match desc.target {
            PassTarget::Screen => Ok(PassTargets {
                colors: vec![ColorTarget::Surface],
                depth: None,
                color_formats: vec![Self::convert_texture_format_back(self.surface_config.format)],
                depth_format: None,
            }),
            PassTarget::Framebuffer(handle) => {
                let fb = self
                    .framebuffers
                    .get(&handle.0)
                    .ok_or_else(|| BackendError::InvalidHandle(format!("{:?}", handle)))?;

                let mut colors = Vec::with_capacity(desc.draw_buffers.len());
                let mut color_formats = Vec::with_capacity(desc.draw_buffers.len());
                for slot in &desc.draw_buffers {
                    let texture = fb.color_attachments.get(*slot as usize).ok_or_else(|| {
                        BackendError::InvalidHandle(format!("draw buffer {} of {:?}", slot, handle))
                    })?;
                    let gpu = self
                        .textures
                        .get(&texture.0)
                        .ok_or_else(|| BackendError::InvalidHandle(format!("{:?}", texture)))?;
                    colors.push(ColorTarget::Texture(texture.0));
                    color_formats.push(gpu.format);
                }

                let (depth, depth_format) = match fb.depth_attachment {
                    Some(texture) => {
                        let gpu = self
                            .textures
                            .get(&texture.0)
                            .ok_or_else(|| BackendError::InvalidHandle(format!("{:?}", texture)))?;
                        (Some(texture.0), Some(gpu.format))
                    }
                    None => (None, None),
                };

                Ok(PassTargets {
                    colors,
                    depth,
                    color_formats,
                    depth_format,
                })
            }
        }
    }

    fn create_pipeline(&self, key: &PipelineKey) -> BackendResult<wgpu::RenderPipeline> {
        let program = self
            .programs
            .get(&key.program)
            .ok_or_else(|| BackendError::InvalidHandle(format!("program {}", key.program)))?;
        let vertex_array = self.vertex_arrays.get(&key.vertex_array).ok_or_else(|| {
            BackendError::InvalidHandle(format!("vertex array {}", key.vertex_array))
        })?;

        // wgpu wants attribute offsets relative to the bound buffer slice
        let attributes = vertex_array
            .attributes
            .iter()
            .map(|a| {
                let format = Self::convert_float_format(a.component_count).ok_or_else(|| {
                    BackendError::PipelineCreationFailed(format!(
                        "location {} has {} components",
                        a.location, a.component_count
                    ))
                })?;
                Ok(wgpu::VertexAttribute {
                    format,
                    offset: a.offset - vertex_array.base_offset,
                    shader_location: a.location,
                })
            })
            .collect::<BackendResult<Vec<_>>>()?;

        let vertex_buffers = [wgpu::VertexBufferLayout {
            array_stride: vertex_array.stride as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = key
            .color_formats
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: Self::convert_texture_format(*format),
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let depth_stencil = key.depth_format.map(|format| wgpu::DepthStencilState {
            format: Self::convert_texture_format(format),
            depth_write_enabled: key.depth_write,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&program.name),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.vertex,
                    entry_point: "main",
                    buffers: &vertex_buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.fragment,
                    entry_point: "main",
                    targets: &color_targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: Self::convert_topology(key.topology),
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::PipelineCreationFailed(format!(
                "{}: {}",
                program.name, error
            )));
        }

        Ok(pipeline)
    }

    fn ensure_uniform_group(&mut self, key: UniformBindingKey) -> BackendResult<()> {
        if self.uniform_groups.contains_key(&key) {
            return Ok(());
        }
        let (buffer_id, offset) = key;
        let buffer = self
            .buffers
            .get(&buffer_id)
            .ok_or_else(|| BackendError::InvalidHandle(format!("buffer {}", buffer_id)))?;

        // The window covers everything the shader may declare, not only the pushed bytes
        let max_window = self.device.limits().max_uniform_buffer_binding_size as u64;
        let window = buffer.size().saturating_sub(offset).min(max_window);
        let size = NonZeroU64::new(window).ok_or_else(|| {
            BackendError::InvalidHandle(format!("empty uniform range at {} in buffer {}", offset, buffer_id))
        })?;

        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Uniform Range"),
            layout: &self.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset,
                    size: Some(size),
                }),
            }],
        });
        self.uniform_groups.insert(key, group);
        Ok(())
    }

    fn ensure_texture_group(&mut self, key: &TextureBindingKey) -> BackendResult<()> {
        if self.texture_groups.contains_key(key) {
            return Ok(());
        }

        let mut entries = Vec::with_capacity(MAX_TEXTURE_UNITS * 2);
        for (unit, bound) in key.iter().enumerate() {
            let (texture_id, sampler_id) = bound.unwrap_or(self.default_texture);
            let texture = self
                .textures
                .get(&texture_id)
                .ok_or_else(|| BackendError::InvalidHandle(format!("texture {}", texture_id)))?;
            let sampler = self
                .samplers
                .get(&sampler_id)
                .ok_or_else(|| BackendError::InvalidHandle(format!("sampler {}", sampler_id)))?;
            entries.push(wgpu::BindGroupEntry {
                binding: unit as u32 * 2,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: unit as u32 * 2 + 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }

        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Texture Units"),
            layout: &self.texture_layout,
            entries: &entries,
        });
        self.texture_groups.insert(*key, group);
        Ok(())
    }

    /// Resolve bound state into cached pipelines and bind groups
    fn resolve_commands(
        &mut self,
        commands: &[RenderCommand],
        targets: &PassTargets,
    ) -> Vec<ResolvedCommand> {
        let mut state = DrawState::default();
        let mut resolved = Vec::with_capacity(commands.len());

        for command in commands {
            let (topology, call) = match command {
                RenderCommand::SetViewport { x, y, width, height } => {
                    resolved.push(ResolvedCommand::Viewport {
                        x: *x,
                        y: *y,
                        width: *width,
                        height: *height,
                    });
                    continue;
                }
                RenderCommand::SetDepthWrite(enabled) => {
                    state.depth_write = *enabled;
                    continue;
                }
                RenderCommand::UseProgram(program) => {
                    state.program = Some(*program);
                    continue;
                }
                RenderCommand::BindUniformRange { slot, buffer, offset } => {
                    match state.uniforms.get_mut(*slot as usize) {
                        Some(entry) => *entry = Some((buffer.0, *offset)),
                        None => log::warn!("Uniform slot {} is out of range", slot),
                    }
                    continue;
                }
                RenderCommand::BindTexture { unit, texture, sampler } => {
                    match state.textures.get_mut(*unit as usize) {
                        Some(entry) => *entry = Some((texture.0, sampler.0)),
                        None => log::warn!("Texture unit {} is out of range", unit),
                    }
                    continue;
                }
                RenderCommand::BindVertexArray(vertex_array) => {
                    state.vertex_array = Some(*vertex_array);
                    continue;
                }
                RenderCommand::DrawIndexed { topology, count, format, byte_offset } => (
                    *topology,
                    DrawCall::Indexed {
                        count: *count,
                        format: *format,
                        byte_offset: *byte_offset,
                    },
                ),
                RenderCommand::Draw { topology, first, count } => (
                    *topology,
                    DrawCall::Direct {
                        first: *first,
                        count: *count,
                    },
                ),
            };

            let (Some(program), Some(vertex_array)) = (state.program, state.vertex_array) else {
                log::warn!("Draw skipped: no program or vertex array bound");
                continue;
            };

            let key = PipelineKey {
                program: program.0,
                vertex_array: vertex_array.0,
                topology,
                color_formats: targets.color_formats.clone(),
                depth_format: targets.depth_format,
                depth_write: state.depth_write,
            };
            if !self.pipelines.contains_key(&key) {
                match self.create_pipeline(&key) {
                    Ok(pipeline) => {
                        self.pipelines.insert(key.clone(), pipeline);
                    }
                    Err(e) => {
                        log::error!("Draw skipped: {}", e);
                        continue;
                    }
                }
            }

            let mut bindings_ok = true;
            for uniform in state.uniforms.iter().flatten() {
                if let Err(e) = self.ensure_uniform_group(*uniform) {
                    log::error!("Draw skipped: {}", e);
                    bindings_ok = false;
                }
            }
            if let Err(e) = self.ensure_texture_group(&state.textures) {
                log::error!("Draw skipped: {}", e);
                bindings_ok = false;
            }
            if !bindings_ok {
                continue;
            }

            resolved.push(ResolvedCommand::Draw(ResolvedDraw {
                pipeline: key,
                uniforms: state.uniforms,
                textures: state.textures,
                vertex_array: vertex_array.0,
                call,
            }));
        }

        resolved
    }

    fn push_command(&mut self, command: RenderCommand) {
        if let Some(ref mut pending) = self.pending_pass {
            pending.commands.push(command);
        } else {
            log::warn!("Pass command issued outside of a pass");
        }
    }
}

impl GraphicsBackend for WgpuBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            let max_size = self.device.limits().max_texture_dimension_2d;
            self.surface_config.width = width.min(max_size);
            self.surface_config.height = height.min(max_size);
            self.surface.configure(&self.device, &self.surface_config);
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn limits(&self) -> DeviceLimits {
        let limits = self.device.limits();
        DeviceLimits {
            uniform_block_alignment: limits.min_uniform_buffer_offset_alignment,
            max_uniform_block_size: limits.max_uniform_buffer_binding_size,
            max_color_attachments: limits.max_color_attachments,
        }
    }

    fn adapter_info(&self) -> AdapterInfo {
        let info = self.adapter.get_info();
        AdapterInfo {
            name: info.name,
            vendor: format!("0x{:04X}", info.vendor),
            driver: format!("{} {}", info.driver, info.driver_info).trim().to_string(),
            backend: format!("{:?}", info.backend),
            shading_language: "GLSL 450 (naga)".to_string(),
        }
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost) | Err(wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.surface_config);
                return Err(BackendError::SurfaceLost);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(BackendError::OutOfMemory),
            Err(e) => return Err(BackendError::AcquireImageFailed(e.to_string())),
        };

        self.current_view = Some(
            output
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default()),
        );
        self.current_texture = Some(output);
        self.encoder = Some(
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                }),
        );

        Ok(FrameContext {
            width: self.surface_config.width,
            height: self.surface_config.height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }

        self.current_view = None;
        if let Some(texture) = self.current_texture.take() {
            texture.present();
        }

        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        Self::convert_texture_format_back(self.surface_config.format)
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size: desc.size,
            usage: Self::convert_buffer_usage(desc.usage),
            mapped_at_creation: false,
        });

        let id = self.allocate_id();
        self.buffers.insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: desc.label.as_deref(),
            contents: data,
            usage: Self::convert_buffer_usage(desc.usage),
        });

        let id = self.allocate_id();
        self.buffers.insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        // Copy size must be a multiple of four
        let padded;
        let data = if data.len() % 4 == 0 {
            data
        } else {
            let mut bytes = data.to_vec();
            bytes.resize((data.len() + 3) & !3, 0);
            padded = bytes;
            &padded
        };
        if let Some(buf) = self.buffers.get(&buffer.0) {
            self.queue.write_buffer(buf, offset, data);
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(desc.format),
            usage: Self::convert_texture_usage(desc.usage),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = self.allocate_id();
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                view,
                width: desc.width,
                height: desc.height,
                format: desc.format,
                usage: desc.usage,
            },
        );
        Ok(TextureHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32) {
        if let Some(gpu) = self.textures.get(&texture.0) {
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &gpu.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(width * 4),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        let address_mode = Self::convert_address_mode(desc.address_mode);
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: Self::convert_filter_mode(desc.mag_filter),
            min_filter: Self::convert_filter_mode(desc.min_filter),
            mipmap_filter: wgpu::FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: f32::MAX,
            compare: None,
            anisotropy_clamp: 1,
            border_color: None,
        });

        let id = self.allocate_id();
        self.samplers.insert(id, sampler);
        Ok(SamplerHandle(id))
    }

    fn create_framebuffer(
        &mut self,
        desc: &FramebufferDescriptor,
    ) -> BackendResult<FramebufferHandle> {
        let id = self.allocate_id();
        self.framebuffers.insert(id, desc.clone());
        Ok(FramebufferHandle(id))
    }

    fn check_framebuffer_status(&self, framebuffer: FramebufferHandle) -> FramebufferStatus {
        let Some(desc) = self.framebuffers.get(&framebuffer.0) else {
            return FramebufferStatus::Undefined;
        };

        let info = |texture: &TextureHandle| {
            self.textures.get(&texture.0).map(|t| AttachmentInfo {
                width: t.width,
                height: t.height,
                format: t.format,
                renderable: t.usage.contains(TextureUsage::RENDER_ATTACHMENT),
            })
        };

        let Some(colors) = desc
            .color_attachments
            .iter()
            .map(info)
            .collect::<Option<Vec<_>>>()
        else {
            return FramebufferStatus::Undefined;
        };
        let depth = match desc.depth_attachment.as_ref().map(info) {
            Some(None) => return FramebufferStatus::Undefined,
            Some(Some(d)) => Some(d),
            None => None,
        };

        FramebufferStatus::evaluate(
            &colors,
            depth.as_ref(),
            self.device.limits().max_color_attachments,
        )
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let vertex = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{} (vertex)", desc.name)),
                source: wgpu::ShaderSource::Glsl {
                    shader: desc.vertex_source.as_str().into(),
                    stage: wgpu::naga::ShaderStage::Vertex,
                    defines: Default::default(),
                },
            });
        let fragment = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{} (fragment)", desc.name)),
                source: wgpu::ShaderSource::Glsl {
                    shader: desc.fragment_source.as_str().into(),
                    stage: wgpu::naga::ShaderStage::Fragment,
                    defines: Default::default(),
                },
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::ProgramCreationFailed {
                name: desc.name.clone(),
                log: error.to_string(),
            });
        }

        let id = self.allocate_id();
        self.programs.insert(
            id,
            GpuProgram {
                name: desc.name.clone(),
                vertex,
                fragment,
            },
        );
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
        if let Some(a) = desc.attributes.iter().find(|a| a.offset < desc.base_offset) {
            return Err(BackendError::VertexArrayCreationFailed(format!(
                "location {} starts before the vertex range",
                a.location
            )));
        }

        let id = self.allocate_id();
        self.vertex_arrays.insert(id, desc.clone());
        Ok(VertexArrayHandle(id))
    }

    fn begin_pass(&mut self, desc: &PassDescriptor) {
        if self.pending_pass.is_some() {
            log::warn!("begin_pass called inside a pass, previous pass dropped");
        }
        self.pending_pass = Some(PendingPass {
            descriptor: desc.clone(),
            commands: Vec::new(),
        });
    }

    fn end_pass(&mut self) {
        let Some(pending) = self.pending_pass.take() else {
            return;
        };

        let targets = match self.resolve_targets(&pending.descriptor) {
            Ok(targets) => targets,
            Err(e) => {
                log::error!("Pass {:?} skipped: {}", pending.descriptor.label, e);
                return;
            }
        };
        let resolved = self.resolve_commands(&pending.commands, &targets);

        let Some(mut encoder) = self.encoder.take() else {
            return;
        };

        {
            let clear_color = pending.descriptor.clear_color;
            let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = targets
                .colors
                .iter()
                .filter_map(|target| {
                    let view = match target {
                        ColorTarget::Surface => self.current_view.as_ref()?,
                        ColorTarget::Texture(id) => &self.textures.get(id)?.view,
                    };
                    Some(Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: match clear_color {
                                Some(c) => wgpu::LoadOp::Clear(wgpu::Color {
                                    r: c[0] as f64,
                                    g: c[1] as f64,
                                    b: c[2] as f64,
                                    a: c[3] as f64,
                                }),
                                None => wgpu::LoadOp::Load,
                            },
                            store: wgpu::StoreOp::Store,
                        },
                    }))
                })
                .collect();

            let depth_attachment = targets
                .depth
                .and_then(|id| self.textures.get(&id))
                .map(|depth| wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: match pending.descriptor.clear_depth {
                            Some(value) => wgpu::LoadOp::Clear(value),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                });

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: pending.descriptor.label.as_deref(),
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for command in &resolved {
                match command {
                    ResolvedCommand::Viewport { x, y, width, height } => {
                        render_pass.set_viewport(*x, *y, *width, *height, 0.0, 1.0);
                    }
                    ResolvedCommand::Draw(draw) => {
                        let Some(pipeline) = self.pipelines.get(&draw.pipeline) else {
                            continue;
                        };
                        let Some(vertex_array) = self.vertex_arrays.get(&draw.vertex_array) else {
                            continue;
                        };
                        let (Some(vertex_buffer), Some(index_buffer)) = (
                            self.buffers.get(&vertex_array.vertex_buffer.0),
                            self.buffers.get(&vertex_array.index_buffer.0),
                        ) else {
                            continue;
                        };
                        let Some(texture_group) = self.texture_groups.get(&draw.textures) else {
                            continue;
                        };

                        render_pass.set_pipeline(pipeline);
                        for (slot, uniform) in draw.uniforms.iter().enumerate() {
                            let group = uniform
                                .and_then(|key| self.uniform_groups.get(&key))
                                .unwrap_or(&self.default_uniform_group);
                            render_pass.set_bind_group(slot as u32, group, &[]);
                        }
                        render_pass.set_bind_group(MAX_UNIFORM_SLOTS as u32, texture_group, &[]);
                        render_pass
                            .set_vertex_buffer(0, vertex_buffer.slice(vertex_array.base_offset..));

                        match draw.call {
                            DrawCall::Indexed { count, format, byte_offset } => {
                                render_pass.set_index_buffer(
                                    index_buffer.slice(byte_offset..),
                                    Self::convert_index_format(format),
                                );
                                render_pass.draw_indexed(0..count, 0, 0..1);
                            }
                            DrawCall::Direct { first, count } => {
                                render_pass.draw(first..first + count, 0..1);
                            }
                        }
                    }
                }
            }
        }

        self.encoder = Some(encoder);
    }

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.push_command(RenderCommand::SetViewport { x, y, width, height });
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.push_command(RenderCommand::SetDepthWrite(enabled));
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.push_command(RenderCommand::UseProgram(program));
    }

    fn bind_uniform_range(&mut self, slot: u32, buffer: BufferHandle, offset: u64, size: u64) {
        let alignment = self.device.limits().min_uniform_buffer_offset_alignment as u64;
        if offset % alignment != 0 {
            log::error!(
                "Uniform range at {} ({} bytes) is not aligned to {}",
                offset,
                size,
                alignment
            );
            return;
        }
        self.push_command(RenderCommand::BindUniformRange {
            slot,
            buffer,
            offset,
        });
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle, sampler: SamplerHandle) {
        self.push_command(RenderCommand::BindTexture {
            unit,
            texture,
            sampler,
        });
    }

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        self.push_command(RenderCommand::BindVertexArray(vertex_array));
    }

    fn draw_indexed(
        &mut self,
        topology: PrimitiveTopology,
        count: u32,
        format: IndexFormat,
        byte_offset: u64,
    ) {
        self.push_command(RenderCommand::DrawIndexed {
            topology,
            count,
            format,
            byte_offset,
        });
    }

    fn draw(&mut self, topology: PrimitiveTopology, first: u32, count: u32) {
        self.push_command(RenderCommand::Draw {
            topology,
            first,
            count,
        });
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.uniform_groups.retain(|(id, _), _| *id != buffer.0);
        self.buffers.remove(&buffer.0);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.texture_groups
            .retain(|key, _| !key.iter().flatten().any(|(id, _)| *id == texture.0));
        self.textures.remove(&texture.0);
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer.0);
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.pipelines.retain(|key, _| key.program != program.0);
        self.programs.remove(&program.0);
    }

    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        self.pipelines.retain(|key, _| key.vertex_array != vertex_array.0);
        self.vertex_arrays.remove(&vertex_array.0);
    }
}

// Additional methods for egui integration
impl WgpuBackend {
    /// Get reference to the wgpu device (for egui-wgpu Renderer creation)
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get the surface format as wgpu type (for egui-wgpu Renderer creation)
    pub fn wgpu_surface_format(&self) -> wgpu::TextureFormat {
        self.surface_config.format
    }

    /// Get device, queue, and encoder together for operations that need all three.
    pub fn device_queue_encoder(
        &mut self,
    ) -> (&wgpu::Device, &wgpu::Queue, Option<&mut wgpu::CommandEncoder>) {
        (&self.device, &self.queue, self.encoder.as_mut())
    }

    /// Render egui on top of the current swapchain image
    pub fn render_egui(
        &mut self,
        renderer: &egui_wgpu::Renderer,
        paint_jobs: &[egui::ClippedPrimitive],
        screen_descriptor: &egui_wgpu::ScreenDescriptor,
    ) {
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };
        let Some(view) = self.current_view.as_ref() else {
            return;
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("egui Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        renderer.render(&mut render_pass, paint_jobs, screen_descriptor);
    }
}
