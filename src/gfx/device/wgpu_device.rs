//! wgpu backend for the device contract
//!
//! wgpu has no immediate-mode draw calls, so draws issued through
//! [`GraphicsDevice`] are resolved into [`RecordedDraw`]s (pipeline, bind group
//! and buffers) and replayed later on a render pass:
//!
//! ```no_run
//! # use haggis_models::gfx::device::{DrawRecorded, WgpuDevice};
//! # fn frame(device: &WgpuDevice, pass: &mut wgpu::RenderPass<'_>) {
//! // ... model.render(device, &program) ...
//! let draws = device.take_draws();
//! pass.draw_recorded(&draws);
//! # }
//! ```
//!
//! Shaders are WGSL with `vs_main` / `fs_main` entry points. Texture unit `u`
//! is exposed to the fragment stage as `@group(0) @binding(2u)` (texture) and
//! `@group(0) @binding(2u + 1)` (sampler).

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Range;

use image::{imageops, RgbaImage};
use log::{debug, error, warn};
use wgpu::util::DeviceExt;

use super::{
    BufferId, BufferTarget, GraphicsDevice, ProgramId, ShaderId, ShaderStage, TextureFilter,
    TextureId, TextureParameters, TextureWrap, Topology, UniformValue, VertexArrayId,
    VertexAttributeBinding,
};
use crate::error::{ModelError, Result};
use crate::gfx::vertex::ComponentType;

/// One resolved draw, ready to be replayed on a render pass.
#[derive(Clone, Debug)]
pub struct RecordedDraw {
    pub pipeline: wgpu::RenderPipeline,
    pub bind_group: Option<wgpu::BindGroup>,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: Option<wgpu::Buffer>,
    /// Index range when indexed, vertex range otherwise
    pub range: Range<u32>,
}

/// Replays recorded draws on a render pass.
pub trait DrawRecorded {
    fn draw_recorded(&mut self, draws: &[RecordedDraw]);
}

impl DrawRecorded for wgpu::RenderPass<'_> {
    fn draw_recorded(&mut self, draws: &[RecordedDraw]) {
        for draw in draws {
            self.set_pipeline(&draw.pipeline);
            if let Some(bind_group) = &draw.bind_group {
                self.set_bind_group(0, bind_group, &[]);
            }
            self.set_vertex_buffer(0, draw.vertex_buffer.slice(..));
            match &draw.index_buffer {
                Some(index_buffer) => {
                    self.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    self.draw_indexed(draw.range.clone(), 0, 0..1);
                }
                None => self.draw(draw.range.clone(), 0..1),
            }
        }
    }
}

#[derive(Default)]
struct VertexArrayState {
    vertex_buffer: Option<BufferId>,
    index_buffer: Option<BufferId>,
    attributes: Vec<VertexAttributeBinding>,
    enabled: BTreeSet<u32>,
}

struct TextureState {
    parameters: TextureParameters,
    /// Level 0 in RGBA, kept so mipmaps can be generated after upload
    image: Option<RgbaImage>,
    gpu: Option<(wgpu::Texture, wgpu::TextureView)>,
    sampler: Option<wgpu::Sampler>,
}

struct ShaderState {
    stage: ShaderStage,
    module: Option<wgpu::ShaderModule>,
}

#[derive(Default)]
struct ProgramState {
    attached: Vec<ShaderId>,
    vertex: Option<wgpu::ShaderModule>,
    fragment: Option<wgpu::ShaderModule>,
    linked: bool,
    warned: HashSet<String>,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    attributes: Vec<VertexAttributeBinding>,
    texture_units: Vec<u32>,
}

#[derive(Clone)]
struct CachedPipeline {
    pipeline: wgpu::RenderPipeline,
    /// Present only when the pipeline samples textures
    bind_group_layout: Option<wgpu::BindGroupLayout>,
}

#[derive(Default)]
struct WgpuState {
    next_id: u32,
    vertex_arrays: HashMap<VertexArrayId, VertexArrayState>,
    buffers: HashMap<BufferId, Option<wgpu::Buffer>>,
    textures: HashMap<TextureId, TextureState>,
    shaders: HashMap<ShaderId, ShaderState>,
    programs: HashMap<ProgramId, ProgramState>,
    bound_vertex_array: Option<VertexArrayId>,
    bound_array_buffer: Option<BufferId>,
    bound_element_buffer: Option<BufferId>,
    active_unit: u32,
    texture_units: BTreeMap<u32, TextureId>,
    current_program: Option<ProgramId>,
    pipelines: HashMap<PipelineKey, CachedPipeline>,
    draws: Vec<RecordedDraw>,
}

impl WgpuState {
    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn bound_texture(&self) -> Option<TextureId> {
        self.texture_units.get(&self.active_unit).copied()
    }
}

/// [`GraphicsDevice`] implemented on a wgpu device and queue.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    color_format: wgpu::TextureFormat,
    depth_format: Option<wgpu::TextureFormat>,
    state: RefCell<WgpuState>,
}

impl WgpuDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, color_format: wgpu::TextureFormat) -> Self {
        Self {
            device,
            queue,
            color_format,
            depth_format: None,
            state: RefCell::new(WgpuState::default()),
        }
    }

    /// Enables depth testing against an attachment of `format` in every pipeline.
    pub fn with_depth_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.depth_format = Some(format);
        self
    }

    /// Requests an adapter and device without a surface, blocking on the request.
    pub fn headless(color_format: wgpu::TextureFormat) -> Result<Self> {
        pollster::block_on(Self::request(color_format))
    }

    async fn request(color_format: wgpu::TextureFormat) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| ModelError::Device(format!("no suitable adapter: {e}")))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Model Device"),
                required_features: wgpu::Features::default(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| ModelError::Device(format!("device request failed: {e}")))?;

        Ok(Self::new(device, queue, color_format))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Removes and returns every draw recorded since the last call.
    pub fn take_draws(&self) -> Vec<RecordedDraw> {
        std::mem::take(&mut self.state.borrow_mut().draws)
    }

    pub fn pipeline_count(&self) -> usize {
        self.state.borrow().pipelines.len()
    }

    fn upload_texture_levels(&self, texture: &mut TextureState, levels: &[RgbaImage]) {
        let Some(base) = levels.first() else {
            return;
        };
        let size = wgpu::Extent3d {
            width: base.width(),
            height: base.height(),
            depth_or_array_layers: 1,
        };
        let gpu_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Model Texture"),
            size,
            mip_level_count: levels.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (level, image) in levels.iter().enumerate() {
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &gpu_texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                image.as_raw(),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * image.width()),
                    rows_per_image: Some(image.height()),
                },
                wgpu::Extent3d {
                    width: image.width(),
                    height: image.height(),
                    depth_or_array_layers: 1,
                },
            );
        }

        let view = gpu_texture.create_view(&wgpu::TextureViewDescriptor::default());
        texture.gpu = Some((gpu_texture, view));
    }

    fn create_sampler(&self, parameters: &TextureParameters) -> wgpu::Sampler {
        let (min_filter, mipmap_filter) = filter_modes(parameters.min_filter);
        let (mag_filter, _) = filter_modes(parameters.mag_filter);
        let border = self
            .device
            .features()
            .contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER);
        self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Model Sampler"),
            address_mode_u: address_mode(parameters.wrap_s, border),
            address_mode_v: address_mode(parameters.wrap_t, border),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter,
            min_filter,
            mipmap_filter,
            border_color: border.then_some(wgpu::SamplerBorderColor::TransparentBlack),
            ..Default::default()
        })
    }

    fn pipeline_for(&self, state: &mut WgpuState, key: PipelineKey) -> Option<CachedPipeline> {
        if let Some(cached) = state.pipelines.get(&key) {
            return Some(cached.clone());
        }

        let program = state.programs.get(&key.program).filter(|p| p.linked)?;
        let (Some(vertex), Some(fragment)) = (&program.vertex, &program.fragment) else {
            return None;
        };

        let attributes: Vec<wgpu::VertexAttribute> = key
            .attributes
            .iter()
            .filter_map(|binding| {
                let format = vertex_format(binding);
                if format.is_none() {
                    warn!(
                        "Attribute at location {} has no wgpu vertex format",
                        binding.location
                    );
                }
                format.map(|format| wgpu::VertexAttribute {
                    format,
                    offset: binding.offset as wgpu::BufferAddress,
                    shader_location: binding.location,
                })
            })
            .collect();
        let stride = key.attributes.first().map_or(0, |binding| binding.stride);

        let bind_group_layout = texture_group_entries(&key.texture_units).map(|entries| {
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Model Texture Layout"),
                    entries: &entries,
                })
        });
        // Untextured draws set no bind group, so the layout must not declare one
        let group_layouts: Vec<&wgpu::BindGroupLayout> = bind_group_layout.iter().collect();
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Model Pipeline Layout"),
                bind_group_layouts: &group_layouts,
                push_constant_ranges: &[],
            });

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Model Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: vertex,
                    entry_point: Some("vs_main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: stride as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &attributes,
                    }],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: fragment,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.color_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Back),
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: self.depth_format.map(|format| wgpu::DepthStencilState {
                    format,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

        debug!(
            "Created pipeline for program {:?} ({} attributes, {} textures)",
            key.program,
            attributes.len(),
            key.texture_units.len()
        );
        let cached = CachedPipeline {
            pipeline,
            bind_group_layout,
        };
        state.pipelines.insert(key, cached.clone());
        Some(cached)
    }

    fn record_draw(&self, indexed: bool, range: Range<u32>) {
        let mut state = self.state.borrow_mut();
        let Some(program) = state.current_program else {
            warn!("Draw issued with no program in use; skipped");
            return;
        };
        let Some(vao) = state.bound_vertex_array else {
            warn!("Draw issued with no vertex array bound; skipped");
            return;
        };
        let Some(vertex_array) = state.vertex_arrays.get(&vao) else {
            return;
        };

        let attributes: Vec<VertexAttributeBinding> = vertex_array
            .attributes
            .iter()
            .filter(|binding| vertex_array.enabled.contains(&binding.location))
            .copied()
            .collect();
        let vertex_buffer = vertex_array
            .vertex_buffer
            .and_then(|id| state.buffers.get(&id).cloned().flatten());
        let index_buffer = vertex_array
            .index_buffer
            .and_then(|id| state.buffers.get(&id).cloned().flatten());
        let Some(vertex_buffer) = vertex_buffer else {
            warn!("Vertex array {:?} has no vertex data; draw skipped", vao);
            return;
        };
        if indexed && index_buffer.is_none() {
            warn!("Vertex array {:?} has no index data; draw skipped", vao);
            return;
        }

        // Units whose texture has been uploaded and given a sampler
        let units: Vec<(u32, wgpu::TextureView, wgpu::Sampler)> = state
            .texture_units
            .iter()
            .filter_map(|(&unit, id)| {
                let texture = state.textures.get(id)?;
                let (_, view) = texture.gpu.as_ref()?;
                let sampler = texture.sampler.clone()?;
                Some((unit, view.clone(), sampler))
            })
            .collect();

        let key = PipelineKey {
            program,
            attributes,
            texture_units: units.iter().map(|(unit, _, _)| *unit).collect(),
        };
        let Some(cached) = self.pipeline_for(&mut state, key) else {
            error!("Program {:?} is not linked; draw skipped", program);
            return;
        };

        let bind_group = cached.bind_group_layout.as_ref().map(|layout| {
            let entries: Vec<wgpu::BindGroupEntry> = units
                .iter()
                .flat_map(|(unit, view, sampler)| {
                    [
                        wgpu::BindGroupEntry {
                            binding: unit * 2,
                            resource: wgpu::BindingResource::TextureView(view),
                        },
                        wgpu::BindGroupEntry {
                            binding: unit * 2 + 1,
                            resource: wgpu::BindingResource::Sampler(sampler),
                        },
                    ]
                })
                .collect();
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Model Texture Bind Group"),
                layout,
                entries: &entries,
            })
        });

        state.draws.push(RecordedDraw {
            pipeline: cached.pipeline,
            bind_group,
            vertex_buffer,
            index_buffer: if indexed { index_buffer } else { None },
            range,
        });
    }
}

impl GraphicsDevice for WgpuDevice {
    fn create_vertex_array(&self) -> VertexArrayId {
        let mut state = self.state.borrow_mut();
        let id = VertexArrayId(state.allocate());
        state.vertex_arrays.insert(id, VertexArrayState::default());
        id
    }

    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayId>) {
        let mut state = self.state.borrow_mut();
        let element_buffer = vertex_array
            .and_then(|id| state.vertex_arrays.get(&id))
            .and_then(|vao| vao.index_buffer);
        state.bound_vertex_array = vertex_array;
        state.bound_element_buffer = element_buffer;
    }

    fn delete_vertex_array(&self, vertex_array: VertexArrayId) {
        let mut state = self.state.borrow_mut();
        state.vertex_arrays.remove(&vertex_array);
        if state.bound_vertex_array == Some(vertex_array) {
            state.bound_vertex_array = None;
        }
    }

    fn create_buffer(&self) -> BufferId {
        let mut state = self.state.borrow_mut();
        let id = BufferId(state.allocate());
        state.buffers.insert(id, None);
        id
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferId>) {
        let mut state = self.state.borrow_mut();
        match target {
            BufferTarget::Array => state.bound_array_buffer = buffer,
            BufferTarget::ElementArray => {
                state.bound_element_buffer = buffer;
                if let Some(vao) = state.bound_vertex_array {
                    if let Some(vertex_array) = state.vertex_arrays.get_mut(&vao) {
                        vertex_array.index_buffer = buffer;
                    }
                }
            }
        }
    }

    fn upload_buffer(&self, target: BufferTarget, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        let (bound, usage, label) = match target {
            BufferTarget::Array => (
                state.bound_array_buffer,
                wgpu::BufferUsages::VERTEX,
                "Model Vertex Buffer",
            ),
            BufferTarget::ElementArray => (
                state.bound_element_buffer,
                wgpu::BufferUsages::INDEX,
                "Model Index Buffer",
            ),
        };
        let Some(id) = bound else {
            warn!("Upload to {:?} with no buffer bound; ignored", target);
            return;
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: data,
                usage: usage | wgpu::BufferUsages::COPY_DST,
            });
        state.buffers.insert(id, Some(buffer));
    }

    fn delete_buffer(&self, buffer: BufferId) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if let Some(Some(buffer)) = state.buffers.remove(&buffer) {
            buffer.destroy();
        }
        for slot in [&mut state.bound_array_buffer, &mut state.bound_element_buffer] {
            if *slot == Some(buffer) {
                *slot = None;
            }
        }
    }

    fn describe_vertex_attribute(&self, attribute: &VertexAttributeBinding) {
        let mut state = self.state.borrow_mut();
        let array_buffer = state.bound_array_buffer;
        let Some(vao) = state.bound_vertex_array else {
            warn!("Attribute described with no vertex array bound; ignored");
            return;
        };
        if let Some(vertex_array) = state.vertex_arrays.get_mut(&vao) {
            vertex_array.vertex_buffer = array_buffer;
            vertex_array
                .attributes
                .retain(|existing| existing.location != attribute.location);
            vertex_array.attributes.push(*attribute);
        }
    }

    fn enable_vertex_attribute(&self, location: u32) {
        let mut state = self.state.borrow_mut();
        if let Some(vao) = state.bound_vertex_array {
            if let Some(vertex_array) = state.vertex_arrays.get_mut(&vao) {
                vertex_array.enabled.insert(location);
            }
        }
    }

    fn create_texture(&self) -> TextureId {
        let mut state = self.state.borrow_mut();
        let id = TextureId(state.allocate());
        state.textures.insert(
            id,
            TextureState {
                parameters: TextureParameters::default(),
                image: None,
                gpu: None,
                sampler: None,
            },
        );
        id
    }

    fn active_texture_unit(&self, unit: u32) {
        self.state.borrow_mut().active_unit = unit;
    }

    fn bind_texture(&self, texture: Option<TextureId>) {
        let mut state = self.state.borrow_mut();
        let unit = state.active_unit;
        match texture {
            Some(id) => {
                state.texture_units.insert(unit, id);
            }
            None => {
                state.texture_units.remove(&unit);
            }
        }
    }

    fn set_texture_parameters(&self, parameters: &TextureParameters) {
        let mut state = self.state.borrow_mut();
        let Some(id) = state.bound_texture() else {
            return;
        };
        let sampler = self.create_sampler(parameters);
        if let Some(texture) = state.textures.get_mut(&id) {
            texture.parameters = *parameters;
            texture.sampler = Some(sampler);
        }
    }

    fn upload_texture_rgb8(&self, width: u32, height: u32, pixels: &[u8]) {
        let mut state = self.state.borrow_mut();
        let Some(id) = state.bound_texture() else {
            warn!("Texture upload with no texture bound; ignored");
            return;
        };
        let Some(image) = expand_rgb8(width, height, pixels) else {
            error!("RGB8 upload of {}x{} has {} bytes", width, height, pixels.len());
            return;
        };
        if let Some(texture) = state.textures.get_mut(&id) {
            self.upload_texture_levels(texture, std::slice::from_ref(&image));
            if texture.sampler.is_none() {
                texture.sampler = Some(self.create_sampler(&texture.parameters));
            }
            texture.image = Some(image);
        }
    }

    fn generate_mipmap(&self) {
        let mut state = self.state.borrow_mut();
        let Some(id) = state.bound_texture() else {
            return;
        };
        if let Some(texture) = state.textures.get_mut(&id) {
            let Some(image) = texture.image.take() else {
                return;
            };
            let levels = mip_chain(&image);
            self.upload_texture_levels(texture, &levels);
            texture.image = Some(image);
        }
    }

    fn delete_texture(&self, texture: TextureId) {
        let mut state = self.state.borrow_mut();
        if let Some(TextureState {
            gpu: Some((gpu_texture, _)),
            ..
        }) = state.textures.remove(&texture)
        {
            gpu_texture.destroy();
        }
        state.texture_units.retain(|_, bound| *bound != texture);
    }

    fn draw_elements(&self, topology: Topology, index_count: u32) {
        match topology {
            Topology::Triangles => self.record_draw(true, 0..index_count),
        }
    }

    fn draw_arrays(&self, topology: Topology, first: u32, vertex_count: u32) {
        match topology {
            Topology::Triangles => self.record_draw(false, first..first + vertex_count),
        }
    }

    fn create_shader(&self, stage: ShaderStage) -> ShaderId {
        let mut state = self.state.borrow_mut();
        let id = ShaderId(state.allocate());
        state.shaders.insert(id, ShaderState { stage, module: None });
        id
    }

    fn compile_shader(&self, shader: ShaderId, source: &str) -> std::result::Result<(), String> {
        let stage = match self.state.borrow().shaders.get(&shader) {
            Some(state) => state.stage,
            None => return Err(format!("unknown shader {:?}", shader)),
        };
        if stage == ShaderStage::Geometry {
            return Err("geometry shaders are not supported by wgpu".to_string());
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Model Shader"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        if let Some(diagnostic) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(diagnostic.to_string());
        }

        if let Some(state) = self.state.borrow_mut().shaders.get_mut(&shader) {
            state.module = Some(module);
        }
        Ok(())
    }

    fn delete_shader(&self, shader: ShaderId) {
        self.state.borrow_mut().shaders.remove(&shader);
    }

    fn create_program(&self) -> ProgramId {
        let mut state = self.state.borrow_mut();
        let id = ProgramId(state.allocate());
        state.programs.insert(id, ProgramState::default());
        id
    }

    fn attach_shader(&self, program: ProgramId, shader: ShaderId) -> std::result::Result<(), String> {
        let mut state = self.state.borrow_mut();
        if !state.shaders.contains_key(&shader) {
            return Err(format!("unknown shader {:?}", shader));
        }
        let program = state
            .programs
            .get_mut(&program)
            .ok_or_else(|| format!("unknown program {:?}", program))?;
        program.attached.push(shader);
        Ok(())
    }

    fn link_program(&self, program: ProgramId) -> std::result::Result<(), String> {
        let mut state = self.state.borrow_mut();
        let attached = state
            .programs
            .get(&program)
            .map(|p| p.attached.clone())
            .ok_or_else(|| format!("unknown program {:?}", program))?;

        let mut vertex = None;
        let mut fragment = None;
        for id in attached {
            let Some(shader) = state.shaders.get(&id) else {
                continue;
            };
            let Some(module) = shader.module.clone() else {
                return Err(format!("shader {:?} is not compiled", id));
            };
            match shader.stage {
                ShaderStage::Vertex => vertex = Some(module),
                ShaderStage::Fragment => fragment = Some(module),
                ShaderStage::Geometry => {
                    return Err("geometry stage cannot be linked".to_string())
                }
            }
        }
        if vertex.is_none() || fragment.is_none() {
            return Err("program needs a vertex and a fragment stage".to_string());
        }

        if let Some(state) = state.programs.get_mut(&program) {
            state.vertex = vertex;
            state.fragment = fragment;
            state.linked = true;
        }
        // Modules may have changed; drop pipelines built from the old ones
        state.pipelines.retain(|key, _| key.program != program);
        Ok(())
    }

    fn use_program(&self, program: Option<ProgramId>) {
        self.state.borrow_mut().current_program = program;
    }

    fn delete_program(&self, program: ProgramId) {
        let mut state = self.state.borrow_mut();
        state.programs.remove(&program);
        state.pipelines.retain(|key, _| key.program != program);
        if state.current_program == Some(program) {
            state.current_program = None;
        }
    }

    fn set_uniform(&self, program: ProgramId, name: &str, value: &UniformValue) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let Some(program) = state.programs.get_mut(&program) else {
            return;
        };
        // Samplers are wired by unit number when the draw is recorded
        if is_sampler_assignment(value, &state.texture_units) {
            return;
        }
        if program.warned.insert(name.to_string()) {
            warn!(
                "Uniform '{}' is not a sampler for a bound texture unit; ignored by wgpu programs",
                name
            );
        }
    }
}

/// An integer uniform naming a texture unit that currently has a texture bound.
fn is_sampler_assignment(value: &UniformValue, bound_units: &BTreeMap<u32, TextureId>) -> bool {
    match value {
        UniformValue::Int(unit) => {
            u32::try_from(*unit).is_ok_and(|unit| bound_units.contains_key(&unit))
        }
        _ => false,
    }
}

/// Expands tightly packed RGB8 pixels to RGBA8 with opaque alpha.
fn expand_rgb8(width: u32, height: u32, pixels: &[u8]) -> Option<RgbaImage> {
    if pixels.len() != width as usize * height as usize * 3 {
        return None;
    }
    let rgba = pixels
        .chunks_exact(3)
        .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], u8::MAX])
        .collect();
    RgbaImage::from_raw(width, height, rgba)
}

fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Full mip chain, level 0 first, each level half the previous (at least 1x1).
fn mip_chain(base: &RgbaImage) -> Vec<RgbaImage> {
    let count = mip_level_count(base.width(), base.height());
    let mut levels = Vec::with_capacity(count as usize);
    levels.push(base.clone());
    for level in 1..count {
        let width = (base.width() >> level).max(1);
        let height = (base.height() >> level).max(1);
        levels.push(imageops::resize(
            base,
            width,
            height,
            imageops::FilterType::Triangle,
        ));
    }
    levels
}

/// Base filter and mipmap filter for a texture filter.
fn filter_modes(filter: TextureFilter) -> (wgpu::FilterMode, wgpu::FilterMode) {
    use wgpu::FilterMode::{Linear, Nearest};
    match filter {
        TextureFilter::Nearest => (Nearest, Nearest),
        TextureFilter::Linear => (Linear, Nearest),
        TextureFilter::NearestMipmapNearest => (Nearest, Nearest),
        TextureFilter::LinearMipmapNearest => (Linear, Nearest),
        TextureFilter::NearestMipmapLinear => (Nearest, Linear),
        TextureFilter::LinearMipmapLinear => (Linear, Linear),
    }
}

fn address_mode(wrap: TextureWrap, border_supported: bool) -> wgpu::AddressMode {
    match wrap {
        TextureWrap::Repeat => wgpu::AddressMode::Repeat,
        TextureWrap::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        TextureWrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        TextureWrap::ClampToBorder if border_supported => wgpu::AddressMode::ClampToBorder,
        TextureWrap::ClampToBorder => wgpu::AddressMode::ClampToEdge,
    }
}

fn vertex_format(binding: &VertexAttributeBinding) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;
    let format = match (binding.component_type, binding.component_count, binding.normalized) {
        (ComponentType::Float32, 1, _) => F::Float32,
        (ComponentType::Float32, 2, _) => F::Float32x2,
        (ComponentType::Float32, 3, _) => F::Float32x3,
        (ComponentType::Float32, 4, _) => F::Float32x4,
        (ComponentType::Int32, 1, _) => F::Sint32,
        (ComponentType::Int32, 2, _) => F::Sint32x2,
        (ComponentType::Int32, 3, _) => F::Sint32x3,
        (ComponentType::Int32, 4, _) => F::Sint32x4,
        (ComponentType::Uint32, 1, _) => F::Uint32,
        (ComponentType::Uint32, 2, _) => F::Uint32x2,
        (ComponentType::Uint32, 3, _) => F::Uint32x3,
        (ComponentType::Uint32, 4, _) => F::Uint32x4,
        (ComponentType::Int16, 2, false) => F::Sint16x2,
        (ComponentType::Int16, 4, false) => F::Sint16x4,
        (ComponentType::Int16, 2, true) => F::Snorm16x2,
        (ComponentType::Int16, 4, true) => F::Snorm16x4,
        (ComponentType::Uint16, 2, false) => F::Uint16x2,
        (ComponentType::Uint16, 4, false) => F::Uint16x4,
        (ComponentType::Uint16, 2, true) => F::Unorm16x2,
        (ComponentType::Uint16, 4, true) => F::Unorm16x4,
        (ComponentType::Int8, 2, false) => F::Sint8x2,
        (ComponentType::Int8, 4, false) => F::Sint8x4,
        (ComponentType::Int8, 2, true) => F::Snorm8x2,
        (ComponentType::Int8, 4, true) => F::Snorm8x4,
        (ComponentType::Uint8, 2, false) => F::Uint8x2,
        (ComponentType::Uint8, 4, false) => F::Uint8x4,
        (ComponentType::Uint8, 2, true) => F::Unorm8x2,
        (ComponentType::Uint8, 4, true) => F::Unorm8x4,
        _ => return None,
    };
    Some(format)
}

/// Group 0 layout entries for the given texture units; `None` when nothing is sampled.
fn texture_group_entries(units: &[u32]) -> Option<Vec<wgpu::BindGroupLayoutEntry>> {
    if units.is_empty() {
        return None;
    }
    Some(units.iter().flat_map(|&unit| texture_layout_entries(unit)).collect())
}

fn texture_layout_entries(unit: u32) -> [wgpu::BindGroupLayoutEntry; 2] {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(component_type: ComponentType, count: u32, normalized: bool) -> VertexAttributeBinding {
        VertexAttributeBinding {
            location: 0,
            component_count: count,
            component_type,
            normalized,
            stride: 32,
            offset: 0,
        }
    }

    #[test]
    fn test_vertex_formats() {
        assert_eq!(
            vertex_format(&binding(ComponentType::Float32, 3, false)),
            Some(wgpu::VertexFormat::Float32x3)
        );
        assert_eq!(
            vertex_format(&binding(ComponentType::Uint8, 4, true)),
            Some(wgpu::VertexFormat::Unorm8x4)
        );
        assert_eq!(vertex_format(&binding(ComponentType::Uint8, 3, false)), None);
        assert_eq!(vertex_format(&binding(ComponentType::Float32, 5, false)), None);
    }

    #[test]
    fn test_rgb8_expansion() {
        let image = expand_rgb8(2, 1, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(image.as_raw(), &vec![1, 2, 3, 255, 4, 5, 6, 255]);
        assert!(expand_rgb8(2, 2, &[0; 6]).is_none());
    }

    #[test]
    fn test_mip_chain_halves_to_one_pixel() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(256, 64), 9);
        assert_eq!(mip_level_count(300, 10), 9);

        let chain = mip_chain(&RgbaImage::new(8, 2));
        let sizes: Vec<_> = chain.iter().map(|level| level.dimensions()).collect();
        assert_eq!(sizes, vec![(8, 2), (4, 1), (2, 1), (1, 1)]);
    }

    #[test]
    fn test_default_parameters_map_to_trilinear_style_sampling() {
        let parameters = TextureParameters::default();
        assert_eq!(
            filter_modes(parameters.min_filter),
            (wgpu::FilterMode::Nearest, wgpu::FilterMode::Linear)
        );
        assert_eq!(filter_modes(parameters.mag_filter).0, wgpu::FilterMode::Linear);
        assert_eq!(
            address_mode(TextureWrap::ClampToBorder, false),
            wgpu::AddressMode::ClampToEdge
        );
        assert_eq!(
            address_mode(TextureWrap::MirroredRepeat, true),
            wgpu::AddressMode::MirrorRepeat
        );
    }

    #[test]
    fn test_untextured_pipelines_declare_no_bind_group() {
        assert!(texture_group_entries(&[]).is_none());

        let entries = texture_group_entries(&[0, 2]).unwrap();
        let bindings: Vec<u32> = entries.iter().map(|entry| entry.binding).collect();
        assert_eq!(bindings, vec![0, 1, 4, 5]);
    }

    #[test]
    fn test_only_bound_units_count_as_sampler_uniforms() {
        let bound = BTreeMap::from([(0, TextureId(7)), (1, TextureId(8))]);

        assert!(is_sampler_assignment(&UniformValue::Int(1), &bound));
        assert!(!is_sampler_assignment(&UniformValue::Int(3), &bound));
        assert!(!is_sampler_assignment(&UniformValue::Int(-1), &bound));
        assert!(!is_sampler_assignment(&UniformValue::Float(0.0), &bound));
        // A flag like `use_lighting = 1` is not a sampler when nothing is bound
        assert!(!is_sampler_assignment(&UniformValue::Int(1), &BTreeMap::new()));
    }

    #[test]
    fn test_texture_bindings_follow_unit_convention() {
        let entries = texture_layout_entries(3);
        assert_eq!(entries[0].binding, 6);
        assert_eq!(entries[1].binding, 7);
    }
}
