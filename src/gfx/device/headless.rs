//! In-memory graphics device
//!
//! [`RecordingDevice`] implements the full device contract without a GPU. It
//! hands out increasing ids, tracks which objects are alive and what is bound,
//! and keeps a log of every call and every draw. Model inspection tools and the
//! test suite run against it.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::{
    BufferId, BufferTarget, GraphicsDevice, ProgramId, ShaderId, ShaderStage, TextureId,
    TextureParameters, Topology, UniformValue, VertexArrayId, VertexAttributeBinding,
};

/// One call made against a [`RecordingDevice`].
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceCall {
    CreateVertexArray(VertexArrayId),
    BindVertexArray(Option<VertexArrayId>),
    DeleteVertexArray(VertexArrayId),
    CreateBuffer(BufferId),
    BindBuffer(BufferTarget, Option<BufferId>),
    UploadBuffer { target: BufferTarget, bytes: usize },
    DeleteBuffer(BufferId),
    DescribeVertexAttribute(VertexAttributeBinding),
    EnableVertexAttribute(u32),
    CreateTexture(TextureId),
    ActiveTextureUnit(u32),
    BindTexture(Option<TextureId>),
    SetTextureParameters(TextureParameters),
    UploadTexture { width: u32, height: u32 },
    GenerateMipmap,
    DeleteTexture(TextureId),
    DrawElements { topology: Topology, count: u32 },
    DrawArrays { topology: Topology, first: u32, count: u32 },
    CreateShader(ShaderId, ShaderStage),
    CompileShader(ShaderId),
    DeleteShader(ShaderId),
    CreateProgram(ProgramId),
    AttachShader { program: ProgramId, shader: ShaderId },
    LinkProgram(ProgramId),
    UseProgram(Option<ProgramId>),
    DeleteProgram(ProgramId),
    SetUniform { program: ProgramId, name: String, value: UniformValue },
}

/// Snapshot of the device state at the moment of a draw call.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecord {
    pub topology: Topology,
    pub indexed: bool,
    /// Number of indices (indexed draws) or vertices (array draws) submitted
    pub count: u32,
    pub vertex_array: Option<VertexArrayId>,
    /// Texture units bound during the draw, in unit order
    pub textures: Vec<(u32, TextureId)>,
    pub program: Option<ProgramId>,
}

#[derive(Debug, Default)]
struct VertexArrayState {
    attributes: Vec<VertexAttributeBinding>,
    enabled: BTreeSet<u32>,
    index_buffer: Option<BufferId>,
}

#[derive(Debug, Default)]
struct DeviceState {
    next_id: u32,
    calls: Vec<DeviceCall>,
    draws: Vec<DrawRecord>,

    vertex_arrays: HashMap<VertexArrayId, VertexArrayState>,
    buffers: HashMap<BufferId, usize>,
    textures: HashSet<TextureId>,
    shaders: HashMap<ShaderId, ShaderStage>,
    programs: HashMap<ProgramId, Vec<ShaderId>>,

    bound_vertex_array: Option<VertexArrayId>,
    bound_buffers: HashMap<BufferTarget, BufferId>,
    active_unit: u32,
    texture_units: BTreeMap<u32, TextureId>,
    current_program: Option<ProgramId>,

    texture_uploads: usize,
    compile_failure: Option<String>,
}

impl DeviceState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn record_draw(&mut self, topology: Topology, indexed: bool, count: u32) {
        let record = DrawRecord {
            topology,
            indexed,
            count,
            vertex_array: self.bound_vertex_array,
            textures: self
                .texture_units
                .iter()
                .map(|(&unit, &texture)| (unit, texture))
                .collect(),
            program: self.current_program,
        };
        self.draws.push(record);
    }
}

/// Graphics device that records calls instead of talking to a GPU.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    state: RefCell<DeviceState>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent shader compilation fail with `diagnostic`.
    pub fn fail_compilation(&self, diagnostic: &str) {
        self.state.borrow_mut().compile_failure = Some(diagnostic.to_string());
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.borrow().calls.clone()
    }

    pub fn draws(&self) -> Vec<DrawRecord> {
        self.state.borrow().draws.clone()
    }

    /// Forgets recorded calls and draws; resource and binding state is kept.
    pub fn clear_log(&self) {
        let mut state = self.state.borrow_mut();
        state.calls.clear();
        state.draws.clear();
    }

    pub fn live_vertex_array_count(&self) -> usize {
        self.state.borrow().vertex_arrays.len()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    pub fn live_texture_count(&self) -> usize {
        self.state.borrow().textures.len()
    }

    pub fn live_program_count(&self) -> usize {
        self.state.borrow().programs.len()
    }

    pub fn live_shader_count(&self) -> usize {
        self.state.borrow().shaders.len()
    }

    /// Total number of pixel uploads performed over the device lifetime.
    pub fn texture_upload_count(&self) -> usize {
        self.state.borrow().texture_uploads
    }

    pub fn buffer_size(&self, buffer: BufferId) -> Option<usize> {
        self.state.borrow().buffers.get(&buffer).copied()
    }

    pub fn bound_vertex_array(&self) -> Option<VertexArrayId> {
        self.state.borrow().bound_vertex_array
    }

    pub fn bound_texture_units(&self) -> Vec<(u32, TextureId)> {
        self.state
            .borrow()
            .texture_units
            .iter()
            .map(|(&unit, &texture)| (unit, texture))
            .collect()
    }

    pub fn vertex_attributes(&self, vertex_array: VertexArrayId) -> Vec<VertexAttributeBinding> {
        self.state
            .borrow()
            .vertex_arrays
            .get(&vertex_array)
            .map(|vao| vao.attributes.clone())
            .unwrap_or_default()
    }

    pub fn enabled_attributes(&self, vertex_array: VertexArrayId) -> Vec<u32> {
        self.state
            .borrow()
            .vertex_arrays
            .get(&vertex_array)
            .map(|vao| vao.enabled.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn index_buffer_of(&self, vertex_array: VertexArrayId) -> Option<BufferId> {
        self.state
            .borrow()
            .vertex_arrays
            .get(&vertex_array)
            .and_then(|vao| vao.index_buffer)
    }

    /// Uniforms set on `program`, in call order.
    pub fn uniforms_set(&self, program: ProgramId) -> Vec<(String, UniformValue)> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                DeviceCall::SetUniform {
                    program: target,
                    name,
                    value,
                } if *target == program => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }
}

impl GraphicsDevice for RecordingDevice {
    fn create_vertex_array(&self) -> VertexArrayId {
        let mut state = self.state.borrow_mut();
        let id = VertexArrayId(state.next_id());
        state.vertex_arrays.insert(id, VertexArrayState::default());
        state.calls.push(DeviceCall::CreateVertexArray(id));
        id
    }

    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayId>) {
        let mut state = self.state.borrow_mut();
        state.bound_vertex_array = vertex_array;
        state.calls.push(DeviceCall::BindVertexArray(vertex_array));
    }

    fn delete_vertex_array(&self, vertex_array: VertexArrayId) {
        let mut state = self.state.borrow_mut();
        state.vertex_arrays.remove(&vertex_array);
        if state.bound_vertex_array == Some(vertex_array) {
            state.bound_vertex_array = None;
        }
        state.calls.push(DeviceCall::DeleteVertexArray(vertex_array));
    }

    fn create_buffer(&self) -> BufferId {
        let mut state = self.state.borrow_mut();
        let id = BufferId(state.next_id());
        state.buffers.insert(id, 0);
        state.calls.push(DeviceCall::CreateBuffer(id));
        id
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferId>) {
        let mut state = self.state.borrow_mut();
        match buffer {
            Some(buffer) => {
                state.bound_buffers.insert(target, buffer);
            }
            None => {
                state.bound_buffers.remove(&target);
            }
        }
        if target == BufferTarget::ElementArray {
            if let Some(vao) = state.bound_vertex_array {
                if let Some(vao) = state.vertex_arrays.get_mut(&vao) {
                    vao.index_buffer = buffer;
                }
            }
        }
        state.calls.push(DeviceCall::BindBuffer(target, buffer));
    }

    fn upload_buffer(&self, target: BufferTarget, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        if let Some(&buffer) = state.bound_buffers.get(&target) {
            state.buffers.insert(buffer, data.len());
        }
        state.calls.push(DeviceCall::UploadBuffer {
            target,
            bytes: data.len(),
        });
    }

    fn delete_buffer(&self, buffer: BufferId) {
        let mut state = self.state.borrow_mut();
        state.buffers.remove(&buffer);
        state.bound_buffers.retain(|_, bound| *bound != buffer);
        state.calls.push(DeviceCall::DeleteBuffer(buffer));
    }

    fn describe_vertex_attribute(&self, attribute: &VertexAttributeBinding) {
        let mut state = self.state.borrow_mut();
        if let Some(vao) = state.bound_vertex_array {
            if let Some(vao) = state.vertex_arrays.get_mut(&vao) {
                vao.attributes.retain(|a| a.location != attribute.location);
                vao.attributes.push(*attribute);
            }
        }
        state.calls.push(DeviceCall::DescribeVertexAttribute(*attribute));
    }

    fn enable_vertex_attribute(&self, location: u32) {
        let mut state = self.state.borrow_mut();
        if let Some(vao) = state.bound_vertex_array {
            if let Some(vao) = state.vertex_arrays.get_mut(&vao) {
                vao.enabled.insert(location);
            }
        }
        state.calls.push(DeviceCall::EnableVertexAttribute(location));
    }

    fn create_texture(&self) -> TextureId {
        let mut state = self.state.borrow_mut();
        let id = TextureId(state.next_id());
        state.textures.insert(id);
        state.calls.push(DeviceCall::CreateTexture(id));
        id
    }

    fn active_texture_unit(&self, unit: u32) {
        let mut state = self.state.borrow_mut();
        state.active_unit = unit;
        state.calls.push(DeviceCall::ActiveTextureUnit(unit));
    }

    fn bind_texture(&self, texture: Option<TextureId>) {
        let mut state = self.state.borrow_mut();
        let unit = state.active_unit;
        match texture {
            Some(texture) => {
                state.texture_units.insert(unit, texture);
            }
            None => {
                state.texture_units.remove(&unit);
            }
        }
        state.calls.push(DeviceCall::BindTexture(texture));
    }

    fn set_texture_parameters(&self, parameters: &TextureParameters) {
        self.state
            .borrow_mut()
            .calls
            .push(DeviceCall::SetTextureParameters(*parameters));
    }

    fn upload_texture_rgb8(&self, width: u32, height: u32, _pixels: &[u8]) {
        let mut state = self.state.borrow_mut();
        state.texture_uploads += 1;
        state.calls.push(DeviceCall::UploadTexture { width, height });
    }

    fn generate_mipmap(&self) {
        self.state.borrow_mut().calls.push(DeviceCall::GenerateMipmap);
    }

    fn delete_texture(&self, texture: TextureId) {
        let mut state = self.state.borrow_mut();
        state.textures.remove(&texture);
        state.texture_units.retain(|_, bound| *bound != texture);
        state.calls.push(DeviceCall::DeleteTexture(texture));
    }

    fn draw_elements(&self, topology: Topology, index_count: u32) {
        let mut state = self.state.borrow_mut();
        state.record_draw(topology, true, index_count);
        state.calls.push(DeviceCall::DrawElements {
            topology,
            count: index_count,
        });
    }

    fn draw_arrays(&self, topology: Topology, first: u32, vertex_count: u32) {
        let mut state = self.state.borrow_mut();
        state.record_draw(topology, false, vertex_count);
        state.calls.push(DeviceCall::DrawArrays {
            topology,
            first,
            count: vertex_count,
        });
    }

    fn create_shader(&self, stage: ShaderStage) -> ShaderId {
        let mut state = self.state.borrow_mut();
        let id = ShaderId(state.next_id());
        state.shaders.insert(id, stage);
        state.calls.push(DeviceCall::CreateShader(id, stage));
        id
    }

    fn compile_shader(&self, shader: ShaderId, source: &str) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        state.calls.push(DeviceCall::CompileShader(shader));
        if let Some(diagnostic) = &state.compile_failure {
            return Err(diagnostic.clone());
        }
        if source.trim().is_empty() {
            return Err("empty shader source".to_string());
        }
        Ok(())
    }

    fn delete_shader(&self, shader: ShaderId) {
        let mut state = self.state.borrow_mut();
        state.shaders.remove(&shader);
        state.calls.push(DeviceCall::DeleteShader(shader));
    }

    fn create_program(&self) -> ProgramId {
        let mut state = self.state.borrow_mut();
        let id = ProgramId(state.next_id());
        state.programs.insert(id, Vec::new());
        state.calls.push(DeviceCall::CreateProgram(id));
        id
    }

    fn attach_shader(&self, program: ProgramId, shader: ShaderId) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        state.calls.push(DeviceCall::AttachShader { program, shader });
        if !state.shaders.contains_key(&shader) {
            return Err(format!("unknown shader {}", shader.0));
        }
        match state.programs.get_mut(&program) {
            Some(attached) => {
                attached.push(shader);
                Ok(())
            }
            None => Err(format!("unknown program {}", program.0)),
        }
    }

    fn link_program(&self, program: ProgramId) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        state.calls.push(DeviceCall::LinkProgram(program));
        match state.programs.get(&program) {
            Some(attached) if attached.is_empty() => {
                Err("program has no attached shaders".to_string())
            }
            Some(_) => Ok(()),
            None => Err(format!("unknown program {}", program.0)),
        }
    }

    fn use_program(&self, program: Option<ProgramId>) {
        let mut state = self.state.borrow_mut();
        state.current_program = program;
        state.calls.push(DeviceCall::UseProgram(program));
    }

    fn delete_program(&self, program: ProgramId) {
        let mut state = self.state.borrow_mut();
        state.programs.remove(&program);
        if state.current_program == Some(program) {
            state.current_program = None;
        }
        state.calls.push(DeviceCall::DeleteProgram(program));
    }

    fn set_uniform(&self, program: ProgramId, name: &str, value: &UniformValue) {
        self.state.borrow_mut().calls.push(DeviceCall::SetUniform {
            program,
            name: name.to_string(),
            value: value.clone(),
        });
    }
}
