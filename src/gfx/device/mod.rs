//! # Graphics Device Contract
//!
//! Every GPU-affecting operation in the crate goes through [`GraphicsDevice`], a
//! small bind-then-operate call contract in the shape of a classic immediate-mode
//! graphics API. The active device is never implied: callers hold a
//! [`GpuContext`] and pass it explicitly to constructors, loaders and `render`.
//!
//! Two implementations ship with the crate:
//!
//! - [`RecordingDevice`] - an in-memory device that records every call and
//!   tracks live resources, used for headless inspection and tests
//! - [`WgpuDevice`] - a wgpu-backed device whose draws are replayed on a
//!   `wgpu::RenderPass`
//!
//! GPU objects created through the contract are wrapped in [`Owned`], which
//! releases them when dropped.

pub mod headless;
pub mod wgpu_device;

use std::fmt;
use std::rc::Rc;

use cgmath::{Matrix2, Matrix3, Matrix4, Vector2, Vector3, Vector4};

pub use headless::{DeviceCall, DrawRecord, RecordingDevice};
pub use wgpu_device::{DrawRecorded, RecordedDraw, WgpuDevice};

use crate::gfx::vertex::ComponentType;

/// Shared handle to the graphics device owning the current context.
pub type GpuContext = Rc<dyn GraphicsDevice>;

macro_rules! device_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);
    };
}

device_id!(
    /// Vertex array object: captures attribute descriptions and the index buffer binding.
    VertexArrayId
);
device_id!(BufferId);
device_id!(TextureId);
device_id!(ShaderId);
device_id!(ProgramId);

/// Buffer binding point.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Per-vertex data
    Array,
    /// Index data, recorded in the bound vertex array
    ElementArray,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    Triangles,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Fragment,
}

/// Texture minification/magnification filter.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    Nearest,
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

/// Texture coordinate wrapping mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureWrap {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

/// Sampling parameters applied to a texture when it is loaded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextureParameters {
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub wrap_s: TextureWrap,
    pub wrap_t: TextureWrap,
    pub generate_mipmap: bool,
}

impl Default for TextureParameters {
    fn default() -> Self {
        Self {
            min_filter: TextureFilter::NearestMipmapLinear,
            mag_filter: TextureFilter::Linear,
            wrap_s: TextureWrap::Repeat,
            wrap_t: TextureWrap::Repeat,
            generate_mipmap: true,
        }
    }
}

impl TextureParameters {
    pub fn with_filters(mut self, min_filter: TextureFilter, mag_filter: TextureFilter) -> Self {
        self.min_filter = min_filter;
        self.mag_filter = mag_filter;
        self
    }

    pub fn with_wrap(mut self, wrap_s: TextureWrap, wrap_t: TextureWrap) -> Self {
        self.wrap_s = wrap_s;
        self.wrap_t = wrap_t;
        self
    }

    pub fn with_mipmaps(mut self, generate_mipmap: bool) -> Self {
        self.generate_mipmap = generate_mipmap;
        self
    }
}

/// One vertex attribute slot as registered with the device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttributeBinding {
    /// Shader layout location
    pub location: u32,
    pub component_count: u32,
    pub component_type: ComponentType,
    pub normalized: bool,
    /// Byte distance between consecutive vertices
    pub stride: usize,
    /// Byte offset of this attribute from the start of a vertex
    pub offset: usize,
}

/// Value assigned to a named shader uniform.
#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue {
    Int(i32),
    IVec2(Vector2<i32>),
    IVec3(Vector3<i32>),
    IVec4(Vector4<i32>),
    Float(f32),
    Vec2(Vector2<f32>),
    Vec3(Vector3<f32>),
    Vec4(Vector4<f32>),
    Mat2(Matrix2<f32>),
    Mat3(Matrix3<f32>),
    Mat4(Matrix4<f32>),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
    Vec3Array(Vec<Vector3<f32>>),
}

macro_rules! uniform_from {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for UniformValue {
                fn from(value: $ty) -> Self {
                    UniformValue::$variant(value)
                }
            }
        )+
    };
}

uniform_from! {
    i32 => Int,
    Vector2<i32> => IVec2,
    Vector3<i32> => IVec3,
    Vector4<i32> => IVec4,
    f32 => Float,
    Vector2<f32> => Vec2,
    Vector3<f32> => Vec3,
    Vector4<f32> => Vec4,
    Matrix2<f32> => Mat2,
    Matrix3<f32> => Mat3,
    Matrix4<f32> => Mat4,
    Vec<i32> => IntArray,
    Vec<f32> => FloatArray,
    Vec<Vector3<f32>> => Vec3Array,
}

/// The graphics device call contract.
///
/// Methods take `&self`; implementations keep their binding state behind
/// interior mutability. All calls must happen on the thread owning the device.
/// Operations that act on "the bound" object use the most recent
/// `bind_*`/`active_texture_unit` call.
pub trait GraphicsDevice {
    fn create_vertex_array(&self) -> VertexArrayId;
    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayId>);
    fn delete_vertex_array(&self, vertex_array: VertexArrayId);

    fn create_buffer(&self) -> BufferId;
    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferId>);
    /// Uploads `data` into the buffer bound to `target`.
    fn upload_buffer(&self, target: BufferTarget, data: &[u8]);
    fn delete_buffer(&self, buffer: BufferId);

    /// Describes an attribute of the bound vertex array, sourced from the bound array buffer.
    fn describe_vertex_attribute(&self, attribute: &VertexAttributeBinding);
    fn enable_vertex_attribute(&self, location: u32);

    fn create_texture(&self) -> TextureId;
    fn active_texture_unit(&self, unit: u32);
    /// Binds `texture` to the active texture unit.
    fn bind_texture(&self, texture: Option<TextureId>);
    fn set_texture_parameters(&self, parameters: &TextureParameters);
    /// Uploads tightly packed 8-bit RGB pixels into the bound texture.
    fn upload_texture_rgb8(&self, width: u32, height: u32, pixels: &[u8]);
    fn generate_mipmap(&self);
    fn delete_texture(&self, texture: TextureId);

    /// Draws `index_count` indices from the bound vertex array's index buffer.
    fn draw_elements(&self, topology: Topology, index_count: u32);
    fn draw_arrays(&self, topology: Topology, first: u32, vertex_count: u32);

    fn create_shader(&self, stage: ShaderStage) -> ShaderId;
    /// Compiles `source`, returning the device diagnostic on failure.
    fn compile_shader(&self, shader: ShaderId, source: &str) -> Result<(), String>;
    fn delete_shader(&self, shader: ShaderId);

    fn create_program(&self) -> ProgramId;
    fn attach_shader(&self, program: ProgramId, shader: ShaderId) -> Result<(), String>;
    fn link_program(&self, program: ProgramId) -> Result<(), String>;
    fn use_program(&self, program: Option<ProgramId>);
    fn delete_program(&self, program: ProgramId);
    fn set_uniform(&self, program: ProgramId, name: &str, value: &UniformValue);
}

/// A device object that can be released through the device contract.
pub trait DeviceResource: Copy + fmt::Debug {
    fn release(self, device: &dyn GraphicsDevice);
}

impl DeviceResource for VertexArrayId {
    fn release(self, device: &dyn GraphicsDevice) {
        device.delete_vertex_array(self);
    }
}

impl DeviceResource for BufferId {
    fn release(self, device: &dyn GraphicsDevice) {
        device.delete_buffer(self);
    }
}

impl DeviceResource for TextureId {
    fn release(self, device: &dyn GraphicsDevice) {
        device.delete_texture(self);
    }
}

impl DeviceResource for ShaderId {
    fn release(self, device: &dyn GraphicsDevice) {
        device.delete_shader(self);
    }
}

impl DeviceResource for ProgramId {
    fn release(self, device: &dyn GraphicsDevice) {
        device.delete_program(self);
    }
}

/// Single owner of one device object.
///
/// The object is released exactly once, when the owner drops. [`Owned::transfer`]
/// moves the object into a new owner and leaves this one empty, so dropping
/// the source afterwards releases nothing.
pub struct Owned<R: DeviceResource> {
    context: GpuContext,
    resource: Option<R>,
}

impl<R: DeviceResource> Owned<R> {
    pub fn new(context: &GpuContext, resource: R) -> Self {
        Self {
            context: Rc::clone(context),
            resource: Some(resource),
        }
    }

    /// The owned object, or `None` once ownership has been transferred away.
    pub fn id(&self) -> Option<R> {
        self.resource
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    pub fn transfer(&mut self) -> Self {
        Self {
            context: Rc::clone(&self.context),
            resource: self.resource.take(),
        }
    }
}

impl<R: DeviceResource> fmt::Debug for Owned<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&self.resource).finish()
    }
}

impl<R: DeviceResource> Drop for Owned<R> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            resource.release(&*self.context);
        }
    }
}
