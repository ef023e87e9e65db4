//! GPU-resident meshes

use std::rc::Rc;

use log::{trace, warn};

use crate::gfx::device::{
    BufferId, BufferTarget, GpuContext, GraphicsDevice, Owned, Topology, VertexArrayId,
};
use crate::gfx::resources::Texture;
use crate::gfx::shaders::ShaderProgram;
use crate::gfx::vertex::{LayoutInstaller, Vertex, VertexLayout};

/// Vertex/index buffers plus the textures a sub-mesh samples.
///
/// Construction uploads everything; a mesh is never modified afterwards.
/// Buffers are owned exclusively and released on drop; textures are shared.
#[derive(Debug)]
pub struct Mesh {
    vertex_array: Owned<VertexArrayId>,
    vertex_buffer: Owned<BufferId>,
    index_buffer: Option<Owned<BufferId>>,
    vertex_count: u32,
    index_count: u32,
    textures: Vec<Rc<Texture>>,
}

impl Mesh {
    /// Uploads typed vertices using the vertex type's layout.
    pub fn new<V: Vertex>(
        context: &GpuContext,
        vertices: &[V],
        indices: &[u32],
        textures: Vec<Rc<Texture>>,
    ) -> Self {
        debug_assert_eq!(V::layout().stride(), std::mem::size_of::<V>());
        Self::from_bytes(
            context,
            bytemuck::cast_slice(vertices),
            &V::layout(),
            indices,
            textures,
        )
    }

    /// Uploads raw interleaved vertex data described by `layout`.
    ///
    /// An empty `indices` slice makes the mesh draw by vertex count.
    pub fn from_bytes(
        context: &GpuContext,
        vertex_data: &[u8],
        layout: &VertexLayout,
        indices: &[u32],
        textures: Vec<Rc<Texture>>,
    ) -> Self {
        let stride = layout.stride();
        let vertex_count = if stride == 0 {
            0
        } else {
            vertex_data.len() / stride
        };
        let whole = vertex_count * stride;
        if stride > 0 && whole != vertex_data.len() {
            warn!(
                "Vertex data is {} bytes, not a multiple of the {}-byte stride; trailing {} bytes dropped",
                vertex_data.len(),
                stride,
                vertex_data.len() - whole
            );
        }
        let vertex_data = &vertex_data[..whole];
        let vertex_count = vertex_count as u32;
        let index_count = indices.len() as u32;

        // Create and bind vertex array object
        let vao = context.create_vertex_array();
        let vertex_array = Owned::new(context, vao);
        context.bind_vertex_array(Some(vao));

        let vbo = context.create_buffer();
        let vertex_buffer = Owned::new(context, vbo);
        context.bind_buffer(BufferTarget::Array, Some(vbo));
        context.upload_buffer(BufferTarget::Array, vertex_data);

        let index_buffer = (index_count > 0).then(|| {
            let ebo = context.create_buffer();
            let index_buffer = Owned::new(context, ebo);
            context.bind_buffer(BufferTarget::ElementArray, Some(ebo));
            context.upload_buffer(BufferTarget::ElementArray, bytemuck::cast_slice(indices));
            index_buffer
        });

        LayoutInstaller::new(layout).install(&**context);

        // Unbind so later drawing code cannot step over the setup
        context.bind_vertex_array(None);
        context.bind_buffer(BufferTarget::Array, None);

        trace!(
            "Mesh uploaded: {} vertices, {} indices, {} textures",
            vertex_count,
            index_count,
            textures.len()
        );

        Self {
            vertex_array,
            vertex_buffer,
            index_buffer,
            vertex_count,
            index_count,
            textures,
        }
    }

    /// Draws the mesh with `program`.
    ///
    /// Texture `i` is bound to unit `i` and the sampler uniform named after the
    /// texture is set to `i`. Everything bound here is unbound before returning.
    pub fn render(&self, device: &dyn GraphicsDevice, program: &ShaderProgram) {
        self.bind_textures(device, program);
        self.draw(device);
        self.unbind_textures(device);
    }

    fn bind_textures(&self, device: &dyn GraphicsDevice, program: &ShaderProgram) {
        for (unit, texture) in self.textures.iter().enumerate() {
            texture.bind(device, unit as u32);
            program.set_uniform(texture.name(), unit as i32);
        }
    }

    fn draw(&self, device: &dyn GraphicsDevice) {
        let Some(vao) = self.vertex_array.id() else {
            return;
        };
        device.bind_vertex_array(Some(vao));
        if self.index_count > 0 {
            device.draw_elements(Topology::Triangles, self.index_count);
        } else {
            device.draw_arrays(Topology::Triangles, 0, self.vertex_count);
        }
        device.bind_vertex_array(None);
    }

    fn unbind_textures(&self, device: &dyn GraphicsDevice) {
        for (unit, texture) in self.textures.iter().enumerate() {
            texture.unbind(device, unit as u32);
        }
    }

    /// Moves every device object and texture share into a new mesh.
    ///
    /// `self` is left empty: rendering it draws nothing and dropping it
    /// releases nothing.
    pub fn transfer(&mut self) -> Mesh {
        let moved = Mesh {
            vertex_array: self.vertex_array.transfer(),
            vertex_buffer: self.vertex_buffer.transfer(),
            index_buffer: self.index_buffer.as_mut().map(Owned::transfer),
            vertex_count: self.vertex_count,
            index_count: self.index_count,
            textures: std::mem::take(&mut self.textures),
        };
        self.vertex_count = 0;
        self.index_count = 0;
        moved
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn textures(&self) -> &[Rc<Texture>] {
        &self.textures
    }

    pub fn vertex_array(&self) -> Option<VertexArrayId> {
        self.vertex_array.id()
    }

    pub fn vertex_buffer(&self) -> Option<BufferId> {
        self.vertex_buffer.id()
    }

    pub fn index_buffer(&self) -> Option<BufferId> {
        self.index_buffer.as_ref().and_then(Owned::id)
    }

    /// Number of triangles submitted per draw.
    pub fn triangle_count(&self) -> u32 {
        if self.index_count > 0 {
            self.index_count / 3
        } else {
            self.vertex_count / 3
        }
    }
}
