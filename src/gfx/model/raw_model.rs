//! Models built from caller-supplied geometry

use std::path::Path;
use std::rc::Rc;

use log::debug;

use super::Renderable;
use crate::error::Result;
use crate::gfx::device::{GpuContext, GraphicsDevice};
use crate::gfx::mesh::Mesh;
use crate::gfx::resources::{ImageDecoder, Texture};
use crate::gfx::shaders::ShaderProgram;
use crate::gfx::vertex::{Vertex, VertexLayout};

/// Exactly one mesh, created and uploaded at construction.
///
/// Every texture path gets its own freshly loaded [`Texture`]; repeated paths
/// are not shared.
#[derive(Debug)]
pub struct RawModel {
    meshes: Vec<Mesh>,
}

impl RawModel {
    pub fn new<V: Vertex, P: AsRef<Path>>(
        context: &GpuContext,
        vertices: &[V],
        indices: &[u32],
        texture_paths: &[P],
        decoder: &dyn ImageDecoder,
    ) -> Result<Self> {
        let textures = load_textures(context, texture_paths, decoder)?;
        Ok(Self {
            meshes: vec![Mesh::new(context, vertices, indices, textures)],
        })
    }

    /// Builds the mesh from interleaved floats laid out as `layout` describes.
    pub fn from_floats<P: AsRef<Path>>(
        context: &GpuContext,
        vertex_data: &[f32],
        layout: &VertexLayout,
        indices: &[u32],
        texture_paths: &[P],
        decoder: &dyn ImageDecoder,
    ) -> Result<Self> {
        let textures = load_textures(context, texture_paths, decoder)?;
        let mesh = Mesh::from_bytes(
            context,
            bytemuck::cast_slice(vertex_data),
            layout,
            indices,
            textures,
        );
        Ok(Self { meshes: vec![mesh] })
    }

    /// Already loaded at construction.
    pub fn load(&mut self, _context: &GpuContext) -> Result<()> {
        Ok(())
    }

    pub fn render(&self, device: &dyn GraphicsDevice, program: &ShaderProgram) -> Result<()> {
        for mesh in &self.meshes {
            mesh.render(device, program);
        }
        Ok(())
    }

    pub fn mesh(&self) -> &Mesh {
        &self.meshes[0]
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }
}

fn load_textures<P: AsRef<Path>>(
    context: &GpuContext,
    paths: &[P],
    decoder: &dyn ImageDecoder,
) -> Result<Vec<Rc<Texture>>> {
    paths
        .iter()
        .map(|path| {
            let mut texture = Texture::new(path.as_ref());
            texture.load(context, decoder)?;
            debug!("Raw model texture '{}' loaded", texture.path().display());
            Ok(Rc::new(texture))
        })
        .collect()
}

impl Renderable for RawModel {
    fn load(&mut self, context: &GpuContext) -> Result<()> {
        RawModel::load(self, context)
    }

    fn render(&self, device: &dyn GraphicsDevice, program: &ShaderProgram) -> Result<()> {
        RawModel::render(self, device, program)
    }

    fn meshes(&self) -> &[Mesh] {
        RawModel::meshes(self)
    }
}
