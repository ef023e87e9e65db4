//! Built-in vertex attribute kinds

use super::{AttributeDescriptor, VertexAttribute};
use crate::gfx::scene::SceneMesh;

/// Object-space position [x, y, z].
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Position(pub [f32; 3]);

impl VertexAttribute for Position {
    const DESCRIPTOR: AttributeDescriptor = AttributeDescriptor::float32(3);

    fn extract(mesh: &SceneMesh, index: usize) -> Self {
        Self(mesh.positions.get(index).copied().unwrap_or_default())
    }
}

/// Surface normal [nx, ny, nz] for lighting calculations.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Normal(pub [f32; 3]);

impl VertexAttribute for Normal {
    const DESCRIPTOR: AttributeDescriptor = AttributeDescriptor::float32(3);

    fn extract(mesh: &SceneMesh, index: usize) -> Self {
        Self(mesh.normals.get(index).copied().unwrap_or_default())
    }
}

/// Texture coordinate [u, v] from UV channel 0; zero when the mesh has no UVs.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TextureCoordinate(pub [f32; 2]);

impl VertexAttribute for TextureCoordinate {
    const DESCRIPTOR: AttributeDescriptor = AttributeDescriptor::float32(2);

    fn extract(mesh: &SceneMesh, index: usize) -> Self {
        let uv = mesh
            .tex_coords
            .as_ref()
            .and_then(|channel| channel.get(index))
            .copied()
            .unwrap_or_default();
        Self(uv)
    }
}
