//! # Haggis Models Prelude
//!
//! Commonly used types and traits in one import.
//!
//! ## Usage
//!
//! ```no_run
//! use std::rc::Rc;
//! use haggis_models::prelude::*;
//!
//! fn main() -> haggis_models::Result<()> {
//!     let context: GpuContext = Rc::new(RecordingDevice::new());
//!     let program = ShaderProgram::from_sources(&context, "...", "...")?;
//!
//!     let mut model = AssetModel::new("assets/crate/crate.obj")
//!         .with_options(LoadOptions::default().with_texture_kinds([TextureKind::Diffuse]));
//!     model.load(&context)?;
//!     model.render(&*context, &program)?;
//!     Ok(())
//! }
//! ```

// Re-export error handling
pub use crate::error::{ModelError, Result};

// Re-export device types
pub use crate::gfx::device::{
    DrawRecorded, GpuContext, GraphicsDevice, RecordingDevice, TextureFilter, TextureParameters,
    TextureWrap, UniformValue, WgpuDevice,
};

// Re-export vertex layout types
pub use crate::gfx::vertex::{
    AttributeDescriptor, ComponentType, DefaultVertex, LayoutInstaller, Normal, Position,
    TextureCoordinate, Vertex, VertexAttribute, VertexLayout,
};

// Re-export scene import
pub use crate::gfx::scene::{ImportFlags, ObjImporter, SceneImporter, TextureKind};

// Re-export resources
pub use crate::gfx::resources::{ImageCrateDecoder, ImageDecoder, Texture, TextureCache};

// Re-export models and drawing
pub use crate::gfx::mesh::Mesh;
pub use crate::gfx::model::{AssetModel, LoadOptions, LoadState, Model, RawModel, Renderable};
pub use crate::gfx::shaders::{Shader, ShaderProgram, ShaderStage};

// Re-export the vertex declaration macro
pub use crate::vertex_type;

// Re-export common external dependencies
pub use cgmath::{Matrix4, Vector2, Vector3};
