//! # Graphics Module
//!
//! Model loading and drawing on top of a small graphics device contract.
//!
//! ## Architecture Overview
//!
//! - **Device** ([`device`]) - the [`GraphicsDevice`] call contract, owned GPU handles, and the recording and wgpu backends
//! - **Vertex Layout** ([`vertex`]) - attribute kinds, compile-time vertex types, and layout installation
//! - **Scene Import** ([`scene`]) - format-independent scene graph and the OBJ importer
//! - **Resources** ([`resources`]) - image decoding, textures, and the per-model texture cache
//! - **Shaders** ([`shaders`]) - shader compilation and program linking
//! - **Meshes** ([`mesh`]) - uploaded vertex/index buffers plus their textures
//! - **Models** ([`model`]) - raw and asset-backed models behind a common interface
//!
//! ## Usage
//!
//! ```no_run
//! use std::rc::Rc;
//! use haggis_models::gfx::{device::GpuContext, AssetModel, RecordingDevice};
//!
//! let context: GpuContext = Rc::new(RecordingDevice::new());
//! let mut model = AssetModel::new("assets/backpack/backpack.obj");
//! model.load(&context).unwrap();
//! println!("{} meshes", model.meshes().len());
//! ```

pub mod device;
pub mod mesh;
pub mod model;
pub mod resources;
pub mod scene;
pub mod shaders;
pub mod vertex;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use device::{GpuContext, GraphicsDevice, RecordingDevice, WgpuDevice};
pub use mesh::Mesh;
pub use model::{AssetModel, Model, RawModel, Renderable};
pub use shaders::ShaderProgram;
