//! # Models
//!
//! A model is a list of [`Mesh`]es rendered with one shader program. Two
//! variants exist behind the [`Renderable`] interface:
//!
//! - [`RawModel`] - one mesh built eagerly from caller-supplied vertices, indices and texture paths
//! - [`AssetModel`] - meshes extracted lazily from a scene file, with textures shared through a [`TextureCache`]
//!
//! [`Model`] wraps either variant.
//!
//! ## Usage
//!
//! ```no_run
//! use std::rc::Rc;
//! use haggis_models::prelude::*;
//!
//! # fn main() -> haggis_models::Result<()> {
//! let context: GpuContext = Rc::new(RecordingDevice::new());
//! let program = ShaderProgram::from_sources(&context, "...", "...")?;
//!
//! let mut model: Model = AssetModel::new("assets/crate/crate.obj").into();
//! model.load(&context)?;
//! model.render(&*context, &program)?;
//! # Ok(())
//! # }
//! ```
//!
//! [`TextureCache`]: crate::gfx::resources::TextureCache

pub mod asset_model;
pub mod raw_model;

pub use asset_model::AssetModel;
pub use raw_model::RawModel;

use crate::error::Result;
use crate::gfx::device::{GpuContext, GraphicsDevice, TextureParameters};
use crate::gfx::mesh::Mesh;
use crate::gfx::scene::{ImportFlags, TextureKind};
use crate::gfx::shaders::ShaderProgram;
use crate::gfx::vertex::{DefaultVertex, Vertex};

/// Loading lifecycle of an [`AssetModel`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
    /// Terminal; the model holds no meshes
    Failed,
}

/// How an [`AssetModel`] imports its scene and textures.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadOptions {
    pub import_flags: ImportFlags,
    /// Material texture kinds to load, in binding order
    pub texture_kinds: Vec<TextureKind>,
    pub texture_parameters: TextureParameters,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            import_flags: ImportFlags::default(),
            texture_kinds: vec![TextureKind::Diffuse, TextureKind::Specular],
            texture_parameters: TextureParameters::default(),
        }
    }
}

impl LoadOptions {
    pub fn with_import_flags(mut self, flags: ImportFlags) -> Self {
        self.import_flags = flags;
        self
    }

    pub fn with_texture_kinds(mut self, kinds: impl IntoIterator<Item = TextureKind>) -> Self {
        self.texture_kinds = kinds.into_iter().collect();
        self
    }

    pub fn with_texture_parameters(mut self, parameters: TextureParameters) -> Self {
        self.texture_parameters = parameters;
        self
    }
}

/// Something that can be loaded and then drawn with a shader program.
pub trait Renderable {
    /// Loads GPU resources if not already loaded.
    fn load(&mut self, context: &GpuContext) -> Result<()>;

    /// Draws every mesh with `program`.
    fn render(&self, device: &dyn GraphicsDevice, program: &ShaderProgram) -> Result<()>;

    /// Meshes available for drawing; empty until loaded.
    fn meshes(&self) -> &[Mesh];
}

/// Either model variant.
pub enum Model<V: Vertex = DefaultVertex> {
    Raw(RawModel),
    Asset(AssetModel<V>),
}

impl<V: Vertex> Renderable for Model<V> {
    fn load(&mut self, context: &GpuContext) -> Result<()> {
        match self {
            Model::Raw(model) => model.load(context),
            Model::Asset(model) => model.load(context),
        }
    }

    fn render(&self, device: &dyn GraphicsDevice, program: &ShaderProgram) -> Result<()> {
        match self {
            Model::Raw(model) => model.render(device, program),
            Model::Asset(model) => model.render(device, program),
        }
    }

    fn meshes(&self) -> &[Mesh] {
        match self {
            Model::Raw(model) => model.meshes(),
            Model::Asset(model) => model.meshes(),
        }
    }
}

impl<V: Vertex> From<RawModel> for Model<V> {
    fn from(model: RawModel) -> Self {
        Model::Raw(model)
    }
}

impl<V: Vertex> From<AssetModel<V>> for Model<V> {
    fn from(model: AssetModel<V>) -> Self {
        Model::Asset(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::gfx::device::RecordingDevice;
    use crate::gfx::scene::{Scene, SceneMesh, SceneNode};
    use crate::gfx::test_support::{quad_vertices, test_program, CountingDecoder, MemoryImporter};
    use std::rc::Rc;

    fn triangle_scene() -> Scene {
        Scene {
            root: Some(SceneNode::new("root").with_meshes([0])),
            meshes: vec![SceneMesh {
                positions: vec![[0.0; 3]; 3],
                normals: vec![[0.0, 0.0, 1.0]; 3],
                faces: vec![vec![0, 1, 2]],
                ..SceneMesh::default()
            }],
            ..Scene::default()
        }
    }

    #[test]
    fn test_models_render_through_common_interface() {
        let device = Rc::new(RecordingDevice::new());
        let context: GpuContext = device.clone();
        let program = test_program(&context);

        let raw = RawModel::new(&context, &quad_vertices(), &[0, 1, 2, 0, 2, 3], &[] as &[&str], &CountingDecoder::new())
            .unwrap();
        let asset = AssetModel::<DefaultVertex>::with_loaders(
            "scene.obj",
            MemoryImporter::new(triangle_scene()),
            CountingDecoder::new(),
        );

        let mut models: Vec<Model> = vec![raw.into(), asset.into()];
        assert!(matches!(
            models[1].render(&*context, &program),
            Err(ModelError::Render { .. })
        ));

        for model in &mut models {
            model.load(&context).unwrap();
        }
        for model in &models {
            model.render(&*context, &program).unwrap();
        }

        let counts: Vec<u32> = device.draws().iter().map(|d| d.count).collect();
        assert_eq!(counts, vec![6, 3]);
        assert_eq!(models.iter().map(|m| m.meshes().len()).sum::<usize>(), 2);
    }

    #[test]
    fn test_default_load_options() {
        let options = LoadOptions::default();
        assert_eq!(
            options.texture_kinds,
            vec![TextureKind::Diffuse, TextureKind::Specular]
        );
        assert!(options.import_flags.flip_uvs);

        let options = options.with_texture_kinds([TextureKind::Normal]);
        assert_eq!(options.texture_kinds, vec![TextureKind::Normal]);
    }
}
