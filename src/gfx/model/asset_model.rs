//! Models loaded from scene files

use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, error, info};

use super::{LoadOptions, LoadState, Renderable};
use crate::error::{ModelError, Result};
use crate::gfx::device::{GpuContext, GraphicsDevice};
use crate::gfx::mesh::Mesh;
use crate::gfx::resources::{ImageCrateDecoder, ImageDecoder, Texture, TextureCache};
use crate::gfx::scene::{ObjImporter, Scene, SceneImporter, SceneMesh, SceneNode};
use crate::gfx::shaders::ShaderProgram;
use crate::gfx::vertex::{DefaultVertex, Vertex};

/// A model whose meshes come from a scene file.
///
/// Nothing is read or uploaded until [`AssetModel::load`]. Loading imports the
/// scene, walks the node tree in pre-order and builds one [`Mesh`] per
/// sub-mesh, with textures shared through a per-model [`TextureCache`].
/// Each sub-mesh vertex is extracted as a `V`.
pub struct AssetModel<V: Vertex = DefaultVertex> {
    path: PathBuf,
    parent_dir: PathBuf,
    state: LoadState,
    failure: Option<String>,
    meshes: Vec<Mesh>,
    textures: TextureCache,
    importer: Box<dyn SceneImporter>,
    decoder: Box<dyn ImageDecoder>,
    options: LoadOptions,
    _vertex: PhantomData<V>,
}

impl AssetModel {
    /// Creates an unloaded model for an OBJ file, decoding textures with the `image` crate.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::from_path(path)
    }
}

impl<V: Vertex> AssetModel<V> {
    /// Like [`AssetModel::new`], for any vertex type.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::with_loaders(path, ObjImporter::new(), ImageCrateDecoder)
    }

    pub fn with_loaders(
        path: impl Into<PathBuf>,
        importer: impl SceneImporter + 'static,
        decoder: impl ImageDecoder + 'static,
    ) -> Self {
        let path = path.into();
        let parent_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            path,
            parent_dir,
            state: LoadState::Unloaded,
            failure: None,
            meshes: Vec::new(),
            textures: TextureCache::new(),
            importer: Box::new(importer),
            decoder: Box::new(decoder),
            options: LoadOptions::default(),
            _vertex: PhantomData,
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    /// Imports the scene and builds every mesh, once.
    ///
    /// Subsequent calls after success do nothing. A failure discards every mesh
    /// and texture built so far and leaves the model in the terminal
    /// [`LoadState::Failed`] state; later calls report the same failure.
    pub fn load(&mut self, context: &GpuContext) -> Result<()> {
        match self.state {
            LoadState::Loaded => return Ok(()),
            LoadState::Failed => {
                return Err(self.load_error(format!(
                    "previous load failed: {}",
                    self.failure.as_deref().unwrap_or("unknown error")
                )))
            }
            LoadState::Unloaded | LoadState::Loading => {}
        }

        self.state = LoadState::Loading;
        match self.build(context) {
            Ok((meshes, textures)) => {
                info!(
                    "Loaded model '{}': {} meshes, {} textures",
                    self.path.display(),
                    meshes.len(),
                    textures.len()
                );
                self.meshes = meshes;
                self.textures = textures;
                self.state = LoadState::Loaded;
                Ok(())
            }
            Err(e) => {
                error!("Failed to load model '{}': {}", self.path.display(), e);
                self.failure = Some(e.to_string());
                self.state = LoadState::Failed;
                Err(e)
            }
        }
    }

    /// Draws every mesh in traversal order.
    ///
    /// Fails with [`ModelError::Render`] unless the model is loaded; rendering
    /// never triggers a load.
    pub fn render(&self, device: &dyn GraphicsDevice, program: &ShaderProgram) -> Result<()> {
        if self.state != LoadState::Loaded {
            return Err(ModelError::Render {
                path: self.path.clone(),
            });
        }
        for mesh in &self.meshes {
            mesh.render(device, program);
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state == LoadState::Loaded
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn texture_cache(&self) -> &TextureCache {
        &self.textures
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    fn load_error(&self, reason: impl Into<String>) -> ModelError {
        ModelError::Load {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    /// Runs the import and traversal into fresh containers, so nothing is
    /// committed to `self` unless every step succeeds.
    fn build(&self, context: &GpuContext) -> Result<(Vec<Mesh>, TextureCache)> {
        let scene = self
            .importer
            .import(&self.path, self.options.import_flags)
            .map_err(|reason| self.load_error(reason))?;
        if scene.incomplete {
            return Err(self.load_error("scene is incomplete"));
        }
        let root = scene
            .root
            .as_ref()
            .ok_or_else(|| self.load_error("scene has no root node"))?;

        let mut traversal = Traversal {
            model: self,
            context,
            scene: &scene,
            meshes: Vec::new(),
            textures: TextureCache::new(),
        };
        traversal.process_node(root)?;
        Ok((traversal.meshes, traversal.textures))
    }
}

/// Working state of one pre-order walk over a scene.
struct Traversal<'a, V: Vertex> {
    model: &'a AssetModel<V>,
    context: &'a GpuContext,
    scene: &'a Scene,
    meshes: Vec<Mesh>,
    textures: TextureCache,
}

impl<V: Vertex> Traversal<'_, V> {
    /// Processes the node's meshes, then recurses into each child in order.
    fn process_node(&mut self, node: &SceneNode) -> Result<()> {
        for &mesh_index in &node.meshes {
            let raw_mesh = self.scene.meshes.get(mesh_index).ok_or_else(|| {
                self.model.load_error(format!(
                    "node '{}' references missing mesh {}",
                    node.name, mesh_index
                ))
            })?;
            let mesh = self.process_mesh(raw_mesh)?;
            self.meshes.push(mesh);
        }
        for child in &node.children {
            self.process_node(child)?;
        }
        Ok(())
    }

    fn process_mesh(&mut self, raw_mesh: &SceneMesh) -> Result<Mesh> {
        let vertices = collect_vertices::<V>(raw_mesh);
        let indices = collect_indices(raw_mesh);
        let textures = self.collect_textures(raw_mesh)?;
        debug!(
            "Mesh '{}': {} vertices, {} indices, {} textures",
            raw_mesh.name,
            vertices.len(),
            indices.len(),
            textures.len()
        );
        Ok(Mesh::new(self.context, &vertices, &indices, textures))
    }

    fn collect_textures(&mut self, raw_mesh: &SceneMesh) -> Result<Vec<Rc<Texture>>> {
        let mut textures = Vec::new();
        let Some(material_index) = raw_mesh.material_index else {
            return Ok(textures);
        };
        let material = self.scene.materials.get(material_index).ok_or_else(|| {
            self.model.load_error(format!(
                "mesh '{}' references missing material {}",
                raw_mesh.name, material_index
            ))
        })?;

        for &kind in &self.model.options.texture_kinds {
            for slot in 0..material.texture_count(kind) {
                let Some(relative) = material.texture_path(kind, slot) else {
                    continue;
                };
                let path = self.model.parent_dir.join(relative);
                let texture = self.textures.get_or_load(
                    self.context,
                    &path,
                    self.model.decoder.as_ref(),
                    &self.model.options.texture_parameters,
                )?;
                textures.push(texture);
            }
        }
        Ok(textures)
    }
}

fn collect_vertices<V: Vertex>(raw_mesh: &SceneMesh) -> Vec<V> {
    (0..raw_mesh.vertex_count())
        .map(|index| V::extract(raw_mesh, index))
        .collect()
}

/// Flattens faces in face order, then within-face order.
fn collect_indices(raw_mesh: &SceneMesh) -> Vec<u32> {
    raw_mesh.faces.iter().flatten().copied().collect()
}

impl<V: Vertex> Renderable for AssetModel<V> {
    fn load(&mut self, context: &GpuContext) -> Result<()> {
        AssetModel::load(self, context)
    }

    fn render(&self, device: &dyn GraphicsDevice, program: &ShaderProgram) -> Result<()> {
        AssetModel::render(self, device, program)
    }

    fn meshes(&self) -> &[Mesh] {
        AssetModel::meshes(self)
    }
}

impl<V: Vertex> fmt::Debug for AssetModel<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetModel")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("meshes", &self.meshes.len())
            .field("textures", &self.textures.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::RecordingDevice;
    use crate::gfx::scene::{SceneMaterial, TextureKind};
    use crate::gfx::test_support::{test_program, CountingDecoder, MemoryImporter};
    use crate::gfx::vertex::{Position, TextureCoordinate};

    fn context() -> (Rc<RecordingDevice>, GpuContext) {
        let device = Rc::new(RecordingDevice::new());
        let context: GpuContext = device.clone();
        (device, context)
    }

    /// Sub-mesh with `n` vertices, one triangle per three vertices.
    fn raw_mesh(name: &str, n: usize, material_index: Option<usize>) -> SceneMesh {
        SceneMesh {
            name: name.to_string(),
            positions: (0..n).map(|i| [i as f32, 0.0, 0.0]).collect(),
            normals: vec![[0.0, 1.0, 0.0]; n],
            tex_coords: None,
            faces: (0..n as u32 / 3)
                .map(|t| vec![t * 3, t * 3 + 1, t * 3 + 2])
                .collect(),
            material_index,
        }
    }

    /// Root with meshes 0 and 1, one child with mesh 2.
    fn nested_scene() -> Scene {
        Scene {
            root: Some(
                SceneNode::new("root")
                    .with_meshes([0, 1])
                    .with_child(SceneNode::new("child").with_meshes([2])),
            ),
            meshes: vec![
                raw_mesh("root0", 3, None),
                raw_mesh("root1", 6, None),
                raw_mesh("child0", 9, None),
            ],
            ..Scene::default()
        }
    }

    fn shared_texture_scene() -> Scene {
        Scene {
            root: Some(SceneNode::new("root").with_meshes([0, 1])),
            meshes: vec![raw_mesh("a", 3, Some(0)), raw_mesh("b", 3, Some(1))],
            materials: vec![
                SceneMaterial::new("first")
                    .with_texture(TextureKind::Diffuse, "textures/brick.png")
                    .with_texture(TextureKind::Specular, "textures/brick_spec.png"),
                SceneMaterial::new("second").with_texture(TextureKind::Diffuse, "textures/brick.png"),
            ],
            ..Scene::default()
        }
    }

    #[test]
    fn test_traversal_is_pre_order() {
        let (_device, context) = context();
        let mut model = AssetModel::<DefaultVertex>::with_loaders(
            "assets/scene.obj",
            MemoryImporter::new(nested_scene()),
            CountingDecoder::new(),
        );
        model.load(&context).unwrap();

        let counts: Vec<u32> = model.meshes().iter().map(Mesh::vertex_count).collect();
        assert_eq!(counts, vec![3, 6, 9]);
        assert_eq!(model.meshes()[2].index_count(), 9);
    }

    #[test]
    fn test_shared_diffuse_texture_loaded_once() {
        let (device, context) = context();
        let decoder = CountingDecoder::new();
        let decodes = decoder.counter();
        let mut model = AssetModel::<DefaultVertex>::with_loaders(
            "assets/scene.obj",
            MemoryImporter::new(shared_texture_scene()),
            decoder,
        );
        model.load(&context).unwrap();

        let meshes = model.meshes();
        assert_eq!(meshes[0].textures().len(), 2);
        assert_eq!(meshes[1].textures().len(), 1);
        assert!(Rc::ptr_eq(&meshes[0].textures()[0], &meshes[1].textures()[0]));

        // Diffuse before specular, paths resolved against the asset directory
        assert_eq!(
            meshes[0].textures()[0].path(),
            Path::new("assets/textures/brick.png")
        );
        assert_eq!(meshes[0].textures()[1].name(), "brick_spec");

        assert_eq!(decodes.get(), 2);
        assert_eq!(device.texture_upload_count(), 2);
        assert_eq!(model.texture_cache().len(), 2);
        assert!(model
            .texture_cache()
            .contains(Path::new("assets/textures/brick.png")));
    }

    #[test]
    fn test_render_before_load_fails_without_drawing() {
        let (device, context) = context();
        let program = test_program(&context);
        let model = AssetModel::<DefaultVertex>::with_loaders(
            "assets/scene.obj",
            MemoryImporter::new(nested_scene()),
            CountingDecoder::new(),
        );

        let err = model.render(&*context, &program).unwrap_err();
        assert!(matches!(err, ModelError::Render { .. }));
        assert!(err.to_string().contains("not loaded"));
        assert!(device.draws().is_empty());
        assert_eq!(model.state(), LoadState::Unloaded);
    }

    #[test]
    fn test_render_draws_meshes_in_order() {
        let (device, context) = context();
        let program = test_program(&context);
        let mut model = AssetModel::<DefaultVertex>::with_loaders(
            "assets/scene.obj",
            MemoryImporter::new(nested_scene()),
            CountingDecoder::new(),
        );
        model.load(&context).unwrap();
        model.render(&*context, &program).unwrap();

        let draws = device.draws();
        let order: Vec<_> = draws.iter().map(|d| d.vertex_array).collect();
        let expected: Vec<_> = model.meshes().iter().map(Mesh::vertex_array).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn test_load_is_idempotent() {
        let (device, context) = context();
        let importer = MemoryImporter::new(shared_texture_scene());
        let imports = importer.counter();
        let decoder = CountingDecoder::new();
        let decodes = decoder.counter();
        let mut model = AssetModel::<DefaultVertex>::with_loaders("assets/scene.obj", importer, decoder);

        model.load(&context).unwrap();
        let first: Vec<_> = model.meshes().iter().map(Mesh::vertex_array).collect();
        model.load(&context).unwrap();
        let second: Vec<_> = model.meshes().iter().map(Mesh::vertex_array).collect();

        assert_eq!(imports.get(), 1);
        assert_eq!(decodes.get(), 2);
        assert_eq!(first, second);
        assert_eq!(device.live_vertex_array_count(), 2);
        assert!(model.is_loaded());
    }

    #[test]
    fn test_import_failure_is_load_error() {
        let (_device, context) = context();
        let mut model = AssetModel::<DefaultVertex>::with_loaders(
            "missing.obj",
            MemoryImporter::failing(),
            CountingDecoder::new(),
        );

        let err = model.load(&context).unwrap_err();
        match err {
            ModelError::Load { path, .. } => assert_eq!(path, PathBuf::from("missing.obj")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(model.state(), LoadState::Failed);
        assert!(model.meshes().is_empty());
    }

    #[test]
    fn test_incomplete_or_rootless_scene_is_rejected() {
        let (_device, context) = context();

        let incomplete = Scene {
            incomplete: true,
            ..nested_scene()
        };
        let mut model = AssetModel::<DefaultVertex>::with_loaders(
            "a.obj",
            MemoryImporter::new(incomplete),
            CountingDecoder::new(),
        );
        assert!(matches!(model.load(&context), Err(ModelError::Load { .. })));

        let rootless = Scene {
            root: None,
            ..nested_scene()
        };
        let mut model = AssetModel::<DefaultVertex>::with_loaders(
            "b.obj",
            MemoryImporter::new(rootless),
            CountingDecoder::new(),
        );
        assert!(matches!(model.load(&context), Err(ModelError::Load { .. })));
    }

    #[test]
    fn test_failure_mid_traversal_discards_everything() {
        let (device, context) = context();
        let importer = MemoryImporter::new(shared_texture_scene());
        let imports = importer.counter();
        // Second material's texture is shared; fail on the specular map of the first
        let mut model = AssetModel::<DefaultVertex>::with_loaders(
            "assets/scene.obj",
            importer,
            CountingDecoder::failing_on("brick_spec.png"),
        );

        assert!(model.load(&context).is_err());
        assert_eq!(model.state(), LoadState::Failed);
        assert!(!model.is_loaded());
        assert!(model.meshes().is_empty());
        assert!(model.texture_cache().is_empty());
        assert_eq!(device.live_texture_count(), 0);
        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(device.live_vertex_array_count(), 0);

        // Failed is terminal
        assert!(model.load(&context).is_err());
        assert_eq!(imports.get(), 1);
    }

    #[test]
    fn test_missing_mesh_or_material_reference_fails() {
        let (_device, context) = context();
        let scene = Scene {
            root: Some(SceneNode::new("root").with_meshes([0, 5])),
            meshes: vec![raw_mesh("only", 3, None)],
            ..Scene::default()
        };
        let mut model = AssetModel::<DefaultVertex>::with_loaders(
            "a.obj",
            MemoryImporter::new(scene),
            CountingDecoder::new(),
        );
        assert!(matches!(model.load(&context), Err(ModelError::Load { .. })));

        let scene = Scene {
            root: Some(SceneNode::new("root").with_meshes([0])),
            meshes: vec![raw_mesh("only", 3, Some(2))],
            ..Scene::default()
        };
        let mut model = AssetModel::<DefaultVertex>::with_loaders(
            "b.obj",
            MemoryImporter::new(scene),
            CountingDecoder::new(),
        );
        assert!(matches!(model.load(&context), Err(ModelError::Load { .. })));
    }

    #[test]
    fn test_texture_kinds_option_filters_slots() {
        let (_device, context) = context();
        let mut model = AssetModel::<DefaultVertex>::with_loaders(
            "assets/scene.obj",
            MemoryImporter::new(shared_texture_scene()),
            CountingDecoder::new(),
        )
        .with_options(LoadOptions::default().with_texture_kinds([TextureKind::Specular]));
        model.load(&context).unwrap();

        assert_eq!(model.meshes()[0].textures().len(), 1);
        assert_eq!(model.meshes()[0].textures()[0].name(), "brick_spec");
        assert!(model.meshes()[1].textures().is_empty());
    }

    #[test]
    fn test_custom_vertex_type_extraction() {
        crate::vertex_type! {
            struct FlatVertex {
                position: Position,
                uv: TextureCoordinate,
            }
        }

        let (device, context) = context();
        let mut model = AssetModel::<FlatVertex>::with_loaders(
            "assets/scene.obj",
            MemoryImporter::new(nested_scene()),
            CountingDecoder::new(),
        );
        model.load(&context).unwrap();

        let mesh = &model.meshes()[0];
        let attributes = device.vertex_attributes(mesh.vertex_array().unwrap());
        assert_eq!(attributes.len(), 2);
        assert!(attributes.iter().all(|a| a.stride == 20));
        assert_eq!(device.buffer_size(mesh.vertex_buffer().unwrap()), Some(3 * 20));
    }

    #[test]
    fn test_indices_flatten_faces_in_order() {
        let mesh = SceneMesh {
            faces: vec![vec![2, 1, 0], vec![3, 4, 5, 6]],
            ..SceneMesh::default()
        };
        assert_eq!(collect_indices(&mesh), vec![2, 1, 0, 3, 4, 5, 6]);
    }
}
