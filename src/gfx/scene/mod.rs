//! # Imported Scene Graph
//!
//! Format-independent representation of a parsed asset file, as produced by a
//! [`SceneImporter`]:
//!
//! - [`Scene`] - mesh and material tables plus the root [`SceneNode`]
//! - [`SceneNode`] - indices into the mesh table and child nodes
//! - [`SceneMesh`] - per-vertex attribute channels, faces and an optional material index
//! - [`SceneMaterial`] - texture paths per [`TextureKind`], relative to the asset file
//!
//! [`ObjImporter`] reads Wavefront OBJ/MTL files through `tobj`.

pub mod obj_importer;

use std::path::Path;

pub use obj_importer::ObjImporter;

/// Kind of texture slot a material can reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureKind {
    Diffuse,
    Specular,
    Normal,
    Ambient,
}

/// Post-processing requested from the importer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImportFlags {
    /// Split polygons into triangles
    pub triangulate: bool,
    /// Flip the vertical texture axis (v becomes 1 - v)
    pub flip_uvs: bool,
}

impl Default for ImportFlags {
    fn default() -> Self {
        Self {
            triangulate: true,
            flip_uvs: true,
        }
    }
}

/// Geometry of one imported sub-mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneMesh {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    /// UV channel 0, if the mesh has texture coordinates
    pub tex_coords: Option<Vec<[f32; 2]>>,
    /// Each face is an ordered list of vertex indices
    pub faces: Vec<Vec<u32>>,
    pub material_index: Option<usize>,
}

impl SceneMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

/// Named set of texture references attached to sub-meshes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneMaterial {
    pub name: String,
    textures: Vec<(TextureKind, String)>,
}

impl SceneMaterial {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            textures: Vec::new(),
        }
    }

    /// Adds a texture path to the next slot of `kind` (builder pattern).
    pub fn with_texture(mut self, kind: TextureKind, path: impl Into<String>) -> Self {
        self.add_texture(kind, path);
        self
    }

    pub fn add_texture(&mut self, kind: TextureKind, path: impl Into<String>) {
        self.textures.push((kind, path.into()));
    }

    pub fn texture_count(&self, kind: TextureKind) -> usize {
        self.textures.iter().filter(|(k, _)| *k == kind).count()
    }

    /// Path of the `slot`-th texture of `kind`, relative to the asset directory.
    pub fn texture_path(&self, kind: TextureKind, slot: usize) -> Option<&str> {
        self.textures
            .iter()
            .filter(|(k, _)| *k == kind)
            .nth(slot)
            .map(|(_, path)| path.as_str())
    }
}

/// Node of the scene hierarchy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneNode {
    pub name: String,
    /// Indices into [`Scene::meshes`]
    pub meshes: Vec<usize>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_meshes(mut self, meshes: impl IntoIterator<Item = usize>) -> Self {
        self.meshes.extend(meshes);
        self
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }
}

/// A parsed asset file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scene {
    pub root: Option<SceneNode>,
    pub meshes: Vec<SceneMesh>,
    pub materials: Vec<SceneMaterial>,
    /// Set by importers that could only partially read the file
    pub incomplete: bool,
}

/// Parses an asset file into a [`Scene`].
pub trait SceneImporter {
    /// Returns a human-readable reason when the file cannot be read or parsed.
    fn import(&self, path: &Path, flags: ImportFlags) -> Result<Scene, String>;
}
