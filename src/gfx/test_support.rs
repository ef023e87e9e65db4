//! Shared fakes for unit tests

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::{ModelError, Result};
use crate::gfx::device::GpuContext;
use crate::gfx::resources::{DecodedImage, ImageDecoder};
use crate::gfx::scene::{ImportFlags, Scene, SceneImporter};
use crate::gfx::shaders::ShaderProgram;
use crate::gfx::vertex::{DefaultVertex, Normal, Position, TextureCoordinate};

/// Decoder producing 2x2 images and counting decodes.
#[derive(Default)]
pub struct CountingDecoder {
    decodes: Rc<Cell<usize>>,
    failing: Option<PathBuf>,
}

impl CountingDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails for any path ending in `file_name`.
    pub fn failing_on(file_name: &str) -> Self {
        Self {
            failing: Some(PathBuf::from(file_name)),
            ..Self::default()
        }
    }

    pub fn decode_count(&self) -> usize {
        self.decodes.get()
    }

    /// Shares the counter with a decoder moved into a model.
    pub fn counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.decodes)
    }
}

impl ImageDecoder for CountingDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage> {
        self.decodes.set(self.decodes.get() + 1);
        if let Some(failing) = &self.failing {
            if path.ends_with(failing) {
                return Err(ModelError::ImageData {
                    path: path.to_path_buf(),
                    reason: "corrupt".to_string(),
                });
            }
        }
        DecodedImage::new(path, 2, 2, vec![128; 12])
    }
}

/// Importer returning a prepared scene and counting imports.
pub struct MemoryImporter {
    scene: Option<Scene>,
    imports: Rc<Cell<usize>>,
}

impl MemoryImporter {
    pub fn new(scene: Scene) -> Self {
        Self {
            scene: Some(scene),
            imports: Rc::default(),
        }
    }

    /// Importer that reports the file as unreadable.
    pub fn failing() -> Self {
        Self {
            scene: None,
            imports: Rc::default(),
        }
    }

    pub fn counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.imports)
    }
}

impl SceneImporter for MemoryImporter {
    fn import(&self, path: &Path, _flags: ImportFlags) -> std::result::Result<Scene, String> {
        self.imports.set(self.imports.get() + 1);
        self.scene
            .clone()
            .ok_or_else(|| format!("no such file: {}", path.display()))
    }
}

pub fn quad_vertices() -> Vec<DefaultVertex> {
    [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]
        .into_iter()
        .map(|[x, y]| DefaultVertex {
            position: Position([x, y, 0.0]),
            normal: Normal([0.0, 0.0, 1.0]),
            tex_coord: TextureCoordinate([x, y]),
        })
        .collect()
}

pub fn test_program(context: &GpuContext) -> ShaderProgram {
    ShaderProgram::from_sources(context, "void main() {}", "void main() {}")
        .expect("test program links")
}
