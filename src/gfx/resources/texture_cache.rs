//! Per-model texture deduplication

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::debug;

use super::decoder::ImageDecoder;
use super::texture::Texture;
use crate::error::Result;
use crate::gfx::device::{GpuContext, TextureParameters};

/// Maps resolved texture paths to shared, loaded textures.
///
/// Holds at most one [`Texture`] per path for the lifetime of the cache.
#[derive(Debug, Default)]
pub struct TextureCache {
    entries: HashMap<PathBuf, Rc<Texture>>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared texture for `path`, loading it on first request.
    ///
    /// A hit clones the existing share without decoding or uploading again.
    pub fn get_or_load(
        &mut self,
        context: &GpuContext,
        path: &Path,
        decoder: &dyn ImageDecoder,
        parameters: &TextureParameters,
    ) -> Result<Rc<Texture>> {
        if let Some(texture) = self.entries.get(path) {
            debug!("Texture cache hit: '{}'", path.display());
            return Ok(Rc::clone(texture));
        }

        debug!("Texture cache miss: '{}'", path.display());
        let mut texture = Texture::new(path).with_parameters(*parameters);
        texture.load(context, decoder)?;

        let texture = Rc::new(texture);
        self.entries.insert(path.to_path_buf(), Rc::clone(&texture));
        Ok(texture)
    }

    pub fn get(&self, path: &Path) -> Option<Rc<Texture>> {
        self.entries.get(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Rc<Texture>)> {
        self.entries.iter().map(|(path, texture)| (path.as_path(), texture))
    }
}
