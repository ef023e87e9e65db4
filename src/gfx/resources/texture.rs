//! 2D textures loaded from image files

use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;

use super::decoder::ImageDecoder;
use crate::error::Result;
use crate::gfx::device::{GpuContext, GraphicsDevice, Owned, TextureId, TextureParameters};

/// A 2D texture backed by one device texture object.
///
/// Constructed without GPU storage; [`Texture::load`] decodes the image file and
/// uploads it. Models share loaded textures as `Rc<Texture>`; the device object
/// is released when the last share drops.
pub struct Texture {
    path: PathBuf,
    name: String,
    parameters: TextureParameters,
    handle: Option<Owned<TextureId>>,
}

impl Texture {
    /// Creates an unloaded texture whose shader name is the file stem of `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            name,
            parameters: TextureParameters::default(),
            handle: None,
        }
    }

    /// Overrides the sampler uniform name used in shaders.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_parameters(mut self, parameters: TextureParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Decodes the image and uploads it to a new device texture.
    ///
    /// Decoding happens first, so a decode failure leaves no device object
    /// behind. Loading an already loaded texture does nothing.
    pub fn load(&mut self, context: &GpuContext, decoder: &dyn ImageDecoder) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        let image = decoder.decode(&self.path)?;

        let id = context.create_texture();
        let handle = Owned::new(context, id);
        context.bind_texture(Some(id));
        context.set_texture_parameters(&self.parameters);
        context.upload_texture_rgb8(image.width(), image.height(), image.pixels());
        if self.parameters.generate_mipmap {
            context.generate_mipmap();
        }
        context.bind_texture(None);

        debug!(
            "Loaded texture '{}' ({}x{}) as '{}'",
            self.path.display(),
            image.width(),
            image.height(),
            self.name
        );
        self.handle = Some(handle);
        Ok(())
    }

    /// Binds the texture to texture unit `unit`.
    pub fn bind(&self, device: &dyn GraphicsDevice, unit: u32) {
        device.active_texture_unit(unit);
        device.bind_texture(self.handle());
    }

    /// Clears texture unit `unit`.
    pub fn unbind(&self, device: &dyn GraphicsDevice, unit: u32) {
        device.active_texture_unit(unit);
        device.bind_texture(None);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Identifier by which the texture is referenced in shaders.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &TextureParameters {
        &self.parameters
    }

    pub fn handle(&self) -> Option<TextureId> {
        self.handle.as_ref().and_then(Owned::id)
    }

    pub fn is_loaded(&self) -> bool {
        self.handle().is_some()
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("handle", &self.handle())
            .finish()
    }
}
