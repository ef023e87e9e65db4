//! Image decoding for texture uploads

use std::path::{Path, PathBuf};

use crate::error::{ModelError, Result};

/// Tightly packed 8-bit RGB pixels.
///
/// The buffer is freed when the value drops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl DecodedImage {
    /// Checks that `pixels` holds exactly `width * height` RGB texels.
    pub fn new(path: &Path, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(ModelError::ImageData {
                path: path.to_path_buf(),
                reason: format!(
                    "expected {} bytes for {}x{} RGB, got {}",
                    expected,
                    width,
                    height,
                    pixels.len()
                ),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// Decodes an image file into RGB8 pixels.
pub trait ImageDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage>;
}

/// [`ImageDecoder`] backed by the `image` crate; any supported format is
/// converted to RGB8.
#[derive(Copy, Clone, Debug, Default)]
pub struct ImageCrateDecoder;

impl ImageDecoder for ImageCrateDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage> {
        let rgb = image::open(path)
            .map_err(|source| ModelError::ImageDecode {
                path: PathBuf::from(path),
                source,
            })?
            .to_rgb8();
        let (width, height) = rgb.dimensions();
        DecodedImage::new(path, width, height, rgb.into_raw())
    }
}
