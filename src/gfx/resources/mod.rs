// src/gfx/resources/mod.rs
//! GPU resource management
//!
//! Handles image decoding, textures and per-model texture sharing.

pub mod decoder;
pub mod texture;
pub mod texture_cache;

// Re-export main types
pub use decoder::{DecodedImage, ImageCrateDecoder, ImageDecoder};
pub use texture::Texture;
pub use texture_cache::TextureCache;
