//! Error types
//!
//! Every fallible operation in the crate returns [`Result<T>`], an alias for
//! `std::result::Result<T, ModelError>`.

use std::path::PathBuf;

use thiserror::Error;

/// Failure modes of model loading, texture decoding and shader setup.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The scene file is missing or unreadable, or the imported scene graph is malformed.
    #[error("Cannot load model '{}': {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    /// `render()` was called on a model that has not finished loading.
    #[error("Model '{}' not loaded before rendering", path.display())]
    Render { path: PathBuf },

    /// The device rejected a shader source; carries the device diagnostic.
    #[error("Shader compilation failed: {0}")]
    Compile(String),

    /// The device failed to attach or link a program; carries the device diagnostic.
    #[error("Program linking failed: {0}")]
    Link(String),

    #[error("Error loading shader source file '{}': {source}", path.display())]
    ShaderSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot decode image '{}': {source}", path.display())]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Decoded pixel data does not match its advertised dimensions.
    #[error("Invalid image data for '{}': {reason}", path.display())]
    ImageData { path: PathBuf, reason: String },

    /// The graphics device could not be created.
    #[error("Graphics device error: {0}")]
    Device(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
