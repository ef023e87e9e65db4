// src/lib.rs
//! Haggis Models
//!
//! 3D model loading for the Haggis engine: scene import, vertex layouts,
//! shared textures and lazily loaded models drawn through a graphics device.

// Lets `vertex_type!` name the bytemuck re-export by crate path inside this crate too
extern crate self as haggis_models;

pub mod error;
pub mod gfx;
pub mod prelude;

// Re-export main types for convenience
pub use error::{ModelError, Result};

#[doc(hidden)]
pub use bytemuck as __bytemuck;
