//! # Model Inspector
//!
//! Loads an OBJ model through the recording device, draws it once and prints
//! what reached the device.
//!
//! ## Usage:
//! ```bash
//! RUST_LOG=debug cargo run --example inspect_model -- assets/crate/crate.obj
//! ```
//!
//! ## What you'll see:
//! - Mesh count and per-mesh vertex/index/texture counts
//! - Unique textures held by the model's cache
//! - One draw per mesh with the texture units bound for it

use std::rc::Rc;

use anyhow::{bail, Context};
use haggis_models::prelude::*;

const VERTEX_SHADER: &str = "void main() { gl_Position = vec4(0.0); }";
const FRAGMENT_SHADER: &str = "void main() {}";

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: inspect_model <path/to/model.obj>");
    };

    let device = Rc::new(RecordingDevice::new());
    let context: GpuContext = device.clone();
    let program = ShaderProgram::from_sources(&context, VERTEX_SHADER, FRAGMENT_SHADER)
        .context("building inspection program")?;

    let mut model = AssetModel::new(&path);
    model
        .load(&context)
        .with_context(|| format!("loading '{path}'"))?;

    println!("Model: {}", model.path().display());
    println!("Meshes: {}", model.meshes().len());
    for (index, mesh) in model.meshes().iter().enumerate() {
        println!(
            "  [{index}] {} vertices, {} indices, {} triangles, {} textures",
            mesh.vertex_count(),
            mesh.index_count(),
            mesh.triangle_count(),
            mesh.textures().len()
        );
    }

    println!("Textures: {}", model.texture_cache().len());
    for (path, texture) in model.texture_cache().iter() {
        println!("  {} as '{}'", path.display(), texture.name());
    }

    program.use_program();
    model.render(&*context, &program)?;

    println!("Draws: {}", device.draws().len());
    for draw in device.draws() {
        let kind = if draw.indexed { "indexed" } else { "arrays" };
        println!(
            "  {:?} {kind} count={} texture units={:?}",
            draw.vertex_array,
            draw.count,
            draw.textures.iter().map(|(unit, _)| *unit).collect::<Vec<_>>()
        );
    }

    Ok(())
}
