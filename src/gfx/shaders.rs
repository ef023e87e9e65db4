//! Shader compilation and program linking
//!
//! Thin owners around device shader/program objects. Sources are compiled by
//! the device; failures carry the device diagnostic.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{ModelError, Result};
use crate::gfx::device::{GpuContext, Owned, ProgramId, ShaderId, UniformValue};

pub use crate::gfx::device::ShaderStage;

/// A compiled shader stage.
#[derive(Debug)]
pub struct Shader {
    stage: ShaderStage,
    path: Option<PathBuf>,
    handle: Owned<ShaderId>,
}

impl Shader {
    pub fn from_source(context: &GpuContext, stage: ShaderStage, source: &str) -> Result<Self> {
        let handle = Owned::new(context, context.create_shader(stage));
        if let Some(id) = handle.id() {
            context.compile_shader(id, source).map_err(ModelError::Compile)?;
        }
        Ok(Self {
            stage,
            path: None,
            handle,
        })
    }

    /// Reads and compiles the shader source at `path`.
    pub fn from_file(context: &GpuContext, stage: ShaderStage, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ModelError::ShaderSource {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Compiling {:?} shader '{}'", stage, path.display());
        let mut shader = Self::from_source(context, stage, &source)?;
        shader.path = Some(path.to_path_buf());
        Ok(shader)
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn handle(&self) -> Option<ShaderId> {
        self.handle.id()
    }
}

/// A linked program of shader stages.
#[derive(Debug)]
pub struct ShaderProgram {
    handle: Owned<ProgramId>,
}

impl ShaderProgram {
    pub fn new(context: &GpuContext) -> Self {
        Self {
            handle: Owned::new(context, context.create_program()),
        }
    }

    /// Compiles a vertex and a fragment stage and links them.
    pub fn from_sources(context: &GpuContext, vertex: &str, fragment: &str) -> Result<Self> {
        let vertex = Shader::from_source(context, ShaderStage::Vertex, vertex)?;
        let fragment = Shader::from_source(context, ShaderStage::Fragment, fragment)?;

        let mut program = Self::new(context);
        program.attach(&vertex)?;
        program.attach(&fragment)?;
        program.link()?;
        Ok(program)
    }

    pub fn attach(&mut self, shader: &Shader) -> Result<()> {
        match (self.handle.id(), shader.handle()) {
            (Some(program), Some(id)) => self
                .handle
                .context()
                .attach_shader(program, id)
                .map_err(ModelError::Link),
            _ => Err(ModelError::Link("cannot attach a released shader".to_string())),
        }
    }

    pub fn link(&self) -> Result<()> {
        match self.handle.id() {
            Some(program) => self
                .handle
                .context()
                .link_program(program)
                .map_err(ModelError::Link),
            None => Err(ModelError::Link("program has been released".to_string())),
        }
    }

    /// Makes this the active program.
    pub fn use_program(&self) {
        if let Some(program) = self.handle.id() {
            self.handle.context().use_program(Some(program));
        }
    }

    pub fn set_uniform(&self, name: &str, value: impl Into<UniformValue>) {
        if let Some(program) = self.handle.id() {
            self.handle
                .context()
                .set_uniform(program, name, &value.into());
        }
    }

    pub fn handle(&self) -> Option<ProgramId> {
        self.handle.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::RecordingDevice;
    use cgmath::{Matrix4, SquareMatrix, Vector3};
    use std::rc::Rc;

    const VERTEX: &str = "void main() { gl_Position = vec4(0.0); }";
    const FRAGMENT: &str = "void main() {}";

    #[test]
    fn test_program_from_sources_links() {
        let device = Rc::new(RecordingDevice::new());
        let context: GpuContext = device.clone();

        let program = ShaderProgram::from_sources(&context, VERTEX, FRAGMENT).unwrap();
        assert!(program.handle().is_some());
        assert_eq!(device.live_program_count(), 1);
        // Stages are released once linked into the program
        assert_eq!(device.live_shader_count(), 0);
    }

    #[test]
    fn test_compile_error_carries_diagnostic() {
        let device = Rc::new(RecordingDevice::new());
        let context: GpuContext = device.clone();
        device.fail_compilation("0:3: 'vec5' : undeclared identifier");

        let err = Shader::from_source(&context, ShaderStage::Vertex, VERTEX).unwrap_err();
        match err {
            ModelError::Compile(diagnostic) => assert!(diagnostic.contains("vec5")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(device.live_shader_count(), 0);
    }

    #[test]
    fn test_link_error_without_stages() {
        let device = Rc::new(RecordingDevice::new());
        let context: GpuContext = device.clone();

        let program = ShaderProgram::new(&context);
        assert!(matches!(program.link(), Err(ModelError::Link(_))));
    }

    #[test]
    fn test_missing_shader_file() {
        let device = Rc::new(RecordingDevice::new());
        let context: GpuContext = device.clone();

        let err = Shader::from_file(&context, ShaderStage::Fragment, "/no/such/shader.frag").unwrap_err();
        assert!(matches!(err, ModelError::ShaderSource { .. }));
    }

    #[test]
    fn test_uniforms_are_forwarded() {
        let device = Rc::new(RecordingDevice::new());
        let context: GpuContext = device.clone();
        let program = ShaderProgram::from_sources(&context, VERTEX, FRAGMENT).unwrap();

        program.set_uniform("light_position", Vector3::new(1.0_f32, 2.0, 3.0));
        program.set_uniform("model", Matrix4::<f32>::identity());
        program.set_uniform("diffuse", 0);

        let uniforms = device.uniforms_set(program.handle().unwrap());
        assert_eq!(uniforms.len(), 3);
        assert_eq!(uniforms[2], ("diffuse".to_string(), UniformValue::Int(0)));
    }
}
