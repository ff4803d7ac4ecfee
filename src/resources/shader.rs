//! Shader programs built from multiplexed GLSL sources
//!
//! One file holds both stages of a program, each guarded by `VERTEX` or
//! `FRAGMENT`, and programs sharing a file are told apart by a define named
//! after the program. Before compiling, both stages are validated with naga
//! and the vertex stage's inputs are reflected into a [`ShaderInputLayout`].

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::resources::vertex_layout::{ShaderInput, ShaderInputLayout};
use naga::front::glsl::{Frontend, Options};
use naga::ShaderStage;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

const VERSION_DIRECTIVE: &str = "#version 450";

#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("Could not read shader {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to compile {stage:?} stage of '{program}':\n{log}")]
    Compile {
        program: String,
        stage: ShaderStage,
        log: String,
    },
    #[error("Program '{program}' has no {stage:?} entry point")]
    MissingEntryPoint { program: String, stage: ShaderStage },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Index into the [`ProgramLibrary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub usize);

/// Prefix a stage's source with the version and the program/stage defines
pub fn compose_stage_source(program_name: &str, stage: ShaderStage, source: &str) -> String {
    let stage_define = match stage {
        ShaderStage::Vertex => "VERTEX",
        ShaderStage::Fragment => "FRAGMENT",
        ShaderStage::Compute => "COMPUTE",
    };
    format!(
        "{}\n#define {}\n#define {}\n{}",
        VERSION_DIRECTIVE, program_name, stage_define, source
    )
}

fn parse_stage(program: &str, stage: ShaderStage, source: &str) -> Result<naga::Module, ShaderError> {
    let module = Frontend::default()
        .parse(&Options::from(stage), source)
        .map_err(|e| ShaderError::Compile {
            program: program.to_string(),
            stage,
            log: e.emit_to_string(source),
        })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator.validate(&module).map_err(|e| ShaderError::Compile {
        program: program.to_string(),
        stage,
        log: e.emit_to_string(source),
    })?;

    Ok(module)
}

/// Vertex inputs declared by a parsed vertex stage
fn reflect_vertex_inputs(program: &str, module: &naga::Module) -> Result<ShaderInputLayout, ShaderError> {
    let entry_point = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == ShaderStage::Vertex)
        .ok_or_else(|| ShaderError::MissingEntryPoint {
            program: program.to_string(),
            stage: ShaderStage::Vertex,
        })?;

    let inputs = entry_point
        .function
        .arguments
        .iter()
        .filter_map(|arg| {
            let Some(naga::Binding::Location { location, .. }) = &arg.binding else {
                return None;
            };
            let component_count = match module.types[arg.ty].inner {
                naga::TypeInner::Vector { size, .. } => size as u8,
                naga::TypeInner::Scalar(_) => 1,
                _ => return None,
            };
            Some(ShaderInput {
                location: *location as u8,
                component_count,
                name: arg.name.clone().unwrap_or_default(),
            })
        })
        .collect();

    Ok(ShaderInputLayout::new(inputs))
}

/// Stage sources and vertex inputs of a program that passed validation
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub descriptor: ProgramDescriptor,
    pub input_layout: ShaderInputLayout,
}

/// Compose, validate and reflect both stages of `program_name` from `source`
pub fn compile_program(program_name: &str, source: &str) -> Result<CompiledProgram, ShaderError> {
    let vertex_source = compose_stage_source(program_name, ShaderStage::Vertex, source);
    let fragment_source = compose_stage_source(program_name, ShaderStage::Fragment, source);

    let vertex_module = parse_stage(program_name, ShaderStage::Vertex, &vertex_source)?;
    parse_stage(program_name, ShaderStage::Fragment, &fragment_source)?;
    let input_layout = reflect_vertex_inputs(program_name, &vertex_module)?;

    Ok(CompiledProgram {
        descriptor: ProgramDescriptor {
            name: program_name.to_string(),
            vertex_source,
            fragment_source,
        },
        input_layout,
    })
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn read_source(path: &Path) -> Result<String, ShaderError> {
    std::fs::read_to_string(path).map_err(|source| ShaderError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// A compiled program and where it came from
#[derive(Debug, Clone)]
pub struct Program {
    pub name: String,
    pub path: PathBuf,
    pub handle: ProgramHandle,
    pub input_layout: ShaderInputLayout,
    pub last_modified: Option<SystemTime>,
    /// The last reload attempt failed and `handle` is the previous good program
    pub reload_failed: bool,
    pub last_error: Option<String>,
}

/// A program swapped out by hot reload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplacedProgram {
    pub id: ProgramId,
    pub old: ProgramHandle,
    pub new: ProgramHandle,
}

/// Program table with file-timestamp based hot reload
#[derive(Debug, Default)]
pub struct ProgramLibrary {
    programs: Vec<Program>,
}

impl ProgramLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ProgramId) -> Option<&Program> {
        self.programs.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Program> {
        self.programs.iter()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Compile program `name` from the multiplexed file at `path`
    pub fn load<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        path: &Path,
        name: &str,
    ) -> Result<ProgramId, ShaderError> {
        let last_modified = modified_time(path);
        let source = read_source(path)?;
        let compiled = compile_program(name, &source)?;
        let handle = backend.create_program(&compiled.descriptor)?;

        log::info!(
            "Loaded program {} from {} ({} vertex inputs)",
            name,
            path.display(),
            compiled.input_layout.inputs.len()
        );

        self.programs.push(Program {
            name: name.to_string(),
            path: path.to_path_buf(),
            handle,
            input_layout: compiled.input_layout,
            last_modified,
            reload_failed: false,
            last_error: None,
        });
        Ok(ProgramId(self.programs.len() - 1))
    }

    /// Recompile every program whose source file changed since it was loaded.
    ///
    /// A program that fails to compile keeps its previous handle and is
    /// flagged with `reload_failed`. Its timestamp still advances so the
    /// same broken file is not retried every frame.
    pub fn hot_reload<B: GraphicsBackend>(&mut self, backend: &mut B) -> Vec<ReplacedProgram> {
        let mut replaced = Vec::new();

        for (index, program) in self.programs.iter_mut().enumerate() {
            let Some(modified) = modified_time(&program.path) else {
                continue;
            };
            if program.last_modified.is_some_and(|last| modified <= last) {
                continue;
            }
            program.last_modified = Some(modified);

            let result = read_source(&program.path)
                .and_then(|source| compile_program(&program.name, &source))
                .and_then(|compiled| {
                    let handle = backend.create_program(&compiled.descriptor)?;
                    Ok((handle, compiled.input_layout))
                });

            match result {
                Ok((handle, input_layout)) => {
                    let old = program.handle;
                    backend.destroy_program(old);
                    program.handle = handle;
                    program.input_layout = input_layout;
                    program.reload_failed = false;
                    program.last_error = None;
                    log::info!("Reloaded program {}", program.name);
                    replaced.push(ReplacedProgram {
                        id: ProgramId(index),
                        old,
                        new: handle,
                    });
                }
                Err(e) => {
                    log::error!("Reload of {} failed, keeping previous program: {}", program.name, e);
                    program.reload_failed = true;
                    program.last_error = Some(e.to_string());
                }
            }
        }

        replaced
    }

    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        for program in self.programs.drain(..) {
            backend.destroy_program(program.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = r#"
#ifdef SIMPLE
#ifdef VERTEX
layout(location = 0) in vec3 aPosition;
layout(location = 2) in vec2 aTexCoord;
layout(location = 0) out vec2 vTexCoord;
void main() {
    vTexCoord = aTexCoord;
    gl_Position = vec4(aPosition, 1.0);
}
#endif
#ifdef FRAGMENT
layout(location = 0) in vec2 vTexCoord;
layout(location = 0) out vec4 oColor;
void main() {
    oColor = vec4(vTexCoord, 0.0, 1.0);
}
#endif
#endif
"#;

    #[test]
    fn test_compose_prefix() {
        let composed = compose_stage_source("SHADING_PASS", ShaderStage::Fragment, "void main() {}");
        assert_eq!(
            composed,
            "#version 450\n#define SHADING_PASS\n#define FRAGMENT\nvoid main() {}"
        );
    }

    #[test]
    fn test_reflects_vertex_inputs() {
        let compiled = compile_program("SIMPLE", SIMPLE).unwrap();
        let inputs = &compiled.input_layout.inputs;
        assert_eq!(inputs.len(), 2);
        assert_eq!((inputs[0].location, inputs[0].component_count), (0, 3));
        assert_eq!((inputs[1].location, inputs[1].component_count), (2, 2));
        assert!(compiled.descriptor.vertex_source.contains("#define VERTEX"));
    }

    #[test]
    fn test_compile_error_names_stage() {
        let broken = SIMPLE.replace("oColor = vec4(vTexCoord, 0.0, 1.0);", "oColor = undefined_value;");
        let err = compile_program("SIMPLE", &broken).unwrap_err();
        assert!(matches!(
            err,
            ShaderError::Compile {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_file() {
        let mut backend = crate::backend::RecordingBackend::new(64, 64);
        let mut library = ProgramLibrary::new();
        let result = library.load(&mut backend, Path::new("missing.glsl"), "SIMPLE");
        assert!(matches!(result, Err(ShaderError::Io { .. })));
    }
}
