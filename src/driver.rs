//! File-level build and run operations behind the `arc` binary.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::bytecode::{
    compile::{CompiledUnit, compile_tokens},
    image::{self, Image},
};
use crate::error::ArcError;
use crate::frontend::lexer::tokenize;
use crate::runtime::vm::{Execution, Vm, VmConfig};

pub const DEFAULT_OUTPUT: &str = "main.arx";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Write a bare instruction stream instead of a container image.
    pub raw: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub output: PathBuf,
    pub instructions: usize,
    pub bytes: usize,
}

pub fn compile_source(source: &str) -> Result<CompiledUnit, ArcError> {
    let tokens = tokenize(source)?;
    Ok(compile_tokens(&tokens)?)
}

/// Compiles `source` and serializes it; nothing touches the disk.
pub fn build_source(source: &str, options: &BuildOptions) -> Result<Vec<u8>, ArcError> {
    let unit = compile_source(source)?;
    let symbols = (!options.raw).then_some(&unit.symbols);
    Ok(image::to_bytes(&unit.program, symbols)?)
}

/// Compiles the file at `source_path` into `output`. The output file is only
/// replaced once the whole image has been produced.
pub fn build_file(
    source_path: &Path,
    output: &Path,
    options: &BuildOptions,
) -> Result<BuildReport, ArcError> {
    let source = fs::read_to_string(source_path).map_err(|source| ArcError::Read {
        path: source_path.to_path_buf(),
        source,
    })?;

    let unit = compile_source(&source)?;
    let symbols = (!options.raw).then_some(&unit.symbols);
    let bytes = image::to_bytes(&unit.program, symbols)?;

    image::write_atomic(output, &bytes).map_err(|source| ArcError::Write {
        path: output.to_path_buf(),
        source,
    })?;

    info!(
        source = %source_path.display(),
        output = %output.display(),
        instructions = unit.program.len(),
        bytes = bytes.len(),
        "build finished"
    );

    Ok(BuildReport {
        output: output.to_path_buf(),
        instructions: unit.program.len(),
        bytes: bytes.len(),
    })
}

pub fn load_image(path: &Path) -> Result<Image, ArcError> {
    let bytes = fs::read(path).map_err(|source| ArcError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image::from_bytes(&bytes)?)
}

pub fn run_image(image: &Image, config: &VmConfig) -> Result<Execution, ArcError> {
    let execution = Vm::with_config(config.clone()).run(&image.program)?;
    if execution.value.is_none() {
        warn!(steps = execution.steps, "program halted without RETURN");
    }
    Ok(execution)
}

pub fn run_file(path: &Path, config: &VmConfig) -> Result<Execution, ArcError> {
    let image = load_image(path)?;
    info!(path = %path.display(), instructions = image.program.len(), "running");
    run_image(&image, config)
}

/// Compiles and runs `source` in memory.
pub fn run_source(source: &str, config: &VmConfig) -> Result<Execution, ArcError> {
    let unit = compile_source(source)?;
    Ok(Vm::with_config(config.clone()).run(&unit.program)?)
}

/// The line the `run` command prints, if the program returned a value.
pub fn result_line(execution: &Execution) -> Option<String> {
    execution.value.map(|value| format!("Return: {}", value))
}
