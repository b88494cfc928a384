use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::bytecode::{compile_error::CompileError, image::ImageError};
use crate::frontend::lexer::LexerError;
use crate::runtime::runtime_error::RuntimeFault;

/// Any failure of a build or run. Every variant is terminal.
#[derive(Debug, Error)]
pub enum ArcError {
    #[error("lexer error: {0}")]
    Lex(#[from] LexerError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Runtime(#[from] RuntimeFault),

    #[error("cannot read '{}': {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("cannot write '{}': {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}
