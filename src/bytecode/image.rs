//! On-disk bytecode image.
//!
//! Two layouts are accepted when reading:
//!
//! * a raw instruction stream, exactly as produced by [`codec::encode`];
//! * a container: `ARCX`, a little-endian `u32` header length, a
//!   postcard-encoded [`ImageHeader`], then the raw instruction stream.
//!
//! A raw stream always starts with an opcode tag, and no tag byte equals
//! `b'A'`, so the magic alone tells the two apart.

use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::bytecode::{
    Program, SymbolTable,
    codec::{self, DecodeError, EncodeError},
};

pub const MAGIC: [u8; 4] = *b"ARCX";
pub const FORMAT_VERSION: u16 = 1;

const LENGTH_SIZE: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHeader {
    pub version: u16,
    pub instruction_count: u32,
    /// `symbols[i]` names slot `i`.
    pub symbols: Vec<String>,
}

/// A decoded image. `symbols` is only present for container images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub program: Program,
    pub symbols: Option<SymbolTable>,
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("image error: malformed header: {reason}")]
    Header { reason: String },

    #[error("image error: header needs {declared} bytes, only {available} remain")]
    HeaderLength { declared: usize, available: usize },

    #[error("image error: unsupported format version {found} (expected {expected})", expected = FORMAT_VERSION)]
    Version { found: u16 },

    #[error("image error: header declares {declared} instructions, stream holds {found}")]
    CountMismatch { declared: u32, found: usize },
}

/// Serializes `program`. With `symbols` the result is a container image,
/// without it a bare instruction stream.
pub fn to_bytes(program: &Program, symbols: Option<&SymbolTable>) -> Result<Vec<u8>, ImageError> {
    let Some(symbols) = symbols else {
        return Ok(codec::encode(program)?);
    };

    let header = ImageHeader {
        version: FORMAT_VERSION,
        instruction_count: u32::try_from(program.len()).map_err(|_| ImageError::Header {
            reason: format!("{} instructions do not fit the header", program.len()),
        })?,
        symbols: symbols.names().to_vec(),
    };
    let header_bytes = postcard::to_allocvec(&header).map_err(|e| ImageError::Header {
        reason: e.to_string(),
    })?;
    let header_len = u32::try_from(header_bytes.len()).map_err(|_| ImageError::Header {
        reason: "header too large".to_string(),
    })?;

    let mut out = Vec::with_capacity(MAGIC.len() + LENGTH_SIZE + header_bytes.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header_bytes);
    codec::encode_into(program, &mut out)?;
    Ok(out)
}

pub fn from_bytes(bytes: &[u8]) -> Result<Image, ImageError> {
    let Some(rest) = bytes.strip_prefix(&MAGIC) else {
        return Ok(Image {
            program: codec::decode(bytes)?,
            symbols: None,
        });
    };

    if rest.len() < LENGTH_SIZE {
        return Err(ImageError::HeaderLength {
            declared: LENGTH_SIZE,
            available: rest.len(),
        });
    }
    let (len_bytes, rest) = rest.split_at(LENGTH_SIZE);
    let mut len_buf = [0u8; LENGTH_SIZE];
    len_buf.copy_from_slice(len_bytes);
    let header_len = u32::from_le_bytes(len_buf) as usize;

    if rest.len() < header_len {
        return Err(ImageError::HeaderLength {
            declared: header_len,
            available: rest.len(),
        });
    }
    let (header_bytes, stream) = rest.split_at(header_len);
    let (header, unread): (ImageHeader, &[u8]) =
        postcard::take_from_bytes(header_bytes).map_err(|e| ImageError::Header {
            reason: e.to_string(),
        })?;
    if !unread.is_empty() {
        return Err(ImageError::Header {
            reason: format!("{} unread bytes after the header", unread.len()),
        });
    }

    if header.version != FORMAT_VERSION {
        return Err(ImageError::Version {
            found: header.version,
        });
    }

    let program = codec::decode(stream)?;
    if program.len() != header.instruction_count as usize {
        return Err(ImageError::CountMismatch {
            declared: header.instruction_count,
            found: program.len(),
        });
    }

    debug!(
        version = header.version,
        instructions = program.len(),
        symbols = header.symbols.len(),
        "read container image"
    );

    Ok(Image {
        program,
        symbols: Some(SymbolTable::from(header.symbols)),
    })
}

/// Writes `bytes` to a temporary file next to `path` and renames it over
/// `path` once everything is on disk. On error `path` is left untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    debug!(path = %path.display(), bytes = bytes.len(), "wrote image");
    Ok(())
}
