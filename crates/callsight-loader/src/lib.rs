//! # callsight-loader
//!
//! Turns an ELF binary into the callsight-core program model: sections,
//! functions with intraprocedural CFGs, instruction register effects, PLT
//! stubs, and DWARF formal-parameter locations. This crate is the only one
//! that touches raw bytes; everything downstream works on the model.

pub mod cfg_builder;
pub mod disasm;
pub mod dwarf;
pub mod elf;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use callsight_core::Program;

/// Loader error type.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The input file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The input is not a parseable ELF file.
    #[error("failed to parse ELF: {0}")]
    Elf(#[from] goblin::error::Error),

    /// The binary targets an architecture the analyzer does not support.
    #[error("unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    /// The disassembler could not be constructed or failed on a region.
    #[error("disassembler error: {0}")]
    Disasm(capstone::Error),
}

/// Reads and loads a binary from disk.
pub fn load(path: &Path) -> Result<Program, LoadError> {
    let data = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_bytes(&data)
}

/// Loads a binary from an in-memory image.
pub fn load_bytes(data: &[u8]) -> Result<Program, LoadError> {
    elf::load_elf(data)
}
