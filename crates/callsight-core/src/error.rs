//! Error types for callsight-core.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug)]
pub enum Error {
    /// No ABI profile is available for this architecture.
    #[error("no ABI profile for architecture {}", .0.name())]
    UnsupportedAbi(crate::Architecture),
}
