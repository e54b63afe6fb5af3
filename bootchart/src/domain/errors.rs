//! Structured error types for bootchart
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a sampling run.
///
/// Per-process read failures never surface here; they are skipped for the
/// tick in which they happen.
#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Failed to read {}: {source}", path.display())]
    GlobalFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot enumerate processes in {}: {source}", path.display())]
    ProcUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: invalid value for {key}: {value:?}", path.display())]
    InvalidValue { path: PathBuf, line: usize, key: String, value: String },
}
