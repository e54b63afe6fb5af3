//! Domain model for bootchart
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern
//! - Stable arena handles in place of pointers
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{CpuId, Pid, ProcessId, SampleId, Seconds, TickId};

pub use errors::{ConfigError, SamplerError};
