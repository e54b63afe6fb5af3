//! Trace export functionality
//!
//! Currently writes a JSON summary of a finished recording for inspection
//! and for feeding external chart renderers.

pub mod summary;

pub use summary::{summary_file_name, write_summary, TraceSummary};
