//! Tracing and logging setup shared by every process embedding the executor.

/// Initialize process-wide structured logging (JSON, `RUST_LOG` filter).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init_with(LogFormat::Json);
}

/// Tracing configuration (filters, output formats).
pub mod tracing;

pub use crate::tracing::{init_with, LogFormat, ParseLogFormatError};
