//! Tracing and logging setup shared by every process.

pub use tracing::{LogFormat, ParseLogFormatError};

/// Install the process-wide subscriber with JSON output.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init(LogFormat::Json);
}

/// Install the process-wide subscriber with the given output format.
pub fn init_with(format: LogFormat) {
    tracing::init(format);
}

/// Subscriber configuration (filters, formats).
pub mod tracing;
