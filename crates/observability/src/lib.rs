//! Tracing and logging setup shared by stockledger binaries.

/// Initialize process-wide tracing with the format chosen by
/// `STOCKLEDGER_LOG_FORMAT` (`json` unless set to `compact`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env());
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::LogFormat;
