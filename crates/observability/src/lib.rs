//! Process-wide logging setup shared by the binaries.

/// Initialize tracing for the process from `RUST_LOG` and
/// `TILESTOCK_LOG_FORMAT`.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Subscriber configuration (filter, output format).
pub mod tracing;

pub use tracing::{LogFormat, UnknownLogFormat};
