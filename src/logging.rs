//! Logging setup for binaries built on the crate.
//!
//! The library only emits `tracing` events; installing a subscriber is up
//! to the program.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a compact stderr subscriber filtered by `RUST_LOG` (default `info`).
///
/// Calling it more than once is harmless; later calls are ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
