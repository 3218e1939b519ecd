//! Structured logging setup for the Spoke binary.
//!
//! Plain `tracing` + `tracing-subscriber`. There is no custom log-transport
//! layer: `tracing`'s `fmt` subscriber writes directly to stderr,
//! filterable via `RUST_LOG`.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
