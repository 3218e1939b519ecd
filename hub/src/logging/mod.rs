//! Structured logging setup for the Hub binary.
//!
//! Plain `tracing` + `tracing-subscriber`, matching the Spoke: no custom
//! log-transport layer, `RUST_LOG`-filterable `fmt` subscriber on stderr.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
