//! Tracing setup for pipeline runs.
//!
//! The engine itself only emits `tracing` spans and events; hosts choose
//! the subscriber. These helpers cover the common cases: human-readable
//! output for local runs and JSON lines for log shippers. Both respect
//! `RUST_LOG` and fall back to `info`.

use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs a human-readable subscriber. Safe to call more than once; only
/// the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .try_init();
}

/// Installs a JSON-lines subscriber for structured log collection.
pub fn init_tracing_json() {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter())
        .try_init();
}
