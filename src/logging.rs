//! Tracing subscriber setup for binaries embedding the engine.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "resource_manager=info";

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to `default_filter`.
/// A second call is a no-op.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
