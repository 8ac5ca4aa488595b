//! Tracing/logging initialization for engine hosts.

use tracing_subscriber::EnvFilter;

/// Initialize logging with the `RUST_LOG` filter, defaulting to `info`.
///
/// Safe to call multiple times (subsequent calls are no-ops), so tests and
/// embedding hosts can both call it unconditionally.
pub fn init() {
    init_with_default_filter("info");
}

/// Initialize logging with an explicit fallback filter for when `RUST_LOG`
/// is unset. Hosts that want machine-readable output use JSON; version
/// conflicts and degraded-mode warnings land here as structured fields.
pub fn init_with_default_filter(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .try_init();
}
