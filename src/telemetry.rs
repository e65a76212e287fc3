//! Structured logging setup for the training service binary.

/// Initializes the global `tracing` subscriber from `filter` (an
/// `EnvFilter` directive string, e.g. `"info"` or `"lamarl_swarm=debug"`).
/// Safe to call more than once; later calls are no-ops.
pub fn init(filter: &str) {
    let _ = tracing_subscriber::fmt().with_env_filter(filter.to_string()).try_init();
}
