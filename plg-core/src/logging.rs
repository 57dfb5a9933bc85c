//! Crate-standard logging setup shared by every binary in the workspace.

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber at the given verbosity (`trace`, `debug`, `info`, `warn`, `error`).
///
/// `RUST_LOG`, when set, takes precedence over `level`. A second call is a no-op.
pub fn setup(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_err()
    {
        tracing::debug!("logging already initialised");
    }
}
