//! Log subscriber setup
//!
//! Logs go to stderr. `RUST_LOG` takes precedence over the settings-file
//! debug level.

use gcusers_engine::Verbosity;
use tracing_subscriber::EnvFilter;

/// Filter directive for the tool's own crates at `verbosity`.
pub fn default_directive(verbosity: Verbosity) -> String {
    let level = verbosity.filter_directive();
    format!("warn,gcusers_engine={level},gcusers_cli={level},gcusers={level}")
}

/// Initialize the tracing subscriber
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init(verbosity: Verbosity) {
    let directive = default_directive(verbosity);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity.log_details())
        .with_writer(std::io::stderr)
        .try_init();
}
