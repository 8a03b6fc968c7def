//! Logging initialization

use tracing_subscriber::EnvFilter;

/// Initialize tracing at `info` unless `RUST_LOG` says otherwise
pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Initialize tracing with standard configuration
///
/// `RUST_LOG` takes precedence over `level`. Calling this twice is harmless;
/// the second subscriber is simply not installed.
pub fn init_tracing_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .try_init();
}
