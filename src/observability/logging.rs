//! Structured logging initialisation
//!
//! Library code only emits `tracing` events. Binaries install a subscriber
//! once at startup; `RUST_LOG` overrides the default `info` filter.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber, JSON or human-readable.
///
/// Returns false if a subscriber was already installed.
pub fn init_logging(json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    let result = if json {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.compact().try_init()
    };
    result.is_ok()
}
