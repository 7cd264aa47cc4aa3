// Logging setup for the probecache binary.
// Library code only emits tracing events; installing a subscriber is left to binaries.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Default filter directives when `RUST_LOG` is not set.
fn default_directives(debug: bool) -> &'static str {
    if debug { "warn,probecache=debug" } else { "warn" }
}

/// Build the filter, preferring `RUST_LOG` over the defaults.
pub fn env_filter(debug: bool) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .try_from_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(debug)))
}

/// Install a stderr fmt subscriber. Stdout is reserved for payloads.
///
/// Does nothing if a global subscriber is already set.
pub fn init(debug: bool) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let _ = tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter(debug)))
        .try_init();
}
