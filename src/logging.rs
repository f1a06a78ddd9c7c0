/// Tracing subscriber wiring for binaries and demos
///
/// The library itself only emits `tracing` events; installing a subscriber is the
/// host application's call. `RUST_LOG` overrides the default filter.

use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
/// Repeated calls, or calls after another subscriber was installed, are no-ops.
pub fn init_logging() {
    init_logging_with(DEFAULT_FILTER);
}

pub fn init_logging_with(default_filter: &str) {
    LOGGING_INIT.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init();
    });
}
