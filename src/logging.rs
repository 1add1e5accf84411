// 13.0 logging.rs: tracing subscriber setup for the simulator and embedding services.
//
// RUST_LOG wins when set (e.g. RUST_LOG=perps_engine=debug). json mode is for
// log shippers, pretty mode for a terminal.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

/// Build the filter from RUST_LOG, or `fallback` when unset or unparsable.
pub fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Install the global subscriber. Returns false if one was already installed.
pub fn init_tracing(json: bool) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter(DEFAULT_FILTER));

    if json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true);
        registry.with(layer).try_init().is_ok()
    } else {
        let layer = tracing_subscriber::fmt::layer().with_target(true);
        registry.with(layer).try_init().is_ok()
    }
}
