use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "sonata=info,tower_http=info";

/// Install the global subscriber. Safe to call more than once.
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(env_filter)
        .try_init();
}
