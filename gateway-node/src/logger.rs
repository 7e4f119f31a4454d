//! Tracing setup. `RUST_LOG` drives the filter, defaulting to `info` when
//! unset, per the teacher's `lexe-ln::logger` pattern but built on
//! [`tracing_subscriber::EnvFilter`] instead of a hand-rolled `Targets`
//! parser, since this workspace's `tracing-subscriber` dependency is
//! already pulled in with the `env-filter` feature.

use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info";

pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
