use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// Install the global subscriber. Filter comes from `RUST_LOG`, default `info`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = Registry::default().with(filter).with(fmt::layer()).try_init();
}
