//! Tracing initialization for the gateway binary and tests.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::LoggingConfig;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this a
/// second time is a no-op, so tests can initialize freely.
pub fn init_tracing(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(config.show_target);

    let _ = Registry::default().with(env_filter).with(fmt_layer).try_init();
}
