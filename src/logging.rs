//! Tracing setup shared by the binaries

use tracing_subscriber::EnvFilter;

use crate::config::Settings;

/// `RUST_LOG` wins; otherwise the level follows `DEBUG`
pub fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.default_log_filter()));

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
