//! # Logging
//!
//! Installs the global `tracing` subscriber. Production writes one JSON object
//! per event to stdout; other profiles use the human-readable formatter.
//! `RUST_LOG`, when set, takes precedence over the configured level.

use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, Profile};

/// Install the subscriber for `config`. Later calls are no-ops.
pub fn init(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.log_level())));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = match config.profile {
        Profile::Product => builder.json().flatten_event(true).try_init(),
        Profile::Testing | Profile::Develop => builder.try_init(),
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
