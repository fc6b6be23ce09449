//! Log subscriber setup
//!
//! Library code logs through `tracing`; nothing is printed until a subscriber
//! is installed. [`init_logging`] installs a stderr fmt subscriber filtered by
//! `HOSTLINK_LOG`. If the embedding process already installed a global
//! subscriber, that one is kept.

use crate::config::config;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static LOGGING_INIT: Once = Once::new();

/// Install the stderr subscriber (idempotent)
pub fn init_logging() {
    LOGGING_INIT.call_once(|| {
        let filter = EnvFilter::try_new(&config().log_filter)
            .unwrap_or_else(|_| EnvFilter::new(crate::config::DEFAULT_LOG_FILTER));

        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init()
            .is_ok();

        if installed {
            tracing::debug!(filter = %config().log_filter, "logging initialized");
        }
    });
}
