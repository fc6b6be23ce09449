//! Runtime configuration
//!
//! Read once from the environment on first use.
//!
//! - `HOSTLINK_LOG`: tracing filter directive (default `hostlink=warn`)
//! - `HOSTLINK_EXCEPTION_SYMBOL`: host-side symbol that receives the
//!   parameters of the last failure (default ``HostLink`$LastFailureParameters``)

use std::sync::OnceLock;

pub const DEFAULT_LOG_FILTER: &str = "hostlink=warn";
pub const DEFAULT_EXCEPTION_SYMBOL: &str = "HostLink`$LastFailureParameters";

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Filter directive for the log subscriber
    pub log_filter: String,
    /// Initial exception-details symbol
    pub exception_symbol: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            exception_symbol: DEFAULT_EXCEPTION_SYMBOL.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let log_filter = std::env::var("HOSTLINK_LOG")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.log_filter);

        let exception_symbol = std::env::var("HOSTLINK_EXCEPTION_SYMBOL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.exception_symbol);

        Self {
            log_filter,
            exception_symbol,
        }
    }
}

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Process-wide configuration, loaded on first call
pub fn config() -> &'static RuntimeConfig {
    CONFIG.get_or_init(RuntimeConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    unsafe fn restore_env(key: &str, value: Option<String>) {
        match value {
            Some(v) => unsafe { std::env::set_var(key, v) },
            None => unsafe { std::env::remove_var(key) },
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        let orig_log = std::env::var("HOSTLINK_LOG").ok();
        let orig_symbol = std::env::var("HOSTLINK_EXCEPTION_SYMBOL").ok();
        // SAFETY: serialized with every other env-mutating test
        unsafe {
            std::env::remove_var("HOSTLINK_LOG");
            std::env::set_var("HOSTLINK_EXCEPTION_SYMBOL", "   ");
        }

        assert_eq!(RuntimeConfig::from_env(), RuntimeConfig::default());

        unsafe {
            restore_env("HOSTLINK_LOG", orig_log);
            restore_env("HOSTLINK_EXCEPTION_SYMBOL", orig_symbol);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        let orig_log = std::env::var("HOSTLINK_LOG").ok();
        let orig_symbol = std::env::var("HOSTLINK_EXCEPTION_SYMBOL").ok();
        unsafe {
            std::env::set_var("HOSTLINK_LOG", "hostlink=debug");
            std::env::set_var("HOSTLINK_EXCEPTION_SYMBOL", " MyPaclet`$Failure ");
        }

        let config = RuntimeConfig::from_env();
        assert_eq!(config.log_filter, "hostlink=debug");
        assert_eq!(config.exception_symbol, "MyPaclet`$Failure");

        unsafe {
            restore_env("HOSTLINK_LOG", orig_log);
            restore_env("HOSTLINK_EXCEPTION_SYMBOL", orig_symbol);
        }
    }
}
