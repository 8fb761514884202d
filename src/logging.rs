//! Structured logging setup.
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! binary's job and happens exactly once, explicitly, at startup.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: String,
    /// Emit one JSON object per event.
    pub json: bool,
    /// Include the event target (module path).
    pub with_target: bool,
    /// Include the source file and line of every event.
    #[serde(alias = "enableStackTrace", alias = "enablestacktrace")]
    pub with_source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            with_target: true,
            with_source_location: false,
        }
    }
}

impl LogConfig {
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

/// Initialize the tracing subscriber for logging.
///
/// Fails if a global subscriber is already installed.
pub fn init(config: &LogConfig) -> DbResult<()> {
    let subscriber = tracing_subscriber::registry().with(config.filter());

    let result = if config.json {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_target(config.with_target)
                    .with_file(config.with_source_location)
                    .with_line_number(config.with_source_location),
            )
            .try_init()
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(config.with_target)
                    .with_file(config.with_source_location)
                    .with_line_number(config.with_source_location)
                    .with_thread_ids(false),
            )
            .try_init()
    };

    result.map_err(|e| DbError::config(format!("logging already initialized: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json);
        assert!(config.with_target);
        assert!(!config.with_source_location);
    }

    #[test]
    fn test_source_location_from_config_file() {
        let config = crate::AppConfig::from_yaml(
            "log:\n  enableStackTrace: true\ndatabase:\n  driver: sqlite\n  db_name: app.db\n",
        )
        .unwrap();
        assert!(config.log.with_source_location);
        assert_eq!(config.log.level, "info");

        let config = crate::AppConfig::from_yaml(
            "log:\n  with_source_location: true\ndatabase:\n  driver: sqlite\n  db_name: app.db\n",
        )
        .unwrap();
        assert!(config.log.with_source_location);
    }

    #[test]
    fn test_second_init_fails() {
        let config = LogConfig {
            level: "warn".to_string(),
            ..LogConfig::default()
        };
        // Another test may have installed the global subscriber first.
        let _ = init(&config);
        assert!(matches!(init(&config), Err(DbError::Config { .. })));
    }
}
