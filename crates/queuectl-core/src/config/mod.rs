//! Application configuration schemas.
//!
//! Configuration is layered with the `config` crate: an optional TOML file,
//! an optional environment-specific overlay, `QUEUECTL__SECTION__KEY`
//! environment variables, and finally the flat environment-style variables
//! listed in [`ENV_OVERRIDES`]. Every field has a default, so an empty
//! environment yields a usable configuration.

pub mod database;
pub mod logging;
pub mod queue;
pub mod worker;

use serde::{Deserialize, Serialize};

pub use self::database::DatabaseConfig;
pub use self::logging::LoggingConfig;
pub use self::queue::QueueConfig;
pub use self::worker::WorkerConfig;

use crate::error::AppError;

/// Flat environment variables mapped onto configuration keys.
pub const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("DATABASE_URL", "database.url"),
    ("BACKOFF_BASE", "queue.backoff_base"),
    ("DEFAULT_MAX_RETRIES", "queue.default_max_retries"),
    ("WORKER_POLL_MS", "worker.poll_interval_ms"),
];

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Job store connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Retry and backoff settings.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Worker loop and supervisor settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from `config_path`, the `config/{env}` overlay,
    /// and the process environment.
    pub fn load(config_path: &str, env: &str) -> Result<Self, AppError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("QUEUECTL")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in ENV_OVERRIDES {
            builder = builder.set_override_option(*key, std::env::var(var).ok())?;
        }

        let config: Self = builder
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the queue cannot operate with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.database.url.trim().is_empty() {
            return Err(AppError::configuration("database.url must not be empty"));
        }
        if self.queue.backoff_base == 0 {
            return Err(AppError::configuration("queue.backoff_base must be at least 1"));
        }
        if self.queue.default_max_retries < 0 {
            return Err(AppError::configuration(
                "queue.default_max_retries must not be negative",
            ));
        }
        if self.worker.poll_interval_ms == 0 {
            return Err(AppError::configuration(
                "worker.poll_interval_ms must be greater than zero",
            ));
        }
        if self.worker.command_timeout_seconds == 0 {
            return Err(AppError::configuration(
                "worker.command_timeout_seconds must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.queue.backoff_base, 2);
        assert_eq!(config.queue.default_max_retries, 3);
        assert_eq!(config.worker.poll_interval_ms, 1000);
        assert_eq!(config.worker.command_timeout_seconds, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[worker]\nshell = \"bash\"\ncommand_timeout_seconds = 30\n\n[logging]\nformat = \"json\""
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = AppConfig::load(&path, "queuectl-test-missing").unwrap();
        assert_eq!(config.worker.shell, "bash");
        assert_eq!(config.worker.command_timeout_seconds, 30);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_zero_base() {
        let mut config = AppConfig::default();
        config.queue.backoff_base = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let mut config = AppConfig::default();
        config.worker.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }
}
