//! Configuration type definitions.

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Backup settings.
    #[serde(default)]
    pub backup: BackupConfig,

    /// Restore settings.
    #[serde(default)]
    pub restore: RestoreConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL (e.g. "sqlite://app.db").
    #[serde(default)]
    pub url: Option<String>,

    /// How long the store waits on a lock before reporting it, in seconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

/// Backup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Also write the table relationships map.
    #[serde(default)]
    pub include_relationships: bool,

    /// Version tag written into the document.
    #[serde(default = "default_version")]
    pub version: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            include_relationships: false,
            version: default_version(),
        }
    }
}

/// Restore configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreConfig {
    /// Total attempts when the database is locked.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed wait between attempts, in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Extra datetime formats (chrono syntax) tried after the built-in ones.
    #[serde(default)]
    pub datetime_formats: Vec<String>,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            datetime_formats: Vec::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error.
    #[serde(default = "default_verbosity")]
    pub verbosity: String,

    /// text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            verbosity: default_verbosity(),
            format: default_log_format(),
        }
    }
}

fn default_busy_timeout() -> u64 {
    30
}

fn default_version() -> String {
    crate::snapshot::DEFAULT_VERSION.to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    5
}

fn default_verbosity() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}
