//! Configuration validation.

use super::Config;
use crate::error::{Result, SnapshotError};
use crate::snapshot::check_version;

const VERBOSITY_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["text", "json"];

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if let Some(url) = &config.database.url {
        if url.trim().is_empty() {
            return Err(SnapshotError::Config("database.url must not be empty".into()));
        }
    }

    check_version(&config.backup.version)
        .map_err(|e| SnapshotError::Config(format!("backup.version: {}", e)))?;

    if config.restore.max_retries == 0 {
        return Err(SnapshotError::Config(
            "restore.max_retries must be at least 1".into(),
        ));
    }

    if !VERBOSITY_LEVELS.contains(&config.logging.verbosity.as_str()) {
        return Err(SnapshotError::Config(format!(
            "logging.verbosity must be one of {}, got '{}'",
            VERBOSITY_LEVELS.join(", "),
            config.logging.verbosity
        )));
    }
    if !LOG_FORMATS.contains(&config.logging.format.as_str()) {
        return Err(SnapshotError::Config(format!(
            "logging.format must be 'text' or 'json', got '{}'",
            config.logging.format
        )));
    }

    Ok(())
}
