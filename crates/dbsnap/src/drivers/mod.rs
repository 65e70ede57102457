//! Store driver implementations and URL dispatch.
//!
//! - [`sqlite`]: SQLite via sqlx
//!
//! [`UrlConnector`] picks the driver from the URL scheme and opens a fresh
//! connection on every [`StoreConnector::connect`] call.

pub mod sqlite;

pub use sqlite::{SqliteDialect, SqliteStore};

use std::time::Duration;

use async_trait::async_trait;

use crate::core::traits::{Store, StoreConnector};
use crate::error::{Result, SnapshotError};

/// How a connection will be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Backup: the database must exist and is never written.
    ReadOnly,
    /// Restore: the database is created if missing and locked for writing
    /// when a transaction begins.
    ReadWrite,
}

/// Supported store engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Sqlite,
}

impl Engine {
    /// Engine for a connection URL.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "sqlite" => Ok(Engine::Sqlite),
            "" => Err(SnapshotError::Config(format!(
                "database URL '{}' has no scheme (expected e.g. sqlite://app.db)",
                url
            ))),
            other => Err(SnapshotError::Config(format!(
                "unsupported database scheme '{}' (supported: sqlite)",
                other
            ))),
        }
    }
}

/// Connector for a database URL.
#[derive(Debug, Clone)]
pub struct UrlConnector {
    url: String,
    engine: Engine,
    mode: AccessMode,
    busy_timeout: Duration,
}

impl UrlConnector {
    /// Validate the URL's scheme and build a connector.
    pub fn new(url: impl Into<String>, mode: AccessMode) -> Result<Self> {
        let url = url.into();
        let engine = Engine::from_url(&url)?;
        Ok(Self {
            url,
            engine,
            mode,
            busy_timeout: Duration::from_secs(30),
        })
    }

    /// How long the store waits on a lock before reporting it.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

#[async_trait]
impl StoreConnector for UrlConnector {
    async fn connect(&self) -> Result<Box<dyn Store>> {
        match self.engine {
            Engine::Sqlite => {
                let store = SqliteStore::connect(&self.url, self.busy_timeout, self.mode).await?;
                Ok(Box::new(store))
            }
        }
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
