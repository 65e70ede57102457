//! # dbsnap
//!
//! Portable schema-and-data snapshots for relational databases.
//!
//! A backup captures every user table of a database (column types,
//! keys, unique constraints, indexes and rows) into one self-describing
//! JSON document. A restore rebuilds the tables in foreign-key order and
//! replaces their rows inside a single transaction, retrying the whole
//! attempt when the database is locked.
//!
//! - **Schema codec** between native column types and portable descriptors
//! - **Value coercion** that repairs temporal text on the way back in
//! - **Dependency ordering** with cycle detection
//! - **Atomic artifacts**: nothing is written unless the backup completed
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use dbsnap::{AccessMode, FileSnapshot, RestoreOrchestrator, SnapshotBuilder, UrlConnector};
//!
//! #[tokio::main]
//! async fn main() -> dbsnap::Result<()> {
//!     let source = UrlConnector::new("sqlite://app.db", AccessMode::ReadOnly)?;
//!     let summary = SnapshotBuilder::new(Arc::new(source))
//!         .run(&FileSnapshot::new("backup.json"))
//!         .await?;
//!     println!("Captured {} rows", summary.rows);
//!
//!     let target = UrlConnector::new("sqlite://copy.db", AccessMode::ReadWrite)?;
//!     let report = RestoreOrchestrator::new(
//!         Arc::new(target),
//!         Arc::new(FileSnapshot::new("backup.json")),
//!     )
//!     .run()
//!     .await?;
//!     println!("Restored {} rows", report.rows);
//!     Ok(())
//! }
//! ```

pub mod backup;
pub mod codec;
pub mod coerce;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod graph;
pub mod restore;
pub mod snapshot;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use backup::{BackupOptions, BackupSummary, SnapshotBuilder};
pub use codec::{ColumnDescriptor, LogicalType, TypeSpec};
pub use coerce::ValueCoercer;
pub use config::{BackupConfig, Config, DatabaseConfig, LoggingConfig, RestoreConfig};
pub use crate::core::{Event, Observer, SqlValue, Store, StoreConnector, TracingObserver};
pub use drivers::{AccessMode, UrlConnector};
pub use error::{Result, SnapshotError};
pub use graph::DependencyGraph;
pub use restore::{RestoreOrchestrator, RestorePhase, RestoreReport, RetryPolicy};
pub use snapshot::{FileSnapshot, MemorySnapshot, SnapshotDocument, SnapshotSink, SnapshotSource};
