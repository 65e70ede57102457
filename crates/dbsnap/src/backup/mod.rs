//! Snapshot builder: capture every table of a store into one document.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::codec::encode_column;
use crate::core::observer::{Event, Observer, TracingObserver};
use crate::core::schema::Table;
use crate::core::traits::{Store, StoreConnector};
use crate::error::{Result, SnapshotError};
use crate::snapshot::{
    check_version, DataRow, Relationship, SnapshotDocument, SnapshotSink, TableDescriptor,
    TableSnapshot, DEFAULT_VERSION,
};

/// Backup options.
#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// Also write the table relationships map.
    pub include_relationships: bool,

    /// Version tag written into the document.
    pub version: String,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            include_relationships: false,
            version: DEFAULT_VERSION.to_string(),
        }
    }
}

/// Outcome of a backup.
#[derive(Debug, Clone, Serialize)]
pub struct BackupSummary {
    /// Tables captured.
    pub tables: usize,

    /// Rows captured across all tables.
    pub rows: usize,

    /// Size of the written artifact.
    pub bytes: usize,

    /// SHA-256 of the written artifact, hex encoded.
    pub sha256: String,

    /// Wall time in seconds.
    pub duration_seconds: f64,
}

impl BackupSummary {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builds snapshot documents from a store.
pub struct SnapshotBuilder {
    connector: Arc<dyn StoreConnector>,
    options: BackupOptions,
    observer: Arc<dyn Observer>,
}

impl SnapshotBuilder {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            connector,
            options: BackupOptions::default(),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_options(mut self, options: BackupOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Capture the store and write the document to `sink` as one unit.
    ///
    /// Nothing is written unless every table was captured.
    pub async fn run(&self, sink: &dyn SnapshotSink) -> Result<BackupSummary> {
        let start = Instant::now();
        info!(
            "Backing up {} to {}",
            self.connector.describe(),
            sink.describe()
        );

        let doc = self.build().await?;
        let bytes = doc.to_vec_pretty()?;
        sink.write(&bytes)?;

        let summary = BackupSummary {
            tables: doc.tables.len(),
            rows: doc.row_count(),
            bytes: bytes.len(),
            sha256: hex::encode(Sha256::digest(&bytes)),
            duration_seconds: start.elapsed().as_secs_f64(),
        };
        info!(
            "Backup complete: {} tables, {} rows, {} bytes",
            summary.tables, summary.rows, summary.bytes
        );
        Ok(summary)
    }

    /// Capture the store into a document without writing it.
    pub async fn build(&self) -> Result<SnapshotDocument> {
        check_version(&self.options.version)
            .map_err(|e| SnapshotError::Config(format!("backup version: {}", e)))?;

        let mut store = self.connector.connect().await?;
        let result = match store.begin().await {
            Ok(()) => self.capture(store.as_mut()).await,
            Err(e) => Err(e),
        };

        // Reads only; the transaction is never committed.
        if let Err(e) = store.rollback().await {
            warn!("Failed to end backup transaction: {}", e);
        }
        if let Err(e) = store.close().await {
            warn!("Failed to close store: {}", e);
        }
        result
    }

    async fn capture(&self, store: &mut dyn Store) -> Result<SnapshotDocument> {
        let mut tables = store.reflect().await?;
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        info!("Phase 1: Capturing {} tables", tables.len());

        let mut doc = SnapshotDocument::new(self.options.version.clone());
        let mut relationships = std::collections::BTreeMap::new();

        for table in &tables {
            let snapshot = self
                .capture_table(store, table)
                .await
                .map_err(|e| e.with_table(&table.name))?;
            self.observer.on_event(&Event::TableBackedUp {
                table: table.name.clone(),
                rows: snapshot.data.len(),
            });
            doc.tables.insert(table.name.clone(), snapshot);

            if self.options.include_relationships {
                relationships.insert(table.name.clone(), table_relationships(table));
            }
        }

        if self.options.include_relationships {
            doc.relationships = Some(relationships);
        }
        Ok(doc)
    }

    async fn capture_table(&self, store: &mut dyn Store, table: &Table) -> Result<TableSnapshot> {
        let columns = table
            .columns
            .iter()
            .map(|c| encode_column(&table.name, c))
            .collect::<Result<Vec<_>>>()?;

        let schema = TableDescriptor {
            columns,
            primary_keys: table.primary_key.clone(),
            unique_constraints: table.unique_constraints.clone(),
            indexes: table.indexes.iter().map(|i| i.name.clone()).collect(),
        };

        let data = store
            .fetch_rows(table)
            .await?
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(name, value)| (name, value.to_json()))
                    .collect::<DataRow>()
            })
            .collect();

        Ok(TableSnapshot { schema, data })
    }
}

/// Relationship entries for every foreign-key column of a table.
fn table_relationships(table: &Table) -> Vec<Relationship> {
    table
        .foreign_keys
        .iter()
        .flat_map(|fk| {
            fk.columns
                .iter()
                .zip(&fk.ref_columns)
                .map(move |(column, referenced)| Relationship {
                    column: column.clone(),
                    referenced_table: fk.ref_table.clone(),
                    referenced_column: referenced.clone(),
                    schema: fk.ref_schema.clone(),
                })
        })
        .collect()
}
