//! Restore orchestrator: rebuild a database from a snapshot document.
//!
//! One attempt walks the [`RestorePhase`]s inside a single transaction:
//!
//! 1. DisableConstraints - open the transaction, defer foreign keys
//! 2. DefineTables - decode columns, keys, unique groups and indexes
//! 3. ResolveOrder - order tables so referenced tables come first
//! 4. CreateTables - create missing tables in that order
//! 5. InsertData - replace each table's rows, repairing temporal values
//! 6. EnableConstraints - enforce foreign keys again
//! 7. Commit
//!
//! Any error rolls the attempt back. A lock error re-runs the whole
//! attempt, re-reading the document, under a [`RetryPolicy`].

mod retry;

pub use retry::RetryPolicy;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::codec::decode_column;
use crate::coerce::{Coerced, ValueCoercer};
use crate::core::observer::{Event, Observer, TracingObserver};
use crate::core::schema::{ColumnDef, IndexDef, TableDef};
use crate::core::traits::{Store, StoreConnector};
use crate::core::value::SqlValue;
use crate::error::{Result, SnapshotError};
use crate::snapshot::{DataRow, SnapshotDocument, SnapshotSource, TableSnapshot};

/// Steps of one restore attempt, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RestorePhase {
    DisableConstraints,
    DefineTables,
    ResolveOrder,
    CreateTables,
    InsertData,
    EnableConstraints,
    Commit,
}

impl fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RestorePhase::DisableConstraints => "disable constraints",
            RestorePhase::DefineTables => "define tables",
            RestorePhase::ResolveOrder => "resolve order",
            RestorePhase::CreateTables => "create tables",
            RestorePhase::InsertData => "insert data",
            RestorePhase::EnableConstraints => "enable constraints",
            RestorePhase::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful restore.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    /// Unique identifier of this run.
    pub run_id: String,

    /// Attempts made, including the successful one.
    pub attempts: u32,

    /// Tables restored, in insertion order.
    pub tables: Vec<String>,

    /// Rows inserted across all tables.
    pub rows: u64,

    /// Degradations of the successful attempt (skipped indexes, nulled values).
    pub warnings: Vec<String>,

    /// Wall time in seconds, including retry waits.
    pub duration_seconds: f64,
}

impl RestoreReport {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// What one successful attempt did.
struct AttemptOutcome {
    tables: Vec<String>,
    rows: u64,
    warnings: Vec<String>,
}

/// Restores snapshot documents into a store.
pub struct RestoreOrchestrator {
    connector: Arc<dyn StoreConnector>,
    source: Arc<dyn SnapshotSource>,
    policy: RetryPolicy,
    observer: Arc<dyn Observer>,
    coercer: ValueCoercer,
}

impl RestoreOrchestrator {
    pub fn new(connector: Arc<dyn StoreConnector>, source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            connector,
            source,
            policy: RetryPolicy::default(),
            observer: Arc::new(TracingObserver),
            coercer: ValueCoercer::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_coercer(mut self, coercer: ValueCoercer) -> Self {
        self.coercer = coercer;
        self
    }

    /// Restore the document, retrying whole attempts on lock errors.
    pub async fn run(&self) -> Result<RestoreReport> {
        let run_id = Uuid::new_v4().to_string();
        let start = Instant::now();
        info!(
            "Restoring {} into {} (run {})",
            self.source.describe(),
            self.connector.describe(),
            run_id
        );

        let (outcome, attempts) = self
            .policy
            .run(self.observer.as_ref(), |attempt| self.attempt(attempt))
            .await?;

        let report = RestoreReport {
            run_id,
            attempts,
            tables: outcome.tables,
            rows: outcome.rows,
            warnings: outcome.warnings,
            duration_seconds: start.elapsed().as_secs_f64(),
        };
        info!(
            "Restore complete: {} tables, {} rows, {} warnings, {} attempt(s)",
            report.tables.len(),
            report.rows,
            report.warnings.len(),
            report.attempts
        );
        Ok(report)
    }

    /// One attempt from a fresh read of the document to commit.
    async fn attempt(&self, attempt: u32) -> Result<AttemptOutcome> {
        let bytes = self.source.read()?;
        let doc = SnapshotDocument::from_slice(&bytes)?;

        let mut store = self.connector.connect().await?;
        let result = self.restore_into(store.as_mut(), &doc, attempt).await;

        if result.is_err() {
            if let Err(e) = store.rollback().await {
                warn!("Rollback failed: {}", e);
            }
        }
        if let Err(e) = store.close().await {
            warn!("Failed to close store: {}", e);
        }
        result
    }

    async fn restore_into(
        &self,
        store: &mut dyn Store,
        doc: &SnapshotDocument,
        attempt: u32,
    ) -> Result<AttemptOutcome> {
        let mut warnings = Vec::new();

        self.enter(attempt, RestorePhase::DisableConstraints);
        store.begin().await?;
        store.set_constraint_enforcement(false).await?;

        self.enter(attempt, RestorePhase::DefineTables);
        let mut defs: BTreeMap<&str, TableDef> = BTreeMap::new();
        for (name, snapshot) in &doc.tables {
            if defs.contains_key(name.as_str()) {
                continue;
            }
            let def = self
                .define_table(name, snapshot, &mut warnings)
                .map_err(|e| e.with_table(name))?;
            self.observer.on_event(&Event::TableDefined {
                table: name.clone(),
                columns: def.columns.len(),
            });
            defs.insert(name.as_str(), def);
        }

        self.enter(attempt, RestorePhase::ResolveOrder);
        let graph = doc.dependency_graph();
        for (table, referenced) in graph.dangling_references() {
            self.emit(&mut warnings, Event::DanglingReference { table, referenced });
        }
        let order = graph.resolve()?;
        let ordered: Vec<TableDef> = order
            .iter()
            .filter_map(|name| defs.remove(name.as_str()))
            .collect();

        self.enter(attempt, RestorePhase::CreateTables);
        store.create_tables(&ordered).await?;

        self.enter(attempt, RestorePhase::InsertData);
        let mut rows = 0;
        for def in &ordered {
            if let Some(snapshot) = doc.tables.get(&def.name) {
                rows += self
                    .insert_table(store, def, snapshot, &mut warnings)
                    .await
                    .map_err(|e| e.with_table(&def.name))?;
            }
        }

        self.enter(attempt, RestorePhase::EnableConstraints);
        store.set_constraint_enforcement(true).await?;

        self.enter(attempt, RestorePhase::Commit);
        store.commit().await?;

        Ok(AttemptOutcome {
            tables: ordered.into_iter().map(|d| d.name).collect(),
            rows,
            warnings,
        })
    }

    /// Rebuild a table definition from its snapshot.
    fn define_table(
        &self,
        name: &str,
        snapshot: &TableSnapshot,
        warnings: &mut Vec<String>,
    ) -> Result<TableDef> {
        let schema = &snapshot.schema;
        let columns = schema
            .columns
            .iter()
            .map(|c| decode_column(name, c))
            .collect::<Result<Vec<ColumnDef>>>()?;

        let known = |column: &str| columns.iter().any(|c| c.name == column);

        let primary_key: Vec<String> = if schema.primary_keys.is_empty() {
            columns
                .iter()
                .filter(|c| c.primary_key)
                .map(|c| c.name.clone())
                .collect()
        } else {
            schema.primary_keys.clone()
        };
        if let Some(missing) = primary_key.iter().find(|c| !known(c.as_str())) {
            return Err(SnapshotError::MalformedDocument(format!(
                "primary key column '{}' is not a column of the table",
                missing
            )));
        }

        let mut unique_constraints = Vec::new();
        for group in &schema.unique_constraints {
            if let Some(missing) = group.iter().find(|c| !known(c.as_str())) {
                return Err(SnapshotError::MalformedDocument(format!(
                    "unique constraint column '{}' is not a column of the table",
                    missing
                )));
            }
            // Single-column groups already carried by the column flag
            let flagged = match group.as_slice() {
                [single] => columns.iter().any(|c| &c.name == single && c.unique),
                _ => false,
            };
            if !group.is_empty() && !flagged {
                unique_constraints.push(group.clone());
            }
        }

        let column_names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        let mut indexes = Vec::new();
        for index in &schema.indexes {
            let resolved = resolve_index_columns(index, &column_names);
            if resolved.is_empty() {
                self.emit(
                    warnings,
                    Event::IndexSkipped {
                        table: name.to_string(),
                        index: index.clone(),
                    },
                );
            } else {
                indexes.push(IndexDef {
                    name: index.clone(),
                    columns: resolved,
                });
            }
        }

        Ok(TableDef {
            name: name.to_string(),
            columns,
            primary_key,
            unique_constraints,
            indexes,
        })
    }

    /// Replace a table's rows with the snapshot's.
    async fn insert_table(
        &self,
        store: &mut dyn Store,
        def: &TableDef,
        snapshot: &TableSnapshot,
        warnings: &mut Vec<String>,
    ) -> Result<u64> {
        let deleted = store.clear_table(&def.name).await?;

        let mut inserted = 0;
        let mut batch_columns: Vec<String> = Vec::new();
        let mut batch: Vec<Vec<SqlValue>> = Vec::new();

        for (i, row) in snapshot.data.iter().enumerate() {
            let columns = row_columns(def, row, i)?;
            if columns != batch_columns && !batch.is_empty() {
                inserted += store
                    .insert_rows(def, &batch_columns, std::mem::take(&mut batch))
                    .await?;
            }
            let values = columns
                .iter()
                .map(|name| self.coerce(def, name, &row[name.as_str()], warnings))
                .collect();
            batch.push(values);
            batch_columns = columns;
        }
        if !batch.is_empty() {
            inserted += store.insert_rows(def, &batch_columns, batch).await?;
        }

        self.observer.on_event(&Event::TableRestored {
            table: def.name.clone(),
            deleted,
            inserted,
        });
        Ok(inserted)
    }

    fn coerce(
        &self,
        def: &TableDef,
        column: &str,
        value: &Value,
        warnings: &mut Vec<String>,
    ) -> SqlValue {
        let Some(col) = def.column(column) else {
            return SqlValue::from_json(value);
        };
        match self.coercer.coerce(&col.logical_type, value) {
            Coerced::Value(v) => v,
            Coerced::Nulled(original) => {
                self.emit(
                    warnings,
                    Event::ValueNulled {
                        table: def.name.clone(),
                        column: column.to_string(),
                        value: original,
                    },
                );
                SqlValue::Null
            }
        }
    }

    fn enter(&self, attempt: u32, phase: RestorePhase) {
        self.observer.on_event(&Event::PhaseStarted { attempt, phase });
    }

    fn emit(&self, warnings: &mut Vec<String>, event: Event) {
        if event.is_warning() {
            warnings.push(event.to_string());
        }
        self.observer.on_event(&event);
    }
}

/// Columns present in a row, in table order. Keys outside the table
/// definition make the document malformed.
fn row_columns(def: &TableDef, row: &DataRow, index: usize) -> Result<Vec<String>> {
    if let Some(unknown) = row.keys().find(|k| def.column(k).is_none()) {
        return Err(SnapshotError::MalformedDocument(format!(
            "row {} has unknown column '{}'",
            index, unknown
        )));
    }
    if row.is_empty() {
        return Err(SnapshotError::MalformedDocument(format!(
            "row {} has no columns",
            index
        )));
    }
    Ok(def
        .columns
        .iter()
        .filter(|c| row.contains_key(&c.name))
        .map(|c| c.name.clone())
        .collect())
}

/// Columns an index covers, judged by which column names appear in the
/// index name. A match contained in a longer match is dropped, so
/// `ix_posts_user_id` resolves to `user_id` and not also `id`.
pub fn resolve_index_columns(index: &str, columns: &[&str]) -> Vec<String> {
    let matched: BTreeSet<&str> = columns
        .iter()
        .copied()
        .filter(|c| !c.is_empty() && index.contains(c))
        .collect();
    columns
        .iter()
        .copied()
        .filter(|c| matched.contains(c))
        .filter(|c| !matched.iter().any(|m| m != c && m.contains(c)))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests;
