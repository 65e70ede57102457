//! In-memory store and recording observer for unit tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::codec::LogicalType;
use crate::core::observer::{Event, Observer};
use crate::core::schema::{Column, ForeignKey, ForeignKeyRef, Index, Table, TableDef};
use crate::core::traits::{Dialect, Store, StoreConnector};
use crate::core::value::{Row, SqlValue};
use crate::drivers::SqliteDialect;
use crate::error::{Result, SnapshotError};

#[derive(Debug, Clone)]
struct MemoryTable {
    table: Table,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemoryTable>,
    journal: Vec<String>,
    lock_failures: u32,
    fail_inserts_into: Option<String>,
    connects: u32,
}

/// Connector whose stores share one in-memory database.
///
/// Every store call is appended to a journal so tests can assert on the
/// order of operations.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, table: Table, rows: Vec<Row>) -> Self {
        self.lock()
            .tables
            .insert(table.name.clone(), MemoryTable { table, rows });
        self
    }

    /// The next `n` calls to `begin` fail with a lock error.
    pub fn with_lock_failures(self, n: u32) -> Self {
        self.lock().lock_failures = n;
        self
    }

    /// Inserts into `table` fail with a non-lock error.
    pub fn failing_inserts_into(self, table: &str) -> Self {
        self.lock().fail_inserts_into = Some(table.to_string());
        self
    }

    pub fn journal(&self) -> Vec<String> {
        self.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    pub fn connects(&self) -> u32 {
        self.lock().connects
    }

    pub fn table_names(&self) -> Vec<String> {
        self.lock().tables.keys().cloned().collect()
    }

    pub fn table(&self, name: &str) -> Option<Table> {
        self.lock().tables.get(name).map(|t| t.table.clone())
    }

    pub fn rows(&self, name: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(name)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn Store>> {
        {
            let mut state = self.lock();
            state.connects += 1;
            state.journal.push("connect".into());
        }
        Ok(Box::new(MemoryStore {
            state: Arc::clone(&self.state),
            dialect: SqliteDialect::new(),
            saved: None,
        }))
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}

/// One connection to a [`MemoryConnector`]'s database.
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    dialect: SqliteDialect,
    saved: Option<BTreeMap<String, MemoryTable>>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    /// What a real store would reflect after creating `def`.
    fn reflected(&self, def: &TableDef) -> Table {
        let columns = def
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                data_type: self.dialect.render_type(&c.logical_type),
                enum_values: match &c.logical_type {
                    LogicalType::Enum { values } => Some(values.clone()),
                    _ => None,
                },
                is_nullable: c.nullable,
                is_primary_key: c.primary_key || def.primary_key.contains(&c.name),
                is_unique: c.unique,
                is_indexed: def.indexes.iter().any(|ix| ix.columns.contains(&c.name)),
                default: c.default.clone(),
                foreign_keys: c.foreign_keys.clone(),
            })
            .collect();

        let mut unique_constraints: Vec<Vec<String>> = def
            .columns
            .iter()
            .filter(|c| c.unique && !c.primary_key)
            .map(|c| vec![c.name.clone()])
            .collect();
        unique_constraints.extend(def.unique_constraints.iter().cloned());

        let foreign_keys = def
            .columns
            .iter()
            .flat_map(|c| {
                c.foreign_keys.iter().map(move |fk| ForeignKey {
                    columns: vec![c.name.clone()],
                    ref_table: fk.table.clone(),
                    ref_schema: fk.schema.clone(),
                    ref_columns: vec![fk.column.clone()],
                })
            })
            .collect();

        Table {
            name: def.name.clone(),
            columns,
            primary_key: def.primary_key.clone(),
            unique_constraints,
            indexes: def
                .indexes
                .iter()
                .map(|ix| Index {
                    name: ix.name.clone(),
                    columns: ix.columns.clone(),
                })
                .collect(),
            foreign_keys,
        }
    }
}

fn missing(table: &str) -> SnapshotError {
    SnapshotError::store(format!("no such table: {}", table), "memory store")
}

#[async_trait]
impl Store for MemoryStore {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn begin(&mut self) -> Result<()> {
        let mut state = self.lock();
        if state.lock_failures > 0 {
            state.lock_failures -= 1;
            state.journal.push("begin:locked".into());
            return Err(SnapshotError::Locked("database is locked".into()));
        }
        state.journal.push("begin".into());
        let saved = state.tables.clone();
        drop(state);
        self.saved = Some(saved);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.saved = None;
        self.lock().journal.push("commit".into());
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(saved) = self.saved.take() {
            let mut state = self.lock();
            state.tables = saved;
            state.journal.push("rollback".into());
        }
        Ok(())
    }

    async fn set_constraint_enforcement(&mut self, enabled: bool) -> Result<()> {
        let entry = if enabled { "constraints:on" } else { "constraints:off" };
        self.lock().journal.push(entry.into());
        Ok(())
    }

    async fn reflect(&mut self) -> Result<Vec<Table>> {
        Ok(self.lock().tables.values().map(|t| t.table.clone()).collect())
    }

    async fn fetch_rows(&mut self, table: &Table) -> Result<Vec<Row>> {
        let state = self.lock();
        let stored = state.tables.get(&table.name).ok_or_else(|| missing(&table.name))?;
        Ok(stored
            .rows
            .iter()
            .map(|row| {
                table
                    .columns
                    .iter()
                    .map(|c| {
                        let value = row
                            .iter()
                            .find(|(name, _)| name == &c.name)
                            .map(|(_, v)| v.clone())
                            .unwrap_or(SqlValue::Null);
                        (c.name.clone(), value)
                    })
                    .collect()
            })
            .collect())
    }

    async fn create_tables(&mut self, tables: &[TableDef]) -> Result<()> {
        for def in tables {
            let reflected = self.reflected(def);
            let mut state = self.lock();
            if !state.tables.contains_key(&def.name) {
                state.journal.push(format!("create:{}", def.name));
                state.tables.insert(
                    def.name.clone(),
                    MemoryTable {
                        table: reflected,
                        rows: Vec::new(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn clear_table(&mut self, table: &str) -> Result<u64> {
        let mut state = self.lock();
        let stored = state.tables.get_mut(table).ok_or_else(|| missing(table))?;
        let removed = stored.rows.len() as u64;
        stored.rows.clear();
        state.journal.push(format!("clear:{}", table));
        Ok(removed)
    }

    async fn insert_rows(
        &mut self,
        table: &TableDef,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        let mut state = self.lock();
        if state.fail_inserts_into.as_deref() == Some(table.name.as_str()) {
            return Err(SnapshotError::store(
                "FOREIGN KEY constraint failed",
                format!("inserting into {}", table.name),
            ));
        }
        let count = rows.len() as u64;
        let stored = state
            .tables
            .get_mut(&table.name)
            .ok_or_else(|| missing(&table.name))?;
        for values in rows {
            stored
                .rows
                .push(columns.iter().cloned().zip(values).collect());
        }
        state.journal.push(format!("insert:{}:{}", table.name, count));
        Ok(count)
    }

    async fn close(&mut self) -> Result<()> {
        self.lock().journal.push("close".into());
        Ok(())
    }
}

/// Observer that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl Observer for RecordingObserver {
    fn on_event(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn column(name: &str, data_type: &str) -> Column {
    Column {
        name: name.into(),
        data_type: data_type.into(),
        is_nullable: true,
        ..Default::default()
    }
}

fn row(values: Vec<(&str, SqlValue)>) -> Row {
    values
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Two related tables: `posts.user_id` references `users.id`.
pub fn users_posts() -> MemoryConnector {
    let mut id = column("id", "INTEGER");
    id.is_primary_key = true;
    id.is_nullable = false;

    let mut name = column("name", "VARCHAR(50)");
    name.is_nullable = false;
    name.is_unique = true;

    let mut status = column("status", "VARCHAR(8)");
    status.enum_values = Some(vec!["active".into(), "inactive".into()]);
    status.default = Some("'active'".into());
    status.is_indexed = true;

    let users = Table {
        name: "users".into(),
        columns: vec![id.clone(), name, status, column("created_at", "DATETIME")],
        primary_key: vec!["id".into()],
        unique_constraints: vec![vec!["name".into()]],
        indexes: vec![Index {
            name: "ix_users_status".into(),
            columns: vec!["status".into()],
        }],
        foreign_keys: vec![],
    };

    let mut user_id = column("user_id", "INTEGER");
    user_id.is_indexed = true;
    user_id.foreign_keys = vec![ForeignKeyRef {
        column: "id".into(),
        table: "users".into(),
        schema: None,
    }];

    let posts = Table {
        name: "posts".into(),
        columns: vec![id, user_id, column("title", "VARCHAR(100)")],
        primary_key: vec!["id".into()],
        unique_constraints: vec![],
        indexes: vec![Index {
            name: "ix_posts_user_id".into(),
            columns: vec!["user_id".into()],
        }],
        foreign_keys: vec![ForeignKey {
            columns: vec!["user_id".into()],
            ref_table: "users".into(),
            ref_schema: None,
            ref_columns: vec!["id".into()],
        }],
    };

    let created = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(3, 4, 5)
        .unwrap();
    let user_rows = vec![
        row(vec![
            ("id", SqlValue::I64(1)),
            ("name", SqlValue::Text("ada".into())),
            ("status", SqlValue::Text("active".into())),
            ("created_at", SqlValue::DateTime(created)),
        ]),
        row(vec![
            ("id", SqlValue::I64(2)),
            ("name", SqlValue::Text("grace".into())),
            ("status", SqlValue::Text("inactive".into())),
            ("created_at", SqlValue::Null),
        ]),
    ];
    let post_rows = vec![
        row(vec![
            ("id", SqlValue::I64(1)),
            ("user_id", SqlValue::I64(1)),
            ("title", SqlValue::Text("hello".into())),
        ]),
        row(vec![
            ("id", SqlValue::I64(2)),
            ("user_id", SqlValue::I64(2)),
            ("title", SqlValue::Text("world".into())),
        ]),
    ];

    MemoryConnector::new()
        .with_table(users, user_rows)
        .with_table(posts, post_rows)
}
