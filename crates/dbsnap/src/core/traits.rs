//! Core traits separating the engine from concrete stores.
//!
//! - [`StoreConnector`]: opens a fresh [`Store`] handle per attempt
//! - [`Store`]: one connection with transaction control, reflection, and
//!   row I/O
//! - [`Dialect`]: SQL syntax strategy for a store engine

use async_trait::async_trait;

use crate::codec::LogicalType;
use crate::error::Result;

use super::schema::{ColumnDef, IndexDef, Table, TableDef};
use super::value::{Row, SqlValue};

/// A single connection to a relational store.
///
/// Every method may block or fail. Implementations report transient lock
/// contention as [`SnapshotError::Locked`](crate::SnapshotError::Locked) and
/// every other failure as some other variant, since only the former is
/// retried.
#[async_trait]
pub trait Store: Send {
    /// SQL dialect of this store.
    fn dialect(&self) -> &dyn Dialect;

    /// Open a transaction.
    async fn begin(&mut self) -> Result<()>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction. A no-op without one.
    async fn rollback(&mut self) -> Result<()>;

    /// Suspend or restore foreign-key enforcement.
    async fn set_constraint_enforcement(&mut self, enabled: bool) -> Result<()>;

    /// Reflect every user table with columns, keys, constraints and indexes.
    async fn reflect(&mut self) -> Result<Vec<Table>>;

    /// Fetch all rows of a table, columns in ordinal order.
    async fn fetch_rows(&mut self, table: &Table) -> Result<Vec<Row>>;

    /// Create the given tables (and their indexes), keeping existing ones.
    async fn create_tables(&mut self, tables: &[TableDef]) -> Result<()>;

    /// Delete every row of a table. Returns the number of rows removed.
    async fn clear_table(&mut self, table: &str) -> Result<u64>;

    /// Insert rows whose values line up with `columns`.
    async fn insert_rows(
        &mut self,
        table: &TableDef,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64>;

    /// Close the connection. Later calls fail.
    async fn close(&mut self) -> Result<()>;
}

/// Opens store connections.
///
/// The restore orchestrator connects once per attempt, so a connector must
/// be reusable.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Open a new connection.
    async fn connect(&self) -> Result<Box<dyn Store>>;

    /// Human-readable target description for logs, without credentials.
    fn describe(&self) -> String;
}

/// SQL syntax strategy for different store engines.
pub trait Dialect: Send + Sync {
    /// Dialect identifier (e.g. "sqlite").
    fn name(&self) -> &str;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_ident(&self, name: &str) -> String;

    /// Native column type for a logical type.
    fn render_type(&self, ty: &LogicalType) -> String;

    /// Full column clause for CREATE TABLE.
    fn column_definition(&self, column: &ColumnDef) -> String;

    /// CREATE TABLE statement for a table definition.
    fn create_table_sql(&self, table: &TableDef) -> String;

    /// CREATE INDEX statement for an index of a table.
    fn create_index_sql(&self, table: &str, index: &IndexDef) -> String;

    /// Get a parameter placeholder for the given 1-based index.
    fn param_placeholder(&self, index: usize) -> String;

    /// Multi-row INSERT statement.
    fn insert_sql(&self, table: &str, columns: &[String], rows: usize) -> String {
        let cols: Vec<String> = columns.iter().map(|c| self.quote_ident(c)).collect();
        let mut n = 0;
        let tuples: Vec<String> = (0..rows)
            .map(|_| {
                let params: Vec<String> = (0..columns.len())
                    .map(|_| {
                        n += 1;
                        self.param_placeholder(n)
                    })
                    .collect();
                format!("({})", params.join(", "))
            })
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.quote_ident(table),
            cols.join(", "),
            tuples.join(", ")
        )
    }
}
