//! SQLite store over a single sqlx connection.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row, Sqlite, TypeInfo, ValueRef};
use tracing::{debug, info};

use super::dialect::SqliteDialect;
use crate::codec::native::classify;
use crate::codec::LogicalType;
use crate::coerce::ValueCoercer;
use crate::core::schema::{Column, ForeignKey, ForeignKeyRef, Index, Table, TableDef};
use crate::core::traits::{Dialect, Store};
use crate::core::value::{Row as NativeRow, SqlValue, DATE_FORMAT};
use crate::drivers::AccessMode;
use crate::error::{Result, SnapshotError};

/// SQLite's compile-time default for bound parameters per statement.
const SQLITE_MAX_VARIABLES: usize = 32766;

/// Storage format for datetimes, matching SQLite's date functions.
const STORE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// One SQLite connection with explicit transaction control.
pub struct SqliteStore {
    conn: Option<SqliteConnection>,
    dialect: SqliteDialect,
    coercer: ValueCoercer,
    mode: AccessMode,
    in_transaction: bool,
}

impl SqliteStore {
    /// Connect to `url` (e.g. `sqlite://app.db`).
    ///
    /// Read-only stores require the file to exist; read-write stores create
    /// it. `busy_timeout` bounds how long SQLite waits on another writer
    /// before reporting the database as locked.
    pub async fn connect(url: &str, busy_timeout: Duration, mode: AccessMode) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| SnapshotError::Config(format!("invalid SQLite URL '{}': {}", url, e)))?
            .busy_timeout(busy_timeout)
            .foreign_keys(true)
            .create_if_missing(mode == AccessMode::ReadWrite)
            .read_only(mode == AccessMode::ReadOnly);

        let conn = options.connect().await?;
        info!("Connected to SQLite database: {}", url);

        Ok(Self {
            conn: Some(conn),
            dialect: SqliteDialect::new(),
            coercer: ValueCoercer::default(),
            mode,
            in_transaction: false,
        })
    }

    fn conn(&mut self) -> Result<&mut SqliteConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| SnapshotError::store("connection is closed", "sqlite"))
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let conn = self.conn()?;
        let result = sqlx::query(sql).execute(conn).await?;
        Ok(result.rows_affected())
    }

    /// Fail with every outstanding foreign-key violation of the open
    /// transaction, so a restore reports it before COMMIT.
    async fn check_foreign_keys(&mut self) -> Result<()> {
        let conn = self.conn()?;
        let rows = sqlx::query("PRAGMA foreign_key_check").fetch_all(conn).await?;
        if let Some(first) = rows.first() {
            let table: String = first.try_get(0)?;
            let parent: String = first.try_get(2)?;
            return Err(SnapshotError::store(
                format!(
                    "{} row(s) violate foreign keys (first: {} referencing {})",
                    rows.len(),
                    table,
                    parent
                ),
                "enabling constraints",
            ));
        }
        Ok(())
    }

    async fn insert_batch(
        &mut self,
        table: &str,
        columns: &[String],
        types: &[Option<LogicalType>],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        let sql = self.dialect.insert_sql(table, columns, rows.len());
        let mut query: SqliteQuery<'_> = sqlx::query(&sql);
        for row in rows {
            for (value, ty) in row.into_iter().zip(types) {
                query = bind_value(query, prepare_value(ty.as_ref(), value));
            }
        }
        let conn = self.conn()?;
        let result = query.execute(conn).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn begin(&mut self) -> Result<()> {
        // Writers take the lock up front so contention surfaces here.
        let sql = match self.mode {
            AccessMode::ReadOnly => "BEGIN",
            AccessMode::ReadWrite => "BEGIN IMMEDIATE",
        };
        self.execute(sql).await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.execute("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction || self.conn.is_none() {
            return Ok(());
        }
        self.in_transaction = false;
        match self.execute("ROLLBACK").await {
            Ok(_) => Ok(()),
            // SQLite already rolled back on its own after some errors
            Err(SnapshotError::Database(e)) if e.to_string().contains("no transaction is active") => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn set_constraint_enforcement(&mut self, enabled: bool) -> Result<()> {
        // `PRAGMA foreign_keys` is a no-op inside a transaction; deferral
        // moves the checks to COMMIT instead.
        if self.in_transaction {
            if enabled {
                self.check_foreign_keys().await?;
                self.execute("PRAGMA defer_foreign_keys = OFF").await?;
            } else {
                self.execute("PRAGMA defer_foreign_keys = ON").await?;
            }
        } else {
            let sql = if enabled {
                "PRAGMA foreign_keys = ON"
            } else {
                "PRAGMA foreign_keys = OFF"
            };
            self.execute(sql).await?;
        }
        debug!("SQLite foreign keys enforced: {}", enabled);
        Ok(())
    }

    async fn reflect(&mut self) -> Result<Vec<Table>> {
        let parser = CheckParser::new()?;
        let conn = self.conn()?;

        let rows = sqlx::query(
            "SELECT name, sql FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&mut *conn)
        .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let sql: Option<String> = row.try_get("sql")?;
            let table = load_table(&mut *conn, &name, sql.as_deref(), &parser)
                .await
                .map_err(|e| e.with_table(&name))?;
            tables.push(table);
        }

        debug!("Reflected {} SQLite tables", tables.len());
        Ok(tables)
    }

    async fn fetch_rows(&mut self, table: &Table) -> Result<Vec<NativeRow>> {
        let cols: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.dialect.quote_ident(&c.name))
            .collect();
        let mut sql = format!(
            "SELECT {} FROM {}",
            cols.join(", "),
            self.dialect.quote_ident(&table.name)
        );
        if table.has_pk() {
            let pk: Vec<String> = table
                .primary_key
                .iter()
                .map(|c| self.dialect.quote_ident(c))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", pk.join(", ")));
        }

        let hints: Vec<Option<LogicalType>> = table
            .columns
            .iter()
            .map(|c| classify(&c.data_type, c.enum_values.as_deref()))
            .collect();

        let conn = self.conn()?;
        let rows = sqlx::query(&sql).fetch_all(conn).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(table.columns.len());
            for (idx, column) in table.columns.iter().enumerate() {
                let value = decode_value(row, idx, hints[idx].as_ref(), &self.coercer)?;
                values.push((column.name.clone(), value));
            }
            out.push(values);
        }
        Ok(out)
    }

    async fn create_tables(&mut self, tables: &[TableDef]) -> Result<()> {
        for table in tables {
            let create = self.dialect.create_table_sql(table);
            self.execute(&create)
                .await
                .map_err(|e| e.with_table(&table.name))?;
            for index in &table.indexes {
                let sql = self.dialect.create_index_sql(&table.name, index);
                self.execute(&sql)
                    .await
                    .map_err(|e| e.with_table(&table.name))?;
            }
            debug!("Created SQLite table {}", table.name);
        }
        Ok(())
    }

    async fn clear_table(&mut self, table: &str) -> Result<u64> {
        let sql = format!("DELETE FROM {}", self.dialect.quote_ident(table));
        self.execute(&sql).await
    }

    async fn insert_rows(
        &mut self,
        table: &TableDef,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(0);
        }

        let types: Vec<Option<LogicalType>> = columns
            .iter()
            .map(|c| table.column(c).map(|d| d.logical_type.clone()))
            .collect();
        let rows_per_batch = (SQLITE_MAX_VARIABLES / columns.len()).max(1);

        let mut inserted = 0;
        let mut batch = Vec::with_capacity(rows_per_batch.min(rows.len()));
        for row in rows {
            batch.push(row);
            if batch.len() == rows_per_batch {
                let full = std::mem::take(&mut batch);
                inserted += self.insert_batch(&table.name, columns, &types, full).await?;
            }
        }
        if !batch.is_empty() {
            inserted += self.insert_batch(&table.name, columns, &types, batch).await?;
        }

        debug!("SQLite: wrote {} rows to {}", inserted, table.name);
        Ok(inserted)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
        }
        Ok(())
    }
}

/// Reflect one table from the catalog.
async fn load_table(
    conn: &mut SqliteConnection,
    name: &str,
    create_sql: Option<&str>,
    parser: &CheckParser,
) -> Result<Table> {
    let mut table = Table {
        name: name.to_string(),
        ..Default::default()
    };

    let enums = create_sql.map(|s| parser.enum_columns(s)).unwrap_or_default();

    // Columns and primary key
    let rows = sqlx::query(
        "SELECT name, type, \"notnull\", dflt_value, pk \
         FROM pragma_table_info(?) ORDER BY cid",
    )
    .bind(name)
    .fetch_all(&mut *conn)
    .await?;

    let mut pk: Vec<(i64, String)> = Vec::new();
    for row in &rows {
        let column_name: String = row.try_get("name")?;
        let pk_pos: i64 = row.try_get("pk")?;
        if pk_pos > 0 {
            pk.push((pk_pos, column_name.clone()));
        }
        let enum_values = enums
            .iter()
            .find(|(c, _)| c == &column_name)
            .map(|(_, v)| v.clone());
        table.columns.push(Column {
            data_type: row.try_get("type")?,
            enum_values,
            is_nullable: row.try_get::<i64, _>("notnull")? == 0,
            is_primary_key: pk_pos > 0,
            default: row
                .try_get::<Option<String>, _>("dflt_value")?
                .map(|d| reflected_default(&d)),
            name: column_name,
            ..Default::default()
        });
    }
    pk.sort();
    table.primary_key = pk.into_iter().map(|(_, c)| c).collect();

    load_foreign_keys(conn, &mut table).await?;
    load_indexes(conn, &mut table).await?;

    Ok(table)
}

async fn load_foreign_keys(conn: &mut SqliteConnection, table: &mut Table) -> Result<()> {
    let rows = sqlx::query(
        "SELECT id, seq, \"table\", \"from\", \"to\" \
         FROM pragma_foreign_key_list(?) ORDER BY id, seq",
    )
    .bind(&table.name)
    .fetch_all(&mut *conn)
    .await?;

    let mut current: Option<(i64, ForeignKey)> = None;
    for row in &rows {
        let id: i64 = row.try_get("id")?;
        let seq: i64 = row.try_get("seq")?;
        let ref_table: String = row.try_get("table")?;
        let from: String = row.try_get("from")?;
        let to = match row.try_get::<Option<String>, _>("to")? {
            Some(to) => to,
            // Implicit target: the referenced table's primary key
            None => referenced_pk(conn, &ref_table)
                .await?
                .into_iter()
                .nth(seq as usize)
                .unwrap_or_default(),
        };

        if let Some(column) = table.columns.iter_mut().find(|c| c.name == from) {
            column.foreign_keys.push(ForeignKeyRef {
                column: to.clone(),
                table: ref_table.clone(),
                schema: None,
            });
        }

        // Composite keys arrive as consecutive rows sharing an id
        match current.as_mut() {
            Some((cur, fk)) if *cur == id => {
                fk.columns.push(from);
                fk.ref_columns.push(to);
            }
            _ => {
                let next = ForeignKey {
                    columns: vec![from],
                    ref_table,
                    ref_schema: None,
                    ref_columns: vec![to],
                };
                if let Some((_, fk)) = current.replace((id, next)) {
                    table.foreign_keys.push(fk);
                }
            }
        }
    }
    if let Some((_, fk)) = current {
        table.foreign_keys.push(fk);
    }
    Ok(())
}

async fn referenced_pk(conn: &mut SqliteConnection, table: &str) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT name FROM pragma_table_info(?) WHERE pk > 0 ORDER BY pk")
        .bind(table)
        .fetch_all(conn)
        .await?;
    rows.iter()
        .map(|r| r.try_get::<String, _>("name").map_err(SnapshotError::from))
        .collect()
}

async fn load_indexes(conn: &mut SqliteConnection, table: &mut Table) -> Result<()> {
    let rows = sqlx::query(
        "SELECT name, origin FROM pragma_index_list(?) ORDER BY name",
    )
    .bind(&table.name)
    .fetch_all(&mut *conn)
    .await?;

    for row in &rows {
        let index_name: String = row.try_get("name")?;
        let origin: String = row.try_get("origin")?;
        if origin == "pk" {
            continue;
        }

        let info = sqlx::query("SELECT name FROM pragma_index_info(?) ORDER BY seqno")
            .bind(&index_name)
            .fetch_all(&mut *conn)
            .await?;
        let mut columns = Vec::with_capacity(info.len());
        for r in &info {
            // Expression indexes have no column name
            match r.try_get::<Option<String>, _>("name")? {
                Some(c) => columns.push(c),
                None => {
                    columns.clear();
                    break;
                }
            }
        }
        if columns.is_empty() {
            debug!("Skipping expression index {} on {}", index_name, table.name);
            continue;
        }

        if origin == "u" {
            if let [single] = columns.as_slice() {
                if let Some(column) = table.columns.iter_mut().find(|c| &c.name == single) {
                    column.is_unique = true;
                }
            }
            table.unique_constraints.push(columns);
        } else {
            for column in table.columns.iter_mut() {
                if columns.contains(&column.name) {
                    column.is_indexed = true;
                }
            }
            table.indexes.push(Index {
                name: index_name,
                columns,
            });
        }
    }
    Ok(())
}

/// Recovers enumeration members from `CHECK (col IN ('a', 'b'))` clauses.
struct CheckParser {
    clause: Regex,
    literal: Regex,
}

impl CheckParser {
    fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| SnapshotError::store(e.to_string(), "compiling CHECK parser"))
        };
        Ok(Self {
            clause: compile(
                r#"(?i)CHECK\s*\(\s*(?:"((?:[^"]|"")+)"|`([^`]+)`|\[([^\]]+)\]|(\w+))\s+IN\s*\(((?:'(?:[^']|'')*'|[^')])*)\)\s*\)"#,
            )?,
            literal: compile(r"'((?:[^']|'')*)'")?,
        })
    }

    /// `(column, members)` for every enumeration check in a CREATE TABLE.
    fn enum_columns(&self, create_sql: &str) -> Vec<(String, Vec<String>)> {
        self.clause
            .captures_iter(create_sql)
            .filter_map(|caps| {
                let column = match caps.get(1) {
                    Some(quoted) => quoted.as_str().replace("\"\"", "\""),
                    None => (2..=4).find_map(|i| caps.get(i))?.as_str().to_string(),
                };
                let values: Vec<String> = self
                    .literal
                    .captures_iter(caps.get(5)?.as_str())
                    .filter_map(|v| v.get(1).map(|m| m.as_str().replace("''", "'")))
                    .collect();
                (!values.is_empty()).then_some((column, values))
            })
            .collect()
    }
}

/// Restore the parentheses SQLite strips from expression defaults, so
/// `DEFAULT (datetime('now'))` is recreated as an expression and not as
/// the text `datetime('now')`. Literals are returned unchanged.
fn reflected_default(raw: &str) -> String {
    let trimmed = raw.trim();
    let upper = trimmed.to_ascii_uppercase();
    let is_literal = trimmed.parse::<f64>().is_ok()
        || is_quoted(trimmed, '\'')
        || is_quoted(trimmed, '"')
        || (upper.starts_with('X') && is_quoted(&trimmed[1..], '\''))
        || matches!(
            upper.as_str(),
            "NULL" | "TRUE" | "FALSE" | "CURRENT_TIME" | "CURRENT_DATE" | "CURRENT_TIMESTAMP"
        )
        || trimmed.chars().all(|c| c.is_alphanumeric() || c == '_');
    if is_literal {
        raw.to_string()
    } else {
        format!("({})", trimmed)
    }
}

/// Whether `text` is one quoted token, with doubled quotes as escapes.
fn is_quoted(text: &str, quote: char) -> bool {
    if text.len() < 2 || !text.starts_with(quote) || !text.ends_with(quote) {
        return false;
    }
    let doubled: String = [quote, quote].iter().collect();
    !text[1..text.len() - 1].replace(&doubled, "").contains(quote)
}

/// Decode one column of a row by its storage class, refined by the
/// column's logical type.
fn decode_value(
    row: &SqliteRow,
    idx: usize,
    hint: Option<&LogicalType>,
    coercer: &ValueCoercer,
) -> Result<SqlValue> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let storage = raw.type_info().name().to_string();

    let value = match storage.as_str() {
        "INTEGER" => {
            let v: i64 = row.try_get_unchecked(idx)?;
            match hint {
                Some(LogicalType::Boolean) => SqlValue::Bool(v != 0),
                Some(LogicalType::Numeric { scale, .. }) => {
                    SqlValue::Decimal(rescaled(Decimal::from(v), *scale))
                }
                _ => SqlValue::I64(v),
            }
        }
        "REAL" => {
            let v: f64 = row.try_get_unchecked(idx)?;
            match (hint, Decimal::from_f64(v)) {
                (Some(LogicalType::Numeric { scale, .. }), Some(d)) => {
                    SqlValue::Decimal(rescaled(d, *scale))
                }
                _ => SqlValue::F64(v),
            }
        }
        "BLOB" => SqlValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        _ => {
            let text: String = row.try_get_unchecked(idx)?;
            match hint {
                Some(LogicalType::DateTime) => coercer
                    .parse_datetime(&text)
                    .map(SqlValue::DateTime)
                    .unwrap_or(SqlValue::Text(text)),
                Some(LogicalType::Date) => coercer
                    .parse_date(&text)
                    .map(SqlValue::Date)
                    .unwrap_or(SqlValue::Text(text)),
                Some(LogicalType::Numeric { scale, .. }) => Decimal::from_str(&text)
                    .map(|d| SqlValue::Decimal(rescaled(d, *scale)))
                    .unwrap_or(SqlValue::Text(text)),
                Some(LogicalType::Array { .. }) => {
                    serde_json::from_str::<serde_json::Value>(&text)
                        .map(SqlValue::Json)
                        .unwrap_or(SqlValue::Text(text))
                }
                _ => SqlValue::Text(text),
            }
        }
    };
    Ok(value)
}

fn rescaled(mut value: Decimal, scale: Option<u32>) -> Decimal {
    if let Some(scale) = scale {
        value.rescale(scale);
    }
    value
}

/// Adjust a document value to the column it is written into.
fn prepare_value(ty: Option<&LogicalType>, value: SqlValue) -> SqlValue {
    match (ty, value) {
        (Some(LogicalType::LargeBinary), SqlValue::Text(text)) => match hex::decode(&text) {
            Ok(bytes) => SqlValue::Bytes(bytes),
            Err(_) => SqlValue::Text(text),
        },
        (Some(LogicalType::Boolean), SqlValue::I64(v)) => SqlValue::Bool(v != 0),
        (_, value) => value,
    }
}

fn bind_value(query: SqliteQuery<'_>, value: SqlValue) -> SqliteQuery<'_> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(v),
        SqlValue::I64(v) => query.bind(v),
        SqlValue::F64(v) => query.bind(v),
        SqlValue::Decimal(v) => query.bind(v.to_string()),
        SqlValue::Text(v) => query.bind(v),
        SqlValue::Bytes(v) => query.bind(v),
        SqlValue::DateTime(v) => query.bind(v.format(STORE_DATETIME_FORMAT).to_string()),
        SqlValue::Date(v) => query.bind(v.format(DATE_FORMAT).to_string()),
        SqlValue::Json(v) => query.bind(v.to_string()),
    }
}
