//! SQLite SQL dialect.
//!
//! SQLite has no native enum or array types. Enumerations become a bounded
//! `VARCHAR` with a `CHECK (col IN (...))` clause, which reflection parses
//! back into members. Arrays are declared as `<ELEMENT> ARRAY` and hold JSON
//! text; the declared type survives in the catalog so the element type is
//! recovered on the next backup.

use crate::codec::LogicalType;
use crate::core::schema::{ColumnDef, IndexDef, TableDef};
use crate::core::traits::Dialect;

/// SQLite dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    pub fn new() -> Self {
        Self
    }

    fn quote_literal(value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Default expressions are emitted verbatim when they already read as
    /// SQL (numbers, quoted strings, parenthesized expressions, keywords);
    /// anything else is treated as a string literal.
    fn render_default(default: &str) -> String {
        let trimmed = default.trim();
        let upper = trimmed.to_ascii_uppercase();
        let is_sql = trimmed.parse::<f64>().is_ok()
            || trimmed.starts_with('\'')
            || trimmed.starts_with('"')
            || trimmed.starts_with('(')
            || matches!(upper.as_str(), "NULL" | "TRUE" | "FALSE")
            || upper.starts_with("CURRENT_");
        if is_sql {
            trimmed.to_string()
        } else {
            Self::quote_literal(trimmed)
        }
    }

    /// Element type name without parameters, for array declarations.
    fn element_type(&self, item: &LogicalType) -> String {
        let rendered = self.render_type(item);
        match rendered.find('(') {
            Some(open) => rendered[..open].to_string(),
            None => rendered,
        }
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn render_type(&self, ty: &LogicalType) -> String {
        match ty {
            LogicalType::Integer => "INTEGER".to_string(),
            LogicalType::String { length: Some(n) } => format!("VARCHAR({})", n),
            LogicalType::String { length: None } => "VARCHAR".to_string(),
            LogicalType::Float => "FLOAT".to_string(),
            LogicalType::Boolean => "BOOLEAN".to_string(),
            LogicalType::DateTime => "DATETIME".to_string(),
            LogicalType::Date => "DATE".to_string(),
            LogicalType::Text => "TEXT".to_string(),
            LogicalType::Numeric {
                precision: Some(p),
                scale: Some(s),
            } => format!("NUMERIC({}, {})", p, s),
            LogicalType::Numeric {
                precision: Some(p),
                scale: None,
            } => format!("NUMERIC({})", p),
            LogicalType::Numeric { precision: None, .. } => "NUMERIC".to_string(),
            LogicalType::LargeBinary => "BLOB".to_string(),
            LogicalType::Enum { values } => {
                let width = values.iter().map(|v| v.chars().count()).max().unwrap_or(0);
                format!("VARCHAR({})", width.max(1))
            }
            LogicalType::Array { item } => format!("{} ARRAY", self.element_type(item)),
        }
    }

    fn column_definition(&self, column: &ColumnDef) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote_ident(&column.name),
            self.render_type(&column.logical_type)
        );
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if column.unique && !column.primary_key {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&Self::render_default(default));
        }
        if let LogicalType::Enum { values } = &column.logical_type {
            if !values.is_empty() {
                let members: Vec<String> = values.iter().map(|v| Self::quote_literal(v)).collect();
                sql.push_str(&format!(
                    " CHECK ({} IN ({}))",
                    self.quote_ident(&column.name),
                    members.join(", ")
                ));
            }
        }
        sql
    }

    fn create_table_sql(&self, table: &TableDef) -> String {
        let mut parts: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();

        let quote_all = |cols: &[String]| -> String {
            cols.iter()
                .map(|c| self.quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ")
        };

        if !table.primary_key.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", quote_all(&table.primary_key)));
        }
        for group in &table.unique_constraints {
            parts.push(format!("UNIQUE ({})", quote_all(group)));
        }
        for column in &table.columns {
            for fk in &column.foreign_keys {
                parts.push(format!(
                    "FOREIGN KEY ({}) REFERENCES {} ({})",
                    self.quote_ident(&column.name),
                    self.quote_ident(&fk.table),
                    self.quote_ident(&fk.column)
                ));
            }
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.quote_ident(&table.name),
            parts.join(",\n    ")
        )
    }

    fn create_index_sql(&self, table: &str, index: &IndexDef) -> String {
        let cols: Vec<String> = index.columns.iter().map(|c| self.quote_ident(c)).collect();
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            self.quote_ident(&index.name),
            self.quote_ident(table),
            cols.join(", ")
        )
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }
}
