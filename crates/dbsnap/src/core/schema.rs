//! Schema metadata for tables, columns, indexes, and constraints.
//!
//! Two families live here. [`Table`] and [`Column`] describe what a store
//! reports about itself during backup. [`TableDef`] and [`ColumnDef`] are
//! what a restore rebuilds from a snapshot document before handing it to a
//! store to create.

use serde::{Deserialize, Serialize};

use crate::codec::LogicalType;

/// Reference from a column to a column of another (or the same) table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Referenced column.
    pub column: String,

    /// Referenced table.
    pub table: String,

    /// Referenced schema, if the store has schemas.
    #[serde(default)]
    pub schema: Option<String>,
}

/// Column metadata as reflected from a store.
#[derive(Debug, Clone, Default)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Declared native type (e.g. "VARCHAR(50)", "INTEGER").
    pub data_type: String,

    /// Enumeration members recovered from the catalog, if any.
    pub enum_values: Option<Vec<String>>,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Whether the column is part of the primary key.
    pub is_primary_key: bool,

    /// Whether a single-column unique constraint covers the column.
    pub is_unique: bool,

    /// Whether an explicit index covers the column.
    pub is_indexed: bool,

    /// Default expression as declared.
    pub default: Option<String>,

    /// Outgoing foreign keys.
    pub foreign_keys: Vec<ForeignKeyRef>,
}

/// Named index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    /// Index name.
    pub name: String,

    /// Indexed columns in key order.
    pub columns: Vec<String>,
}

/// Table-level foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Referencing columns.
    pub columns: Vec<String>,

    /// Referenced table.
    pub ref_table: String,

    /// Referenced schema.
    pub ref_schema: Option<String>,

    /// Referenced columns, parallel to `columns`.
    pub ref_columns: Vec<String>,
}

/// Table metadata as reflected from a store.
#[derive(Debug, Clone, Default)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Column definitions in ordinal order.
    pub columns: Vec<Column>,

    /// Primary key column names in key order.
    pub primary_key: Vec<String>,

    /// Unique constraint column groups.
    pub unique_constraints: Vec<Vec<String>>,

    /// Explicit (non-constraint) indexes.
    pub indexes: Vec<Index>,

    /// Foreign key constraints.
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }
}

/// Column definition rebuilt from a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub logical_type: LogicalType,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub default: Option<String>,
    pub foreign_keys: Vec<ForeignKeyRef>,
}

/// Index definition with its columns already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
}

/// Table definition rebuilt from a snapshot, ready for creation.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub unique_constraints: Vec<Vec<String>>,
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk(table: &str) -> ForeignKeyRef {
        ForeignKeyRef {
            column: "id".into(),
            table: table.into(),
            schema: None,
        }
    }

    fn col(name: &str, fks: Vec<ForeignKeyRef>) -> ColumnDef {
        ColumnDef {
            name: name.into(),
            logical_type: LogicalType::Integer,
            nullable: true,
            primary_key: false,
            unique: false,
            default: None,
            foreign_keys: fks,
        }
    }

    #[test]
    fn test_column_lookup() {
        let table = TableDef {
            name: "posts".into(),
            columns: vec![
                col("id", vec![]),
                col("author_id", vec![fk("users")]),
                col("editor_id", vec![fk("users"), fk("staff")]),
            ],
            primary_key: vec!["id".into()],
            unique_constraints: vec![],
            indexes: vec![],
        };
        assert_eq!(table.column("editor_id").unwrap().foreign_keys.len(), 2);
        assert!(table.column("author_id").is_some());
        assert!(table.column("missing").is_none());
    }

    #[test]
    fn test_foreign_key_ref_schema_defaults_to_none() {
        let parsed: ForeignKeyRef =
            serde_json::from_str(r#"{"column": "id", "table": "users"}"#).unwrap();
        assert_eq!(parsed, fk("users"));
    }
}
