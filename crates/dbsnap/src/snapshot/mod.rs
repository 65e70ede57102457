//! The snapshot document: schema and rows of every table in one JSON value.
//!
//! ```json
//! { "version": "1.0",
//!   "tables": { "users": {
//!       "schema": {"columns": [...], "primary_keys": ["id"],
//!                  "unique_constraints": [["name"]], "indexes": ["ix_users_name"]},
//!       "data": [{"id": 1, "name": "ada"}] } },
//!   "relationships": { "posts": [{"column": "user_id", "referenced_table": "users",
//!                                 "referenced_column": "id", "schema": null}] } }
//! ```

pub mod io;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::codec::ColumnDescriptor;
use crate::error::{Result, SnapshotError};
use crate::graph::DependencyGraph;

pub use io::{FileSnapshot, MemorySnapshot, SnapshotSink, SnapshotSource};

/// Version written when none is given, and assumed when a document has none.
pub const DEFAULT_VERSION: &str = "1.0";

/// Major format version this build reads and writes.
pub const SUPPORTED_MAJOR: u32 = 1;

/// One row: column name to JSON-safe value, in column order.
pub type DataRow = Map<String, Value>;

/// Complete snapshot of a database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(default = "default_version")]
    pub version: String,

    pub tables: BTreeMap<String, TableSnapshot>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<BTreeMap<String, Vec<Relationship>>>,
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

/// Schema and rows of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub schema: TableDescriptor,
    pub data: Vec<DataRow>,
}

/// Portable description of one table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub columns: Vec<ColumnDescriptor>,

    #[serde(default)]
    pub primary_keys: Vec<String>,

    #[serde(default)]
    pub unique_constraints: Vec<Vec<String>>,

    #[serde(default)]
    pub indexes: Vec<String>,
}

/// Foreign-key edge recorded in the optional relationships map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    #[serde(default)]
    pub schema: Option<String>,
}

impl SnapshotDocument {
    /// Empty document with the given version tag.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            tables: BTreeMap::new(),
            relationships: None,
        }
    }

    /// Parse and validate a serialized document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let doc: SnapshotDocument = serde_json::from_slice(bytes)
            .map_err(|e| SnapshotError::MalformedDocument(e.to_string()))?;
        check_version(&doc.version).map_err(SnapshotError::MalformedDocument)?;
        Ok(doc)
    }

    /// Serialize for writing.
    pub fn to_vec_pretty(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Total number of rows across tables.
    pub fn row_count(&self) -> usize {
        self.tables.values().map(|t| t.data.len()).sum()
    }

    /// Foreign-key graph over the document's tables, from column foreign keys
    /// and, when present, the relationships map.
    pub fn dependency_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (name, table) in &self.tables {
            graph.add_table(name.as_str());
            for column in &table.schema.columns {
                for fk in &column.foreign_keys {
                    graph.add_dependency(name.as_str(), fk.table.as_str());
                }
            }
        }
        if let Some(relationships) = &self.relationships {
            for (name, edges) in relationships {
                if !self.tables.contains_key(name) {
                    continue;
                }
                for edge in edges {
                    graph.add_dependency(name.as_str(), edge.referenced_table.as_str());
                }
            }
        }
        graph
    }
}

/// Accept a version tag whose leading numeric component is the supported
/// major. Anything may follow it (`1.0`, `1.2-nightly`).
pub fn check_version(version: &str) -> std::result::Result<(), String> {
    let digits: String = version
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    match digits.parse::<u32>() {
        Ok(SUPPORTED_MAJOR) => Ok(()),
        Ok(major) => Err(format!(
            "unsupported format version '{}' (major {}, expected {})",
            version, major, SUPPORTED_MAJOR
        )),
        Err(_) => Err(format!(
            "version '{}' must start with a numeric major version",
            version
        )),
    }
}
