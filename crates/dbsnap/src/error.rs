//! Error types for the snapshot library.

use thiserror::Error;

/// Main error type for backup and restore operations.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Configuration error (invalid YAML, bad arguments, unknown URL scheme)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A native or portable column type outside the supported set
    #[error("Unsupported type '{type_name}' for column {column}")]
    UnsupportedType { column: String, type_name: String },

    /// The snapshot document is missing fields, has an unknown version, or
    /// carries data that does not match its own schema
    #[error("Malformed snapshot document: {0}")]
    MalformedDocument(String),

    /// Foreign keys form a cycle, so no creation order exists
    #[error("Cyclic foreign-key dependency between tables: {}", tables.join(", "))]
    CyclicDependency { tables: Vec<String> },

    /// The store reported a transient lock; the operation may be retried
    #[error("Database is locked: {0}")]
    Locked(String),

    /// Store query or connection error
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    /// Store error raised outside sqlx, with context about where it occurred
    #[error("Store error: {message}\n  Context: {context}")]
    Store { message: String, context: String },

    /// Failure while processing a specific table
    #[error("Table {table}: {source}")]
    Table {
        table: String,
        #[source]
        source: Box<SnapshotError>,
    },

    /// Every restore attempt hit a lock
    #[error("Restore failed after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last_error: Box<SnapshotError>,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<sqlx::Error> for SnapshotError {
    fn from(err: sqlx::Error) -> Self {
        if crate::drivers::sqlite::is_lock_error(&err) {
            SnapshotError::Locked(err.to_string())
        } else {
            SnapshotError::Database(err)
        }
    }
}

impl SnapshotError {
    /// Create a Store error with context about where it occurred
    pub fn store(message: impl Into<String>, context: impl Into<String>) -> Self {
        SnapshotError::Store {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create an UnsupportedType error for `table.column`
    pub fn unsupported(table: &str, column: &str, type_name: impl Into<String>) -> Self {
        SnapshotError::UnsupportedType {
            column: format!("{}.{}", table, column),
            type_name: type_name.into(),
        }
    }

    /// Attach table context. Errors that already carry it are left alone.
    pub fn with_table(self, table: impl Into<String>) -> Self {
        match self {
            e @ SnapshotError::Table { .. } => e,
            e @ SnapshotError::CyclicDependency { .. } => e,
            e => SnapshotError::Table {
                table: table.into(),
                source: Box::new(e),
            },
        }
    }

    /// True if this error, or the error it wraps, is a transient lock.
    pub fn is_locked(&self) -> bool {
        match self {
            SnapshotError::Locked(_) => true,
            SnapshotError::Table { source, .. } => source.is_locked(),
            _ => false,
        }
    }

    /// The innermost error once table context is peeled off.
    pub fn root(&self) -> &SnapshotError {
        match self {
            SnapshotError::Table { source, .. } => source.root(),
            e => e,
        }
    }

    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> u8 {
        match self.root() {
            SnapshotError::Config(_) | SnapshotError::Yaml(_) => 2,
            SnapshotError::MalformedDocument(_) | SnapshotError::Json(_) => 3,
            SnapshotError::CyclicDependency { .. } => 4,
            SnapshotError::Locked(_) | SnapshotError::RetriesExhausted { .. } => 5,
            SnapshotError::UnsupportedType { .. } => 6,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for snapshot operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;
