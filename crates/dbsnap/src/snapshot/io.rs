//! Whole-document artifact I/O.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::{Result, SnapshotError};

/// Destination for a serialized snapshot.
///
/// `write` receives the complete document. Implementations must not leave a
/// partial artifact behind when it fails.
pub trait SnapshotSink: Send + Sync {
    fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Where the snapshot goes, for logs.
    fn describe(&self) -> String;
}

/// Origin of a serialized snapshot. Read once per restore attempt.
pub trait SnapshotSource: Send + Sync {
    fn read(&self) -> Result<Vec<u8>>;

    /// Where the snapshot comes from, for logs.
    fn describe(&self) -> String;
}

/// Snapshot stored in a file.
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    path: PathBuf,
}

impl FileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Sibling of the target named `<file name>.tmp`.
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotSink for FileSnapshot {
    fn write(&self, bytes: &[u8]) -> Result<()> {
        // Atomic write: write to temp file, then rename
        let temp_path = self.temp_path();
        let written = std::fs::write(&temp_path, bytes)
            .and_then(|_| std::fs::rename(&temp_path, &self.path));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&temp_path);
            return Err(SnapshotError::Io(e));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

impl SnapshotSource for FileSnapshot {
    fn read(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path).map_err(|e| {
            SnapshotError::store(e.to_string(), format!("reading {}", self.path.display()))
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Snapshot held in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    bytes: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-filled with a serialized document.
    pub fn with_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(Some(bytes.into()))),
        }
    }

    /// Current contents, if anything was written.
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.bytes.lock().ok().and_then(|b| b.clone())
    }
}

impl SnapshotSink for MemorySnapshot {
    fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = self
            .bytes
            .lock()
            .map_err(|_| SnapshotError::store("buffer lock poisoned", "memory snapshot"))?;
        *guard = Some(bytes.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

impl SnapshotSource for MemorySnapshot {
    fn read(&self) -> Result<Vec<u8>> {
        self.contents()
            .ok_or_else(|| SnapshotError::MalformedDocument("snapshot is empty".to_string()))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
