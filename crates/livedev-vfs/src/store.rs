//! In-memory project file store.
//!
//! Every write installs a fresh immutable [`FileEntry`]; readers clone the
//! `Arc` and never observe a partially written file.

use crate::path::{PathError, normalize};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

#[derive(Debug)]
pub struct FileEntry {
    pub bytes: Bytes,
    /// Store-wide monotonically increasing write counter.
    pub version: u64,
    pub modified: SystemTime,
}

#[derive(Debug, Default)]
pub struct VirtualFileStore {
    files: RwLock<BTreeMap<String, Arc<FileEntry>>>,
    versions: AtomicU64,
}

impl VirtualFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents at `path`, returning the normalized path.
    pub fn write(&self, path: &str, bytes: impl Into<Bytes>) -> Result<String, PathError> {
        let path = normalize(path)?;
        if path.is_empty() {
            return Err(PathError::Invalid);
        }
        let entry = Arc::new(FileEntry {
            bytes: bytes.into(),
            version: self.versions.fetch_add(1, Ordering::Relaxed) + 1,
            modified: SystemTime::now(),
        });
        self.files.write().insert(path.clone(), entry);
        Ok(path)
    }

    /// Remove the file at `path`. Returns the normalized path if it existed.
    pub fn remove(&self, path: &str) -> Result<Option<String>, PathError> {
        let path = normalize(path)?;
        Ok(self.files.write().remove(&path).map(|_| path))
    }

    /// Snapshot of a normalized path.
    pub fn get(&self, path: &str) -> Option<Arc<FileEntry>> {
        self.files.read().get(path).cloned()
    }

    pub fn version_of(&self, path: &str) -> Option<u64> {
        self.files.read().get(path).map(|e| e.version)
    }

    /// Whether any file lives under `dir` (a normalized path, "" for the root).
    pub fn is_dir(&self, dir: &str) -> bool {
        let files = self.files.read();
        if dir.is_empty() {
            return !files.is_empty();
        }
        let prefix = format!("{dir}/");
        files
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(&prefix))
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}
