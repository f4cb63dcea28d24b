//! Expiring cache of rendered response bodies.

use crate::store::{FileEntry, VirtualFileStore};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

/// Resource category a max-age applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheCategory {
    /// HTML entry points (instrumented before serving).
    Document,
    /// Everything else.
    Static,
}

impl CacheCategory {
    pub fn of(path: &str) -> Self {
        if crate::mime::is_html(path) {
            Self::Document
        } else {
            Self::Static
        }
    }
}

/// Max-age per category. A zero or missing max-age disables caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    max_age: HashMap<CacheCategory, Duration>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::disabled()
            .with(CacheCategory::Document, Duration::from_secs(60))
            .with(CacheCategory::Static, Duration::from_secs(300))
    }
}

impl CachePolicy {
    pub fn disabled() -> Self {
        Self {
            max_age: HashMap::new(),
        }
    }

    pub fn with(mut self, category: CacheCategory, max_age: Duration) -> Self {
        self.max_age.insert(category, max_age);
        self
    }

    /// Build from a `category → seconds` table.
    pub fn from_seconds(table: &HashMap<CacheCategory, u64>) -> Self {
        Self {
            max_age: table
                .iter()
                .map(|(category, secs)| (*category, Duration::from_secs(*secs)))
                .collect(),
        }
    }

    pub fn max_age(&self, category: CacheCategory) -> Option<Duration> {
        self.max_age
            .get(&category)
            .copied()
            .filter(|age| !age.is_zero())
    }
}

#[derive(Debug, Clone)]
pub struct CachedBody {
    pub body: Bytes,
    pub version: u64,
    pub modified: SystemTime,
    expires: Instant,
}

#[derive(Debug)]
pub struct ResponseCache {
    policy: CachePolicy,
    entries: Mutex<HashMap<String, CachedBody>>,
}

impl ResponseCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Unexpired body for `path`. Expired entries are dropped.
    pub fn get(&self, path: &str) -> Option<CachedBody> {
        let mut entries = self.entries.lock();
        let hit = entries.get(path)?;
        if Instant::now() < hit.expires {
            return Some(hit.clone());
        }
        entries.remove(path);
        None
    }

    /// Cache `body` rendered from the `source` snapshot of `path`.
    ///
    /// The store is re-checked under the cache lock: if a write replaced
    /// the file since `source` was read, nothing is inserted. Writers
    /// evict after replacing, so a stale body can never outlive the write.
    pub fn fill(
        &self,
        store: &VirtualFileStore,
        path: &str,
        source: &FileEntry,
        body: Bytes,
    ) -> bool {
        let Some(max_age) = self.policy.max_age(CacheCategory::of(path)) else {
            return false;
        };
        let mut entries = self.entries.lock();
        if store.version_of(path) != Some(source.version) {
            return false;
        }
        entries.insert(
            path.to_string(),
            CachedBody {
                body,
                version: source.version,
                modified: source.modified,
                expires: Instant::now() + max_age,
            },
        );
        true
    }

    pub fn evict(&self, path: &str) -> bool {
        self.entries.lock().remove(path).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
