//! Bounded cache of parsed YAML documents.
//!
//! Change detection across many snapshots re-reads the same files over and
//! over; entries are keyed by path jointly with the file's mtime so an
//! unchanged file is parsed once per session. When the capacity is exceeded
//! the single oldest-inserted entry is evicted (insertion order, not LRU).

use crate::error::Result;
use serde_yaml::Value;
use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;

pub const YAML_CACHE_CAPACITY: usize = 100;

struct CacheEntry {
    mtime: SystemTime,
    value: Arc<Value>,
}

struct Inner {
    entries: HashMap<PathBuf, CacheEntry>,
    order: VecDeque<PathBuf>,
}

pub struct YamlCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl Default for YamlCache {
    fn default() -> Self {
        Self::with_capacity(YAML_CACHE_CAPACITY)
    }
}

impl YamlCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity,
        }
    }

    /// Load and parse a YAML file, memoized on (path, mtime). A missing file
    /// is `Ok(None)` — absence is ordinary during change detection. Parse
    /// failures propagate so callers can apply their own conservative
    /// fallback.
    pub async fn load(&self, path: &Path) -> Result<Option<Arc<Value>>> {
        let mtime = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        {
            let inner = self.inner.lock().await;
            if let Some(entry) = inner.entries.get(path) {
                if entry.mtime == mtime {
                    return Ok(Some(entry.value.clone()));
                }
            }
        }

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value: Arc<Value> = Arc::new(serde_yaml::from_str(&contents)?);

        let mut inner = self.inner.lock().await;
        if !inner.entries.contains_key(path) {
            if inner.entries.len() >= self.capacity {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.entries.remove(&oldest);
                }
            }
            inner.order.push_back(path.to_path_buf());
        }
        inner.entries.insert(
            path.to_path_buf(),
            CacheEntry {
                mtime,
                value: value.clone(),
            },
        );
        Ok(Some(value))
    }

    /// Drop entries for paths outside the live config root. Called after bulk
    /// snapshot filtering so parsed backup files do not pin memory.
    pub async fn purge_outside(&self, live_root: &Path) -> usize {
        let mut inner = self.inner.lock().await;
        let keep: Vec<PathBuf> = inner
            .order
            .iter()
            .filter(|p| p.starts_with(live_root))
            .cloned()
            .collect();
        let purged = inner.entries.len() - keep.len();
        inner.entries.retain(|p, _| p.starts_with(live_root));
        inner.order = keep.into();
        purged
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }
}
