//! Local persisted key/value store and a TTL cache on top of it.
//!
//! [`LocalStore`] keeps every entry in one JSON object on disk. Keys are
//! namespaced with a prefix so several tools can share a file, and `clear`
//! only touches keys under its own prefix. Every operation reads the file,
//! and writes merge into what is on disk at that moment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_PREFIX: &str = "datalogger:";
pub const STORE_FILE: &str = "store.json";

/// Default freshness window for cached history.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store entry is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("no data directory available for this platform")]
    NoDataDir,
}

/// Default data directory (`~/.local/share/datalogger` on Linux).
pub fn default_data_dir() -> Result<PathBuf, StoreError> {
    directories::ProjectDirs::from("", "", "datalogger")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(StoreError::NoDataDir)
}

#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    prefix: String,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

type Entries = BTreeMap<String, Value>;

impl LocalStore {
    /// Open (or create on first write) the store file at `path`.
    pub fn open(path: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self, StoreError> {
        let store = Self {
            path: path.into(),
            prefix: prefix.into(),
            lock: Mutex::new(()),
        };
        store.read_entries()?;
        Ok(store)
    }

    /// Store file `store.json` inside `dir` with the default prefix.
    pub fn in_dir(dir: &Path) -> Result<Self, StoreError> {
        Self::open(dir.join(STORE_FILE), DEFAULT_PREFIX)
    }

    pub fn open_default() -> Result<Self, StoreError> {
        Self::in_dir(&default_data_dir()?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;
        match entries.remove(&self.full_key(key)) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        let key = self.full_key(key);
        self.update(|entries| {
            entries.insert(key, value);
            true
        })
    }

    /// Returns whether the key existed.
    pub fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let key = self.full_key(key);
        let mut existed = false;
        self.update(|entries| {
            existed = entries.remove(&key).is_some();
            existed
        })?;
        Ok(existed)
    }

    /// Remove every key under this store's prefix.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.update(|entries| {
            let before = entries.len();
            entries.retain(|k, _| !k.starts_with(&self.prefix));
            entries.len() != before
        })
    }

    /// Keys under this store's prefix, without the prefix.
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self
            .read_entries()?
            .keys()
            .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }

    /// Apply `change` to the entries currently on disk and write them back
    /// when it reports a modification. Keys written by other stores sharing
    /// the file are preserved, and a failed write leaves the file untouched.
    fn update(&self, change: impl FnOnce(&mut Entries) -> bool) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;
        if change(&mut entries) {
            self.persist(&entries)?;
        }
        Ok(())
    }

    fn read_entries(&self) -> Result<Entries, StoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(Entries::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Entries::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a sibling temp file and rename over the target.
    fn persist(&self, entries: &Entries) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

// =============================================================================
// TtlCache
// =============================================================================

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    data: T,
    /// Unix milliseconds at which `data` was stored.
    timestamp: i64,
}

/// Time-boxed JSON cache. Entries older than the TTL are dropped on read.
#[derive(Debug, Clone)]
pub struct TtlCache {
    store: Arc<LocalStore>,
    ttl: Duration,
}

impl TtlCache {
    pub fn new(store: Arc<LocalStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn with_default_ttl(store: Arc<LocalStore>) -> Self {
        Self::new(store, DEFAULT_CACHE_TTL)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.load_at(key, chrono::Utc::now().timestamp_millis())
    }

    /// Like [`load`](Self::load) with an explicit clock.
    pub fn load_at<T: DeserializeOwned>(&self, key: &str, now_ms: i64) -> Option<T> {
        let envelope = match self.store.get::<Envelope<T>>(key) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(key, error = %e, "Dropping unreadable cache entry");
                self.invalidate(key);
                return None;
            }
        };
        let age_ms = now_ms.saturating_sub(envelope.timestamp);
        if age_ms > self.ttl.as_millis() as i64 {
            self.invalidate(key);
            return None;
        }
        Some(envelope.data)
    }

    pub fn store<T: Serialize>(&self, key: &str, data: &T) -> Result<(), StoreError> {
        self.store_at(key, data, chrono::Utc::now().timestamp_millis())
    }

    pub fn store_at<T: Serialize>(&self, key: &str, data: &T, now_ms: i64) -> Result<(), StoreError> {
        self.store.set(
            key,
            &Envelope {
                data,
                timestamp: now_ms,
            },
        )
    }

    pub fn invalidate(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            tracing::warn!(key, error = %e, "Failed to remove cache entry");
        }
    }
}
