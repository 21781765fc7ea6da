//! Artifact cache
//!
//! Memoizes expensive results (tuning sweeps, fitted workflows, ROC plot
//! objects) keyed by workflow fingerprint, dataset identity and
//! hyperparameters. Payloads are JSON; a payload that no longer parses is
//! treated as a miss and recomputed.

use crate::error::{FlowError, Result};
use crate::utils::sha256_hex;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Kind of cached artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    Tuning,
    FittedModel,
    RocPlot,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Tuning => "tuning",
            ArtifactKind::FittedModel => "model",
            ArtifactKind::RocPlot => "roc",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub kind: ArtifactKind,
    pub workflow: String,
    pub dataset: String,
    /// Canonical JSON of the hyperparameters or grid
    pub params: String,
}

impl CacheKey {
    pub fn new(
        kind: ArtifactKind,
        workflow: impl Into<String>,
        dataset: impl Into<String>,
        params: &impl Serialize,
    ) -> Result<Self> {
        Ok(Self {
            kind,
            workflow: workflow.into(),
            dataset: dataset.into(),
            params: serde_json::to_string(params)?,
        })
    }

    pub fn digest(&self) -> String {
        let payload = format!("{}|{}|{}|{}", self.kind, self.workflow, self.dataset, self.params);
        sha256_hex(payload.as_bytes())
    }

    /// `{kind}-{digest}.json`
    pub fn file_name(&self) -> String {
        format!("{}-{}.json", self.kind, self.digest())
    }
}

/// Backend holding serialized artifacts
pub trait ArtifactStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<String>>;
    fn put(&self, key: &CacheKey, payload: &str) -> Result<()>;
    fn remove(&self, key: &CacheKey) -> Result<()>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process store
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryStore {
    fn get(&self, key: &CacheKey) -> Result<Option<String>> {
        Ok(self.entries.read().get(&key.digest()).cloned())
    }

    fn put(&self, key: &CacheKey, payload: &str) -> Result<()> {
        self.entries.write().insert(key.digest(), payload.to_string());
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<()> {
        self.entries.write().remove(&key.digest());
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// One JSON file per artifact in a directory
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| {
            FlowError::CacheError(format!("cannot create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

impl ArtifactStore for DiskStore {
    fn get(&self, key: &CacheKey) -> Result<Option<String>> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn put(&self, key: &CacheKey, payload: &str) -> Result<()> {
        // write then rename so readers never see a partial file
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, payload)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<()> {
        let path = self.path(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn len(&self) -> usize {
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().extension().map_or(false, |x| x == "json"))
                    .count()
            })
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Typed cache over an [`ArtifactStore`]
pub struct ArtifactCache {
    store: Box<dyn ArtifactStore>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ArtifactCache {
    pub fn new(store: Box<dyn ArtifactStore>) -> Self {
        Self {
            store,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn memory() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }

    pub fn on_disk(dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Box::new(DiskStore::open(dir)?)))
    }

    /// Cached value for `key`; unreadable payloads count as misses
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        let value = match self.store.get(key)? {
            Some(payload) => match serde_json::from_str(&payload) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(kind = %key.kind, error = %e, "discarding unreadable cache entry");
                    self.store.remove(key)?;
                    None
                }
            },
            None => None,
        };

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(kind = %key.kind, "cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    pub fn store<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        self.store.put(key, &payload)
    }

    /// Return the cached value or compute, store and return it
    pub fn get_or_compute<T, F>(&self, key: &CacheKey, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.get(key)? {
            return Ok(value);
        }
        let value = compute()?;
        self.store(key, &value)?;
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
