//! Key-value store backend.
//!
//! [`StoreSync`] keeps each resource under `"<backend name>.<resource name>"`
//! in an injected [`KeyValueStore`]. There is no connection lifecycle:
//! `get` reads and decodes, `set` encodes and writes.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::backend::SyncBackend;
use crate::error::{StoreError, SyncError};
use crate::pipeline::{payload_text, Pipeline};
use crate::resource::Resource;

/// Synchronous string key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// Read a key.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a key.
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Delete a key, returning what it held.
    fn remove(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// All keys, sorted.
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// In-memory store. Clones share contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.lock().insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().remove(key))
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().keys().cloned().collect())
    }
}

/// Store persisted as a single JSON object file.
///
/// The whole file is read on open and rewritten on every change. A missing
/// file is an empty store; it is created (with its parent directories) on
/// the first write.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!("opened store {} ({} keys)", path.display(), entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self.lock();
        entries.insert(key.to_owned(), value);
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.lock();
        let removed = entries.remove(key);
        if removed.is_some() {
            self.flush(&entries)?;
        }
        Ok(removed)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().keys().cloned().collect())
    }
}

/// Backend over a [`KeyValueStore`].
pub struct StoreSync {
    name: String,
    pipeline: Pipeline,
    store: Arc<dyn KeyValueStore>,
}

impl fmt::Debug for StoreSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSync")
            .field("name", &self.name)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl StoreSync {
    /// Create a backend named `name` over `store`.
    ///
    /// The post chain must turn stored text back into the packed mapping,
    /// so `pipeline` normally starts from [`Pipeline::json`].
    pub fn new(name: impl Into<String>, pipeline: Pipeline, store: impl KeyValueStore + 'static) -> Self {
        Self::with_store(name, pipeline, Arc::new(store))
    }

    /// Create a backend over a shared store.
    pub fn with_store(
        name: impl Into<String>,
        pipeline: Pipeline,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            name: name.into(),
            pipeline,
            store,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Storage key for `resource`.
    pub fn key_for(&self, resource: &Resource) -> String {
        format!("{}.{}", self.name, resource.name())
    }
}

#[async_trait]
impl SyncBackend for StoreSync {
    fn name(&self) -> &str {
        &self.name
    }

    fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    async fn get(&self, resource: &Arc<Resource>) -> Result<Option<Value>, SyncError> {
        let raw = self.store.get(&self.key_for(resource))?;
        Ok(self.postprocess(resource, raw.map(Value::String)).await?)
    }

    async fn set(&self, resource: &Arc<Resource>, value: &Value) -> Result<(), SyncError> {
        let key = self.key_for(resource);
        match self.preprocess(resource, Some(value.clone())).await? {
            Some(encoded) => {
                let text = payload_text(&encoded);
                tracing::debug!("{}: writing {} ({} bytes)", self.name, key, text.len());
                self.store.set(&key, text)?;
            }
            None => {
                tracing::debug!("{}: clearing {}", self.name, key);
                self.store.remove(&key)?;
            }
        }
        Ok(())
    }
}
