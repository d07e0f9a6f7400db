//! Key-value storage port for cached responses.
//!
//! The cache only needs string get/set/delete, the shape of a browser's local storage. Two
//! backends ship with the crate:
//! - [`MemoryStore`]: process-local map, handy for tests and short-lived tools.
//! - [`FileStore`]: a JSON object on disk that survives restarts.

use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

/// Abstract string key-value store.
///
/// Writers to the same key race with last-write-wins semantics.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Insert or overwrite `key`.
    async fn set(&self, key: &str, value: String) -> Result<(), Self::Error>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), Self::Error>;
}

/// Simple in-memory store. Clones share the same map.
#[derive(Default, Clone, Debug)]
pub struct MemoryStore {
    data: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).contains_key(key)
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    type Error = std::convert::Infallible;

    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        let guard = self.data.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), Self::Error> {
        let mut guard = self.data.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Self::Error> {
        let mut guard = self.data.lock().unwrap_or_else(|e| e.into_inner());
        guard.remove(key);
        Ok(())
    }
}

/// Durable store kept as a single JSON object file.
///
/// The file is read on first use and rewritten in full after every mutation (temp file +
/// rename). A missing file is an empty store. Clones share the loaded map.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
    data: Arc<AsyncMutex<Option<HashMap<String, String>>>>,
}

impl FileStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into(), data: Arc::new(AsyncMutex::new(None)) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(path: &Path) -> Result<HashMap<String, String>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, map: &HashMap<String, String>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(map)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn loaded(
        &self,
    ) -> Result<MutexGuard<'_, Option<HashMap<String, String>>>, StoreError> {
        let mut guard = self.data.lock().await;
        if guard.is_none() {
            *guard = Some(Self::load(&self.path).await?);
        }
        Ok(guard)
    }

    /// Apply `f` to a copy of the map; the copy replaces the shared map only once it is on disk.
    async fn update(
        &self,
        f: impl FnOnce(&mut HashMap<String, String>) -> bool,
    ) -> Result<(), StoreError> {
        let mut guard = self.loaded().await?;
        let mut next = guard.clone().unwrap_or_default();
        if f(&mut next) {
            self.persist(&next).await?;
            *guard = Some(next);
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for FileStore {
    type Error = StoreError;

    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        let guard = self.loaded().await?;
        Ok(guard.as_ref().and_then(|map| map.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), Self::Error> {
        self.update(|map| {
            map.insert(key.to_string(), value);
            true
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), Self::Error> {
        self.update(|map| map.remove(key).is_some()).await
    }
}
