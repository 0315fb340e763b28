//! In-memory storage for testing.
//!
//! Clones share the same medium, so a "process restart" is simulated by
//! building a fresh queue store over a clone of the same `MemoryStorage`.

use super::{Storage, StorageError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// In-memory storage with scriptable failures.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Debug, Default)]
struct MemoryStorageInner {
    map: BTreeMap<String, Vec<u8>>,
    unavailable: bool,
    fail_next_put: Option<String>,
    fail_next_delete: Option<String>,
}

impl MemoryStorage {
    /// Create a new empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `Unavailable` until re-enabled.
    pub fn set_unavailable(&self, unavailable: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.unavailable = unavailable;
    }

    /// Cause the next `put()` to fail (e.g. simulated quota exhaustion).
    pub fn fail_next_put(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_put = Some(error.to_string());
    }

    /// Cause the next `delete()` to fail.
    pub fn fail_next_delete(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_delete = Some(error.to_string());
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.map.len()
    }

    /// Check whether the medium is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Clone for MemoryStorage {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let inner = self.inner.lock().unwrap();
        if inner.unavailable {
            return Err(StorageError::Unavailable("memory storage disabled".into()));
        }
        Ok(inner.map.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.unavailable {
            return Err(StorageError::Unavailable("memory storage disabled".into()));
        }
        if let Some(error) = inner.fail_next_put.take() {
            return Err(StorageError::WriteRejected(error));
        }
        inner.map.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.unavailable {
            return Err(StorageError::Unavailable("memory storage disabled".into()));
        }
        if let Some(error) = inner.fail_next_delete.take() {
            return Err(StorageError::Io(error));
        }
        inner.map.remove(key);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let inner = self.inner.lock().unwrap();
        if inner.unavailable {
            return Err(StorageError::Unavailable("memory storage disabled".into()));
        }
        Ok(inner
            .map
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
