//! Key-value backend for decryption signatures.

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::error::StoreError;

/// Session-scoped key-value store for encoded signatures.
///
/// Must be Clone (shared between the cache and whoever clears it on logout),
/// Send + Sync, and synchronous. Implementations typically share internal
/// state via Arc, so clones access the same underlying storage.
pub trait SignatureStore: Clone + Send + Sync + 'static {
    /// Value stored under `key`. `None` if absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `value` under `key`, overwriting any existing value.
    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Remove the value under `key`. No-op if absent.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Remove every entry.
    fn clear(&self) -> Result<(), StoreError>;

    /// Number of stored entries.
    fn len(&self) -> Result<usize, StoreError>;

    /// Check if the store is empty.
    fn is_empty(&self) -> Result<bool, StoreError> {
        self.len().map(|n| n == 0)
    }
}

/// In-memory store. Contents are lost when the process exits.
///
/// A poisoned lock is recovered rather than propagated: every write is a
/// single map operation, so the map is never left half-updated.
#[derive(Debug, Clone, Default)]
pub struct MemorySignatureStore {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemorySignatureStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SignatureStore for MemorySignatureStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries().get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.entries().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.entries().clear();
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries().len())
    }
}
