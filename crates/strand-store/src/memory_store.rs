//! In-memory content storage backend.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use strand_types::ContentId;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::ContentStore;

/// In-memory content store backed by a `RwLock<HashMap>`.
///
/// Useful for testing and for peers that run without persistence.
/// Contents and roots are lost when the store is dropped.
#[derive(Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<ContentId, Bytes>>,
    roots: RwLock<HashMap<String, ContentId>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Whether the store holds no blobs.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return a reference to the inner map (for testing purposes).
    #[cfg(test)]
    pub(crate) fn inner(&self) -> &RwLock<HashMap<ContentId, Bytes>> {
        &self.blobs
    }
}

#[async_trait::async_trait]
impl ContentStore for MemoryStore {
    async fn put(&self, data: Bytes) -> Result<ContentId, StoreError> {
        let id = ContentId::from_data(&data);
        let mut map = self.blobs.write().expect("lock poisoned");

        if !map.contains_key(&id) {
            debug!(%id, size = data.len(), "storing blob in memory");
            map.insert(id, data);
        }

        Ok(id)
    }

    async fn get(&self, id: ContentId) -> Result<Option<Bytes>, StoreError> {
        let map = self.blobs.read().expect("lock poisoned");
        Ok(map.get(&id).cloned())
    }

    async fn delete(&self, id: ContentId) -> Result<(), StoreError> {
        let mut map = self.blobs.write().expect("lock poisoned");
        if map.remove(&id).is_some() {
            debug!(%id, "deleted blob from memory");
        }
        Ok(())
    }

    async fn contains(&self, id: ContentId) -> Result<bool, StoreError> {
        let map = self.blobs.read().expect("lock poisoned");
        Ok(map.contains_key(&id))
    }

    async fn set_root(&self, name: &str, id: ContentId) -> Result<(), StoreError> {
        let mut roots = self.roots.write().expect("lock poisoned");
        roots.insert(name.to_string(), id);
        debug!(name, %id, "updated root pointer");
        Ok(())
    }

    async fn root(&self, name: &str) -> Result<Option<ContentId>, StoreError> {
        let roots = self.roots.read().expect("lock poisoned");
        Ok(roots.get(name).copied())
    }
}
