//! Core trait for content-addressed storage.

use bytes::Bytes;
use strand_types::ContentId;

use crate::error::StoreError;

/// Content-addressed blob storage plus named root pointers.
///
/// A blob's address is `blake3(bytes)`, so `put` is idempotent and safe to
/// call concurrently for the same content. Root pointers are the only
/// mutable state: they map a log name to the id of its latest persisted
/// heads manifest.
///
/// All implementations must be `Send + Sync` for use across async tasks.
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Store a blob, returning its content id.
    async fn put(&self, data: Bytes) -> Result<ContentId, StoreError>;

    /// Retrieve a blob by id. Returns `None` if not found.
    async fn get(&self, id: ContentId) -> Result<Option<Bytes>, StoreError>;

    /// Delete a blob by id. Deleting a missing blob is not an error.
    async fn delete(&self, id: ContentId) -> Result<(), StoreError>;

    /// Check whether a blob exists.
    async fn contains(&self, id: ContentId) -> Result<bool, StoreError>;

    /// Point the root named `name` at `id`.
    async fn set_root(&self, name: &str, id: ContentId) -> Result<(), StoreError>;

    /// Read the root named `name`, if it was ever set.
    async fn root(&self, name: &str) -> Result<Option<ContentId>, StoreError>;
}
