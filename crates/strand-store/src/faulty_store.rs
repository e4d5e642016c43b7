//! A [`ContentStore`] wrapper that injects faults.
//!
//! `FaultyStore` wraps any `Arc<dyn ContentStore>` and can serve tampered
//! bytes for chosen ids, hide ids as if they were never stored, or fail
//! reads of chosen ids, every read or every write with
//! [`StoreError::Unavailable`]. Faults are toggled at runtime so tests can
//! heal a store mid-scenario.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use strand_types::ContentId;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::ContentStore;

/// A [`ContentStore`] wrapper for integrity and availability tests.
///
/// Tampered bytes are returned as-is: the wrapper does not verify content,
/// so callers see exactly what a lying or bit-rotted store would hand them.
pub struct FaultyStore {
    inner: Arc<dyn ContentStore>,
    tampered: RwLock<HashMap<ContentId, Bytes>>,
    hidden: RwLock<HashSet<ContentId>>,
    unreadable: RwLock<HashSet<ContentId>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    reads: AtomicU64,
}

impl FaultyStore {
    /// Wrap an existing store with no faults enabled.
    pub fn new(inner: Arc<dyn ContentStore>) -> Self {
        Self {
            inner,
            tampered: RwLock::new(HashMap::new()),
            hidden: RwLock::new(HashSet::new()),
            unreadable: RwLock::new(HashSet::new()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            reads: AtomicU64::new(0),
        }
    }

    /// Serve `bytes` whenever `id` is read.
    pub fn tamper(&self, id: ContentId, bytes: impl Into<Bytes>) {
        debug!(%id, "tampering blob");
        self.tampered
            .write()
            .expect("lock poisoned")
            .insert(id, bytes.into());
    }

    /// Report `id` as not found until [`FaultyStore::reveal`] is called.
    pub fn hide(&self, id: ContentId) {
        self.hidden.write().expect("lock poisoned").insert(id);
    }

    /// Undo [`FaultyStore::hide`].
    pub fn reveal(&self, id: ContentId) {
        self.hidden.write().expect("lock poisoned").remove(&id);
    }

    /// Fail reads of `id` with `Unavailable` until
    /// [`FaultyStore::restore_reads_of`] is called. Other ids stay readable.
    pub fn fail_reads_of(&self, id: ContentId) {
        debug!(%id, "failing reads of blob");
        self.unreadable.write().expect("lock poisoned").insert(id);
    }

    /// Undo [`FaultyStore::fail_reads_of`].
    pub fn restore_reads_of(&self, id: ContentId) {
        self.unreadable.write().expect("lock poisoned").remove(&id);
    }

    /// Fail every read with `Unavailable` while set.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Fail every write (blob or root) with `Unavailable` while set.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `get` calls seen, including failed ones.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    fn check_writes(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        Ok(())
    }

    fn check_read_of(&self, id: &ContentId) -> Result<(), StoreError> {
        self.check_reads()?;
        if self.unreadable.read().expect("lock poisoned").contains(id) {
            return Err(StoreError::Unavailable(format!("injected read failure for {id}")));
        }
        Ok(())
    }

    fn is_hidden(&self, id: &ContentId) -> bool {
        self.hidden.read().expect("lock poisoned").contains(id)
    }
}

#[async_trait::async_trait]
impl ContentStore for FaultyStore {
    async fn put(&self, data: Bytes) -> Result<ContentId, StoreError> {
        self.check_writes()?;
        self.inner.put(data).await
    }

    async fn get(&self, id: ContentId) -> Result<Option<Bytes>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_read_of(&id)?;

        if self.is_hidden(&id) {
            return Ok(None);
        }

        if let Some(bytes) = self.tampered.read().expect("lock poisoned").get(&id) {
            return Ok(Some(bytes.clone()));
        }

        self.inner.get(id).await
    }

    async fn delete(&self, id: ContentId) -> Result<(), StoreError> {
        self.check_writes()?;
        self.inner.delete(id).await
    }

    async fn contains(&self, id: ContentId) -> Result<bool, StoreError> {
        self.check_read_of(&id)?;

        if self.is_hidden(&id) {
            return Ok(false);
        }

        if self.tampered.read().expect("lock poisoned").contains_key(&id) {
            return Ok(true);
        }

        self.inner.contains(id).await
    }

    async fn set_root(&self, name: &str, id: ContentId) -> Result<(), StoreError> {
        self.check_writes()?;
        self.inner.set_root(name, id).await
    }

    async fn root(&self, name: &str) -> Result<Option<ContentId>, StoreError> {
        self.check_reads()?;
        self.inner.root(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;

    fn faulty() -> FaultyStore {
        FaultyStore::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_passes_through_without_faults() {
        let store = faulty();
        let id = store.put(Bytes::from_static(b"hello")).await.unwrap();

        assert_eq!(
            store.get(id).await.unwrap(),
            Some(Bytes::from_static(b"hello"))
        );
        assert_eq!(store.reads(), 1);
    }

    #[tokio::test]
    async fn test_tampered_bytes_are_served() {
        let store = faulty();
        let id = store.put(Bytes::from_static(b"original")).await.unwrap();
        store.tamper(id, Bytes::from_static(b"forged"));

        let got = store.get(id).await.unwrap().unwrap();
        assert_eq!(got.as_ref(), b"forged");
        assert_ne!(ContentId::from_data(&got), id);
    }

    #[tokio::test]
    async fn test_hide_and_reveal() {
        let store = faulty();
        let id = store.put(Bytes::from_static(b"data")).await.unwrap();

        store.hide(id);
        assert_eq!(store.get(id).await.unwrap(), None);
        assert!(!store.contains(id).await.unwrap());

        store.reveal(id);
        assert!(store.get(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = faulty();
        let id = store.put(Bytes::from_static(b"data")).await.unwrap();

        store.set_fail_reads(true);
        assert!(matches!(
            store.get(id).await,
            Err(StoreError::Unavailable(_))
        ));

        store.set_fail_reads(false);
        store.set_fail_writes(true);
        assert!(matches!(
            store.put(Bytes::from_static(b"more")).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.set_root("log", id).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.get(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_read_failure_of_one_blob() {
        let store = faulty();
        let broken = store.put(Bytes::from_static(b"broken")).await.unwrap();
        let fine = store.put(Bytes::from_static(b"fine")).await.unwrap();

        store.fail_reads_of(broken);
        assert!(matches!(
            store.get(broken).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.contains(broken).await.is_err());
        assert!(store.get(fine).await.unwrap().is_some());

        store.restore_reads_of(broken);
        assert!(store.get(broken).await.unwrap().is_some());
        assert_eq!(store.reads(), 3);
    }
}
