//! File-based content storage backend.
//!
//! Stores one file per blob with a 2-level fan-out directory structure:
//! `{base_dir}/blobs/{hex[0..2]}/{hex[2..4]}/{hex}`. Root pointers live in
//! `{base_dir}/roots/`, one small file per name.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use strand_types::ContentId;
use tracing::{debug, error};

use crate::error::StoreError;
use crate::traits::ContentStore;

/// File-based content store with 2-level fan-out directory layout.
///
/// Writes are atomic: data is written to a uniquely named temporary file
/// first, then renamed into place. Concurrent puts of the same content are
/// safe because every writer produces identical bytes.
pub struct FileStore {
    base_dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileStore {
    /// Create a new file store rooted at the given directory.
    ///
    /// The directory is created if it does not exist.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(base_dir.join("blobs"))?;
        std::fs::create_dir_all(base_dir.join("roots"))?;
        Ok(Self {
            base_dir,
            tmp_counter: AtomicU64::new(0),
        })
    }

    /// Root directory of this store.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Compute the full file path for a blob.
    fn blob_path(&self, id: &ContentId) -> PathBuf {
        let hex = id.to_string();
        self.base_dir
            .join("blobs")
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(&hex)
    }

    /// Root names are hashed so arbitrary log names map to safe file names.
    fn root_path(&self, name: &str) -> PathBuf {
        let key = ContentId::from_data(name.as_bytes());
        self.base_dir.join("roots").join(key.to_string())
    }

    /// Write `data` to `path` via a temp file + rename.
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp_path = path.with_extension(format!("{}.{n}.tmp", std::process::id()));
        tokio::fs::write(&tmp_path, data).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ContentStore for FileStore {
    async fn put(&self, data: Bytes) -> Result<ContentId, StoreError> {
        let id = ContentId::from_data(&data);
        let path = self.blob_path(&id);

        if tokio::fs::try_exists(&path).await? {
            return Ok(id);
        }

        self.write_atomic(&path, &data).await?;
        debug!(%id, path = %path.display(), size = data.len(), "stored blob to file");
        Ok(id)
    }

    async fn get(&self, id: ContentId) -> Result<Option<Bytes>, StoreError> {
        let path = self.blob_path(&id);
        match tokio::fs::read(&path).await {
            Ok(data) => {
                // Verify-on-read: a blob that no longer hashes to its id is
                // never handed to the caller.
                let actual = ContentId::from_data(&data);
                if actual != id {
                    error!(expected = %id, %actual, "blob corruption detected on read");
                    return Err(StoreError::Corrupt {
                        expected: id,
                        actual,
                    });
                }
                Ok(Some(Bytes::from(data)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn delete(&self, id: ContentId) -> Result<(), StoreError> {
        let path = self.blob_path(&id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(%id, "deleted blob file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn contains(&self, id: ContentId) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(self.blob_path(&id)).await?)
    }

    async fn set_root(&self, name: &str, id: ContentId) -> Result<(), StoreError> {
        let path = self.root_path(name);
        self.write_atomic(&path, id.to_string().as_bytes()).await?;
        debug!(name, %id, "updated root pointer");
        Ok(())
    }

    async fn root(&self, name: &str) -> Result<Option<ContentId>, StoreError> {
        let path = self.root_path(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => content.trim().parse().map(Some).map_err(|e| {
                StoreError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}
