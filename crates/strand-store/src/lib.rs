//! Content-addressed blob storage for Strand.
//!
//! This crate defines the [`ContentStore`] trait the log is written
//! against, along with its backends and test wrappers:
//!
//! - [`MemoryStore`]: in-memory storage backed by a `RwLock<HashMap>`.
//! - [`FileStore`]: file-based storage with a 2-level fan-out directory layout.
//! - [`SlowStore`]: a wrapper injecting seeded random latency, for chaos tests.
//! - [`FaultyStore`]: a wrapper serving tampered, hidden or failing reads.

mod error;
mod faulty_store;
mod file_store;
mod memory_store;
mod slow_store;
mod traits;

pub use error::StoreError;
pub use faulty_store::FaultyStore;
pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use slow_store::SlowStore;
pub use traits::ContentStore;
