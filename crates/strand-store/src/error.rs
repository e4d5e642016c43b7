//! Error types for content store operations.

use strand_types::ContentId;

/// Errors that can occur during content store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested blob was not found.
    #[error("content not found: {0}")]
    NotFound(ContentId),

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Blob data on disk does not match its content-addressed ID.
    #[error("content corruption detected: expected {expected}, actual hash {actual}")]
    Corrupt {
        /// The ID that was requested.
        expected: ContentId,
        /// The ID computed from the data actually stored.
        actual: ContentId,
    },

    /// The backend cannot serve requests right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
