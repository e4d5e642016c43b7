//! Error types for the log crate.

use strand_store::StoreError;
use strand_types::{ContentId, PeerId};

/// Errors that can occur during log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Entry bytes could not be decoded (truncated, trailing data, unknown format).
    #[error("malformed entry: {0}")]
    MalformedEntry(String),

    /// Fetched content does not match the id it was requested under.
    #[error("integrity violation for {claimed}: {reason}")]
    IntegrityViolation {
        /// The id the content was claimed to have.
        claimed: ContentId,
        /// What did not match.
        reason: String,
    },

    /// The identity is not allowed to write to this log.
    #[error("write rejected: {0} lacks write capability")]
    WriteRejected(PeerId),

    /// Resolving a branch walked further than the configured bound.
    #[error("resolve depth exceeded: branch at {head} deeper than {depth}")]
    ResolveDepthExceeded {
        /// The head the walk started from.
        head: ContentId,
        /// The configured bound.
        depth: usize,
    },

    /// The content store failed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Serialization error (root manifest).
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A capability string could not be parsed.
    #[error("invalid capability: {0:?}")]
    InvalidCapability(String),
}

impl From<postcard::Error> for LogError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
