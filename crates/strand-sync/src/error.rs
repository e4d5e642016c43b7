//! Error types for replication.

use strand_log::LogError;

/// Errors that can occur while replicating a log.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The log rejected or failed an operation.
    #[error("log error: {0}")]
    Log(#[from] LogError),

    /// The transport could not deliver a message.
    #[error("transport error: {0}")]
    Transport(String),

    /// Serialization or deserialization of a wire message failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The inbound channel or the network was shut down.
    #[error("channel closed")]
    Closed,
}

impl From<postcard::Error> for SyncError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
