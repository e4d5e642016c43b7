//! Wire messages exchanged between replicating peers.
//!
//! All messages are serialized with postcard. Only heads travel on the
//! wire; entries themselves are fetched from the content store.

use serde::{Deserialize, Serialize};
use strand_types::{Heads, PeerId};

use crate::error::SyncError;

/// Largest encoded message accepted by [`SyncMessage::decode`].
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// A peer's view of a log's heads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadsAnnouncement {
    /// Address of the log the heads belong to.
    pub address: String,
    /// The announcing peer.
    pub peer_id: PeerId,
    /// Newest entry per identity, as the announcing peer knows it.
    pub heads: Heads,
}

/// Messages exchanged between replication sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMessage {
    /// Unsolicited or requested heads of a log.
    Heads(HeadsAnnouncement),

    /// Ask every peer replicating `address` to announce its heads.
    HeadsRequest {
        /// Address of the log.
        address: String,
        /// The asking peer.
        from: PeerId,
    },
}

impl SyncMessage {
    /// Address of the log this message concerns.
    pub fn address(&self) -> &str {
        match self {
            Self::Heads(announcement) => &announcement.address,
            Self::HeadsRequest { address, .. } => address,
        }
    }

    /// The peer that sent this message.
    pub fn sender(&self) -> PeerId {
        match self {
            Self::Heads(announcement) => announcement.peer_id,
            Self::HeadsRequest { from, .. } => *from,
        }
    }

    /// Serialize to postcard bytes.
    pub fn encode(&self) -> Result<Vec<u8>, SyncError> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Deserialize from postcard bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, SyncError> {
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(SyncError::Serialization(format!(
                "message of {} bytes exceeds limit of {MAX_MESSAGE_SIZE}",
                bytes.len()
            )));
        }

        Ok(postcard::from_bytes(bytes)?)
    }
}
