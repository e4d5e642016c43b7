//! Replication of Strand logs between peers.
//!
//! Peers exchange heads, never entries:
//!
//! - [`SyncMessage`]: the wire protocol (postcard-serialized).
//! - [`Transport`]: broadcast to the other peers of a log.
//! - [`LocalNetwork`]: an in-process transport hub with partition support.
//! - [`ReplicationSession`]: announces local heads and merges what peers
//!   announce, fetching entries from the shared content store.

mod error;
mod message;
mod session;
mod transport;

pub use error::SyncError;
pub use message::{HeadsAnnouncement, MAX_MESSAGE_SIZE, SyncMessage};
pub use session::{ReplicationSession, SessionHandle, SyncConfig, diff_heads};
pub use transport::{LocalNetwork, LocalTransport, Transport};
