//! Message transport between replicating peers.
//!
//! [`LocalNetwork`] is an in-process hub: every joined peer gets a
//! [`LocalTransport`] for sending and an `mpsc` receiver for inbound
//! messages. Messages go through the wire codec on the way, and peers can
//! be marked down to simulate partitions.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use strand_types::PeerId;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::SyncError;
use crate::message::SyncMessage;

/// Inbound queue depth per peer.
const INBOX_CAPACITY: usize = 1024;

/// Delivers messages to the other peers replicating a log.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send `msg` to every reachable peer except the sender.
    async fn broadcast(&self, msg: &SyncMessage) -> Result<(), SyncError>;
}

#[derive(Default)]
struct NetworkInner {
    inboxes: HashMap<PeerId, mpsc::Sender<SyncMessage>>,
    down: HashSet<PeerId>,
}

/// In-process broadcast network.
///
/// Clonable (`Arc` inside). A peer that is down neither sends nor
/// receives; its messages are dropped silently, as a partition would.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    inner: Arc<RwLock<NetworkInner>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the network as `peer`. Joining again replaces the old inbox.
    pub fn join(&self, peer: PeerId) -> (LocalTransport, mpsc::Receiver<SyncMessage>) {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);

        let mut inner = self.inner.write().expect("network lock poisoned");
        inner.inboxes.insert(peer, tx);
        inner.down.remove(&peer);
        debug!(peer = %peer.short(), peers = inner.inboxes.len(), "peer joined network");

        let transport = LocalTransport {
            peer,
            network: self.clone(),
        };

        (transport, rx)
    }

    /// Remove `peer`; its receiver sees the channel close.
    pub fn leave(&self, peer: &PeerId) {
        let mut inner = self.inner.write().expect("network lock poisoned");
        inner.inboxes.remove(peer);
        inner.down.remove(peer);
    }

    /// Cut `peer` off from (or reconnect it to) everyone else.
    pub fn set_down(&self, peer: PeerId, down: bool) {
        let mut inner = self.inner.write().expect("network lock poisoned");

        if down {
            inner.down.insert(peer);
        } else {
            inner.down.remove(&peer);
        }

        debug!(peer = %peer.short(), down, "peer connectivity changed");
    }

    pub fn is_down(&self, peer: &PeerId) -> bool {
        let inner = self.inner.read().expect("network lock poisoned");
        inner.down.contains(peer)
    }

    pub fn peer_count(&self) -> usize {
        let inner = self.inner.read().expect("network lock poisoned");
        inner.inboxes.len()
    }

    fn deliver(&self, from: PeerId, bytes: &[u8]) -> Result<usize, SyncError> {
        let targets: Vec<(PeerId, mpsc::Sender<SyncMessage>)> = {
            let inner = self.inner.read().expect("network lock poisoned");

            if !inner.inboxes.contains_key(&from) {
                return Err(SyncError::Transport(format!(
                    "{} is not joined to the network",
                    from.short()
                )));
            }

            if inner.down.contains(&from) {
                trace!(peer = %from.short(), "sender is down, dropping message");
                return Ok(0);
            }

            inner
                .inboxes
                .iter()
                .filter(|(peer, _)| **peer != from && !inner.down.contains(*peer))
                .map(|(peer, tx)| (*peer, tx.clone()))
                .collect()
        };

        let mut delivered = 0;

        for (peer, tx) in targets {
            // Each receiver decodes its own copy, as it would off a socket.
            let msg = SyncMessage::decode(bytes)?;

            match tx.try_send(msg) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(peer = %peer.short(), "inbox full, dropping message");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    trace!(peer = %peer.short(), "inbox closed");
                }
            }
        }

        Ok(delivered)
    }
}

impl std::fmt::Debug for LocalNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("network lock poisoned");
        f.debug_struct("LocalNetwork")
            .field("peers", &inner.inboxes.len())
            .field("down", &inner.down.len())
            .finish()
    }
}

/// A peer's sending half on a [`LocalNetwork`].
#[derive(Debug, Clone)]
pub struct LocalTransport {
    peer: PeerId,
    network: LocalNetwork,
}

impl LocalTransport {
    pub fn peer_id(&self) -> PeerId {
        self.peer
    }
}

#[async_trait::async_trait]
impl Transport for LocalTransport {
    async fn broadcast(&self, msg: &SyncMessage) -> Result<(), SyncError> {
        let bytes = msg.encode()?;
        let delivered = self.network.deliver(self.peer, &bytes)?;

        trace!(
            peer = %self.peer.short(),
            size = bytes.len(),
            delivered,
            "broadcast message"
        );

        Ok(())
    }
}
