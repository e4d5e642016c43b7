//! Shared test harness for Strand replication tests.
//!
//! Provides [`TestNetwork`]: N peers, each with its own [`Log`] and running
//! [`ReplicationSession`], sharing one content store and one
//! [`LocalNetwork`]. Peers exchange heads only; entries travel through the
//! store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use strand_log::{Entry, Log, LogConfig};
use strand_store::{ContentStore, MemoryStore};
use strand_sync::{LocalNetwork, ReplicationSession, SessionHandle, SyncConfig};
use strand_types::events::EventBus;
use strand_types::{Heads, PeerId};
use tracing::debug;

/// Name of the log every test peer opens.
pub const LOG_NAME: &str = "hello";

/// Session settings with short intervals so tests settle quickly.
pub fn fast_sync_config() -> SyncConfig {
    SyncConfig {
        max_resolve_depth: None,
        store_retry_attempts: 5,
        store_retry_base_ms: 5,
        pending_retry_interval_ms: 50,
        announce_interval_ms: 100,
    }
}

/// One peer of a [`TestNetwork`].
pub struct TestPeer {
    identity: PeerId,
    log: Arc<Log>,
    session: Option<SessionHandle>,
}

/// N replicating peers over a shared store.
///
/// Construct inside a tokio runtime: sessions are spawned immediately.
pub struct TestNetwork {
    peers: Vec<TestPeer>,
    network: LocalNetwork,
    store: Arc<dyn ContentStore>,
    config: SyncConfig,
}

impl TestNetwork {
    /// `n` peers over an in-memory store with [`fast_sync_config`].
    pub fn new(n: usize) -> Self {
        Self::with_store(n, Arc::new(MemoryStore::new()), fast_sync_config())
    }

    /// `n` peers over the given store and session settings.
    pub fn with_store(n: usize, store: Arc<dyn ContentStore>, config: SyncConfig) -> Self {
        assert!(n >= 1, "need at least 1 peer");

        let mut net = Self {
            peers: Vec::with_capacity(n),
            network: LocalNetwork::new(),
            store,
            config,
        };

        for i in 0..n {
            let identity = peer_identity(i);
            let log = Arc::new(net.open_log());
            let session = net.start_session(identity, log.clone());

            net.peers.push(TestPeer {
                identity,
                log,
                session: Some(session),
            });
        }

        net
    }

    fn open_log(&self) -> Log {
        Log::open(
            LOG_NAME,
            self.store.clone(),
            LogConfig::default()
                .with_max_resolve_depth(self.config.max_resolve_depth)
                .with_reclaim_manifests(false),
            EventBus::new(),
        )
    }

    fn start_session(&self, identity: PeerId, log: Arc<Log>) -> SessionHandle {
        let (transport, inbox) = self.network.join(identity);
        let session = Arc::new(ReplicationSession::new(
            identity,
            log,
            Arc::new(transport),
            self.config.clone(),
        ));

        session.spawn(inbox)
    }

    /// Identity of peer `i`.
    pub fn identity(&self, i: usize) -> PeerId {
        self.peers[i].identity
    }

    /// Log of peer `i`.
    pub fn log(&self, i: usize) -> &Arc<Log> {
        &self.peers[i].log
    }

    /// The shared content store.
    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Number of peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Returns `true` if the network has no peers.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Append `message` on peer `i` as that peer's identity.
    pub async fn post(&self, i: usize, message: &str) -> Entry {
        let peer = &self.peers[i];
        peer.log
            .append(peer.identity, message.as_bytes())
            .await
            .unwrap_or_else(|e| panic!("post on peer {i} failed: {e}"))
    }

    /// Cut peer `i` off: it neither sends nor receives heads.
    pub fn partition(&self, i: usize) {
        self.network.set_down(self.peers[i].identity, true);
    }

    /// Reconnect a partitioned peer.
    pub fn heal(&self, i: usize) {
        self.network.set_down(self.peers[i].identity, false);
    }

    /// Stop peer `i`'s session and drop it from the network.
    pub async fn stop(&mut self, i: usize) {
        let identity = self.peers[i].identity;
        self.network.leave(&identity);

        if let Some(session) = self.peers[i].session.take() {
            // The session ends on its own once its inbox closes.
            let _ = session.shutdown().await;
        }
    }

    /// Bring a stopped peer back with a fresh log restored from the store.
    ///
    /// Returns how many entries the restore added.
    pub async fn restart(&mut self, i: usize) -> usize {
        assert!(self.peers[i].session.is_none(), "peer {i} is still running");

        let identity = self.peers[i].identity;
        let log = Arc::new(self.open_log());
        let restored = log
            .load()
            .await
            .unwrap_or_else(|e| panic!("restore of peer {i} failed: {e}"));
        let session = self.start_session(identity, log.clone());

        self.peers[i].log = log;
        self.peers[i].session = Some(session);

        restored
    }

    /// Whether every peer holds exactly `expected` entries with identical
    /// heads.
    pub fn converged(&self, expected: usize) -> bool {
        let first: Heads = self.peers[0].log.heads();
        self.peers
            .iter()
            .all(|p| p.log.len() == expected && p.log.heads() == first)
    }

    /// Poll until [`converged`](Self::converged) or the timeout elapses.
    pub async fn wait_for_convergence(&self, expected: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            if self.converged(expected) {
                return true;
            }
            if Instant::now() >= deadline {
                let counts: Vec<usize> = self.peers.iter().map(|p| p.log.len()).collect();
                debug!(?counts, expected, "peers did not converge");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until peer `i` holds at least `count` entries.
    pub async fn wait_for_len(&self, i: usize, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        while self.peers[i].log.len() < count {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        true
    }

    /// Materialized feed of peer `i`, as payload strings.
    pub fn feed(&self, i: usize) -> Vec<String> {
        self.peers[i]
            .log
            .materialize(-1)
            .iter()
            .map(|e| e.payload_str().into_owned())
            .collect()
    }

    /// Stop every running session.
    pub async fn shutdown(mut self) {
        for i in 0..self.peers.len() {
            if self.peers[i].session.is_some() {
                self.stop(i).await;
            }
        }
    }
}

/// Identity of the `i`-th test peer.
pub fn peer_identity(i: usize) -> PeerId {
    PeerId::from_name(&format!("peer-{i}"))
}
