//! Replication session: drives [`Log::merge`] from peer announcements.
//!
//! A session announces the local heads whenever the log is written to and
//! on a fixed interval, answers heads requests, and merges whatever a
//! peer announces that the local log does not already have. Entries are
//! never sent on the wire; the merge fetches them from the shared content
//! store.

use std::sync::Arc;
use std::time::Duration;

use strand_log::{Log, LogError, LogSnapshot, MergeOptions, MergeReport};
use strand_types::events::{EventKind, EventReceiver};
use strand_types::{Heads, PeerId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::message::{HeadsAnnouncement, SyncMessage};
use crate::transport::Transport;

type Result<T> = std::result::Result<T, SyncError>;

/// Replication settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Bound on entries fetched per branch. `None` is unbounded.
    pub max_resolve_depth: Option<usize>,
    /// How many times a merge is retried after `StoreUnavailable`.
    pub store_retry_attempts: u32,
    /// Delay before the first retry; doubled on each further attempt.
    pub store_retry_base_ms: u64,
    /// How often pending entries are re-walked. `0` disables it.
    pub pending_retry_interval_ms: u64,
    /// How often heads are announced without a local write. `0` disables
    /// it.
    pub announce_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_resolve_depth: None,
            store_retry_attempts: 3,
            store_retry_base_ms: 50,
            pending_retry_interval_ms: 1_000,
            announce_interval_ms: 5_000,
        }
    }
}

/// Heads from `remote` the local log does not already have.
///
/// A head equal to the local head, or naming any entry already resolved
/// locally, is left out.
pub fn diff_heads(local: &LogSnapshot, remote: &Heads) -> Heads {
    remote
        .iter()
        .filter(|(identity, head)| local.head(identity) != Some(**head) && !local.contains(head))
        .map(|(identity, head)| (*identity, *head))
        .collect()
}

/// Replicates one log with the peers reachable through a transport.
pub struct ReplicationSession {
    peer_id: PeerId,
    log: Arc<Log>,
    transport: Arc<dyn Transport>,
    config: SyncConfig,
}

impl ReplicationSession {
    pub fn new(
        peer_id: PeerId,
        log: Arc<Log>,
        transport: Arc<dyn Transport>,
        config: SyncConfig,
    ) -> Self {
        Self {
            peer_id,
            log,
            transport,
            config,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn log(&self) -> &Arc<Log> {
        &self.log
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Broadcast the local heads.
    pub async fn announce(&self) -> Result<()> {
        let msg = SyncMessage::Heads(HeadsAnnouncement {
            address: self.log.address(),
            peer_id: self.peer_id,
            heads: self.log.heads(),
        });

        self.transport.broadcast(&msg).await
    }

    /// Ask every peer to announce its heads.
    pub async fn request_heads(&self) -> Result<()> {
        let msg = SyncMessage::HeadsRequest {
            address: self.log.address(),
            from: self.peer_id,
        };

        self.transport.broadcast(&msg).await
    }

    /// Process one inbound message.
    ///
    /// Returns the merge report when an announcement led to a merge.
    pub async fn handle_message(&self, msg: SyncMessage) -> Result<Option<MergeReport>> {
        if msg.sender() == self.peer_id || msg.address() != self.log.address() {
            return Ok(None);
        }

        match msg {
            SyncMessage::HeadsRequest { from, .. } => {
                debug!(peer = %self.peer_id.short(), from = %from.short(), "answering heads request");
                self.announce().await?;
                Ok(None)
            }
            SyncMessage::Heads(announcement) => {
                let wanted = diff_heads(&self.log.snapshot(), &announcement.heads);

                if wanted.is_empty() {
                    return Ok(None);
                }

                debug!(
                    peer = %self.peer_id.short(),
                    from = %announcement.peer_id.short(),
                    heads = wanted.len(),
                    "merging announced heads"
                );

                let report = self.merge_with_retry(&wanted).await?;
                Ok(Some(report))
            }
        }
    }

    /// Merge, retrying with exponential backoff while the store is
    /// unavailable.
    ///
    /// Branches that resolve are committed on the first pass. Only the heads
    /// whose walk hit a store failure are merged again. Once the retries run
    /// out the combined report still lists those branches as failed.
    async fn merge_with_retry(&self, heads: &Heads) -> Result<MergeReport> {
        let options = MergeOptions {
            max_resolve_depth: self.config.max_resolve_depth,
        };
        let mut remaining = heads.clone();
        let mut total: Option<MergeReport> = None;
        let mut attempt = 0;

        loop {
            let error = match self.log.merge_with(&remaining, &options).await {
                Ok(report) => {
                    remaining = report.unavailable_heads();
                    let total = total.get_or_insert_with(MergeReport::default);
                    total.absorb(report);

                    if remaining.is_empty() || attempt >= self.config.store_retry_attempts {
                        if total.changed() {
                            info!(
                                peer = %self.peer_id.short(),
                                added = total.added,
                                pending = total.pending,
                                "replicated entries"
                            );
                        }
                        if !remaining.is_empty() {
                            warn!(
                                peer = %self.peer_id.short(),
                                heads = remaining.len(),
                                "store still unavailable, giving up on branches"
                            );
                        }
                        return Ok(std::mem::take(total));
                    }

                    format!("{} branches unreadable", remaining.len())
                }
                Err(LogError::StoreUnavailable(e)) if attempt < self.config.store_retry_attempts => {
                    e.to_string()
                }
                Err(e) => return Err(e.into()),
            };

            let delay = self.config.store_retry_base_ms.saturating_mul(1u64 << attempt.min(16));
            warn!(
                peer = %self.peer_id.short(),
                attempt = attempt + 1,
                delay_ms = delay,
                error = %error,
                "store unavailable, retrying merge"
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
            attempt += 1;
        }
    }

    /// Start the session on a background task.
    pub fn spawn(self: Arc<Self>, inbox: mpsc::Receiver<SyncMessage>) -> SessionHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Subscribe before spawning so no write is missed.
        let events = self.log.events().subscribe();

        let task = tokio::spawn(async move { self.run(inbox, events, shutdown_rx).await });

        SessionHandle { shutdown_tx, task }
    }

    /// Drive the session until shutdown or until the inbox closes.
    pub async fn run(
        &self,
        mut inbox: mpsc::Receiver<SyncMessage>,
        mut events: EventReceiver,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        info!(peer = %self.peer_id.short(), log = %self.log.address(), "replication session started");

        let mut pending_tick = ticker(self.config.pending_retry_interval_ms);
        let mut announce_tick = ticker(self.config.announce_interval_ms);
        let address = self.log.address();

        if let Err(e) = self.request_heads().await {
            warn!(error = %e, "initial heads request failed");
        }
        if let Err(e) = self.announce().await {
            warn!(error = %e, "initial announce failed");
        }

        let result = loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break Ok(()),
                msg = inbox.recv() => {
                    let Some(msg) = msg else {
                        debug!(peer = %self.peer_id.short(), "inbox closed");
                        break Err(SyncError::Closed);
                    };

                    if let Err(e) = self.handle_message(msg).await {
                        warn!(peer = %self.peer_id.short(), error = %e, "failed to handle message");
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        break Err(SyncError::Closed);
                    };

                    if event.kind == EventKind::Write && event.address == address
                        && let Err(e) = self.announce().await
                    {
                        warn!(peer = %self.peer_id.short(), error = %e, "announce failed");
                    }
                }
                _ = tick(&mut pending_tick) => {
                    if self.log.pending_count() > 0 {
                        match self.log.retry_pending().await {
                            Ok(report) if report.changed() => {
                                debug!(added = report.added, "resolved pending entries");
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "pending retry failed"),
                        }
                    }
                }
                _ = tick(&mut announce_tick) => {
                    if let Err(e) = self.announce().await {
                        warn!(peer = %self.peer_id.short(), error = %e, "periodic announce failed");
                    }
                }
            }
        };

        info!(peer = %self.peer_id.short(), "replication session stopped");
        result
    }
}

/// A ticker for `ms`, or `None` when disabled.
fn ticker(ms: u64) -> Option<tokio::time::Interval> {
    (ms > 0).then(|| {
        let mut ticker = interval(Duration::from_millis(ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    })
}

/// Wait for the next tick; never resolves for a disabled ticker.
async fn tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Handle to a spawned [`ReplicationSession`].
///
/// Dropping the handle also stops the session.
pub struct SessionHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
}

impl SessionHandle {
    /// Stop the session and wait for it to finish.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);

        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "session task did not finish cleanly");
                Err(SyncError::Closed)
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Abort the session without waiting.
    pub fn abort(&self) {
        self.task.abort();
    }
}
