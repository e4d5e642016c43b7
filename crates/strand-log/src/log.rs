//! The append-only log: local appends, merges of remote heads, and the
//! persisted root pointer.
//!
//! Mutations (`append`, the commit phase of `merge`, `load`) are serialized
//! by one async mutex. Fetching remote branches happens before that mutex
//! is taken, so a slow store delays only the merge doing the fetching.
//! Readers go through [`Log::snapshot`], an `Arc` swapped after each commit.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use futures::future::join_all;
use strand_store::{ContentStore, StoreError};
use strand_types::events::{EventBus, LogEvent};
use strand_types::{ContentId, Heads, LogicalClock, PeerId};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::access::{AccessController, CapabilitySet};
use crate::entry::{Entry, decode_verified, encode};
use crate::error::LogError;
use crate::manifest::{RootManifest, deserialize_manifest, serialize_manifest};
use crate::pending::PendingBuffer;
use crate::report::{BranchOutcome, BranchResult, MergeReport};
use crate::snapshot::{EntryStatus, INCREMENTAL_LIMIT, LogSnapshot};

type Result<T> = std::result::Result<T, LogError>;

/// Per-log settings.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Who may write. Checked on append and for every merged entry.
    pub access: Arc<dyn AccessController>,
    /// Default bound on entries fetched per branch during `merge`.
    /// `None` is unbounded.
    pub max_resolve_depth: Option<usize>,
    /// Delete the superseded root manifest after each persist.
    ///
    /// Root pointers have no compare-and-swap, so turn this off when several
    /// logs write the same root name into one shared store.
    pub reclaim_manifests: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            access: Arc::new(CapabilitySet::open()),
            max_resolve_depth: None,
            reclaim_manifests: true,
        }
    }
}

impl LogConfig {
    pub fn with_access(mut self, access: impl AccessController + 'static) -> Self {
        self.access = Arc::new(access);
        self
    }

    pub fn with_max_resolve_depth(mut self, depth: Option<usize>) -> Self {
        self.max_resolve_depth = depth;
        self
    }

    pub fn with_reclaim_manifests(mut self, reclaim: bool) -> Self {
        self.reclaim_manifests = reclaim;
        self
    }
}

/// Options for a single merge call.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Bound on entries fetched per branch. `None` is unbounded.
    pub max_resolve_depth: Option<usize>,
}

struct LogState {
    entries: HashMap<ContentId, Entry>,
    pending: PendingBuffer,
}

/// Result of walking one branch, before anything is committed.
enum Walk {
    Known,
    Complete(Vec<Entry>),
    Incomplete {
        entries: Vec<Entry>,
        missing: BTreeSet<ContentId>,
    },
    Failed(LogError),
}

/// A replicated append-only log.
pub struct Log {
    name: String,
    store: Arc<dyn ContentStore>,
    config: LogConfig,
    bus: EventBus,
    state: Mutex<LogState>,
    snapshot: RwLock<Arc<LogSnapshot>>,
}

impl Log {
    /// Open an empty log. Call [`Log::load`] to restore persisted state.
    pub fn open(
        name: impl Into<String>,
        store: Arc<dyn ContentStore>,
        config: LogConfig,
        bus: EventBus,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            config,
            bus,
            state: Mutex::new(LogState {
                entries: HashMap::new(),
                pending: PendingBuffer::default(),
            }),
            snapshot: RwLock::new(Arc::new(LogSnapshot::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address carried in events and replication messages.
    pub fn address(&self) -> String {
        format!("/strand/{}", self.name)
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Current committed view.
    pub fn snapshot(&self) -> Arc<LogSnapshot> {
        self.snapshot
            .read()
            .expect("snapshot lock poisoned")
            .clone()
    }

    pub fn heads(&self) -> Heads {
        self.snapshot().heads().clone()
    }

    pub fn head(&self, identity: &PeerId) -> Option<ContentId> {
        self.snapshot().head(identity)
    }

    pub fn get(&self, id: &ContentId) -> Option<Entry> {
        self.snapshot().get(id).cloned()
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.snapshot().contains(id)
    }

    pub fn status(&self, id: &ContentId) -> Option<EntryStatus> {
        self.snapshot().status(id)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.snapshot().pending_count()
    }

    /// Entries in deterministic order: parents before children, ties by
    /// `(clock, id)`. `limit < 0` returns everything, otherwise the last
    /// `limit` entries of that order.
    pub fn materialize(&self, limit: i64) -> Vec<Entry> {
        self.snapshot().materialize(limit)
    }

    /// Append a local entry authored by `identity`.
    ///
    /// The entry follows the identity's current head and carries the next
    /// clock value. Emits `write` once committed.
    pub async fn append(&self, identity: PeerId, payload: impl Into<Vec<u8>>) -> Result<Entry> {
        if !self.config.access.can_append(&identity) {
            warn!(log = %self.name, %identity, "append rejected");
            return Err(LogError::WriteRejected(identity));
        }

        let entry = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            let (clock, parents) = match self
                .snapshot()
                .head(&identity)
                .and_then(|id| state.entries.get(&id))
            {
                Some(head) => (head.clock().next(), vec![head.id()]),
                None => (LogicalClock::ZERO.next(), Vec::new()),
            };

            let entry = Entry::new(identity, payload, clock, parents);
            let stored = self.store.put(Bytes::from(encode(&entry))).await?;

            if stored != entry.id() {
                return Err(LogError::IntegrityViolation {
                    claimed: entry.id(),
                    reason: format!("store addressed it as {stored}"),
                });
            }

            self.commit(state, vec![entry.clone()], true).await?;
            entry
        };

        debug!(
            log = %self.name,
            id = %entry.id(),
            identity = %identity,
            clock = %entry.clock(),
            "appended entry"
        );

        self.bus.emit(LogEvent::write(self.address(), identity));
        Ok(entry)
    }

    /// Merge remote heads using the configured depth bound.
    pub async fn merge(&self, remote: &Heads) -> Result<MergeReport> {
        let options = MergeOptions {
            max_resolve_depth: self.config.max_resolve_depth,
        };
        self.merge_with(remote, &options).await
    }

    /// Merge remote heads.
    ///
    /// Each head is an independent branch: integrity, capability, depth and
    /// store read failures drop that branch and are reported in the returned
    /// [`MergeReport`] while the other branches are committed. Branches that
    /// failed on a store read are listed by
    /// [`MergeReport::unavailable_heads`] so they can be merged again later.
    /// Only a failure to persist the new root makes the call return `Err`,
    /// and then nothing is committed.
    ///
    /// Emits one `replicated` event per identity that gained entries.
    pub async fn merge_with(&self, remote: &Heads, options: &MergeOptions) -> Result<MergeReport> {
        let starts = remote
            .iter()
            .map(|(identity, head)| (*head, Some(*identity)))
            .collect();

        self.resolve(starts, options.max_resolve_depth, Notify::Replicated)
            .await
    }

    /// Walk the missing ancestors of pending entries again.
    ///
    /// Useful when the content may have reached the store after the merge
    /// that left the entries pending.
    pub async fn retry_pending(&self) -> Result<MergeReport> {
        let missing = {
            let state = self.state.lock().await;

            if state.pending.is_empty() {
                return Ok(MergeReport::default());
            }

            state
                .pending
                .missing_parents(|id| state.entries.contains_key(id))
        };

        let starts = missing.into_iter().map(|id| (id, None)).collect();
        self.resolve(starts, self.config.max_resolve_depth, Notify::Replicated)
            .await
    }

    /// Rebuild state from the store's root pointer for this log.
    ///
    /// Returns how many entries were newly resolved. Idempotent; emits no
    /// events and does not rewrite the root. If part of the log could not be
    /// read, the readable part is still restored and the store error is
    /// returned, so calling again finishes the restore.
    pub async fn load(&self) -> Result<usize> {
        let Some(root) = self.store.root(&self.name).await? else {
            debug!(log = %self.name, "no persisted root");
            return Ok(0);
        };

        let bytes = self
            .store
            .get(root)
            .await?
            .ok_or(StoreError::NotFound(root))?;

        let actual = ContentId::from_data(&bytes);
        if actual != root {
            return Err(LogError::IntegrityViolation {
                claimed: root,
                reason: format!("root manifest hashes to {actual}"),
            });
        }

        let manifest = deserialize_manifest(&bytes)?;
        let starts = manifest
            .starting_points()
            .into_iter()
            .map(|id| (id, None))
            .collect();

        let report = self.resolve(starts, None, Notify::Silent).await?;

        for failure in report.failures() {
            if let BranchResult::Failed(e) = &failure.result {
                warn!(log = %self.name, head = %failure.head, error = %e, "could not restore branch");
            }
        }

        info!(
            log = %self.name,
            root = %root,
            restored = report.added,
            pending = report.pending,
            "loaded log"
        );

        // The rest is committed; loading again picks up the unreadable part.
        let added = report.added;
        let unavailable = report.branches.into_iter().find_map(|b| match b.result {
            BranchResult::Failed(LogError::StoreUnavailable(e)) => Some(e),
            _ => None,
        });

        match unavailable {
            Some(e) => Err(LogError::StoreUnavailable(e)),
            None => Ok(added),
        }
    }

    async fn resolve(
        &self,
        starts: Vec<(ContentId, Option<PeerId>)>,
        max_depth: Option<usize>,
        notify: Notify,
    ) -> Result<MergeReport> {
        let known = self.snapshot();

        let walks = join_all(
            starts
                .iter()
                .map(|(head, identity)| self.walk_branch(&known, *head, *identity, max_depth)),
        )
        .await;

        let mut accepted = Vec::new();
        let mut waiting = Vec::new();
        let mut branches = Vec::with_capacity(starts.len());

        for ((head, identity), walk) in starts.into_iter().zip(walks) {
            let result = match walk {
                Walk::Known => BranchResult::Known,
                Walk::Complete(entries) => {
                    let fetched = entries.len();
                    accepted.extend(entries);
                    BranchResult::Resolved { fetched }
                }
                Walk::Incomplete { entries, missing } => {
                    debug!(
                        log = %self.name,
                        %head,
                        fetched = entries.len(),
                        missing = missing.len(),
                        "branch pending on missing ancestors"
                    );
                    waiting.extend(entries);
                    BranchResult::Pending {
                        missing: missing.into_iter().collect(),
                    }
                }
                Walk::Failed(error) => {
                    warn!(log = %self.name, %head, error = %error, "dropping branch");
                    BranchResult::Failed(error)
                }
            };

            branches.push(BranchOutcome {
                head,
                identity,
                result,
            });
        }

        let (added, pending) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            for entry in waiting {
                if !state.entries.contains_key(&entry.id()) {
                    state.pending.insert(entry);
                }
            }

            let persist = matches!(notify, Notify::Replicated);
            let added = self.commit(state, accepted, persist).await?;
            (added, state.pending.len())
        };

        if !added.is_empty() {
            debug!(log = %self.name, added = added.len(), pending, "merged entries");
        }

        if matches!(notify, Notify::Replicated) {
            let identities: BTreeSet<PeerId> = added.iter().map(|e| e.identity()).collect();

            for identity in identities {
                self.bus
                    .emit(LogEvent::replicated(self.address(), identity));
            }
        }

        Ok(MergeReport {
            added: added.len(),
            pending,
            branches,
        })
    }

    /// Fetch a branch back to known entries. Holds no lock.
    async fn walk_branch(
        &self,
        known: &LogSnapshot,
        head: ContentId,
        expected: Option<PeerId>,
        max_depth: Option<usize>,
    ) -> Walk {
        if known.contains(&head) {
            return Walk::Known;
        }

        let mut frontier = VecDeque::from([(head, 1usize)]);
        let mut visited = HashSet::new();
        let mut fetched = Vec::new();
        let mut missing = BTreeSet::new();

        while let Some((id, depth)) = frontier.pop_front() {
            if known.contains(&id) || !visited.insert(id) {
                continue;
            }

            if let Some(max) = max_depth
                && depth > max
            {
                return Walk::Failed(LogError::ResolveDepthExceeded { head, depth: max });
            }

            let bytes = match self.store.get(id).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    missing.insert(id);
                    continue;
                }
                Err(StoreError::Corrupt { actual, .. }) => {
                    return Walk::Failed(LogError::IntegrityViolation {
                        claimed: id,
                        reason: format!("stored content hashes to {actual}"),
                    });
                }
                Err(e) => return Walk::Failed(e.into()),
            };

            let entry = match decode_verified(id, &bytes) {
                Ok(entry) => entry,
                Err(e) => return Walk::Failed(e),
            };

            if id == head
                && let Some(expected) = expected
                && entry.identity() != expected
            {
                return Walk::Failed(LogError::IntegrityViolation {
                    claimed: head,
                    reason: format!(
                        "announced as head of {expected} but authored by {}",
                        entry.identity()
                    ),
                });
            }

            if !self.config.access.can_append(&entry.identity()) {
                return Walk::Failed(LogError::WriteRejected(entry.identity()));
            }

            for parent in entry.parents() {
                frontier.push_back((*parent, depth + 1));
            }

            fetched.push(entry);
        }

        if missing.is_empty() {
            Walk::Complete(fetched)
        } else {
            Walk::Incomplete {
                entries: fetched,
                missing,
            }
        }
    }

    /// Apply resolved entries, release pending ones, persist, swap the
    /// snapshot. On a persist failure the entry set is restored.
    ///
    /// Every parent of an entry in `accepted` must already be in the entry
    /// set or in `accepted` itself.
    async fn commit(
        &self,
        state: &mut LogState,
        accepted: Vec<Entry>,
        persist: bool,
    ) -> Result<Vec<Entry>> {
        let mut added = Vec::new();

        for entry in accepted {
            if !state.entries.contains_key(&entry.id()) {
                state.entries.insert(entry.id(), entry.clone());
                added.push(entry);
            }
        }

        let released = state
            .pending
            .drain_resolvable(|id| state.entries.contains_key(id));
        let mut released_ids = HashSet::new();

        for entry in released {
            if !state.entries.contains_key(&entry.id()) {
                released_ids.insert(entry.id());
                state.entries.insert(entry.id(), entry.clone());
                added.push(entry);
            }
        }

        let snapshot = if added.len() <= INCREMENTAL_LIMIT {
            self.snapshot().with_added(&added, state.pending.ids())
        } else {
            LogSnapshot::build(&state.entries, state.pending.ids())
        };

        if persist
            && !added.is_empty()
            && let Err(e) = self.persist_root(&snapshot).await
        {
            for entry in &added {
                state.entries.remove(&entry.id());

                if released_ids.contains(&entry.id()) {
                    state.pending.insert(entry.clone());
                }
            }
            return Err(e);
        }

        *self.snapshot.write().expect("snapshot lock poisoned") = Arc::new(snapshot);
        Ok(added)
    }

    async fn persist_root(&self, snapshot: &LogSnapshot) -> Result<()> {
        let manifest = RootManifest::new(snapshot.heads().clone(), snapshot.tips().clone());
        let bytes = serialize_manifest(&manifest)?;
        let previous = if self.config.reclaim_manifests {
            self.store.root(&self.name).await.unwrap_or_else(|e| {
                debug!(log = %self.name, error = %e, "root unreadable, old manifest kept");
                None
            })
        } else {
            None
        };

        let id = self.store.put(Bytes::from(bytes)).await?;
        self.store.set_root(&self.name, id).await?;

        if let Some(previous) = previous
            && previous != id
        {
            if let Err(e) = self.store.delete(previous).await {
                warn!(log = %self.name, manifest = %previous, error = %e, "could not delete old root manifest");
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for Log {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("Log")
            .field("name", &self.name)
            .field("entries", &snapshot.len())
            .field("heads", &snapshot.heads().len())
            .field("pending", &snapshot.pending_count())
            .finish()
    }
}

#[derive(Clone, Copy)]
enum Notify {
    Replicated,
    Silent,
}
