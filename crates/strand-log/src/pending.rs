//! Buffer for entries awaiting missing ancestors.
//!
//! When a merge walk reaches an id the content store does not have, the
//! entries fetched so far are verified but cannot be resolved. They wait
//! here until their ancestors arrive, through a later merge or a
//! [`Log::retry_pending`](crate::Log::retry_pending) walk. Pending entries
//! are not part of the log: they do not move heads and are never
//! materialized.

use std::collections::{BTreeSet, HashMap};

use strand_types::ContentId;
use tracing::trace;

use crate::entry::Entry;

/// Entries whose ancestry is not yet complete.
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingBuffer {
    entries: HashMap<ContentId, Entry>,
}

impl PendingBuffer {
    pub(crate) fn insert(&mut self, entry: Entry) {
        self.entries.entry(entry.id()).or_insert(entry);
    }

    pub(crate) fn contains(&self, id: &ContentId) -> bool {
        self.entries.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn ids(&self) -> BTreeSet<ContentId> {
        self.entries.keys().copied().collect()
    }

    /// Parents that are neither resolved nor waiting here themselves.
    pub(crate) fn missing_parents(
        &self,
        is_resolved: impl Fn(&ContentId) -> bool,
    ) -> BTreeSet<ContentId> {
        self.entries
            .values()
            .flat_map(|e| e.parents().iter())
            .filter(|p| !is_resolved(p) && !self.entries.contains_key(*p))
            .copied()
            .collect()
    }

    /// Remove and return every entry whose ancestry is now complete.
    ///
    /// Runs to a fixpoint: an entry released in one pass can release its
    /// children in the next.
    pub(crate) fn drain_resolvable(
        &mut self,
        is_resolved: impl Fn(&ContentId) -> bool,
    ) -> Vec<Entry> {
        let mut released: HashMap<ContentId, Entry> = HashMap::new();

        loop {
            let ready: Vec<ContentId> = self
                .entries
                .values()
                .filter(|e| {
                    e.parents()
                        .iter()
                        .all(|p| is_resolved(p) || released.contains_key(p))
                })
                .map(|e| e.id())
                .collect();

            if ready.is_empty() {
                break;
            }

            for id in ready {
                if let Some(entry) = self.entries.remove(&id) {
                    trace!(%id, "pending entry resolved");
                    released.insert(id, entry);
                }
            }
        }

        released.into_values().collect()
    }
}
