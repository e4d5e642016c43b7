//! Immutable read view of a log.

use std::collections::{BTreeSet, HashMap};

use strand_types::{ContentId, Heads, PeerId};

use crate::entry::Entry;
use crate::order::{compute_heads, compute_tips, topological_order};

/// Whether an entry is part of the log or still waiting on ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Verified, but some ancestor has not been fetched yet.
    Pending,
    /// In the entry set. Terminal.
    Resolved,
}

/// Commits adding at most this many entries extend the previous snapshot;
/// larger ones rebuild it from the entry set.
pub(crate) const INCREMENTAL_LIMIT: usize = 64;

/// A consistent view of the log at one commit.
///
/// Built once per mutation and swapped in atomically, so readers never
/// observe a half-applied merge. The materialized order is computed at
/// build time.
#[derive(Debug, Clone, Default)]
pub struct LogSnapshot {
    view: Vec<Entry>,
    index: HashMap<ContentId, usize>,
    heads: Heads,
    tips: BTreeSet<ContentId>,
    pending: BTreeSet<ContentId>,
}

impl LogSnapshot {
    pub(crate) fn build(entries: &HashMap<ContentId, Entry>, pending: BTreeSet<ContentId>) -> Self {
        let view: Vec<Entry> = topological_order(entries.values())
            .into_iter()
            .cloned()
            .collect();

        let index = view
            .iter()
            .enumerate()
            .map(|(pos, e)| (e.id(), pos))
            .collect();

        Self {
            heads: compute_heads(entries.values()),
            tips: compute_tips(entries.values()),
            view,
            index,
            pending,
        }
    }

    /// The snapshot of this entry set plus `added`, equal to what
    /// [`LogSnapshot::build`] gives for the combined set.
    ///
    /// Every parent of an added entry must be in this snapshot or in
    /// `added`, so each added entry has no children yet when it goes in.
    pub(crate) fn with_added(&self, added: &[Entry], pending: BTreeSet<ContentId>) -> Self {
        let mut next = Self {
            view: self.view.clone(),
            index: self.index.clone(),
            heads: self.heads.clone(),
            tips: self.tips.clone(),
            pending,
        };

        for entry in topological_order(added) {
            next.insert_childless(entry.clone());
        }

        next
    }

    /// Place an entry nothing depends on.
    ///
    /// Adding a childless entry to the Kahn order leaves every other entry in
    /// place: it lands on the first position after its last parent whose
    /// entry sorts above it.
    fn insert_childless(&mut self, entry: Entry) {
        let id = entry.id();
        if self.index.contains_key(&id) {
            return;
        }

        let after = entry
            .parents()
            .iter()
            .filter_map(|p| self.index.get(p))
            .max()
            .map_or(0, |pos| pos + 1);
        let key = entry.sort_key();
        let pos = self.view[after..]
            .iter()
            .position(|e| e.sort_key() > key)
            .map_or(self.view.len(), |offset| after + offset);

        let better = match self.head(&entry.identity()).and_then(|h| self.get(&h)) {
            Some(current) => {
                entry.clock() > current.clock()
                    || (entry.clock() == current.clock() && id < current.id())
            }
            None => true,
        };
        if better {
            self.heads.insert(entry.identity(), id);
        }

        for parent in entry.parents() {
            self.tips.remove(parent);
        }
        self.tips.insert(id);

        for moved in &self.view[pos..] {
            if let Some(slot) = self.index.get_mut(&moved.id()) {
                *slot += 1;
            }
        }
        self.index.insert(id, pos);
        self.view.insert(pos, entry);
    }

    /// All resolved entries in materialized order.
    pub fn entries(&self) -> &[Entry] {
        &self.view
    }

    /// Entries in materialized order; `limit < 0` returns all of them,
    /// otherwise the last `limit`.
    pub fn materialize(&self, limit: i64) -> Vec<Entry> {
        let start = match usize::try_from(limit) {
            Ok(limit) => self.view.len().saturating_sub(limit),
            Err(_) => 0,
        };
        self.view[start..].to_vec()
    }

    pub fn heads(&self) -> &Heads {
        &self.heads
    }

    pub fn head(&self, identity: &PeerId) -> Option<ContentId> {
        self.heads.get(identity).copied()
    }

    /// Entries no other entry lists as a parent.
    pub fn tips(&self) -> &BTreeSet<ContentId> {
        &self.tips
    }

    pub fn get(&self, id: &ContentId) -> Option<&Entry> {
        self.index.get(id).map(|pos| &self.view[*pos])
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.index.contains_key(id)
    }

    pub fn status(&self, id: &ContentId) -> Option<EntryStatus> {
        if self.contains(id) {
            Some(EntryStatus::Resolved)
        } else if self.pending.contains(id) {
            Some(EntryStatus::Pending)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// Number of entries waiting on missing ancestors.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
