//! Deterministic ordering over the entry DAG.
//!
//! Every peer holding the same set of entries must derive the same view and
//! the same heads, whatever order the entries arrived in. Both functions
//! here depend only on the set.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use strand_types::{ContentId, Heads};

use crate::entry::Entry;

/// Total order over a set of entries.
///
/// Kahn's algorithm (parents before children). Among entries whose
/// in-set parents have all been emitted, the smallest `(clock, id)` goes
/// first. Parents outside the set are ignored.
pub(crate) fn topological_order<'a, I>(entries: I) -> Vec<&'a Entry>
where
    I: IntoIterator<Item = &'a Entry>,
{
    let by_id: HashMap<ContentId, &Entry> = entries.into_iter().map(|e| (e.id(), e)).collect();

    let mut in_degree: HashMap<ContentId, usize> = HashMap::with_capacity(by_id.len());
    let mut children: HashMap<ContentId, Vec<ContentId>> = HashMap::new();

    for (id, entry) in &by_id {
        // A parent listed twice is still one edge.
        let parents: HashSet<&ContentId> = entry
            .parents()
            .iter()
            .filter(|p| by_id.contains_key(*p))
            .collect();
        in_degree.insert(*id, parents.len());

        for parent in parents {
            children.entry(*parent).or_default().push(*id);
        }
    }

    let mut ready: BinaryHeap<Reverse<_>> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| Reverse(by_id[id].sort_key()))
        .collect();

    let mut result = Vec::with_capacity(by_id.len());

    while let Some(Reverse((_, id))) = ready.pop() {
        let entry = by_id[&id];
        result.push(entry);

        if let Some(kids) = children.get(&id) {
            for kid in kids {
                if let Some(deg) = in_degree.get_mut(kid) {
                    *deg -= 1;

                    if *deg == 0 {
                        ready.push(Reverse(by_id[kid].sort_key()));
                    }
                }
            }
        }
    }

    result
}

/// Per-identity head: the entry with the highest clock, ties going to the
/// lexicographically smaller id.
pub(crate) fn compute_heads<'a, I>(entries: I) -> Heads
where
    I: IntoIterator<Item = &'a Entry>,
{
    let mut best: HashMap<_, &Entry> = HashMap::new();

    for entry in entries {
        best.entry(entry.identity())
            .and_modify(|current| {
                let better = entry.clock() > current.clock()
                    || (entry.clock() == current.clock() && entry.id() < current.id());
                if better {
                    *current = entry;
                }
            })
            .or_insert(entry);
    }

    best.into_iter().map(|(peer, e)| (peer, e.id())).collect()
}

/// Entries no other entry in the set lists as a parent.
pub(crate) fn compute_tips<'a, I>(entries: I) -> BTreeSet<ContentId>
where
    I: IntoIterator<Item = &'a Entry> + Clone,
{
    let referenced: HashSet<ContentId> = entries
        .clone()
        .into_iter()
        .flat_map(|e| e.parents().iter().copied())
        .collect();

    entries
        .into_iter()
        .map(|e| e.id())
        .filter(|id| !referenced.contains(id))
        .collect()
}
