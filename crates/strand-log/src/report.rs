//! Outcome of a merge, per branch.

use strand_types::{ContentId, Heads, PeerId};

use crate::error::LogError;

/// What happened to one remote head.
#[derive(Debug)]
pub enum BranchResult {
    /// The head was already resolved locally.
    Known,
    /// The branch was fetched and every entry on it resolved.
    Resolved {
        /// Entries fetched from the store for this branch.
        fetched: usize,
    },
    /// The walk reached ids the store does not have; the fetched entries
    /// wait in the pending buffer.
    Pending {
        /// Ids the store could not provide.
        missing: Vec<ContentId>,
    },
    /// The branch was dropped. Other branches are unaffected.
    Failed(LogError),
}

impl BranchResult {
    /// Whether the branch failed only because the store could not be read,
    /// so walking it again later may succeed.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BranchResult::Failed(LogError::StoreUnavailable(_)))
    }
}

/// A branch's starting head and its result.
#[derive(Debug)]
pub struct BranchOutcome {
    /// Where the walk started.
    pub head: ContentId,
    /// The identity the head was announced for, if any.
    pub identity: Option<PeerId>,
    pub result: BranchResult,
}

/// Summary of a merge, load or pending retry.
#[derive(Debug, Default)]
pub struct MergeReport {
    /// Entries newly added to the resolved set.
    pub added: usize,
    /// Size of the pending buffer after the commit.
    pub pending: usize,
    /// One outcome per branch, in the order the branches were given.
    pub branches: Vec<BranchOutcome>,
}

impl MergeReport {
    /// Whether the entry set changed.
    pub fn changed(&self) -> bool {
        self.added > 0
    }

    /// Branches that were dropped.
    pub fn failures(&self) -> impl Iterator<Item = &BranchOutcome> {
        self.branches
            .iter()
            .filter(|b| matches!(b.result, BranchResult::Failed(_)))
    }

    /// Branches that failed on a store read.
    pub fn unavailable(&self) -> impl Iterator<Item = &BranchOutcome> {
        self.branches.iter().filter(|b| b.result.is_unavailable())
    }

    /// Announced heads whose branch failed on a store read, for a retry
    /// that leaves the other heads alone.
    pub fn unavailable_heads(&self) -> Heads {
        self.unavailable()
            .filter_map(|b| b.identity.map(|identity| (identity, b.head)))
            .collect()
    }

    /// Fold in the report of a later attempt over some of the same heads.
    ///
    /// Outcomes of heads walked again replace the earlier ones.
    pub fn absorb(&mut self, later: MergeReport) {
        self.added += later.added;
        self.pending = later.pending;

        for outcome in later.branches {
            match self.branches.iter_mut().find(|b| b.head == outcome.head) {
                Some(existing) => *existing = outcome,
                None => self.branches.push(outcome),
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        self.branches
            .iter()
            .any(|b| matches!(b.result, BranchResult::Pending { .. }))
    }
}
