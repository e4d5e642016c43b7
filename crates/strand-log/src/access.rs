//! Write access control.
//!
//! Every log consults an [`AccessController`] before a local append and for
//! every entry it receives through a merge. The default is open write
//! (`"*"`), matching a feed anyone may post to.

use std::collections::BTreeSet;
use std::fmt;

use strand_types::PeerId;

use crate::error::LogError;

/// Decides which identities may write to a log.
pub trait AccessController: Send + Sync + fmt::Debug {
    /// Whether `identity` may author entries.
    fn can_append(&self, identity: &PeerId) -> bool;
}

/// Capability set: either open write or an explicit allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CapabilitySet {
    /// Anyone may write (`"*"`).
    #[default]
    Open,
    /// Only the listed identities may write. An empty list makes the log
    /// read-only.
    AllowList(BTreeSet<PeerId>),
}

impl CapabilitySet {
    /// Open write access.
    pub fn open() -> Self {
        Self::Open
    }

    /// Allow only the given identities.
    pub fn allow(identities: impl IntoIterator<Item = PeerId>) -> Self {
        Self::AllowList(identities.into_iter().collect())
    }

    /// Parse capability strings.
    ///
    /// Each item is `"*"` (open write), a 64-character hex peer id, or
    /// `"name:<name>"` for an identity derived with [`PeerId::from_name`].
    /// A `"*"` anywhere in the list makes the set open.
    pub fn parse<S: AsRef<str>>(items: &[S]) -> Result<Self, LogError> {
        let mut allowed = BTreeSet::new();

        for item in items {
            let item = item.as_ref().trim();

            if item == "*" {
                return Ok(Self::Open);
            }

            let peer = match item.strip_prefix("name:") {
                Some(name) if !name.is_empty() => PeerId::from_name(name),
                Some(_) => return Err(LogError::InvalidCapability(item.to_string())),
                None => item
                    .parse()
                    .map_err(|_| LogError::InvalidCapability(item.to_string()))?,
            };
            allowed.insert(peer);
        }

        Ok(Self::AllowList(allowed))
    }

    /// Whether this set grants write access to everyone.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl AccessController for CapabilitySet {
    fn can_append(&self, identity: &PeerId) -> bool {
        match self {
            Self::Open => true,
            Self::AllowList(allowed) => allowed.contains(identity),
        }
    }
}
