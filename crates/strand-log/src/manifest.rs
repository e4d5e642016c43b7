//! Root manifest: the persisted pointer to a log's state.
//!
//! After every commit the log stores a small manifest (heads and DAG tips)
//! in the content store and points the store's root for the log name at
//! it. [`Log::load`](crate::Log::load) walks back from the manifest to
//! rebuild the entry set. Tips are recorded next to heads so that entries
//! on a losing fork, which no head reaches, are still restored.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strand_types::{ContentId, Heads};

use crate::error::LogError;

/// Current root manifest format.
pub const ROOT_MANIFEST_VERSION: u8 = 1;

/// Persisted summary of a log's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootManifest {
    /// Format version.
    pub version: u8,
    /// Per-identity heads.
    pub heads: Heads,
    /// Entries without children.
    pub tips: BTreeSet<ContentId>,
}

impl RootManifest {
    /// Build a manifest at the current format version.
    pub fn new(heads: Heads, tips: BTreeSet<ContentId>) -> Self {
        Self {
            version: ROOT_MANIFEST_VERSION,
            heads,
            tips,
        }
    }

    /// Every id a load must walk back from.
    pub fn starting_points(&self) -> BTreeSet<ContentId> {
        self.heads
            .values()
            .copied()
            .chain(self.tips.iter().copied())
            .collect()
    }
}

/// Serialize a manifest to postcard bytes.
pub fn serialize_manifest(manifest: &RootManifest) -> Result<Vec<u8>, LogError> {
    Ok(postcard::to_allocvec(manifest)?)
}

/// Deserialize a manifest, rejecting unknown versions.
pub fn deserialize_manifest(bytes: &[u8]) -> Result<RootManifest, LogError> {
    let manifest: RootManifest = postcard::from_bytes(bytes)?;

    if manifest.version != ROOT_MANIFEST_VERSION {
        return Err(LogError::Serialization(format!(
            "unsupported root manifest version {}, this build supports {ROOT_MANIFEST_VERSION}",
            manifest.version
        )));
    }

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_types::PeerId;

    #[test]
    fn test_manifest_roundtrip() {
        let mut heads = Heads::new();
        heads.insert(PeerId::from_name("a"), ContentId::from_data(b"a1"));
        let tips = BTreeSet::from([ContentId::from_data(b"a1"), ContentId::from_data(b"fork")]);
        let manifest = RootManifest::new(heads, tips);

        let bytes = serialize_manifest(&manifest).unwrap();
        assert_eq!(deserialize_manifest(&bytes).unwrap(), manifest);
        assert_eq!(manifest.starting_points().len(), 2);
    }

    #[test]
    fn test_manifest_rejects_unknown_version() {
        let mut manifest = RootManifest::new(Heads::new(), BTreeSet::new());
        manifest.version = 9;
        let bytes = serialize_manifest(&manifest).unwrap();

        assert!(matches!(
            deserialize_manifest(&bytes),
            Err(LogError::Serialization(_))
        ));
    }
}
