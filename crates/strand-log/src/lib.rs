//! Replicated append-only log.
//!
//! A [`Log`] is a set of immutable, content-addressed [`Entry`] values
//! forming a DAG: each entry names the previous entry of its author as its
//! parent. Peers exchange per-identity [`Heads`](strand_types::Heads) and
//! call [`Log::merge`] to fetch whatever they are missing from a shared
//! [`ContentStore`](strand_store::ContentStore).
//!
//! Entry ids are recomputed from the bytes on every decode. Content that
//! does not hash to the id it was requested under is rejected, and only
//! the branch it came from is dropped.
//!
//! The materialized view orders entries topologically, breaking ties
//! between causally unrelated entries by `(clock, id)`. Two logs with the
//! same entry set produce the same view and the same heads.

mod access;
mod entry;
mod error;
mod log;
mod manifest;
mod order;
mod pending;
mod report;
mod snapshot;

#[cfg(test)]
mod tests;

pub use access::{AccessController, CapabilitySet};
pub use entry::{ENTRY_FORMAT_VERSION, Entry, decode, decode_verified, encode};
pub use error::LogError;
pub use log::{Log, LogConfig, MergeOptions};
pub use manifest::{ROOT_MANIFEST_VERSION, RootManifest};
pub use report::{BranchOutcome, BranchResult, MergeReport};
pub use snapshot::{EntryStatus, LogSnapshot};
