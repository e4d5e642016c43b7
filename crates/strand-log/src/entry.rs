//! Log entries and their canonical byte encoding.
//!
//! An entry's id is `blake3(encode(entry))`. The encoding covers every
//! field except the id itself, in a fixed order, so any implementation
//! that encodes the same fields gets the same id. Storing the encoded bytes
//! in a [`ContentStore`](strand_store::ContentStore) therefore yields the
//! entry id as the blob address.
//!
//! Ids are never read from the wire: [`decode`] recomputes them, and
//! [`decode_verified`] rejects bytes that do not hash to the id they were
//! fetched under.

use serde::{Deserialize, Serialize};
use strand_types::{ContentId, LogicalClock, PeerId};

use crate::error::LogError;

type Result<T> = std::result::Result<T, LogError>;

/// Version tag leading every encoded entry.
pub const ENTRY_FORMAT_VERSION: u8 = 1;

/// An immutable record in the log.
///
/// Construct with [`Entry::new`] (local appends) or [`decode`] (received
/// bytes); both derive `id` from the other fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    id: ContentId,
    identity: PeerId,
    payload: Vec<u8>,
    clock: LogicalClock,
    parents: Vec<ContentId>,
}

/// Field order here is the wire order.
#[derive(Serialize)]
struct EntryBody<'a> {
    version: u8,
    identity: PeerId,
    clock: LogicalClock,
    parents: &'a [ContentId],
    payload: &'a [u8],
}

#[derive(Deserialize)]
struct OwnedEntryBody {
    version: u8,
    identity: PeerId,
    clock: LogicalClock,
    parents: Vec<ContentId>,
    payload: Vec<u8>,
}

impl Entry {
    /// Create an entry, computing its content id.
    pub fn new(
        identity: PeerId,
        payload: impl Into<Vec<u8>>,
        clock: LogicalClock,
        parents: Vec<ContentId>,
    ) -> Self {
        let payload = payload.into();
        let id = ContentId::from_data(&encode_fields(identity, clock, &parents, &payload));

        Self {
            id,
            identity,
            payload,
            clock,
            parents,
        }
    }

    /// Content id of this entry.
    pub fn id(&self) -> ContentId {
        self.id
    }

    /// Identity that authored this entry.
    pub fn identity(&self) -> PeerId {
        self.identity
    }

    /// Opaque payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload as text, replacing invalid UTF-8.
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// The author's logical clock at this entry.
    pub fn clock(&self) -> LogicalClock {
        self.clock
    }

    /// Ids of the entries this one directly follows.
    pub fn parents(&self) -> &[ContentId] {
        &self.parents
    }

    /// Recompute the id from the fields and compare.
    pub fn verify_id(&self) -> bool {
        ContentId::from_data(&encode(self)) == self.id
    }

    /// Ordering key used to break ties between causally unrelated entries.
    pub(crate) fn sort_key(&self) -> (LogicalClock, ContentId) {
        (self.clock, self.id)
    }
}

fn encode_fields(
    identity: PeerId,
    clock: LogicalClock,
    parents: &[ContentId],
    payload: &[u8],
) -> Vec<u8> {
    let body = EntryBody {
        version: ENTRY_FORMAT_VERSION,
        identity,
        clock,
        parents,
        payload,
    };
    postcard::to_allocvec(&body).expect("entry serialization should not fail")
}

/// Canonical encoding of an entry (everything but its id).
pub fn encode(entry: &Entry) -> Vec<u8> {
    encode_fields(entry.identity, entry.clock, &entry.parents, &entry.payload)
}

/// Decode an entry, deriving its id from the decoded fields.
///
/// Fails with [`LogError::MalformedEntry`] on truncated input, trailing
/// bytes, or an unknown format version.
pub fn decode(bytes: &[u8]) -> Result<Entry> {
    let (body, rest): (OwnedEntryBody, &[u8]) =
        postcard::take_from_bytes(bytes).map_err(|e| LogError::MalformedEntry(e.to_string()))?;

    if !rest.is_empty() {
        return Err(LogError::MalformedEntry(format!(
            "{} trailing bytes",
            rest.len()
        )));
    }

    if body.version != ENTRY_FORMAT_VERSION {
        return Err(LogError::MalformedEntry(format!(
            "unsupported entry format version {}, expected {ENTRY_FORMAT_VERSION}",
            body.version
        )));
    }

    Ok(Entry::new(
        body.identity,
        body.payload,
        body.clock,
        body.parents,
    ))
}

/// Decode bytes fetched under `claimed` and check they hash to it.
///
/// The raw bytes must hash to `claimed` and must also be the canonical
/// encoding of the decoded fields; bytes that decode but re-encode
/// differently are rejected as malformed.
pub fn decode_verified(claimed: ContentId, bytes: &[u8]) -> Result<Entry> {
    let actual = ContentId::from_data(bytes);

    if actual != claimed {
        return Err(LogError::IntegrityViolation {
            claimed,
            reason: format!("content hashes to {actual}"),
        });
    }

    let entry = decode(bytes)?;

    if entry.id != claimed {
        return Err(LogError::MalformedEntry(format!(
            "non-canonical encoding of {claimed}"
        )));
    }

    Ok(entry)
}
