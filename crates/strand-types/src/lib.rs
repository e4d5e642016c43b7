//! Shared types and identifiers for Strand.
//!
//! This crate defines the core types used across the Strand workspace:
//! identifiers ([`ContentId`], [`PeerId`]), the per-identity
//! [`LogicalClock`], the [`Heads`] mapping, and the in-process
//! [`events::EventBus`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod events;

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

/// Error returned when parsing an identifier from its hex form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identifier {input:?}: expected 64 hex characters")]
pub struct ParseIdError {
    /// The rejected input.
    pub input: String,
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Create an ID by hashing arbitrary data with BLAKE3.
            pub fn from_data(data: &[u8]) -> Self {
                Self(blake3::hash(data).into())
            }

            /// Return the raw 32-byte representation.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// First eight hex characters, for compact log output.
            pub fn short(&self) -> String {
                self.to_string()[..8].to_string()
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(s, &mut bytes)
                    .map_err(|_| ParseIdError { input: s.to_string() })?;
                Ok(Self(bytes))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

define_id!(
    /// Content-addressed identifier for a stored blob: `blake3(bytes)`.
    ///
    /// Log entries are stored under their `ContentId`, so an entry's id is
    /// also the key it is fetched by during replication.
    ContentId
);

define_id!(
    /// Identifier of a writer (a peer's identity).
    PeerId
);

impl PeerId {
    /// Derive a peer identity from a human-readable name.
    pub fn from_name(name: &str) -> Self {
        Self::from_data(name.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Clock and heads
// ---------------------------------------------------------------------------

/// Per-identity logical clock.
///
/// Incremented by one on every local append. Used to order entries for
/// display and to pick heads; never used on its own to infer causality.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct LogicalClock(u64);

impl LogicalClock {
    /// The clock of an identity that has not appended anything yet.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw clock value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The clock value for the next local append.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Return the raw value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LogicalClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newest known entry per identity.
///
/// A `BTreeMap` so that iteration (and therefore serialization) is ordered
/// by `PeerId`.
pub type Heads = BTreeMap<PeerId, ContentId>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
