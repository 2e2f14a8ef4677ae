use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Opaque identifier for a stored blob.
///
/// A `BlobId` is a UUID v7: unique per store operation and roughly ordered by
/// creation time. It never depends on the blob's content or its client-visible
/// path, so two stores of identical bytes at the same path get distinct ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobId(uuid::Uuid);

impl BlobId {
    /// Generate a fresh, time-ordered blob id.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Hex-encoded string representation (32 characters, no dashes).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0.as_bytes()[..4])
    }

    /// Directory shard for this id (first two hex characters).
    pub fn shard(&self) -> String {
        hex::encode(&self.0.as_bytes()[..1])
    }

    /// File name within the shard directory (remaining hex characters).
    pub fn file_name(&self) -> String {
        hex::encode(&self.0.as_bytes()[1..])
    }

    /// Parse from a 32-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; 16] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength {
                expected: 16,
                actual: bytes.len(),
            })?;
        Ok(Self(uuid::Uuid::from_bytes(arr)))
    }
}

impl Default for BlobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.short_hex())
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for BlobId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
