use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::BlobId;
use crate::path::BlobPath;

/// Manifest record describing one stored blob.
///
/// `size` is always the number of bytes the blob store reported persisting,
/// never a client-declared length.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: BlobId,
    /// Mime type supplied at store time; empty when the client sent none.
    pub mime_type: String,
    pub added: DateTime<Utc>,
    pub path: BlobPath,
    pub size: u64,
    /// Hex SHA-256 of the blob contents, computed while the body streamed in.
    pub sha256: String,
}

impl Entry {
    /// Create an entry stamped with the current time.
    pub fn new(
        id: BlobId,
        path: BlobPath,
        mime_type: impl Into<String>,
        size: u64,
        sha256: impl Into<String>,
    ) -> Self {
        Self {
            id,
            mime_type: mime_type.into(),
            added: Utc::now(),
            path,
            size,
            sha256: sha256.into(),
        }
    }
}
