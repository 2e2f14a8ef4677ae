//! The manifest: authoritative mapping from client path to stored blob.
//!
//! Owns the create/overwrite/delete protocol against a
//! [`BlobStore`](blob_store::BlobStore):
//!
//! - **Manifest** -- in-memory index plus the store/remove protocol
//! - **ManifestJournal** -- CRC-framed append-only log the index is rebuilt from
//! - **PathLocks** -- striped per-path reader/writer locks

pub mod digest;
pub mod error;
pub mod journal;
pub mod locks;
pub mod manifest;

pub use digest::HashingReader;
pub use error::{ManifestError, ManifestResult};
pub use journal::{JournalRecord, ManifestJournal};
pub use locks::PathLocks;
pub use manifest::{Manifest, StoreOutcome};
