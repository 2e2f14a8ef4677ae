use std::io;

use blob_store::StoreError;

/// Errors produced by the manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Failure in the underlying blob store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error while streaming a body or touching the journal.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Journal record could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias used throughout the manifest crate.
pub type ManifestResult<T> = std::result::Result<T, ManifestError>;
