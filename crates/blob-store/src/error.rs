use blob_types::BlobId;

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No committed blob exists for the id.
    #[error("blob not found: {0}")]
    NotFound(BlobId),

    /// A committed blob already exists for the id.
    #[error("blob already exists: {0}")]
    AlreadyExists(BlobId),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
