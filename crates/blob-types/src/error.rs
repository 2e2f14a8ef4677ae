use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Reasons a client-supplied path is refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    /// Nothing left after canonicalization (e.g. `/` or `//`).
    #[error("path has no segments")]
    Empty,

    /// Contains characters outside the allowed set, or a misplaced extension.
    #[error("path contains forbidden characters: {0:?}")]
    Malformed(String),

    /// Resolves outside the storage root once joined to it.
    #[error("path escapes the storage root: {0:?}")]
    EscapesRoot(String),
}
