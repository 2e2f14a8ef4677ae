//! Foundation types for the blob service.
//!
//! Every other blob crate depends on `blob-types`.
//!
//! # Key Types
//!
//! - [`BlobId`] -- opaque, time-ordered identifier a blob is stored under
//! - [`BlobPath`] -- canonical client-visible path, only produced by validation
//! - [`PathValidator`] -- character filter plus storage-root containment check
//! - [`Entry`] -- manifest record tying a path to a stored blob

pub mod entry;
pub mod error;
pub mod id;
pub mod path;

pub use entry::Entry;
pub use error::{PathError, TypeError};
pub use id::BlobId;
pub use path::{BlobPath, PathValidator};
