//! Physical blob storage for the blob service.
//!
//! Blobs are opaque byte sequences keyed by [`BlobId`](blob_types::BlobId).
//! The store knows nothing about client paths; the manifest owns that
//! mapping.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlobStore`] trait:
//!
//! - [`FsBlobStore`] -- sharded files under a root directory
//! - [`InMemoryBlobStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Atomic publish: bytes go to a private location and become visible in
//!    one step on commit.
//! 2. A failed or dropped write leaves no visible trace.
//! 3. Committed blobs are never modified in place; a new version is a new id.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsBlobStore;
pub use memory::InMemoryBlobStore;
pub use traits::{BlobReader, BlobStore, BlobWriter};
