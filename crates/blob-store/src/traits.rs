use async_trait::async_trait;
use blob_types::BlobId;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::StoreResult;

/// Streaming reader over a committed blob.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Exclusive write handle for a blob that is not yet visible.
///
/// Bytes written here are invisible to [`BlobStore::open`] until
/// [`commit`](BlobWriter::commit) succeeds. Dropping the handle without
/// committing discards everything written so far.
#[async_trait]
pub trait BlobWriter: AsyncWrite + Send + Unpin {
    /// Durably persist and atomically publish the blob.
    ///
    /// Returns the number of bytes actually persisted.
    async fn commit(self: Box<Self>) -> StoreResult<u64>;
}

/// Physical blob storage keyed by opaque [`BlobId`]s.
///
/// All implementations must satisfy these invariants:
/// - A blob is either fully visible or not visible at all.
/// - A failed or abandoned write leaves no trace of its id.
/// - The store never interprets blob contents or knows client paths.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Open a fresh write handle for `id`.
    ///
    /// Fails with `AlreadyExists` if `id` is already committed.
    async fn create(&self, id: &BlobId) -> StoreResult<Box<dyn BlobWriter>>;

    /// Open a committed blob for reading, returning the reader and its size.
    ///
    /// Fails with `NotFound` if `id` has no committed blob.
    async fn open(&self, id: &BlobId) -> StoreResult<(BlobReader, u64)>;

    /// Delete a committed blob. Returns `true` if it existed.
    async fn delete(&self, id: &BlobId) -> StoreResult<bool>;

    /// Ids of every committed blob, in no particular order.
    async fn list(&self) -> StoreResult<Vec<BlobId>>;

    /// Write a whole buffer as one blob and commit it.
    async fn put(&self, id: &BlobId, data: &[u8]) -> StoreResult<u64> {
        let mut writer = self.create(id).await?;
        writer.write_all(data).await?;
        writer.commit().await
    }
}
