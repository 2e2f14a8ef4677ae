use std::collections::HashMap;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};

use async_trait::async_trait;
use blob_types::BlobId;
use bytes::Bytes;
use tokio::io::AsyncWrite;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobReader, BlobStore, BlobWriter};

type BlobMap = Arc<RwLock<HashMap<BlobId, Bytes>>>;

/// In-memory, HashMap-based blob store.
///
/// Intended for tests and embedding. Writes are buffered per handle and only
/// inserted into the shared map on commit.
pub struct InMemoryBlobStore {
    blobs: BlobMap,
}

impl InMemoryBlobStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            blobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of committed blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no blob is committed.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all committed blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .map(|data| data.len() as u64)
            .sum()
    }

    /// Copy of a committed blob's bytes.
    pub fn get(&self, id: &BlobId) -> Option<Bytes> {
        self.blobs.read().expect("lock poisoned").get(id).cloned()
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlobStore")
            .field("blob_count", &self.len())
            .finish()
    }
}

struct MemoryBlobWriter {
    id: BlobId,
    buf: Vec<u8>,
    blobs: BlobMap,
}

impl AsyncWrite for MemoryBlobWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.buf).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.buf).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.buf).poll_shutdown(cx)
    }
}

#[async_trait]
impl BlobWriter for MemoryBlobWriter {
    async fn commit(self: Box<Self>) -> StoreResult<u64> {
        let MemoryBlobWriter { id, buf, blobs } = *self;
        let size = buf.len() as u64;
        let mut map = blobs.write().expect("lock poisoned");
        if map.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        map.insert(id, Bytes::from(buf));
        Ok(size)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn create(&self, id: &BlobId) -> StoreResult<Box<dyn BlobWriter>> {
        if self.blobs.read().expect("lock poisoned").contains_key(id) {
            return Err(StoreError::AlreadyExists(*id));
        }
        Ok(Box::new(MemoryBlobWriter {
            id: *id,
            buf: Vec::new(),
            blobs: Arc::clone(&self.blobs),
        }))
    }

    async fn open(&self, id: &BlobId) -> StoreResult<(BlobReader, u64)> {
        let data = self.get(id).ok_or(StoreError::NotFound(*id))?;
        let size = data.len() as u64;
        Ok((Box::new(Cursor::new(data)), size))
    }

    async fn delete(&self, id: &BlobId) -> StoreResult<bool> {
        let mut map = self.blobs.write().expect("lock poisoned");
        Ok(map.remove(id).is_some())
    }

    async fn list(&self) -> StoreResult<Vec<BlobId>> {
        let map = self.blobs.read().expect("lock poisoned");
        Ok(map.keys().copied().collect())
    }
}
