//! Filesystem-backed blob store.
//!
//! Layout:
//! ```text
//! {root}/
//! ├── blobs/
//! │   ├── 01/
//! │   │   └── 9a3c...   # committed blob (remainder of the id)
//! │   └── 7f/
//! │       └── 02bd...
//! └── tmp/
//!     └── .incoming-XXXX  # in-flight writes
//! ```
//!
//! Writes land in `tmp/` and are renamed into `blobs/` on commit. Both
//! directories live under the same root so the rename never crosses a
//! filesystem boundary.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use blob_types::BlobId;
use tempfile::TempPath;
use tokio::fs::{self, File};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobReader, BlobStore, BlobWriter};

const BLOBS_DIR: &str = "blobs";
const TMP_DIR: &str = "tmp";
const TMP_PREFIX: &str = ".incoming-";

/// Blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    blobs_dir: PathBuf,
    tmp_dir: PathBuf,
    /// `fsync` blob contents and directories on commit.
    sync_writes: bool,
}

impl FsBlobStore {
    /// Open (or create) a store under `root`.
    ///
    /// Any temp files left behind by an earlier crash are removed.
    pub async fn open(root: impl AsRef<Path>, sync_writes: bool) -> StoreResult<Self> {
        let root = root.as_ref();
        let store = Self {
            blobs_dir: root.join(BLOBS_DIR),
            tmp_dir: root.join(TMP_DIR),
            sync_writes,
        };
        fs::create_dir_all(&store.blobs_dir).await?;
        fs::create_dir_all(&store.tmp_dir).await?;

        let purged = store.purge_tmp().await?;
        if purged > 0 {
            info!(purged, "removed stale temp files");
        }
        Ok(store)
    }

    /// Directory holding committed blobs.
    pub fn blobs_dir(&self) -> &Path {
        &self.blobs_dir
    }

    /// Directory holding in-flight writes.
    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    fn blob_path(&self, id: &BlobId) -> PathBuf {
        self.blobs_dir.join(id.shard()).join(id.file_name())
    }

    async fn purge_tmp(&self) -> StoreResult<usize> {
        let mut purged = 0;
        let mut dir = fs::read_dir(&self.tmp_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_file() {
                fs::remove_file(entry.path()).await?;
                purged += 1;
            }
        }
        Ok(purged)
    }
}

/// Write handle backed by an anonymous temp file.
///
/// The [`TempPath`] unlinks the file when dropped, so an abandoned handle
/// leaves nothing behind.
struct FsBlobWriter {
    id: BlobId,
    file: File,
    temp_path: TempPath,
    final_path: PathBuf,
    sync_writes: bool,
}

impl AsyncWrite for FsBlobWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.file).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_shutdown(cx)
    }
}

#[async_trait]
impl BlobWriter for FsBlobWriter {
    async fn commit(self: Box<Self>) -> StoreResult<u64> {
        let FsBlobWriter {
            id,
            mut file,
            temp_path,
            final_path,
            sync_writes,
        } = *self;

        file.flush().await?;
        if sync_writes {
            file.sync_all().await?;
        }
        let size = file.metadata().await?.len();
        drop(file);

        let shard_dir = final_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::other("blob path has no parent"))?;
        fs::create_dir_all(&shard_dir).await?;

        tokio::task::spawn_blocking(move || -> io::Result<()> {
            temp_path.persist(&final_path).map_err(|e| e.error)?;
            if sync_writes {
                std::fs::File::open(&shard_dir)?.sync_all()?;
            }
            Ok(())
        })
        .await
        .map_err(io::Error::other)??;

        debug!(id = %id.short_hex(), size, "blob committed");
        Ok(size)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn create(&self, id: &BlobId) -> StoreResult<Box<dyn BlobWriter>> {
        let final_path = self.blob_path(id);
        if fs::try_exists(&final_path).await? {
            return Err(StoreError::AlreadyExists(*id));
        }

        let tmp_dir = self.tmp_dir.clone();
        let named = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(TMP_PREFIX)
                .tempfile_in(&tmp_dir)
        })
        .await
        .map_err(io::Error::other)??;
        let (file, temp_path) = named.into_parts();

        Ok(Box::new(FsBlobWriter {
            id: *id,
            file: File::from_std(file),
            temp_path,
            final_path,
            sync_writes: self.sync_writes,
        }))
    }

    async fn open(&self, id: &BlobId) -> StoreResult<(BlobReader, u64)> {
        let file = match File::open(self.blob_path(id)).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(*id));
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();
        Ok((Box::new(file), size))
    }

    async fn delete(&self, id: &BlobId) -> StoreResult<bool> {
        match fs::remove_file(self.blob_path(id)).await {
            Ok(()) => {
                debug!(id = %id.short_hex(), "blob deleted");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> StoreResult<Vec<BlobId>> {
        let mut ids = Vec::new();
        let mut shards = fs::read_dir(&self.blobs_dir).await?;
        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let shard_name = shard.file_name().to_string_lossy().into_owned();
            let mut files = fs::read_dir(shard.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let name = format!("{shard_name}{}", file.file_name().to_string_lossy());
                match name.parse::<BlobId>() {
                    Ok(id) => ids.push(id),
                    Err(e) => warn!(path = %file.path().display(), error = %e, "skipping unrecognized file in blob store"),
                }
            }
        }
        Ok(ids)
    }
}
