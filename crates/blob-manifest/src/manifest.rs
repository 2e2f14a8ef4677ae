use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::sync::{Arc, RwLock};

use blob_store::{BlobReader, BlobStore, BlobWriter, StoreError};
use blob_types::{BlobId, BlobPath, Entry};
use tokio::io::AsyncRead;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::digest::HashingReader;
use crate::error::{ManifestError, ManifestResult};
use crate::journal::{JournalRecord, ManifestJournal};
use crate::locks::PathLocks;

/// Whether a store created a new path or replaced an existing entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOutcome {
    Created,
    Replaced,
}

/// The authoritative mapping from client path to stored blob.
///
/// Protocol for every mutation:
/// 1. stream the body into a fresh blob id (no lock held)
/// 2. commit the blob (atomic publish in the store)
/// 3. under the path's write guard, journal the change and swap the entry
/// 4. reclaim the blob the old entry pointed at
///
/// Steps 2 to 4 run on their own task, so a caller that goes away mid-way
/// cannot strand a committed blob. A crash between 2 and 3 leaves only an
/// unreferenced blob, which the next [`Manifest::open`] deletes. No entry
/// ever points at a partial blob.
pub struct Manifest {
    inner: Arc<Inner>,
}

struct Inner {
    entries: RwLock<HashMap<BlobPath, Entry>>,
    locks: PathLocks,
    store: Arc<dyn BlobStore>,
    journal: Option<Arc<ManifestJournal>>,
}

impl Manifest {
    /// A manifest that lives only in memory.
    pub fn in_memory(store: Arc<dyn BlobStore>) -> Self {
        Self::from_parts(HashMap::new(), store, None)
    }

    /// Load a journaled manifest, compact its journal, and reconcile it
    /// with the blob store.
    ///
    /// Must run before any request is served: reconciliation deletes every
    /// blob the manifest does not reference.
    pub async fn open(
        journal_path: impl AsRef<Path>,
        store: Arc<dyn BlobStore>,
        sync_writes: bool,
    ) -> ManifestResult<Self> {
        let journal_path = journal_path.as_ref().to_path_buf();
        let (journal, entries) = tokio::task::spawn_blocking(move || -> ManifestResult<_> {
            let journal = ManifestJournal::open(&journal_path, sync_writes)?;
            let mut entries = HashMap::new();
            for record in journal.recover()? {
                match record {
                    JournalRecord::Put(entry) => {
                        entries.insert(entry.path.clone(), entry);
                    }
                    JournalRecord::Remove { path } => {
                        entries.remove(&path);
                    }
                }
            }
            journal.compact(entries.values())?;
            Ok((journal, entries))
        })
        .await
        .map_err(join_error)??;

        let manifest = Self::from_parts(entries, store, Some(Arc::new(journal)));
        manifest.inner.reconcile().await?;

        if let Some(journal) = &manifest.inner.journal {
            info!(
                entries = manifest.len(),
                journal = %journal.path().display(),
                "manifest loaded"
            );
        }
        Ok(manifest)
    }

    fn from_parts(
        entries: HashMap<BlobPath, Entry>,
        store: Arc<dyn BlobStore>,
        journal: Option<Arc<ManifestJournal>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(entries),
                locks: PathLocks::default(),
                store,
                journal,
            }),
        }
    }

    /// Current entry for `path`, if any.
    pub fn lookup(&self, path: &BlobPath) -> Option<Entry> {
        self.inner.lookup(path)
    }

    /// Look up `path` and open its blob as one step.
    ///
    /// The blob is opened under the path's read guard, so a concurrent
    /// overwrite or delete cannot reclaim it between lookup and open. Once
    /// open, the reader stays valid even if the blob is later reclaimed.
    /// An entry whose blob has gone missing reads as absent.
    pub async fn open_blob(&self, path: &BlobPath) -> ManifestResult<Option<(Entry, BlobReader)>> {
        let _guard = self.inner.locks.read(path).await;
        let Some(entry) = self.inner.lookup(path) else {
            return Ok(None);
        };
        match self.inner.store.open(&entry.id).await {
            Ok((reader, _)) => Ok(Some((entry, reader))),
            Err(StoreError::NotFound(_)) => {
                warn!(%path, id = %entry.id.short_hex(), "blob missing for manifest entry");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stream `body` into a new blob and install it at `path`.
    ///
    /// On any failure the new blob is discarded and the previous entry for
    /// `path` (if any) is left untouched. Once the body has been read in
    /// full, installation completes even if this future is dropped.
    pub async fn store<R>(
        &self,
        path: BlobPath,
        mime_type: impl Into<String>,
        body: &mut R,
    ) -> ManifestResult<(Entry, StoreOutcome)>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let id = BlobId::new();
        let mut writer = self.inner.store.create(&id).await?;
        // Dropping the writer on error discards the partial blob.
        let mut body = HashingReader::new(body);
        tokio::io::copy(&mut body, &mut writer).await?;
        let sha256 = body.finish();

        let inner = Arc::clone(&self.inner);
        let mime_type = mime_type.into();
        tokio::spawn(async move { inner.install(id, writer, path, mime_type, sha256).await })
            .await
            .map_err(join_error)?
    }

    /// Remove the entry for `path` and reclaim its blob.
    ///
    /// Returns `false` if there was no entry. Like [`Manifest::store`], the
    /// journal write and index update finish even if this future is dropped.
    pub async fn remove(&self, path: &BlobPath) -> ManifestResult<bool> {
        let inner = Arc::clone(&self.inner);
        let path = path.clone();
        tokio::spawn(async move { inner.remove(&path).await })
            .await
            .map_err(join_error)?
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.entries.read().expect("manifest lock poisoned").len()
    }

    /// Returns `true` if the manifest has no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().expect("manifest lock poisoned").is_empty()
    }

    /// Snapshot of all live entries, sorted by path.
    pub fn entries(&self) -> Vec<Entry> {
        let map = self.inner.entries.read().expect("manifest lock poisoned");
        let mut entries: Vec<Entry> = map.values().cloned().collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    /// The blob store backing this manifest.
    pub fn blob_store(&self) -> &Arc<dyn BlobStore> {
        &self.inner.store
    }
}

impl Inner {
    fn lookup(&self, path: &BlobPath) -> Option<Entry> {
        self.entries
            .read()
            .expect("manifest lock poisoned")
            .get(path)
            .cloned()
    }

    async fn install(
        &self,
        id: BlobId,
        writer: Box<dyn BlobWriter>,
        path: BlobPath,
        mime_type: String,
        sha256: String,
    ) -> ManifestResult<(Entry, StoreOutcome)> {
        let size = match writer.commit().await {
            Ok(size) => size,
            Err(e) => {
                self.discard(&id).await;
                return Err(e.into());
            }
        };

        let entry = Entry::new(id, path, mime_type, size, sha256);
        let previous = {
            let _guard = self.locks.write(&entry.path).await;
            if let Err(e) = self.append(JournalRecord::Put(entry.clone())).await {
                drop(_guard);
                self.discard(&id).await;
                return Err(e);
            }
            let previous = self
                .entries
                .write()
                .expect("manifest lock poisoned")
                .insert(entry.path.clone(), entry.clone());
            if let Some(old) = &previous {
                self.reclaim(&old.id).await;
            }
            previous
        };

        debug!(path = %entry.path, id = %entry.id.short_hex(), size, "entry stored");
        let outcome = match previous {
            Some(_) => StoreOutcome::Replaced,
            None => StoreOutcome::Created,
        };
        Ok((entry, outcome))
    }

    async fn remove(&self, path: &BlobPath) -> ManifestResult<bool> {
        let _guard = self.locks.write(path).await;
        let Some(entry) = self.lookup(path) else {
            return Ok(false);
        };

        self.append(JournalRecord::Remove { path: path.clone() }).await?;
        self.entries
            .write()
            .expect("manifest lock poisoned")
            .remove(path);
        self.reclaim(&entry.id).await;

        debug!(%path, id = %entry.id.short_hex(), "entry removed");
        Ok(true)
    }

    /// Journal writes block on disk, so they run off the async workers.
    async fn append(&self, record: JournalRecord) -> ManifestResult<()> {
        let Some(journal) = self.journal.clone() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || journal.append(&record))
            .await
            .map_err(join_error)??;
        Ok(())
    }

    /// Delete a blob no entry points at any more.
    ///
    /// Failure only leaks the blob until the next reconciliation, so it is
    /// logged rather than returned.
    async fn reclaim(&self, id: &BlobId) {
        match self.store.delete(id).await {
            Ok(_) => debug!(id = %id.short_hex(), "blob reclaimed"),
            Err(e) => warn!(id = %id.short_hex(), error = %e, "failed to reclaim blob"),
        }
    }

    async fn discard(&self, id: &BlobId) {
        if let Err(e) = self.store.delete(id).await {
            warn!(id = %id.short_hex(), error = %e, "failed to discard uncommitted blob");
        }
    }

    /// Drop entries whose blob is gone and delete blobs no entry references.
    async fn reconcile(&self) -> ManifestResult<()> {
        let stored: HashSet<BlobId> = self.store.list().await?.into_iter().collect();

        let dangling: Vec<BlobPath> = {
            let map = self.entries.read().expect("manifest lock poisoned");
            map.values()
                .filter(|entry| !stored.contains(&entry.id))
                .map(|entry| entry.path.clone())
                .collect()
        };
        for path in &dangling {
            warn!(%path, "blob missing for manifest entry; dropping entry");
            self.append(JournalRecord::Remove { path: path.clone() }).await?;
            self.entries.write().expect("manifest lock poisoned").remove(path);
        }

        let referenced: HashSet<BlobId> = self
            .entries
            .read()
            .expect("manifest lock poisoned")
            .values()
            .map(|entry| entry.id)
            .collect();
        let mut orphans = 0usize;
        for id in stored.difference(&referenced) {
            match self.store.delete(id).await {
                Ok(_) => orphans += 1,
                Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(ManifestError::Store(e)),
            }
        }
        if orphans > 0 || !dangling.is_empty() {
            info!(orphans, dangling = dangling.len(), "reconciled manifest with blob store");
        }
        Ok(())
    }
}

fn join_error(e: JoinError) -> ManifestError {
    ManifestError::Io(io::Error::other(e))
}

impl std::fmt::Debug for Manifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manifest")
            .field("entries", &self.len())
            .field("journaled", &self.inner.journal.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blob_store::{FsBlobStore, InMemoryBlobStore};
    use blob_types::PathValidator;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncReadExt, ReadBuf};

    fn path(raw: &str) -> BlobPath {
        PathValidator::new("/data").validate(raw).unwrap()
    }

    fn memory() -> (Manifest, Arc<InMemoryBlobStore>) {
        let store = Arc::new(InMemoryBlobStore::new());
        (Manifest::in_memory(store.clone()), store)
    }

    async fn read(manifest: &Manifest, raw: &str) -> Option<(Entry, Vec<u8>)> {
        let (entry, mut reader) = manifest.open_blob(&path(raw)).await.unwrap()?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        Some((entry, out))
    }

    /// Yields some bytes, then fails like a dropped client connection.
    struct FailingBody {
        sent: bool,
    }

    impl AsyncRead for FailingBody {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")));
            }
            self.sent = true;
            buf.put_slice(b"partial bytes");
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn store_then_lookup() {
        let (manifest, store) = memory();
        let (entry, outcome) = manifest
            .store(path("/foo.txt"), "text/plain", &mut &b"hello"[..])
            .await
            .unwrap();
        assert_eq!(outcome, StoreOutcome::Created);
        assert_eq!(entry.size, 5);
        assert_eq!(entry.mime_type, "text/plain");

        assert_eq!(manifest.lookup(&path("/FOO.TXT")), Some(entry.clone()));
        let (read_entry, bytes) = read(&manifest, "/foo.txt").await.unwrap();
        assert_eq!(read_entry, entry);
        assert_eq!(bytes, b"hello");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn lookup_missing() {
        let (manifest, _) = memory();
        assert!(manifest.lookup(&path("/unknown.txt")).is_none());
        assert!(read(&manifest, "/unknown.txt").await.is_none());
    }

    #[tokio::test]
    async fn overwrite_replaces_and_reclaims() {
        let (manifest, store) = memory();
        let (first, _) = manifest.store(path("/a.txt"), "", &mut &b"v1"[..]).await.unwrap();
        let (second, outcome) = manifest.store(path("/a.txt"), "", &mut &b"v2!"[..]).await.unwrap();

        assert_eq!(outcome, StoreOutcome::Replaced);
        assert_ne!(first.id, second.id);
        assert_eq!(manifest.len(), 1);
        assert_eq!(read(&manifest, "/a.txt").await.unwrap().1, b"v2!");
        assert!(store.get(&first.id).is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn remove_twice() {
        let (manifest, store) = memory();
        manifest.store(path("/gone"), "", &mut &b"x"[..]).await.unwrap();

        assert!(manifest.remove(&path("/gone")).await.unwrap());
        assert!(!manifest.remove(&path("/gone")).await.unwrap());
        assert!(manifest.lookup(&path("/gone")).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn failed_body_leaves_previous_entry() {
        let (manifest, store) = memory();
        let (original, _) = manifest.store(path("/keep.txt"), "text/plain", &mut &b"original"[..]).await.unwrap();

        let err = manifest
            .store(path("/keep.txt"), "text/plain", &mut FailingBody { sent: false })
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::Io(_)));

        assert_eq!(manifest.lookup(&path("/keep.txt")), Some(original));
        assert_eq!(read(&manifest, "/keep.txt").await.unwrap().1, b"original");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn failed_body_on_new_path_leaves_nothing() {
        let (manifest, store) = memory();
        assert!(manifest
            .store(path("/new.bin"), "", &mut FailingBody { sent: false })
            .await
            .is_err());
        assert!(manifest.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn size_counts_persisted_bytes() {
        let (manifest, _) = memory();
        let body = vec![7u8; 300_000];
        let (entry, _) = manifest.store(path("/big.bin"), "", &mut body.as_slice()).await.unwrap();
        assert_eq!(entry.size, 300_000);
    }

    #[tokio::test]
    async fn concurrent_distinct_paths() {
        let (manifest, store) = memory();
        let manifest = Arc::new(manifest);
        let mut tasks = Vec::new();
        for i in 0..32 {
            let manifest = Arc::clone(&manifest);
            tasks.push(tokio::spawn(async move {
                let body = format!("body-{i}");
                manifest
                    .store(path(&format!("/file-{i}.txt")), "", &mut body.as_bytes())
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(manifest.len(), 32);
        assert_eq!(store.len(), 32);
        for i in 0..32 {
            let (_, bytes) = read(&manifest, &format!("/file-{i}.txt")).await.unwrap();
            assert_eq!(bytes, format!("body-{i}").as_bytes());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_same_path_leaves_one_whole_body() {
        let (manifest, store) = memory();
        let manifest = Arc::new(manifest);
        let bodies: Vec<Vec<u8>> = (0..16u8).map(|i| vec![i; 4096]).collect();

        let reader = {
            let manifest = Arc::clone(&manifest);
            tokio::spawn(async move {
                for _ in 0..200 {
                    if let Some((entry, bytes)) = read(&manifest, "/race.bin").await {
                        assert_eq!(bytes.len() as u64, entry.size);
                        assert!(bytes.iter().all(|b| *b == bytes[0]), "torn read");
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut writers = Vec::new();
        for body in bodies.clone() {
            let manifest = Arc::clone(&manifest);
            writers.push(tokio::spawn(async move {
                manifest.store(path("/race.bin"), "", &mut body.as_slice()).await.unwrap();
            }));
        }
        for writer in writers {
            writer.await.unwrap();
        }
        reader.await.unwrap();

        let (_, bytes) = read(&manifest, "/race.bin").await.unwrap();
        assert!(bodies.contains(&bytes));
        assert_eq!(manifest.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn journal_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let journal_path = dir.path().join("manifest.journal");

        let stored = {
            let store = Arc::new(FsBlobStore::open(dir.path(), true).await.unwrap());
            let manifest = Manifest::open(&journal_path, store, true).await.unwrap();
            let (kept, _) = manifest.store(path("/kept.txt"), "text/plain", &mut &b"kept"[..]).await.unwrap();
            manifest.store(path("/replaced.txt"), "", &mut &b"old"[..]).await.unwrap();
            manifest.store(path("/replaced.txt"), "", &mut &b"new"[..]).await.unwrap();
            manifest.store(path("/removed.txt"), "", &mut &b"bye"[..]).await.unwrap();
            manifest.remove(&path("/removed.txt")).await.unwrap();
            kept
        };

        let store = Arc::new(FsBlobStore::open(dir.path(), true).await.unwrap());
        let manifest = Manifest::open(&journal_path, store, true).await.unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.lookup(&path("/kept.txt")), Some(stored));
        assert_eq!(read(&manifest, "/replaced.txt").await.unwrap().1, b"new");
        assert!(manifest.lookup(&path("/removed.txt")).is_none());
    }

    #[tokio::test]
    async fn open_reclaims_orphans_and_drops_dangling_entries() {
        let dir = tempfile::tempdir().unwrap();
        let journal_path = dir.path().join("manifest.journal");
        let store = Arc::new(FsBlobStore::open(dir.path(), false).await.unwrap());

        let dangling_id = {
            let manifest = Manifest::open(&journal_path, store.clone(), false).await.unwrap();
            manifest.store(path("/ok.txt"), "", &mut &b"ok"[..]).await.unwrap();
            let (dangling, _) = manifest.store(path("/dangling.txt"), "", &mut &b"x"[..]).await.unwrap();
            dangling.id
        };
        // A blob committed just before a crash, never journaled.
        let orphan = BlobId::new();
        store.put(&orphan, b"orphan").await.unwrap();
        // A blob lost behind the manifest's back.
        store.delete(&dangling_id).await.unwrap();

        let manifest = Manifest::open(&journal_path, store.clone(), false).await.unwrap();
        assert_eq!(manifest.len(), 1);
        assert!(manifest.lookup(&path("/dangling.txt")).is_none());
        assert_eq!(read(&manifest, "/ok.txt").await.unwrap().1, b"ok");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn entries_are_sorted() {
        let (manifest, _) = memory();
        for raw in ["/c", "/a", "/b"] {
            manifest.store(path(raw), "", &mut &b""[..]).await.unwrap();
        }
        let paths: Vec<String> = manifest.entries().into_iter().map(|e| e.path.to_string()).collect();
        assert_eq!(paths, vec!["/a", "/b", "/c"]);
    }

    #[tokio::test]
    async fn entry_records_content_digest() {
        let (manifest, _) = memory();
        let (entry, _) = manifest.store(path("/foo.txt"), "", &mut &b"hello"[..]).await.unwrap();
        assert_eq!(
            entry.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[tokio::test]
    async fn missing_blob_reads_as_absent() {
        let (manifest, store) = memory();
        let (entry, _) = manifest.store(path("/a.txt"), "", &mut &b"a"[..]).await.unwrap();
        store.delete(&entry.id).await.unwrap();

        assert!(manifest.lookup(&path("/a.txt")).is_some());
        assert!(manifest.open_blob(&path("/a.txt")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dropped_store_still_installs_committed_blob() {
        let (manifest, store) = memory();
        let key = path("/slow.txt");

        let guard = manifest.inner.locks.write(&key).await;
        let attempt = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            manifest.store(key.clone(), "", &mut &b"body"[..]),
        )
        .await;
        assert!(attempt.is_err());
        drop(guard);

        for _ in 0..100 {
            if manifest.len() == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(manifest.len(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(read(&manifest, "/slow.txt").await.unwrap().1, b"body");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn fs_readers_never_see_torn_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsBlobStore::open(dir.path(), false).await.unwrap());
        let manifest = Arc::new(
            Manifest::open(dir.path().join("manifest.journal"), store.clone(), false)
                .await
                .unwrap(),
        );
        let bodies: Vec<Vec<u8>> = (0..12u8).map(|i| vec![i; 64 * 1024]).collect();

        let mut readers = Vec::new();
        for _ in 0..4 {
            let manifest = Arc::clone(&manifest);
            readers.push(tokio::spawn(async move {
                for _ in 0..100 {
                    if let Some((entry, bytes)) = read(&manifest, "/race.bin").await {
                        assert_eq!(bytes.len() as u64, entry.size);
                        assert_eq!(bytes.len(), 64 * 1024);
                        assert!(bytes.iter().all(|b| *b == bytes[0]), "torn read");
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        let mut writers = Vec::new();
        for body in bodies.clone() {
            let manifest = Arc::clone(&manifest);
            writers.push(tokio::spawn(async move {
                manifest.store(path("/race.bin"), "", &mut body.as_slice()).await.unwrap();
            }));
        }
        for task in writers.into_iter().chain(readers) {
            task.await.unwrap();
        }

        let (_, bytes) = read(&manifest, "/race.bin").await.unwrap();
        assert!(bodies.contains(&bytes));
        assert_eq!(manifest.len(), 1);
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert_eq!(std::fs::read_dir(store.tmp_dir()).unwrap().count(), 0);
    }
}
