use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use blob_types::BlobPath;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Default number of lock stripes.
pub const DEFAULT_STRIPES: usize = 64;

/// Striped per-path reader/writer locks.
///
/// Every path hashes to one stripe. Operations on the same path always
/// contend on the same lock; operations on different paths only contend
/// when they happen to share a stripe. Memory stays bounded no matter how
/// many distinct paths are seen.
pub struct PathLocks {
    stripes: Vec<RwLock<()>>,
}

impl PathLocks {
    pub fn new(stripes: usize) -> Self {
        let count = stripes.max(1);
        Self {
            stripes: (0..count).map(|_| RwLock::new(())).collect(),
        }
    }

    /// Shared guard for reading `path`.
    pub async fn read(&self, path: &BlobPath) -> RwLockReadGuard<'_, ()> {
        self.stripe(path).read().await
    }

    /// Exclusive guard for mutating `path`.
    pub async fn write(&self, path: &BlobPath) -> RwLockWriteGuard<'_, ()> {
        self.stripe(path).write().await
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    fn stripe(&self, path: &BlobPath) -> &RwLock<()> {
        &self.stripes[self.stripe_index(path)]
    }

    fn stripe_index(&self, path: &BlobPath) -> usize {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }
}

impl Default for PathLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}
