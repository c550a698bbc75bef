//! Commit points and reader leases.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::error::Result;
use crate::storage::Storage;

/// One commit of the index, as presented to an
/// [`IndexDeletionPolicy`](crate::index::deletion_policy::IndexDeletionPolicy).
///
/// Calling [`delete`](Self::delete) only marks the commit. Its files are
/// removed after the policy returns, unless a reader lease still holds the
/// generation, in which case removal waits until the lease is released.
pub struct CommitPoint {
    generation: u64,
    segments_file_name: String,
    file_names: Vec<String>,
    referenced: bool,
    deleted: AtomicBool,
    storage: Arc<dyn Storage>,
}

impl CommitPoint {
    pub(crate) fn new(
        generation: u64,
        segments_file_name: String,
        file_names: Vec<String>,
        referenced: bool,
        storage: Arc<dyn Storage>,
    ) -> Self {
        CommitPoint {
            generation,
            segments_file_name,
            file_names,
            referenced,
            deleted: AtomicBool::new(false),
            storage,
        }
    }

    /// Generation, taken from the `segments_N` suffix.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Name of the commit file.
    pub fn segments_file_name(&self) -> &str {
        &self.segments_file_name
    }

    /// Every file the commit references, the commit file included.
    pub fn file_names(&self) -> &[String] {
        &self.file_names
    }

    /// Whether an open reader held this commit when the list was built.
    pub fn is_referenced(&self) -> bool {
        self.referenced
    }

    /// Modification time of the commit file, in milliseconds since the epoch.
    pub fn modified(&self) -> Result<i64> {
        Ok(self.storage.metadata(&self.segments_file_name)?.modified)
    }

    /// Mark this commit for deletion.
    pub fn delete(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    /// Whether [`delete`](Self::delete) was called.
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CommitPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitPoint")
            .field("generation", &self.generation)
            .field("segments_file_name", &self.segments_file_name)
            .field("files", &self.file_names.len())
            .field("referenced", &self.referenced)
            .field("deleted", &self.is_deleted())
            .finish()
    }
}

/// Reference counts of commit generations held open by readers.
///
/// A writer consults its leases before removing the files of a deleted
/// commit; a reader opened with
/// [`DirectoryReader::open_leased`](crate::index::DirectoryReader::open_leased)
/// holds a [`ReaderLease`] until it is dropped.
#[derive(Debug, Default)]
pub struct ReaderLeases {
    counts: Mutex<AHashMap<u64, usize>>,
}

impl ReaderLeases {
    /// An empty lease table.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hold `generation` until the returned lease is dropped.
    pub fn acquire(self: &Arc<Self>, generation: u64) -> ReaderLease {
        *self.counts.lock().entry(generation).or_insert(0) += 1;
        ReaderLease {
            leases: Arc::clone(self),
            generation,
        }
    }

    /// Whether any lease holds `generation`.
    pub fn is_leased(&self, generation: u64) -> bool {
        self.counts.lock().get(&generation).is_some_and(|&n| n > 0)
    }

    /// Number of leases on `generation`.
    pub fn count(&self, generation: u64) -> usize {
        self.counts.lock().get(&generation).copied().unwrap_or(0)
    }

    fn release(&self, generation: u64) {
        let mut counts = self.counts.lock();
        if let Some(n) = counts.get_mut(&generation) {
            *n -= 1;
            if *n == 0 {
                counts.remove(&generation);
            }
        }
    }
}

/// A held generation. Dropping it releases the hold.
#[derive(Debug)]
pub struct ReaderLease {
    leases: Arc<ReaderLeases>,
    generation: u64,
}

impl ReaderLease {
    /// The generation held.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for ReaderLease {
    fn drop(&mut self) {
        self.leases.release(self.generation);
    }
}
