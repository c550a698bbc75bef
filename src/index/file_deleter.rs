//! Reference counting of index files.
//!
//! Every file named by a live commit, or by the writer's current in-memory
//! segment list, holds a reference. A file is deleted as soon as its count
//! drops to zero. Deletions that fail are logged and retried at the next
//! checkpoint.

use std::sync::Arc;

use ahash::AHashMap;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::index::commit::{CommitPoint, ReaderLeases};
use crate::index::deletion_policy::{IndexDeletionPolicy, check_commit_order};
use crate::index::file_names::{self, is_index_file};
use crate::index::segment_info::SegmentInfos;
use crate::storage::Storage;

#[derive(Debug)]
pub(crate) struct IndexFileDeleter {
    storage: Arc<dyn Storage>,
    policy: Arc<dyn IndexDeletionPolicy>,
    leases: Arc<ReaderLeases>,
    ref_counts: AHashMap<String, usize>,
    commits: Vec<CommitPoint>,
    deferred: Vec<CommitPoint>,
    last_files: Vec<String>,
    deletable: Vec<String>,
}

impl IndexFileDeleter {
    /// Load every commit in `storage`, run the policy's `on_init` hook and
    /// remove files nothing refers to.
    ///
    /// `current` is the writer's segment list, which already has been
    /// committed when the writer created the index.
    pub fn new(
        storage: Arc<dyn Storage>,
        policy: Arc<dyn IndexDeletionPolicy>,
        leases: Arc<ReaderLeases>,
        current: &SegmentInfos,
    ) -> Result<Self> {
        let mut deleter = IndexFileDeleter {
            storage,
            policy,
            leases,
            ref_counts: AHashMap::new(),
            commits: Vec::new(),
            deferred: Vec::new(),
            last_files: Vec::new(),
            deletable: Vec::new(),
        };

        let files = deleter.storage.list_files()?;
        let mut generations: Vec<u64> = files
            .iter()
            .filter_map(|name| file_names::generation_from_segments_file_name(name))
            .collect();
        generations.sort_unstable();

        for generation in generations {
            let name = file_names::segments_file_name(generation);
            match SegmentInfos::read(deleter.storage.as_ref(), &name) {
                Ok(infos) => {
                    let commit = deleter.commit_point(&infos);
                    deleter.inc_ref_all(commit.file_names());
                    deleter.commits.push(commit);
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "skipping unreadable commit");
                }
            }
        }

        for name in &files {
            if is_index_file(name) {
                deleter.ref_counts.entry(name.clone()).or_insert(0);
            }
        }

        let current_files = current.files(false);
        deleter.inc_ref_all(&current_files);
        deleter.last_files = current_files;

        check_commit_order(&deleter.commits)?;
        debug!(commits = deleter.commits.len(), "deletion policy on_init");
        deleter.policy.on_init(&deleter.commits)?;
        deleter.delete_commits()?;

        let unreferenced: Vec<String> = deleter
            .ref_counts
            .iter()
            .filter(|&(_, &count)| count == 0)
            .map(|(name, _)| name.clone())
            .collect();
        for name in unreferenced {
            deleter.ref_counts.remove(&name);
            deleter.delete_file(&name);
        }
        Ok(deleter)
    }

    fn commit_point(&self, infos: &SegmentInfos) -> CommitPoint {
        CommitPoint::new(
            infos.generation,
            infos.segments_file_name(),
            infos.files(true),
            self.leases.is_leased(infos.generation),
            Arc::clone(&self.storage),
        )
    }

    /// Record the writer's new state. When `is_commit` is set, `infos` has
    /// just been written as a commit and the policy's `on_commit` hook runs.
    pub fn checkpoint(&mut self, infos: &SegmentInfos, is_commit: bool) -> Result<()> {
        self.delete_pending_files();

        if is_commit {
            let commit = self.commit_point(infos);
            self.inc_ref_all(commit.file_names());
            self.commits.push(commit);
            check_commit_order(&self.commits)?;
            debug!(generation = infos.generation, commits = self.commits.len(), "deletion policy on_commit");
            self.policy.on_commit(&self.commits)?;
            self.delete_commits()?;
        } else {
            let files = infos.files(false);
            self.inc_ref_all(&files);
            let previous = std::mem::replace(&mut self.last_files, files);
            self.dec_ref_all(&previous);
        }

        self.release_deferred();
        Ok(())
    }

    /// Remove the files of deleted commits whose reader leases were released.
    pub fn release_deferred(&mut self) {
        let (released, still_leased): (Vec<CommitPoint>, Vec<CommitPoint>) = std::mem::take(&mut self.deferred)
            .into_iter()
            .partition(|c| !self.leases.is_leased(c.generation()));
        self.deferred = still_leased;
        for commit in released {
            debug!(generation = commit.generation(), "lease released, removing commit");
            self.dec_ref_all(commit.file_names());
        }
    }

    /// Retry deletions that failed earlier.
    pub fn delete_pending_files(&mut self) {
        for name in std::mem::take(&mut self.deletable) {
            self.delete_file(&name);
        }
    }

    /// Deleted commits whose files are kept for open readers.
    pub fn deferred_generations(&self) -> Vec<u64> {
        self.deferred.iter().map(CommitPoint::generation).collect()
    }

    fn delete_commits(&mut self) -> Result<()> {
        let (deleted, live): (Vec<CommitPoint>, Vec<CommitPoint>) =
            std::mem::take(&mut self.commits).into_iter().partition(CommitPoint::is_deleted);
        self.commits = live;

        for commit in deleted {
            if self.leases.is_leased(commit.generation()) {
                info!(generation = commit.generation(), "commit still leased by a reader, deferring deletion");
                self.deferred.push(commit);
            } else {
                debug!(generation = commit.generation(), "removing commit");
                self.dec_ref_all(commit.file_names());
            }
        }
        Ok(())
    }

    fn inc_ref_all(&mut self, files: &[String]) {
        for name in files {
            *self.ref_counts.entry(name.clone()).or_insert(0) += 1;
        }
    }

    fn dec_ref_all(&mut self, files: &[String]) {
        for name in files {
            self.dec_ref(name);
        }
    }

    fn dec_ref(&mut self, name: &str) {
        let Some(count) = self.ref_counts.get_mut(name) else {
            warn!(file = name, "released a file that was never referenced");
            return;
        };
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.ref_counts.remove(name);
            self.delete_file(name);
        }
    }

    fn delete_file(&mut self, name: &str) {
        match self.storage.delete_file(name) {
            Ok(()) => debug!(file = name, "deleted index file"),
            Err(e) => {
                warn!(file = name, error = %e, "could not delete index file, will retry");
                self.deletable.push(name.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::deletion_policy::{KeepAllDeletionPolicy, KeepOnlyLastCommitDeletionPolicy};
    use crate::index::segment_info::SegmentInfo;
    use crate::storage::memory::MemoryStorage;

    fn touch(storage: &dyn Storage, name: &str) {
        storage.create_output(name).unwrap().close().unwrap();
    }

    fn commit_segment(storage: &dyn Storage, infos: &mut SegmentInfos) {
        let name = infos.new_segment_name();
        touch(storage, &format!("{name}.cfs"));
        infos.segments.push(SegmentInfo::new(name, 1, true));
        infos.commit(storage).unwrap();
    }

    #[test]
    fn test_unreferenced_files_removed_on_init() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut infos = SegmentInfos::new();
        commit_segment(storage.as_ref(), &mut infos);
        touch(storage.as_ref(), "_9.cfs");
        touch(storage.as_ref(), "notes.txt");

        IndexFileDeleter::new(
            Arc::clone(&storage),
            Arc::new(KeepAllDeletionPolicy),
            ReaderLeases::new(),
            &infos,
        )
        .unwrap();

        assert_eq!(
            storage.list_files().unwrap(),
            vec!["_0.cfs".to_string(), "notes.txt".to_string(), "segments_1".to_string()]
        );
    }

    #[test]
    fn test_keep_only_last_removes_old_segments() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut infos = SegmentInfos::new();
        commit_segment(storage.as_ref(), &mut infos);

        let mut deleter = IndexFileDeleter::new(
            Arc::clone(&storage),
            Arc::new(KeepOnlyLastCommitDeletionPolicy),
            ReaderLeases::new(),
            &infos,
        )
        .unwrap();

        // Replace segment _0 by _1 and commit.
        infos.segments.clear();
        commit_segment(storage.as_ref(), &mut infos);
        deleter.checkpoint(&infos, false).unwrap();
        deleter.checkpoint(&infos, true).unwrap();

        assert_eq!(deleter.commits.len(), 1);
        assert_eq!(deleter.commits[0].generation(), 2);
        assert_eq!(
            storage.list_files().unwrap(),
            vec!["_1.cfs".to_string(), "segments_2".to_string()]
        );
    }

    #[test]
    fn test_leased_commit_is_deferred() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let leases = ReaderLeases::new();
        let mut infos = SegmentInfos::new();
        commit_segment(storage.as_ref(), &mut infos);

        let mut deleter = IndexFileDeleter::new(
            Arc::clone(&storage),
            Arc::new(KeepOnlyLastCommitDeletionPolicy),
            Arc::clone(&leases),
            &infos,
        )
        .unwrap();

        let lease = leases.acquire(1);
        infos.segments.clear();
        commit_segment(storage.as_ref(), &mut infos);
        deleter.checkpoint(&infos, false).unwrap();
        deleter.checkpoint(&infos, true).unwrap();

        assert_eq!(deleter.deferred_generations(), vec![1]);
        assert!(storage.file_exists("segments_1"));
        assert!(storage.file_exists("_0.cfs"));

        drop(lease);
        deleter.release_deferred();
        assert!(deleter.deferred_generations().is_empty());
        assert!(!storage.file_exists("segments_1"));
        assert!(!storage.file_exists("_0.cfs"));
    }
}
