//! Retention policies for old commits.
//!
//! An [`IndexDeletionPolicy`] is told about every commit of the index: once
//! through [`on_init`](IndexDeletionPolicy::on_init) when a writer opens, and
//! through [`on_commit`](IndexDeletionPolicy::on_commit) after each new
//! commit. Both hooks receive the live commits in strictly increasing
//! generation order, the newest last, and may call
//! [`CommitPoint::delete`] on any of them.
//!
//! Deleting every commit leaves an index that cannot be opened. That is the
//! policy's responsibility; the writer does not prevent it.

use std::fmt::Debug;
use std::time::Duration;

use tracing::debug;

use crate::error::{PilumError, Result};
use crate::index::commit::CommitPoint;

/// Decides which commits to keep.
pub trait IndexDeletionPolicy: Send + Sync + Debug {
    /// Called once when a writer opens, with every existing commit.
    fn on_init(&self, commits: &[CommitPoint]) -> Result<()>;

    /// Called after each commit, with every live commit.
    fn on_commit(&self, commits: &[CommitPoint]) -> Result<()>;
}

/// Check that generations strictly increase.
pub(crate) fn check_commit_order(commits: &[CommitPoint]) -> Result<()> {
    for pair in commits.windows(2) {
        if pair[0].generation() >= pair[1].generation() {
            return Err(PilumError::commit_order(format!(
                "generation {} listed before {}",
                pair[0].generation(),
                pair[1].generation()
            )));
        }
    }
    Ok(())
}

fn delete_all_but_last(commits: &[CommitPoint], keep: usize) {
    let end = commits.len().saturating_sub(keep);
    for commit in &commits[..end] {
        commit.delete();
    }
}

/// Keeps only the newest commit. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepOnlyLastCommitDeletionPolicy;

impl IndexDeletionPolicy for KeepOnlyLastCommitDeletionPolicy {
    fn on_init(&self, commits: &[CommitPoint]) -> Result<()> {
        self.on_commit(commits)
    }

    fn on_commit(&self, commits: &[CommitPoint]) -> Result<()> {
        delete_all_but_last(commits, 1);
        Ok(())
    }
}

/// Never deletes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAllDeletionPolicy;

impl IndexDeletionPolicy for KeepAllDeletionPolicy {
    fn on_init(&self, _commits: &[CommitPoint]) -> Result<()> {
        Ok(())
    }

    fn on_commit(&self, _commits: &[CommitPoint]) -> Result<()> {
        Ok(())
    }
}

/// Keeps the newest `n` commits.
#[derive(Debug, Clone, Copy)]
pub struct KeepLastNDeletionPolicy {
    n: usize,
}

impl KeepLastNDeletionPolicy {
    /// Keep `n` commits; `n` must be at least one.
    pub fn new(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(PilumError::invalid_argument("must keep at least one commit"));
        }
        Ok(KeepLastNDeletionPolicy { n })
    }

    /// Number of commits kept.
    pub fn n(&self) -> usize {
        self.n
    }
}

impl IndexDeletionPolicy for KeepLastNDeletionPolicy {
    fn on_init(&self, commits: &[CommitPoint]) -> Result<()> {
        self.on_commit(commits)
    }

    fn on_commit(&self, commits: &[CommitPoint]) -> Result<()> {
        delete_all_but_last(commits, self.n);
        Ok(())
    }
}

/// Deletes commits that are older than the newest one by more than a fixed
/// duration, measured on the modification times of the commit files.
#[derive(Debug, Clone, Copy)]
pub struct ExpirationTimeDeletionPolicy {
    expiration: Duration,
}

impl ExpirationTimeDeletionPolicy {
    /// Expire commits older than `expiration` relative to the newest commit.
    pub fn new(expiration: Duration) -> Self {
        ExpirationTimeDeletionPolicy { expiration }
    }

    /// The configured expiration.
    pub fn expiration(&self) -> Duration {
        self.expiration
    }
}

impl IndexDeletionPolicy for ExpirationTimeDeletionPolicy {
    fn on_init(&self, commits: &[CommitPoint]) -> Result<()> {
        self.on_commit(commits)
    }

    fn on_commit(&self, commits: &[CommitPoint]) -> Result<()> {
        let Some((last, older)) = commits.split_last() else {
            return Ok(());
        };
        let newest = last.modified()?;
        let expiration = i64::try_from(self.expiration.as_millis()).unwrap_or(i64::MAX);
        for commit in older {
            let modified = commit.modified()?;
            if newest.saturating_sub(modified) > expiration {
                debug!(generation = commit.generation(), age_ms = newest - modified, "expiring commit");
                commit.delete();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;
    use std::sync::Arc;

    fn commits(storage: &Arc<dyn Storage>, generations: &[u64]) -> Vec<CommitPoint> {
        generations
            .iter()
            .map(|&g| {
                let name = format!("segments_{g}");
                CommitPoint::new(g, name.clone(), vec![name], false, Arc::clone(storage))
            })
            .collect()
    }

    fn deleted(commits: &[CommitPoint]) -> Vec<u64> {
        commits
            .iter()
            .filter(|c| c.is_deleted())
            .map(|c| c.generation())
            .collect()
    }

    #[test]
    fn test_keep_only_last() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let list = commits(&storage, &[1, 2, 3]);
        KeepOnlyLastCommitDeletionPolicy.on_commit(&list).unwrap();
        assert_eq!(deleted(&list), vec![1, 2]);
    }

    #[test]
    fn test_keep_last_n() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let list = commits(&storage, &[1, 2, 3, 4]);
        KeepLastNDeletionPolicy::new(3).unwrap().on_init(&list).unwrap();
        assert_eq!(deleted(&list), vec![1]);

        let list = commits(&storage, &[7]);
        KeepLastNDeletionPolicy::new(3).unwrap().on_commit(&list).unwrap();
        assert!(deleted(&list).is_empty());

        assert!(KeepLastNDeletionPolicy::new(0).is_err());
    }

    #[test]
    fn test_keep_all() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let list = commits(&storage, &[1, 2]);
        KeepAllDeletionPolicy.on_commit(&list).unwrap();
        assert!(deleted(&list).is_empty());
    }

    #[test]
    fn test_expiration_time() {
        let memory = Arc::new(MemoryStorage::new_default());
        for g in 1..=3 {
            let mut out = memory.create_output(&format!("segments_{g}")).unwrap();
            out.close().unwrap();
        }
        memory.set_modified("segments_1", 1_000).unwrap();
        memory.set_modified("segments_2", 9_500).unwrap();
        memory.set_modified("segments_3", 10_000).unwrap();

        let storage: Arc<dyn Storage> = memory;
        let list = commits(&storage, &[1, 2, 3]);
        ExpirationTimeDeletionPolicy::new(Duration::from_secs(1))
            .on_commit(&list)
            .unwrap();
        assert_eq!(deleted(&list), vec![1]);
    }

    #[test]
    fn test_commit_order_check() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        assert!(check_commit_order(&commits(&storage, &[1, 2, 5])).is_ok());
        let err = check_commit_order(&commits(&storage, &[1, 3, 3])).unwrap_err();
        assert!(matches!(err, PilumError::CommitOrder(_)));
    }
}
