//! Global commit log
//!
//! Holds every commit some repository may still need to pull, in id order,
//! plus the position each repository has replayed up to. Callers guard it
//! with one lock; ids are allocated under that lock so allocation order is
//! append order.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use strata_commit::{Commit, CommitId};
use strata_model::RepositoryId;

#[derive(Debug, Default)]
pub struct CommitLog {
    commits: VecDeque<Arc<Commit>>,
    head: Option<CommitId>,
    positions: HashMap<RepositoryId, CommitId>,
}

impl CommitLog {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the last appended commit, [`CommitId::ZERO`] before the first
    #[inline]
    #[must_use]
    pub fn head(&self) -> CommitId {
        self.head.unwrap_or(CommitId::ZERO)
    }

    /// Allocate the id of the next commit to append
    #[must_use]
    pub fn next_id(&self) -> CommitId {
        CommitId::next()
    }

    /// Append `commit`; its id must exceed the head
    pub fn append(&mut self, commit: Arc<Commit>) {
        debug_assert!(commit.id() > self.head(), "commit ids must increase");
        self.head = Some(commit.id());
        self.commits.push_back(commit);
    }

    /// Commits after `position`, oldest first
    #[must_use]
    pub fn commits_after(&self, position: CommitId) -> Vec<Arc<Commit>> {
        let start = self.commits.partition_point(|c| c.id() <= position);
        self.commits.range(start..).cloned().collect()
    }

    #[must_use]
    pub fn position(&self, repository: RepositoryId) -> Option<CommitId> {
        self.positions.get(&repository).copied()
    }

    pub fn set_position(&mut self, repository: RepositoryId, position: CommitId) {
        self.positions.insert(repository, position);
    }

    pub fn remove_position(&mut self, repository: RepositoryId) -> Option<CommitId> {
        self.positions.remove(&repository)
    }

    /// Oldest position any repository is at
    #[must_use]
    pub fn min_position(&self) -> CommitId {
        self.positions.values().copied().min().unwrap_or_else(|| self.head())
    }

    /// Drop every commit all repositories have replayed
    ///
    /// Returns the number of purged commits.
    pub fn purge(&mut self) -> usize {
        let min = self.min_position();
        let mut purged = 0;
        while self.commits.front().is_some_and(|c| c.id() <= min) {
            self.commits.pop_front();
            purged += 1;
        }
        if purged > 0 {
            tracing::debug!(purged, retained = self.commits.len(), %min, "commit log purged");
        }
        purged
    }

    /// Retained commits, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Commit>> {
        self.commits.iter()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_commit::CommitRecords;
    use strata_model::EntityId;

    fn append(log: &mut CommitLog) -> CommitId {
        let id = log.next_id();
        log.append(Arc::new(Commit::new(id, CommitRecords::new())));
        id
    }

    #[test]
    fn commits_after_position() {
        let mut log = CommitLog::new();
        let first = append(&mut log);
        let second = append(&mut log);
        let third = append(&mut log);

        let ids: Vec<_> = log.commits_after(first).iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![second, third]);
        assert!(log.commits_after(third).is_empty());
        assert_eq!(log.commits_after(CommitId::ZERO).len(), 3);
        assert_eq!(log.head(), third);
    }

    #[test]
    fn purge_keeps_commits_a_repository_still_needs() {
        let mut log = CommitLog::new();
        let behind = RepositoryId::of_root(EntityId::next());
        let ahead = RepositoryId::of_root(EntityId::next());
        let first = append(&mut log);
        let second = append(&mut log);
        log.set_position(behind, first);
        log.set_position(ahead, second);

        assert_eq!(log.purge(), 1);
        assert_eq!(log.commits_after(first).len(), 1);

        log.set_position(behind, second);
        assert_eq!(log.purge(), 1);
        assert!(log.is_empty());
        assert_eq!(log.head(), second);
    }

    #[test]
    fn removed_position_no_longer_pins_commits() {
        let mut log = CommitLog::new();
        let repo = RepositoryId::of_root(EntityId::next());
        log.set_position(repo, CommitId::ZERO);
        append(&mut log);
        assert_eq!(log.purge(), 0);
        log.remove_position(repo);
        assert_eq!(log.purge(), 1);
    }
}
