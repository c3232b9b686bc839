//! Undo / redo history
//!
//! Every local commit of a repository is folded into an ongoing accumulator.
//! [`History::create_undo_state`] closes it into a checkpoint. Checkpoints
//! before the cursor can be undone, those after it redone; recording new
//! work discards the redo side.

use std::sync::Arc;
use strata_commit::{Commit, CommitId, CommitRecords};

#[derive(Debug, Clone, Default)]
pub struct History {
    checkpoints: Vec<Arc<Commit>>,
    cursor: usize,
    ongoing: Option<CommitRecords>,
    /// 0 = unbounded
    max_checkpoints: usize,
}

impl History {
    #[must_use]
    pub fn new(max_checkpoints: usize) -> Self {
        Self {
            max_checkpoints,
            ..Self::default()
        }
    }

    /// Fold a local commit into the ongoing checkpoint
    pub fn record(&mut self, commit: &Commit) {
        self.checkpoints.truncate(self.cursor);
        self.ongoing
            .get_or_insert_with(CommitRecords::new)
            .absorb(commit);
    }

    /// Close the ongoing checkpoint
    ///
    /// Returns `false` if nothing was recorded since the last checkpoint.
    pub fn create_undo_state(&mut self) -> bool {
        let Some(records) = self.ongoing.take().filter(|r| !r.is_empty()) else {
            return false;
        };
        self.checkpoints.truncate(self.cursor);
        self.checkpoints
            .push(Arc::new(Commit::new(CommitId::ZERO, records)));
        if self.max_checkpoints > 0 && self.checkpoints.len() > self.max_checkpoints {
            let excess = self.checkpoints.len() - self.max_checkpoints;
            self.checkpoints.drain(..excess);
        }
        self.cursor = self.checkpoints.len();
        true
    }

    /// Checkpoint the next undo reverts
    #[must_use]
    pub fn peek_undo(&self) -> Option<&Arc<Commit>> {
        self.cursor.checked_sub(1).and_then(|i| self.checkpoints.get(i))
    }

    pub fn confirm_undo(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// Checkpoint the next redo re-applies
    #[must_use]
    pub fn peek_redo(&self) -> Option<&Arc<Commit>> {
        self.checkpoints.get(self.cursor)
    }

    pub fn confirm_redo(&mut self) {
        if self.cursor < self.checkpoints.len() {
            self.cursor += 1;
        }
    }

    #[inline]
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    #[inline]
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.cursor < self.checkpoints.len()
    }

    /// Work recorded since the last checkpoint
    #[must_use]
    pub fn has_ongoing(&self) -> bool {
        self.ongoing.as_ref().is_some_and(|r| !r.is_empty())
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn clear(&mut self) {
        self.checkpoints.clear();
        self.ongoing = None;
        self.cursor = 0;
    }
}
