//! Repository: one versioned workcopy
//!
//! Pairs a live [`Model`] with its [`Remote`] baseline, the log position it
//! has replayed up to and, optionally, its undo history. The model's journal
//! holds the pending local created / changed / deleted sets.

use crate::error::Result;
use crate::history::History;
use crate::pull::{Pull, PullStats};
use strata_commit::{Commit, CommitBuilder, CommitId, CommitRecords};
use strata_model::{LocalChanges, Model, RepositoryId};
use strata_state::Remote;

#[derive(Debug)]
pub struct Repository {
    id: RepositoryId,
    model: Model,
    remote: Remote,
    position: CommitId,
    history: Option<History>,
}

impl Repository {
    pub(crate) fn new(model: Model, remote: Remote, position: CommitId) -> Self {
        Self {
            id: RepositoryId::of_root(model.root()),
            model,
            remote,
            position,
            history: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> RepositoryId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    #[inline]
    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub(crate) fn into_model(mut self) -> Model {
        self.model.disable_journal();
        self.model
    }

    #[inline]
    #[must_use]
    pub fn remote(&self) -> &Remote {
        &self.remote
    }

    /// Last commit this repository has replayed
    #[inline]
    #[must_use]
    pub fn position(&self) -> CommitId {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: CommitId) {
        self.position = position;
    }

    #[inline]
    #[must_use]
    pub fn history(&self) -> Option<&History> {
        self.history.as_ref()
    }

    pub(crate) fn history_mut(&mut self) -> Option<&mut History> {
        self.history.as_mut()
    }

    /// Start recording undo history; existing history is kept
    pub fn enable_history(&mut self, max_checkpoints: usize) {
        self.history.get_or_insert_with(|| History::new(max_checkpoints));
    }

    #[must_use]
    pub fn has_local_changes(&self) -> bool {
        self.local_changes().is_some_and(|c| !c.is_empty())
    }

    #[inline]
    #[must_use]
    pub fn local_changes(&self) -> Option<&LocalChanges> {
        self.model.local_changes()
    }

    /// Build the records of the pending local changes and clear the journal
    ///
    /// Returns `None` when nothing is pending or everything cancelled out.
    ///
    /// # Errors
    /// Returns a consistency violation if the journal and the remote disagree
    pub(crate) fn take_local_records(&mut self) -> Result<Option<CommitRecords>> {
        let Some(changes) = self.model.local_changes().filter(|c| !c.is_empty()).cloned() else {
            return Ok(None);
        };
        let records = CommitBuilder::new(&self.model, &mut self.remote, &changes).build()?;
        if let Some(journal) = self.model.local_changes_mut() {
            journal.clear();
        }
        Ok(Some(records).filter(|r| !r.is_empty()))
    }

    /// Replay `commit` and move to its position
    ///
    /// # Errors
    /// Returns a consistency violation if the commit does not fit this
    /// repository's remote
    pub(crate) fn apply(&mut self, commit: &Commit) -> Result<PullStats> {
        let stats = Pull::new(self.id, &mut self.model, &mut self.remote, commit).run()?;
        if commit.id() > self.position {
            self.position = commit.id();
        }
        Ok(stats)
    }

    /// Replay a commit that is not part of the log, keeping the position
    pub(crate) fn apply_untracked(&mut self, commit: &Commit) -> Result<PullStats> {
        Pull::new(self.id, &mut self.model, &mut self.remote, commit).run()
    }

    /// Discard pending local changes, restoring the remote baseline
    ///
    /// Returns whether anything was discarded.
    ///
    /// # Errors
    /// Returns a consistency violation if the journal and the remote disagree
    pub(crate) fn revert(&mut self) -> Result<bool> {
        let Some(records) = self.take_local_records()? else {
            return Ok(false);
        };
        let forward = Commit::new(CommitId::ZERO, records).with_origin(self.id);
        let inverse = forward.inverted(CommitId::ZERO);
        let stats = self.apply_untracked(&inverse)?;
        tracing::info!(repository = %self.id, %stats, "local changes reverted");
        Ok(true)
    }
}
