//! Transaction manager
//!
//! Owns every repository and the global commit log. It is an explicit
//! context object: independent managers share nothing.
//!
//! # Locking
//!
//! Each repository sits behind its own `parking_lot::Mutex`, the log behind
//! another. Operations always take the repository lock first, then the log
//! lock. Commits, undo and redo hold the log lock from catching up until the
//! new commit is appended, so every published commit is based on the head.

use crate::config::TransactionConfig;
use crate::error::{Result, UsageError};
use crate::log::CommitLog;
use crate::pull::PullStats;
use crate::repository::Repository;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use strata_commit::{Commit, CommitId, CommitRecords};
use strata_model::{Model, RepositoryId};
use strata_state::Remote;

/// Coordinator of versioned workcopies
#[derive(Debug, Default)]
pub struct TransactionManager {
    config: TransactionConfig,
    repositories: DashMap<RepositoryId, Arc<Mutex<Repository>>>,
    log: Mutex<CommitLog>,
    initial: Mutex<Option<RepositoryId>>,
}

impl TransactionManager {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: TransactionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Repositories
    // ------------------------------------------------------------------

    /// Version `model` as the initial repository
    ///
    /// Every existing entity becomes part of the baseline; the model journals
    /// local changes from now on. Further workcopies come from
    /// [`TransactionManager::clone_repository`].
    ///
    /// # Errors
    /// Returns a usage error if an initial repository already exists
    #[tracing::instrument(skip(self, model), fields(root = %model.root()))]
    pub fn enable_transactions(&self, mut model: Model) -> Result<RepositoryId> {
        let id = RepositoryId::of_root(model.root());
        if self.repositories.contains_key(&id) {
            return Err(UsageError::AlreadyEnabled(id).into());
        }
        let mut initial = self.initial.lock();
        if let Some(existing) = *initial {
            return Err(UsageError::InitialRootExists(existing).into());
        }

        let mut remote = Remote::new();
        for entity in model.walk(model.root()).map_err(UsageError::from)? {
            remote.create_object_state(&model, entity)?;
        }
        if let Some(journal) = model.local_changes_mut() {
            journal.clear();
        }
        model.enable_journal();

        let tracked = remote.len();
        let position = {
            let mut log = self.log.lock();
            let head = log.head();
            log.set_position(id, head);
            head
        };
        let mut repository = Repository::new(model, remote, position);
        if self.config.history_enabled {
            repository.enable_history(self.config.max_checkpoints);
        }
        self.repositories.insert(id, Arc::new(Mutex::new(repository)));
        *initial = Some(id);
        tracing::info!(repository = %id, tracked, "transactions enabled");
        Ok(id)
    }

    /// Stop versioning a repository and hand its model back
    ///
    /// Pending local changes are dropped with the journal.
    ///
    /// # Errors
    /// Returns a usage error if the repository is unknown or still borrowed
    #[tracing::instrument(skip(self))]
    pub fn disable_transactions(&self, id: RepositoryId) -> Result<Model> {
        let (_, handle) = self
            .repositories
            .remove(&id)
            .ok_or(UsageError::TransactionsNotEnabled(id))?;
        let repository = match Arc::try_unwrap(handle) {
            Ok(mutex) => mutex.into_inner(),
            Err(handle) => {
                self.repositories.insert(id, handle);
                return Err(UsageError::RepositoryBusy(id).into());
            }
        };
        {
            let mut log = self.log.lock();
            log.remove_position(id);
            self.collect_garbage(&mut log);
        }
        let mut initial = self.initial.lock();
        if *initial == Some(id) {
            *initial = None;
        }
        tracing::info!(repository = %id, "transactions disabled");
        Ok(repository.into_model())
    }

    /// Shared handle to a repository
    ///
    /// # Errors
    /// Returns [`UsageError::TransactionsNotEnabled`] for unknown ids
    pub fn repository(&self, id: RepositoryId) -> Result<Arc<Mutex<Repository>>> {
        self.repositories
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| UsageError::TransactionsNotEnabled(id).into())
    }

    /// Ids of every versioned repository
    #[must_use]
    pub fn repositories(&self) -> Vec<RepositoryId> {
        self.repositories.iter().map(|entry| *entry.key()).collect()
    }

    #[must_use]
    pub fn initial_repository(&self) -> Option<RepositoryId> {
        *self.initial.lock()
    }

    /// Read a repository's model under its lock
    ///
    /// # Errors
    /// Returns [`UsageError::TransactionsNotEnabled`] for unknown ids
    pub fn with_model<R>(&self, id: RepositoryId, f: impl FnOnce(&Model) -> R) -> Result<R> {
        let handle = self.repository(id)?;
        let repository = handle.lock();
        Ok(f(repository.model()))
    }

    /// Mutate a repository's model under its lock; changes are journaled
    ///
    /// # Errors
    /// Returns [`UsageError::TransactionsNotEnabled`] for unknown ids
    pub fn with_model_mut<R>(&self, id: RepositoryId, f: impl FnOnce(&mut Model) -> R) -> Result<R> {
        let handle = self.repository(id)?;
        let mut repository = handle.lock();
        Ok(f(repository.model_mut()))
    }

    /// # Errors
    /// Returns [`UsageError::TransactionsNotEnabled`] for unknown ids
    pub fn has_local_changes(&self, id: RepositoryId) -> Result<bool> {
        let handle = self.repository(id)?;
        let repository = handle.lock();
        Ok(repository.has_local_changes())
    }

    // ------------------------------------------------------------------
    // Synchronization
    // ------------------------------------------------------------------

    /// Publish a repository's pending local changes
    ///
    /// Missing commits are pulled first. Returns `None` if nothing was
    /// pending.
    ///
    /// # Errors
    /// Usage error for unknown ids; consistency violation if the repository
    /// and the log disagree
    #[tracing::instrument(skip(self))]
    pub fn commit(&self, id: RepositoryId) -> Result<Option<Arc<Commit>>> {
        let handle = self.repository(id)?;
        let mut repository = handle.lock();
        self.commit_locked(&mut repository)
    }

    fn commit_locked(&self, repository: &mut Repository) -> Result<Option<Arc<Commit>>> {
        let mut log = self.log.lock();
        self.catch_up(repository, &mut log)?;
        let Some(records) = repository.take_local_records()? else {
            return Ok(None);
        };
        let commit = Arc::new(Commit::new(log.next_id(), records).with_origin(repository.id()));
        self.publish(repository, &mut log, &commit);
        if let Some(history) = repository.history_mut() {
            history.record(&commit);
        }
        tracing::info!(
            repository = %repository.id(),
            commit = %commit.id(),
            creations = commit.stats().creations,
            changes = commit.stats().changes,
            deletions = commit.stats().deletions,
            "committed"
        );
        Ok(Some(commit))
    }

    /// Replay every commit the repository has not seen yet
    ///
    /// # Errors
    /// Usage error for unknown ids; consistency violation if a commit does
    /// not fit the repository
    #[tracing::instrument(skip(self))]
    pub fn pull(&self, id: RepositoryId) -> Result<PullStats> {
        let handle = self.repository(id)?;
        let mut repository = handle.lock();
        let pending = self.log.lock().commits_after(repository.position());

        let mut stats = PullStats::default();
        for commit in &pending {
            stats.add(repository.apply(commit)?);
        }
        {
            let mut log = self.log.lock();
            log.set_position(id, repository.position());
            self.collect_garbage(&mut log);
        }
        tracing::info!(
            repository = %id,
            commits = pending.len(),
            position = %repository.position(),
            %stats,
            "pulled"
        );
        Ok(stats)
    }

    /// Create an independent workcopy of `source`
    ///
    /// Pending changes of the source are committed first. The clone starts
    /// at the source's position with no pending changes.
    ///
    /// # Errors
    /// Usage error for unknown ids; consistency violation if the source
    /// cannot be snapshotted or the initialization commit does not apply
    #[tracing::instrument(skip(self))]
    pub fn clone_repository(&self, source: RepositoryId) -> Result<RepositoryId> {
        let handle = self.repository(source)?;
        let mut repository = handle.lock();
        self.commit_locked(&mut repository)?;

        let model = repository.model();
        let remote = repository.remote();
        let root = model.root();
        let root_state = remote
            .state_of(root)
            .cloned()
            .ok_or(strata_state::StateError::UnknownEntity(root))?;

        let mut records = CommitRecords::new();
        for entity in model.walk(root).map_err(UsageError::from)?.into_iter().skip(1) {
            let state = remote
                .state_of(entity)
                .cloned()
                .ok_or(strata_state::StateError::UnknownEntity(entity))?;
            records.insert_creation(state);
        }
        // Identity change so the root's references go through the link pass
        records.insert_change(root_state.clone(), root_state.clone());
        let init = Commit::new(CommitId::ZERO, records).with_origin(source);

        let root_type = model.type_name(root).map_err(UsageError::from)?;
        let mut copy = Model::new(Arc::clone(model.registry()), root_type)
            .map_err(UsageError::from)?
            .with_sink(Arc::clone(model.sink()));
        for (slot, value) in root_state.content().iter().enumerate() {
            copy.set_content_slot(copy.root(), slot, value.clone())
                .map_err(UsageError::from)?;
        }
        let mut copy_remote = Remote::new();
        copy_remote.insert(copy.root(), root_state)?;

        let position = repository.position();
        let mut clone = Repository::new(copy, copy_remote, position);
        let stats = clone.apply_untracked(&init)?;
        clone.model_mut().enable_journal();
        if self.config.history_enabled {
            clone.enable_history(self.config.max_checkpoints);
        }

        let id = clone.id();
        self.log.lock().set_position(id, position);
        self.repositories.insert(id, Arc::new(Mutex::new(clone)));
        tracing::info!(%source, clone = %id, created = stats.created, %position, "repository cloned");
        Ok(id)
    }

    /// Discard a repository's pending local changes
    ///
    /// Returns whether anything was discarded.
    ///
    /// # Errors
    /// Usage error for unknown ids; consistency violation if the journal and
    /// the remote disagree
    #[tracing::instrument(skip(self))]
    pub fn revert(&self, id: RepositoryId) -> Result<bool> {
        let handle = self.repository(id)?;
        let mut repository = handle.lock();
        repository.revert()
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Start recording undo history for one repository
    ///
    /// # Errors
    /// Returns [`UsageError::TransactionsNotEnabled`] for unknown ids
    pub fn enable_history(&self, id: RepositoryId) -> Result<()> {
        let handle = self.repository(id)?;
        handle.lock().enable_history(self.config.max_checkpoints);
        Ok(())
    }

    /// Commit pending work and close the ongoing checkpoint
    ///
    /// Returns whether a checkpoint was created.
    ///
    /// # Errors
    /// Usage error without history; consistency violation from the commit
    #[tracing::instrument(skip(self))]
    pub fn create_undo_state(&self, id: RepositoryId) -> Result<bool> {
        let handle = self.repository(id)?;
        let mut repository = handle.lock();
        Self::require_history(&repository)?;
        self.commit_locked(&mut repository)?;
        Ok(repository
            .history_mut()
            .is_some_and(|history| history.create_undo_state()))
    }

    /// # Errors
    /// Usage error for unknown ids or without history
    pub fn can_undo(&self, id: RepositoryId) -> Result<bool> {
        let handle = self.repository(id)?;
        let repository = handle.lock();
        let history = Self::require_history(&repository)?;
        Ok(history.can_undo() || history.has_ongoing() || repository.has_local_changes())
    }

    /// # Errors
    /// Usage error for unknown ids or without history
    pub fn can_redo(&self, id: RepositoryId) -> Result<bool> {
        let handle = self.repository(id)?;
        let repository = handle.lock();
        Ok(Self::require_history(&repository)?.can_redo() && !repository.has_local_changes())
    }

    /// Revert the latest checkpoint
    ///
    /// Pending work is committed and checkpointed first. The inverted
    /// checkpoint is published to the log so other workcopies follow.
    /// Returns `None` if there is nothing to undo.
    ///
    /// # Errors
    /// Usage error without history; consistency violation if the inverse
    /// does not fit the repository
    #[tracing::instrument(skip(self))]
    pub fn undo(&self, id: RepositoryId) -> Result<Option<Arc<Commit>>> {
        let handle = self.repository(id)?;
        let mut repository = handle.lock();
        Self::require_history(&repository)?;
        self.commit_locked(&mut repository)?;
        let Some(history) = repository.history_mut() else {
            return Ok(None);
        };
        history.create_undo_state();
        let Some(checkpoint) = history.peek_undo().cloned() else {
            return Ok(None);
        };

        let mut log = self.log.lock();
        self.catch_up(&mut repository, &mut log)?;
        let commit = Arc::new(checkpoint.inverted(log.next_id()).with_origin(id));
        repository.apply(&commit)?;
        self.publish(&mut repository, &mut log, &commit);
        if let Some(history) = repository.history_mut() {
            history.confirm_undo();
        }
        tracing::info!(repository = %id, commit = %commit.id(), stats = %commit.stats(), "undone");
        Ok(Some(commit))
    }

    /// Re-apply the checkpoint undone last
    ///
    /// Pending work is committed first, which discards the redo side.
    /// Returns `None` if there is nothing to redo.
    ///
    /// # Errors
    /// Usage error without history; consistency violation if the checkpoint
    /// does not fit the repository
    #[tracing::instrument(skip(self))]
    pub fn redo(&self, id: RepositoryId) -> Result<Option<Arc<Commit>>> {
        let handle = self.repository(id)?;
        let mut repository = handle.lock();
        Self::require_history(&repository)?;
        self.commit_locked(&mut repository)?;
        let Some(checkpoint) = repository.history().and_then(|h| h.peek_redo()).cloned() else {
            return Ok(None);
        };

        let mut log = self.log.lock();
        self.catch_up(&mut repository, &mut log)?;
        let commit = Arc::new(checkpoint.with_id(log.next_id()).with_origin(id));
        repository.apply(&commit)?;
        self.publish(&mut repository, &mut log, &commit);
        if let Some(history) = repository.history_mut() {
            history.confirm_redo();
        }
        tracing::info!(repository = %id, commit = %commit.id(), stats = %commit.stats(), "redone");
        Ok(Some(commit))
    }

    fn require_history(repository: &Repository) -> Result<&crate::history::History> {
        repository
            .history()
            .ok_or_else(|| UsageError::HistoryNotEnabled(repository.id()).into())
    }

    // ------------------------------------------------------------------
    // Log
    // ------------------------------------------------------------------

    /// Id of the newest commit in the log
    #[must_use]
    pub fn head(&self) -> CommitId {
        self.log.lock().head()
    }

    /// Commits still retained by the log
    #[must_use]
    pub fn log_len(&self) -> usize {
        self.log.lock().len()
    }

    /// Retained commits, oldest first
    #[must_use]
    pub fn log_snapshot(&self) -> Vec<Arc<Commit>> {
        self.log.lock().iter().cloned().collect()
    }

    /// Position of a repository as recorded in the log
    #[must_use]
    pub fn position(&self, id: RepositoryId) -> Option<CommitId> {
        self.log.lock().position(id)
    }

    fn catch_up(&self, repository: &mut Repository, log: &mut CommitLog) -> Result<PullStats> {
        let mut stats = PullStats::default();
        for commit in log.commits_after(repository.position()) {
            stats.add(repository.apply(&commit)?);
        }
        log.set_position(repository.id(), repository.position());
        Ok(stats)
    }

    fn publish(&self, repository: &mut Repository, log: &mut CommitLog, commit: &Arc<Commit>) {
        log.append(Arc::clone(commit));
        repository.set_position(commit.id());
        log.set_position(repository.id(), commit.id());
        self.collect_garbage(log);
    }

    fn collect_garbage(&self, log: &mut CommitLog) {
        if self.config.garbage_collect {
            log.purge();
        }
    }
}
