//! Applying one commit to a repository
//!
//! A pull runs in two stages. [`Pull::preflight`] resolves every record
//! against the target remote without touching anything. The apply stage
//! then runs deletions, creations (materialized depth-first along their
//! parameters), changes, and finally links every queued cross-reference
//! once all states of the commit are in place.
//!
//! A deletion removes everything the live entity takes with it. Tracked
//! entities removed that way without a record of their own (an undone
//! creation whose subtree grew elsewhere) stop being tracked too, and
//! baselines referring to them are untied.
//!
//! Pending local work in the target is kept where possible:
//! - a remote deletion wins and forgets the removed subtree from the journal
//! - a remote change to a locally changed or deleted entity only moves the
//!   remote baseline
//! - a remote creation under a locally deleted owner is tracked against an
//!   entity that never materializes and is journaled as deleted
//! - a remote list creation whose ordinal is taken by an uncommitted local
//!   member moves that member to the end of the list

use crate::error::{ConsistencyViolation, Result, TransactionError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use strata_commit::{Commit, CommitId};
use strata_model::{
    EntityId, EntityKind, EntityStatus, Model, ModelError, Param, RepositoryId, Tombstone,
};
use strata_state::{ObjectId, ObjectState, Remote, StateParam, StateRef};

/// What a pull did to its target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullStats {
    pub deleted: usize,
    pub created: usize,
    pub changed: usize,
    pub linked: usize,
    /// Records resolved in favour of pending local work
    pub conflicts: usize,
}

impl PullStats {
    pub(crate) fn add(&mut self, other: Self) {
        self.deleted += other.deleted;
        self.created += other.created;
        self.changed += other.changed;
        self.linked += other.linked;
        self.conflicts += other.conflicts;
    }
}

impl Display for PullStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "-{} +{} ~{} links {} conflicts {}",
            self.deleted, self.created, self.changed, self.linked, self.conflicts
        )
    }
}

/// Cross-reference to set once the whole commit is applied
#[derive(Debug, Clone, Copy)]
struct PendingLink {
    entity: EntityId,
    object: ObjectId,
    slot: usize,
    target: Option<ObjectId>,
}

/// One commit being replayed into one repository
pub(crate) struct Pull<'r> {
    repository: RepositoryId,
    model: &'r mut Model,
    remote: &'r mut Remote,
    commit: &'r Commit,
    /// Tracked objects the deletions remove, cascades included
    doomed: HashSet<ObjectId>,
    links: Vec<PendingLink>,
    /// Referrers of removed entities whose baselines may dangle
    stale: Vec<EntityId>,
    /// Referrers whose target was removed locally; journaled after replay
    untied: Vec<EntityId>,
    stats: PullStats,
}

impl<'r> Pull<'r> {
    pub(crate) fn new(
        repository: RepositoryId,
        model: &'r mut Model,
        remote: &'r mut Remote,
        commit: &'r Commit,
    ) -> Self {
        let doomed = doomed_objects(model, remote, commit);
        Self {
            repository,
            model,
            remote,
            commit,
            doomed,
            links: Vec::new(),
            stale: Vec::new(),
            untied: Vec::new(),
            stats: PullStats::default(),
        }
    }

    fn id(&self) -> CommitId {
        self.commit.id()
    }

    /// Whether `object` is tracked before the commit and survives it
    fn survives(&self, object: ObjectId) -> bool {
        self.remote.contains(object) && !self.doomed.contains(&object)
    }

    /// Whether `object` resolves once the commit is applied
    fn resolves_after(&self, object: ObjectId) -> bool {
        self.survives(object) || self.commit.creation(object).is_some()
    }

    fn violation(&self, violation: ConsistencyViolation) -> TransactionError {
        tracing::error!(
            repository = %self.repository,
            commit = %self.id(),
            %violation,
            "pull rejected"
        );
        TransactionError::Consistency(violation)
    }

    /// Check every record against the target without mutating it
    ///
    /// # Errors
    /// Returns the first [`ConsistencyViolation`] found
    pub(crate) fn preflight(&self) -> Result<()> {
        let commit = self.id();
        for state in self.commit.deletions() {
            if !self.remote.contains(state.id()) {
                return Err(self.violation(ConsistencyViolation::MissingState {
                    repository: self.repository,
                    commit,
                    object: state.id(),
                }));
            }
            if state.owner().is_none() {
                return Err(self.violation(ConsistencyViolation::RootRecord {
                    commit,
                    object: state.id(),
                }));
            }
        }

        for (before, after) in self.commit.changes() {
            if !self.survives(before.id()) {
                return Err(self.violation(ConsistencyViolation::MissingState {
                    repository: self.repository,
                    commit,
                    object: before.id(),
                }));
            }
            if let Some(entity) = self.remote.entity(before.id()) {
                if !self.model.contains(entity) && self.status(entity) != EntityStatus::Deleted {
                    return Err(self.violation(ConsistencyViolation::MissingEntity {
                        commit,
                        object: before.id(),
                        entity,
                    }));
                }
            }
            self.check_references(after)?;
        }

        for state in self.commit.creations() {
            if self.survives(state.id()) {
                return Err(self.violation(ConsistencyViolation::DuplicateObject {
                    commit,
                    object: state.id(),
                }));
            }
            if state.owner().is_none() {
                return Err(self.violation(ConsistencyViolation::RootRecord {
                    commit,
                    object: state.id(),
                }));
            }
            for parameter in state.params().iter().filter_map(StateParam::object) {
                if !self.resolves_after(parameter) {
                    return Err(self.violation(ConsistencyViolation::UnresolvedParameter {
                        commit,
                        object: state.id(),
                        parameter,
                    }));
                }
            }
            self.check_references(state)?;
        }
        Ok(())
    }

    fn check_references(&self, state: &ObjectState) -> Result<()> {
        for target in state.references().iter().flatten() {
            if !self.resolves_after(*target) {
                return Err(self.violation(ConsistencyViolation::UnresolvedReference {
                    commit: self.id(),
                    object: state.id(),
                    target: *target,
                }));
            }
        }
        Ok(())
    }

    /// Preflight, then apply
    ///
    /// # Errors
    /// A preflight failure leaves the target untouched. A failure after
    /// preflight leaves it partially updated.
    pub(crate) fn run(mut self) -> Result<PullStats> {
        self.preflight()?;
        self.model.set_replaying(true);
        let applied = self.apply();
        self.model.set_replaying(false);
        applied?;

        for referrer in std::mem::take(&mut self.untied) {
            if let Some(journal) = self.model.local_changes_mut() {
                journal.record_changed(referrer);
            }
        }
        tracing::debug!(
            repository = %self.repository,
            commit = %self.id(),
            stats = %self.stats,
            "commit applied"
        );
        Ok(self.stats)
    }

    fn apply(&mut self) -> Result<()> {
        let commit = self.commit;
        for state in commit.deletions() {
            self.delete(state)?;
        }
        for state in commit.creations() {
            self.materialize(state.id())?;
        }
        for (before, after) in commit.changes() {
            self.change(before, after)?;
        }
        self.link()?;
        self.refresh_baselines();
        Ok(())
    }

    fn status(&self, entity: EntityId) -> EntityStatus {
        self.model
            .local_changes()
            .map_or(EntityStatus::Unknown, |journal| journal.status(entity))
    }

    fn model_error(&self, err: ModelError) -> TransactionError {
        self.violation(ConsistencyViolation::Model(err))
    }

    fn delete(&mut self, state: &StateRef) -> Result<()> {
        let Some((entity, _)) = self.remote.remove(state.id()) else {
            return Ok(());
        };
        if self.model.contains(entity) {
            let owner = self.model.owner(entity).map_err(|e| self.model_error(e))?;
            let scope = self.model.removal_scope(entity).map_err(|e| self.model_error(e))?;
            for member in &scope {
                self.stale.extend(self.model.referrers(*member));
            }
            self.model.remove(entity).map_err(|e| self.model_error(e))?;
            for member in scope.into_iter().skip(1) {
                self.drop_cascaded(member);
            }
            if let Some(owner) = owner.filter(|o| self.model.contains(*o)) {
                self.model.notify_changed(owner);
            }
        } else if let Some(journal) = self.model.local_changes_mut() {
            // Removed earlier in this pull, or pending local deletion
            if journal.forget(entity) == EntityStatus::Deleted {
                tracing::warn!(
                    repository = %self.repository,
                    %entity,
                    "remote deletion supersedes pending local deletion"
                );
            }
        }
        tracing::debug!(object = %state.id(), %entity, "deletion applied");
        self.stats.deleted += 1;
        Ok(())
    }

    /// Stop tracking an entity removed with its owner or key entity
    ///
    /// Entities with their own deletion record are left to that record.
    fn drop_cascaded(&mut self, entity: EntityId) {
        let Some(object) = self.remote.key(entity) else { return };
        if self.commit.deletion(object).is_some() {
            return;
        }
        self.remote.remove(object);
        tracing::debug!(%object, %entity, "deletion cascaded");
        self.stats.deleted += 1;
    }

    /// Untie baselines still pointing at objects this pull stopped tracking
    fn refresh_baselines(&mut self) {
        for referrer in std::mem::take(&mut self.stale) {
            let Some(state) = self.remote.untie_dangling(referrer) else { continue };
            tracing::debug!(object = %state.id(), entity = %referrer, "baseline untied");
            if self.model.contains(referrer) {
                self.model.notify_changed(referrer);
            }
        }
    }

    /// Live entity for `object`, creating it first if the commit does
    fn materialize(&mut self, object: ObjectId) -> Result<EntityId> {
        if let Some(entity) = self.remote.entity(object) {
            return Ok(entity);
        }
        let commit = self.id();
        let state = self.commit.creation(object).cloned().ok_or_else(|| {
            self.violation(ConsistencyViolation::UnresolvedParameter {
                commit,
                object,
                parameter: object,
            })
        })?;

        let mut params = Vec::with_capacity(state.params().len());
        for param in state.params() {
            params.push(match param {
                StateParam::Object(p) => Param::Entity(self.materialize(*p)?),
                StateParam::Value(v) => Param::Value(v.clone()),
            });
        }

        let detached = params
            .iter()
            .filter_map(Param::entity)
            .any(|e| !self.model.contains(e));
        if detached {
            return self.track_ghost(state, params);
        }

        let entity = self.construct(&state, params)?;
        self.remote.insert(entity, state.clone())?;
        self.imprint(entity, &state)?;
        self.model.notify_changed(entity);
        if let Ok(Some(owner)) = self.model.owner(entity) {
            self.model.notify_changed(owner);
        }
        tracing::debug!(object = %object, %entity, "creation applied");
        self.stats.created += 1;
        Ok(entity)
    }

    /// Creation under a locally removed owner: tracked, never built
    fn track_ghost(&mut self, state: StateRef, params: Vec<Param>) -> Result<EntityId> {
        let ghost = EntityId::next();
        self.remote.insert(ghost, state.clone())?;
        if let Some(journal) = self.model.local_changes_mut() {
            journal.record_deleted(
                ghost,
                Tombstone {
                    type_name: state.type_name().to_string(),
                    params,
                },
            );
        }
        tracing::warn!(
            repository = %self.repository,
            object = %state.id(),
            "remote creation under locally deleted owner will be deleted on next commit"
        );
        self.stats.conflicts += 1;
        Ok(ghost)
    }

    fn construct(&mut self, state: &ObjectState, params: Vec<Param>) -> Result<EntityId> {
        match self.model.construct(state.type_name(), params.clone()) {
            Err(ModelError::DuplicateKey { owner, field, key }) => {
                let occupant = self
                    .model
                    .child(owner, &field, &key)
                    .map_err(|e| self.model_error(e))?
                    .filter(|o| self.status(*o) == EntityStatus::Created)
                    .ok_or_else(|| self.model_error(ModelError::DuplicateKey { owner, field, key }))?;
                self.make_room(occupant, state.type_name(), owner)?;
                self.model
                    .construct(state.type_name(), params)
                    .map_err(|e| self.model_error(e))
            }
            other => other.map_err(|e| self.model_error(e)),
        }
    }

    /// Clear a key taken by an uncommitted local child
    fn make_room(&mut self, occupant: EntityId, type_name: &str, owner: EntityId) -> Result<()> {
        let kind = self.model.kind(occupant).map_err(|e| self.model_error(e))?;
        self.stats.conflicts += 1;
        if kind == EntityKind::IndexedChild {
            let ordinal = self
                .model
                .next_ordinal(owner, type_name)
                .map_err(|e| self.model_error(e))?;
            self.model
                .reassign_ordinal(occupant, ordinal)
                .map_err(|e| self.model_error(e))?;
            tracing::warn!(
                repository = %self.repository,
                entity = %occupant,
                ordinal,
                "uncommitted list member moved to make room for remote creation"
            );
        } else {
            self.model.remove(occupant).map_err(|e| self.model_error(e))?;
            tracing::warn!(
                repository = %self.repository,
                entity = %occupant,
                "uncommitted keyed child replaced by remote creation"
            );
        }
        Ok(())
    }

    fn change(&mut self, before: &StateRef, after: &StateRef) -> Result<()> {
        let entity = self.remote.entity(before.id()).ok_or_else(|| {
            self.violation(ConsistencyViolation::MissingState {
                repository: self.repository,
                commit: self.commit.id(),
                object: before.id(),
            })
        })?;
        self.remote.replace(after.clone())?;

        let status = self.status(entity);
        if !self.model.contains(entity) || matches!(status, EntityStatus::Changed | EntityStatus::Deleted) {
            tracing::warn!(
                repository = %self.repository,
                %entity,
                ?status,
                "remote change kept as baseline, pending local change wins"
            );
            self.stats.conflicts += 1;
            return Ok(());
        }

        self.imprint(entity, after)?;
        self.model.notify_changed(entity);
        tracing::debug!(object = %before.id(), %entity, "change applied");
        self.stats.changed += 1;
        Ok(())
    }

    /// Copy content now, queue references for the link pass
    fn imprint(&mut self, entity: EntityId, state: &ObjectState) -> Result<()> {
        for (slot, value) in state.content().iter().enumerate() {
            self.model
                .set_content_slot(entity, slot, value.clone())
                .map_err(|e| self.model_error(e))?;
        }
        for (slot, target) in state.references().iter().enumerate() {
            self.links.push(PendingLink {
                entity,
                object: state.id(),
                slot,
                target: *target,
            });
        }
        Ok(())
    }

    fn link(&mut self) -> Result<()> {
        for link in std::mem::take(&mut self.links) {
            if !self.model.contains(link.entity) {
                continue;
            }
            let target = match link.target {
                None => None,
                Some(target) => {
                    let entity = self.remote.entity(target).ok_or_else(|| {
                        self.violation(ConsistencyViolation::UnresolvedReference {
                            commit: self.commit.id(),
                            object: link.object,
                            target,
                        })
                    })?;
                    if self.model.contains(entity) {
                        Some(entity)
                    } else {
                        // Target removed locally and not yet committed
                        self.untied.push(link.entity);
                        self.stats.conflicts += 1;
                        None
                    }
                }
            };
            self.model
                .set_reference_slot(link.entity, link.slot, target)
                .map_err(|e| self.model_error(e))?;
            self.stats.linked += 1;
        }
        Ok(())
    }
}

/// Objects tracked by `remote` that applying the deletions of `commit` removes
fn doomed_objects(model: &Model, remote: &Remote, commit: &Commit) -> HashSet<ObjectId> {
    let mut doomed = HashSet::new();
    for state in commit.deletions() {
        doomed.insert(state.id());
        let Some(entity) = remote.entity(state.id()).filter(|e| model.contains(*e)) else {
            continue;
        };
        if let Ok(scope) = model.removal_scope(entity) {
            doomed.extend(scope.into_iter().filter_map(|e| remote.key(e)));
        }
    }
    doomed
}
