//! Commit construction
//!
//! Turns a model's local change journal into [`CommitRecords`], updating the
//! repository's remote along the way. Order is fixed:
//!
//! 1. deletions, recorded with their pre-commit states and only staged for
//!    removal so sibling deletions can still resolve their owners
//! 2. creations, each after the dirty entities it depends on
//! 3. changes, with the same dependency rule
//! 4. staged removals are flushed

use crate::commit::CommitRecords;
use crate::error::CommitError;
use std::collections::HashSet;
use strata_model::{EntityId, EntityStatus, LocalChanges, Model, Param};
use strata_state::Remote;

/// One-shot builder of the records for a repository's pending changes
#[derive(Debug)]
pub struct CommitBuilder<'a> {
    model: &'a Model,
    remote: &'a mut Remote,
    changes: &'a LocalChanges,
    records: CommitRecords,
    done: HashSet<EntityId>,
    in_progress: HashSet<EntityId>,
}

impl<'a> CommitBuilder<'a> {
    #[must_use]
    pub fn new(model: &'a Model, remote: &'a mut Remote, changes: &'a LocalChanges) -> Self {
        Self {
            model,
            remote,
            changes,
            records: CommitRecords::new(),
            done: HashSet::new(),
            in_progress: HashSet::new(),
        }
    }

    /// Build the records and bring the remote up to date
    ///
    /// # Errors
    /// Returns a [`CommitError`] if the journal and the remote disagree. The
    /// remote may then hold states for some of the journaled entities.
    pub fn build(mut self) -> Result<CommitRecords, CommitError> {
        let changes = self.changes;
        self.record_deletions()?;
        for &entity in changes.created() {
            self.commit_entity(entity)?;
        }
        for &entity in changes.changed() {
            self.commit_entity(entity)?;
        }
        let removed = self.remote.flush_removals();
        tracing::debug!(
            removed,
            stats = %self.records.stats(),
            "commit records built"
        );
        Ok(self.records)
    }

    fn record_deletions(&mut self) -> Result<(), CommitError> {
        let changes = self.changes;
        for (&entity, tombstone) in changes.deleted() {
            if tombstone.params.is_empty() {
                return Err(CommitError::RootNotCommittable(entity));
            }
            let state = self
                .remote
                .state_of(entity)
                .cloned()
                .ok_or(CommitError::UntrackedDeletion(entity))?;
            let params = self
                .remote
                .construction_parameter_states(entity, &tombstone.params)?;
            if params.as_slice() != state.params() {
                return Err(CommitError::ParameterMismatch {
                    entity,
                    object: state.id(),
                });
            }
            tracing::trace!(%entity, object = %state.id(), "deletion recorded");
            self.remote.stage_removal(state.id());
            self.records.insert_deletion(state);
        }
        Ok(())
    }

    fn commit_entity(&mut self, entity: EntityId) -> Result<(), CommitError> {
        if self.done.contains(&entity) || self.in_progress.contains(&entity) {
            return Ok(());
        }
        let status = self.changes.status(entity);
        if !matches!(status, EntityStatus::Created | EntityStatus::Changed) {
            return Ok(());
        }
        self.in_progress.insert(entity);

        for dependency in self.dependencies(entity)? {
            self.commit_entity(dependency)?;
        }

        if status == EntityStatus::Created {
            if self.model.owner(entity)?.is_none() {
                return Err(CommitError::RootNotCommittable(entity));
            }
            let state = self.remote.create_object_state(self.model, entity)?;
            tracing::trace!(%entity, object = %state.id(), "creation recorded");
            self.records.insert_creation(state);
        } else {
            let before = self
                .remote
                .state_of(entity)
                .cloned()
                .ok_or(CommitError::UntrackedChange(entity))?;
            let after = self.remote.update_object_state(self.model, entity, &before)?;
            if after.same_fields(&before) {
                // Net no-op: keep the old state as baseline
                self.remote.replace(before)?;
            } else {
                tracing::trace!(%entity, object = %before.id(), "change recorded");
                self.records.insert_change(before, after);
            }
        }

        self.in_progress.remove(&entity);
        self.done.insert(entity);
        Ok(())
    }

    /// Owner, key entity and reference targets of `entity`
    fn dependencies(&self, entity: EntityId) -> Result<Vec<EntityId>, CommitError> {
        let mut out: Vec<EntityId> = self
            .model
            .construction_parameter_objects(entity)?
            .iter()
            .filter_map(Param::entity)
            .collect();
        out.extend(self.model.reference_slots(entity)?.iter().flatten().copied());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{journaled_song, track_with_note};
    use strata_model::Value;

    fn commit(model: &mut Model, remote: &mut Remote) -> CommitRecords {
        let changes = model.local_changes().cloned().unwrap_or_default();
        let records = CommitBuilder::new(model, remote, &changes).build().unwrap();
        if let Some(journal) = model.local_changes_mut() {
            journal.clear();
        }
        records
    }

    #[test]
    fn single_creation() {
        let (mut model, mut remote) = journaled_song();
        let root = model.root();
        let track = model.create_indexed_child(root, "Track").unwrap();
        let records = commit(&mut model, &mut remote);
        assert_eq!(records.stats().creations, 1);
        assert_eq!(records.stats().total(), 1);
        assert!(remote.state_of(track).is_some());
    }

    #[test]
    fn owner_is_recorded_before_child() {
        let (mut model, mut remote) = journaled_song();
        let (track, note) = track_with_note(&mut model);
        let records = commit(&mut model, &mut remote);
        let order: Vec<_> = records.creations().keys().copied().collect();
        assert_eq!(order, vec![remote.key(track).unwrap(), remote.key(note).unwrap()]);
    }

    #[test]
    fn created_then_deleted_is_absent() {
        let (mut model, mut remote) = journaled_song();
        let (track, _) = track_with_note(&mut model);
        model.remove(track).unwrap();
        let records = commit(&mut model, &mut remote);
        assert!(records.is_empty());
        assert_eq!(remote.len(), 1);
    }

    #[test]
    fn changed_then_deleted_records_original_state() {
        let (mut model, mut remote) = journaled_song();
        let (_, note) = track_with_note(&mut model);
        model.set(note, "pitch", 69).unwrap();
        commit(&mut model, &mut remote);
        let original = remote.state_of(note).unwrap().clone();

        model.set(note, "pitch", 30).unwrap();
        model.remove(note).unwrap();
        let records = commit(&mut model, &mut remote);
        assert_eq!(records.stats().deletions, 1);
        assert_eq!(records.stats().changes, 0);
        assert_eq!(records.deletions()[&original.id()], original);
        assert_eq!(remote.key(note), None);
    }

    #[test]
    fn subtree_deletion_records_every_descendant() {
        let (mut model, mut remote) = journaled_song();
        let (track, _) = track_with_note(&mut model);
        model.create_child(track, "Note").unwrap();
        model.create_keyed_child(track, "Marker", Value::from("verse")).unwrap();
        commit(&mut model, &mut remote);
        let before = remote.len();

        model.remove(track).unwrap();
        let records = commit(&mut model, &mut remote);
        assert_eq!(records.stats().deletions, 4);
        assert_eq!(remote.len(), before - 4);
    }

    #[test]
    fn cyclic_references_commit_together() {
        let (mut model, mut remote) = journaled_song();
        let (_, a) = track_with_note(&mut model);
        let (_, b) = track_with_note(&mut model);
        model.set_reference(a, "tie", Some(b)).unwrap();
        model.set_reference(b, "tie", Some(a)).unwrap();
        let records = commit(&mut model, &mut remote);
        assert_eq!(records.stats().creations, 4);
        let state_a = remote.state_of(a).unwrap();
        let state_b = remote.state_of(b).unwrap();
        assert_eq!(state_a.references()[0], Some(state_b.id()));
        assert_eq!(state_b.references()[0], Some(state_a.id()));
    }

    #[test]
    fn net_no_op_change_is_dropped() {
        let (mut model, mut remote) = journaled_song();
        let (_, note) = track_with_note(&mut model);
        model.set(note, "pitch", 60).unwrap();
        commit(&mut model, &mut remote);
        let baseline = remote.state_of(note).unwrap().clone();

        model.set(note, "pitch", 61).unwrap();
        model.set(note, "pitch", 60).unwrap();
        let records = commit(&mut model, &mut remote);
        assert!(records.is_empty());
        assert_eq!(remote.state_of(note), Some(&baseline));
    }

    #[test]
    fn changed_root_is_a_change_record() {
        let (mut model, mut remote) = journaled_song();
        let root = model.root();
        model.set(root, "title", "Outro").unwrap();
        let records = commit(&mut model, &mut remote);
        assert_eq!(records.stats().changes, 1);
    }
}
