//! Folding consecutive commits
//!
//! History accumulates commits into checkpoints by folding each commit onto
//! the records gathered so far. Records are keyed by object id and
//! parameters reference objects by id, so a record whose owner changed again
//! later needs no re-keying.

use crate::commit::{Change, Commit, CommitRecords};

impl CommitRecords {
    /// Fold `later` onto these records
    ///
    /// - creation then deletion: nothing
    /// - creation then change: creation of the later state
    /// - change then change: first before -> last after
    /// - change then deletion: deletion of the first before state
    /// - deletion then re-creation of the same object: both records, since
    ///   a pull applies deletions before creations
    pub fn absorb(&mut self, later: &Commit) {
        for state in later.deletions() {
            let id = state.id();
            if self.creations_mut().shift_remove(&id).is_some() {
                continue;
            }
            if let Some(change) = self.changes_mut().shift_remove(&id) {
                self.insert_deletion(change.before);
                continue;
            }
            self.insert_deletion(state.clone());
        }

        for state in later.creations() {
            self.insert_creation(state.clone());
        }

        for (before, after) in later.changes() {
            let id = before.id();
            if let Some(created) = self.creations_mut().get_mut(&id) {
                *created = after.clone();
                continue;
            }
            if let Some(change) = self.changes_mut().get_mut(&id) {
                change.after = after.clone();
                if change.after == change.before {
                    self.changes_mut().shift_remove(&id);
                }
                continue;
            }
            self.changes_mut().insert(
                id,
                Change {
                    before: before.clone(),
                    after: after.clone(),
                },
            );
        }
    }

    /// Records of `commit` as seen through its direction
    #[must_use]
    pub fn of(commit: &Commit) -> Self {
        let mut records = Self::new();
        records.absorb(commit);
        records
    }
}

impl Commit {
    /// Records of `earlier` followed by `later`
    #[must_use]
    pub fn merge(earlier: &Commit, later: &Commit) -> CommitRecords {
        let mut records = CommitRecords::of(earlier);
        records.absorb(later);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CommitBuilder;
    use crate::commit::CommitId;
    use crate::test_support::{journaled_song, track_with_note};
    use strata_model::Model;
    use strata_state::Remote;

    fn commit(model: &mut Model, remote: &mut Remote) -> Commit {
        let changes = model.local_changes().cloned().unwrap_or_default();
        let records = CommitBuilder::new(model, remote, &changes).build().unwrap();
        model.local_changes_mut().unwrap().clear();
        Commit::new(CommitId::next(), records)
    }

    #[test]
    fn creation_then_deletion_vanishes() {
        let (mut model, mut remote) = journaled_song();
        let (track, _) = track_with_note(&mut model);
        let first = commit(&mut model, &mut remote);
        model.remove(track).unwrap();
        let second = commit(&mut model, &mut remote);

        assert!(Commit::merge(&first, &second).is_empty());
    }

    #[test]
    fn creation_then_change_keeps_later_state() {
        let (mut model, mut remote) = journaled_song();
        let (_, note) = track_with_note(&mut model);
        let first = commit(&mut model, &mut remote);
        model.set(note, "pitch", 72).unwrap();
        let second = commit(&mut model, &mut remote);

        let merged = Commit::merge(&first, &second);
        let stats = merged.stats();
        assert_eq!((stats.creations, stats.changes), (2, 0));
        let id = remote.key(note).unwrap();
        assert_eq!(merged.creations()[&id].content()[0].as_int(), Some(72));
    }

    #[test]
    fn change_chains_collapse() {
        let (mut model, mut remote) = journaled_song();
        let (_, note) = track_with_note(&mut model);
        model.set(note, "pitch", 1).unwrap();
        commit(&mut model, &mut remote);
        let original = remote.state_of(note).unwrap().clone();

        model.set(note, "pitch", 2).unwrap();
        let first = commit(&mut model, &mut remote);
        model.set(note, "pitch", 3).unwrap();
        let second = commit(&mut model, &mut remote);

        let merged = Commit::merge(&first, &second);
        let change = &merged.changes()[&original.id()];
        assert_eq!(change.before, original);
        assert_eq!(change.after.content()[0].as_int(), Some(3));
    }

    #[test]
    fn change_then_deletion_deletes_first_state() {
        let (mut model, mut remote) = journaled_song();
        let (_, note) = track_with_note(&mut model);
        commit(&mut model, &mut remote);
        let original = remote.state_of(note).unwrap().clone();

        model.set(note, "pitch", 5).unwrap();
        let first = commit(&mut model, &mut remote);
        model.remove(note).unwrap();
        let second = commit(&mut model, &mut remote);

        let merged = Commit::merge(&first, &second);
        assert!(merged.changes().is_empty());
        assert_eq!(merged.deletions()[&original.id()], original);
    }

    #[test]
    fn inverse_of_merge_swaps_tables() {
        let (mut model, mut remote) = journaled_song();
        track_with_note(&mut model);
        let first = commit(&mut model, &mut remote);
        let inverse = first.inverted(CommitId::next());
        assert_eq!(inverse.stats().deletions, 2);
        assert_eq!(inverse.stats().creations, 0);

        // A commit followed by its inverse cancels out
        assert!(Commit::merge(&first, &inverse).is_empty());
    }
}
