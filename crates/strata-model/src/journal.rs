//! Local change journal
//!
//! Records, per model, which entities were created, changed or deleted since
//! the last commit. Each entity is in exactly one [`EntityStatus`]:
//!
//! ```text
//! Unknown --construct--> Created --remove--> (forgotten)
//! Unknown --mutate-----> Changed --remove--> Deleted
//! Unknown --remove-----> Deleted
//! ```
//!
//! Repeated changes collapse and a change to a created entity is absorbed by
//! its creation.

use crate::ids::EntityId;
use crate::value::Param;
use indexmap::{IndexMap, IndexSet};

/// Status of one entity relative to its repository's last commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityStatus {
    Unknown,
    Created,
    Changed,
    Deleted,
}

/// What remains of a removed entity until its deletion is committed
///
/// The live parameters still name the (possibly also removed) owner, which
/// the repository's remote table can resolve to a pre-commit state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tombstone {
    pub type_name: String,
    pub params: Vec<Param>,
}

/// Pending local deltas of one model
#[derive(Debug, Clone, Default)]
pub struct LocalChanges {
    created: IndexSet<EntityId>,
    changed: IndexSet<EntityId>,
    deleted: IndexMap<EntityId, Tombstone>,
}

impl LocalChanges {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status of `entity`
    #[must_use]
    pub fn status(&self, entity: EntityId) -> EntityStatus {
        if self.created.contains(&entity) {
            EntityStatus::Created
        } else if self.changed.contains(&entity) {
            EntityStatus::Changed
        } else if self.deleted.contains_key(&entity) {
            EntityStatus::Deleted
        } else {
            EntityStatus::Unknown
        }
    }

    /// Unknown -> Created
    pub fn record_created(&mut self, entity: EntityId) {
        self.created.insert(entity);
    }

    /// Unknown -> Changed; no-op for created, changed or deleted entities
    pub fn record_changed(&mut self, entity: EntityId) {
        if self.created.contains(&entity) || self.deleted.contains_key(&entity) {
            return;
        }
        self.changed.insert(entity);
    }

    /// Any -> Deleted
    ///
    /// A created entity is forgotten entirely: it never existed from the
    /// remote's point of view. A changed entity drops its pending change.
    pub fn record_deleted(&mut self, entity: EntityId, tombstone: Tombstone) {
        if self.created.shift_remove(&entity) {
            return;
        }
        self.changed.shift_remove(&entity);
        self.deleted.insert(entity, tombstone);
    }

    /// Drop every trace of `entity`
    ///
    /// Returns the status it had.
    pub fn forget(&mut self, entity: EntityId) -> EntityStatus {
        let status = self.status(entity);
        self.created.shift_remove(&entity);
        self.changed.shift_remove(&entity);
        self.deleted.shift_remove(&entity);
        status
    }

    /// Created entities, in creation order
    #[inline]
    #[must_use]
    pub fn created(&self) -> &IndexSet<EntityId> {
        &self.created
    }

    /// Changed entities, in first-change order
    #[inline]
    #[must_use]
    pub fn changed(&self) -> &IndexSet<EntityId> {
        &self.changed
    }

    /// Deleted entities with their tombstones, in removal (pre-)order
    #[inline]
    #[must_use]
    pub fn deleted(&self) -> &IndexMap<EntityId, Tombstone> {
        &self.deleted
    }

    /// Created or changed
    #[inline]
    #[must_use]
    pub fn is_dirty(&self, entity: EntityId) -> bool {
        self.created.contains(&entity) || self.changed.contains(&entity)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.changed.is_empty() && self.deleted.is_empty()
    }

    /// Total pending entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.created.len() + self.changed.len() + self.deleted.len()
    }

    pub fn clear(&mut self) {
        self.created.clear();
        self.changed.clear();
        self.deleted.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tombstone() -> Tombstone {
        Tombstone {
            type_name: "Note".into(),
            params: vec![Param::Entity(EntityId::next())],
        }
    }

    #[test]
    fn created_then_deleted_is_forgotten() {
        let mut journal = LocalChanges::new();
        let e = EntityId::next();
        journal.record_created(e);
        journal.record_deleted(e, tombstone());
        assert_eq!(journal.status(e), EntityStatus::Unknown);
        assert!(journal.is_empty());
    }

    #[test]
    fn changed_then_deleted_is_deleted() {
        let mut journal = LocalChanges::new();
        let e = EntityId::next();
        journal.record_changed(e);
        journal.record_deleted(e, tombstone());
        assert_eq!(journal.status(e), EntityStatus::Deleted);
        assert!(journal.changed().is_empty());
    }

    #[test]
    fn change_of_created_entity_is_absorbed() {
        let mut journal = LocalChanges::new();
        let e = EntityId::next();
        journal.record_created(e);
        journal.record_changed(e);
        journal.record_changed(e);
        assert_eq!(journal.status(e), EntityStatus::Created);
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn forget_reports_previous_status() {
        let mut journal = LocalChanges::new();
        let e = EntityId::next();
        journal.record_changed(e);
        assert_eq!(journal.forget(e), EntityStatus::Changed);
        assert_eq!(journal.forget(e), EntityStatus::Unknown);
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Change,
        Delete,
    }

    proptest! {
        #[test]
        fn prop_status_is_exclusive(
            created_first in any::<bool>(),
            ops in proptest::collection::vec(prop_oneof![Just(Op::Change), Just(Op::Delete)], 0..12),
        ) {
            let mut journal = LocalChanges::new();
            let e = EntityId::next();
            if created_first {
                journal.record_created(e);
            }
            for op in ops {
                match op {
                    Op::Change => journal.record_changed(e),
                    Op::Delete => journal.record_deleted(e, tombstone()),
                }
                let memberships = usize::from(journal.created().contains(&e))
                    + usize::from(journal.changed().contains(&e))
                    + usize::from(journal.deleted().contains_key(&e));
                prop_assert!(memberships <= 1);
            }
        }
    }
}
