//! Remote: live entity <-> object state table
//!
//! One [`Remote`] per repository records the last state of every entity that
//! repository agreed on with the commit log. Local mutations do not touch it;
//! only building a commit or applying a pull does.

use crate::error::StateError;
use crate::state::{ObjectId, ObjectState, StateParam, StateParams, StateRef};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use strata_model::{EntityId, Model, Param};

#[derive(Debug, Clone)]
struct RemoteEntry {
    entity: EntityId,
    state: StateRef,
}

/// Bijective table between live entities and their current states
#[derive(Debug, Clone, Default)]
pub struct Remote {
    objects: IndexMap<ObjectId, RemoteEntry>,
    /// Also holds ids reserved by a state still being built
    entities: HashMap<EntityId, ObjectId>,
    staged: Vec<ObjectId>,
}

impl Remote {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `entity`, creating it from the live model if absent
    ///
    /// The entity's object id is reserved before its fields are resolved, and
    /// every referenced entity without a state gets one recursively, so
    /// entities that reference each other terminate.
    ///
    /// # Errors
    /// Returns an error if the entity, one of its parameters or one of its
    /// reference targets is not live in `model`
    pub fn create_object_state(&mut self, model: &Model, entity: EntityId) -> Result<StateRef, StateError> {
        let id = self.object_id_or_create(model, entity)?;
        self.state(id).cloned().ok_or(StateError::UnknownObject(id))
    }

    fn object_id_or_create(&mut self, model: &Model, entity: EntityId) -> Result<ObjectId, StateError> {
        if let Some(&id) = self.entities.get(&entity) {
            return Ok(id);
        }
        let id = ObjectId::next();
        self.entities.insert(entity, id);
        match self.snapshot(model, entity, id) {
            Ok(state) => {
                tracing::trace!(%entity, object = %id, "object state created");
                self.objects.insert(id, RemoteEntry { entity, state: Arc::new(state) });
                Ok(id)
            }
            Err(err) => {
                self.entities.remove(&entity);
                Err(err)
            }
        }
    }

    fn snapshot(&mut self, model: &Model, entity: EntityId, id: ObjectId) -> Result<ObjectState, StateError> {
        let type_name: Arc<str> = Arc::from(model.type_name(entity)?);
        let mut params = StateParams::new();
        for param in model.construction_parameter_objects(entity)? {
            params.push(match param {
                Param::Entity(e) => StateParam::Object(self.object_id_or_create(model, e)?),
                Param::Value(v) => StateParam::Value(v),
            });
        }
        let content = model.content_values(entity)?.to_vec();
        let targets = model.reference_slots(entity)?.to_vec();
        let mut references = Vec::with_capacity(targets.len());
        for target in targets {
            references.push(match target {
                Some(target) if !model.contains(target) => {
                    return Err(StateError::DanglingReference { entity, target });
                }
                Some(target) => Some(self.object_id_or_create(model, target)?),
                None => None,
            });
        }
        Ok(ObjectState::new(id, type_name, params, content, references))
    }

    /// New state for `entity` under `old`'s object id
    ///
    /// # Errors
    /// Returns [`StateError::StaleState`] if `old` is not the entity's current
    /// state, or an error if the live entity cannot be snapshotted
    pub fn update_object_state(
        &mut self,
        model: &Model,
        entity: EntityId,
        old: &StateRef,
    ) -> Result<StateRef, StateError> {
        let current = self.state_of(entity).ok_or(StateError::UnknownEntity(entity))?;
        if current.id() != old.id() || current.version() != old.version() {
            return Err(StateError::StaleState {
                id: old.id(),
                expected: old.version(),
                found: current.version(),
            });
        }
        let state = Arc::new(self.snapshot(model, entity, old.id())?);
        if let Some(entry) = self.objects.get_mut(&old.id()) {
            entry.state = state.clone();
        }
        tracing::trace!(%entity, object = %old.id(), "object state updated");
        Ok(state)
    }

    /// Track `state` as the state of `entity`
    ///
    /// # Errors
    /// Returns an error if the object or the entity is already tracked
    pub fn insert(&mut self, entity: EntityId, state: StateRef) -> Result<(), StateError> {
        let id = state.id();
        if self.objects.contains_key(&id) {
            return Err(StateError::DuplicateObject(id));
        }
        if let Some(&existing) = self.entities.get(&entity) {
            return Err(StateError::EntityAlreadyTracked { entity, existing });
        }
        self.entities.insert(entity, id);
        self.objects.insert(id, RemoteEntry { entity, state });
        Ok(())
    }

    /// Swap in a newer state of a tracked object, returning the previous one
    ///
    /// # Errors
    /// Returns [`StateError::UnknownObject`] if the object is not tracked
    pub fn replace(&mut self, state: StateRef) -> Result<StateRef, StateError> {
        let entry = self
            .objects
            .get_mut(&state.id())
            .ok_or(StateError::UnknownObject(state.id()))?;
        Ok(std::mem::replace(&mut entry.state, state))
    }

    /// Clear references in the state of `entity` whose targets are no longer tracked
    ///
    /// Returns the new state, or `None` if the entity is untracked or every
    /// target is still tracked.
    pub fn untie_dangling(&mut self, entity: EntityId) -> Option<StateRef> {
        let id = self.key(entity)?;
        let current = self.state(id)?;
        let references: Vec<Option<ObjectId>> = current
            .references()
            .iter()
            .map(|&target| target.filter(|t| self.objects.contains_key(t)))
            .collect();
        if references.as_slice() == current.references() {
            return None;
        }
        let state = Arc::new(current.with_references(references));
        if let Some(entry) = self.objects.get_mut(&id) {
            entry.state = Arc::clone(&state);
        }
        tracing::trace!(%entity, object = %id, "dangling references cleared");
        Some(state)
    }

    /// Object id of `entity`
    #[inline]
    #[must_use]
    pub fn key(&self, entity: EntityId) -> Option<ObjectId> {
        self.entities.get(&entity).copied()
    }

    /// Live entity of `id`
    #[must_use]
    pub fn entity(&self, id: ObjectId) -> Option<EntityId> {
        self.objects.get(&id).map(|entry| entry.entity)
    }

    /// Current state of object `id`
    #[must_use]
    pub fn state(&self, id: ObjectId) -> Option<&StateRef> {
        self.objects.get(&id).map(|entry| &entry.state)
    }

    /// Current state of `entity`
    #[must_use]
    pub fn state_of(&self, entity: EntityId) -> Option<&StateRef> {
        self.key(entity).and_then(|id| self.state(id))
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Resolve live construction parameters to their current states
    ///
    /// Pure lookup: entity parameters must already be tracked.
    ///
    /// # Errors
    /// Returns [`StateError::UnresolvedParameter`] for untracked entities
    pub fn construction_parameter_states(&self, entity: EntityId, params: &[Param]) -> Result<StateParams, StateError> {
        params
            .iter()
            .map(|param| match param {
                Param::Entity(e) => self
                    .key(*e)
                    .map(StateParam::Object)
                    .ok_or(StateError::UnresolvedParameter { entity, param: *e }),
                Param::Value(v) => Ok(StateParam::Value(v.clone())),
            })
            .collect()
    }

    /// Mark `id` for removal at the next [`Remote::flush_removals`]
    pub fn stage_removal(&mut self, id: ObjectId) {
        self.staged.push(id);
    }

    /// Remove every staged object, returning how many were tracked
    pub fn flush_removals(&mut self) -> usize {
        let staged = std::mem::take(&mut self.staged);
        staged.into_iter().filter(|id| self.remove(*id).is_some()).count()
    }

    /// Stop tracking `id`
    pub fn remove(&mut self, id: ObjectId) -> Option<(EntityId, StateRef)> {
        let entry = self.objects.shift_remove(&id)?;
        if self.entities.get(&entry.entity) == Some(&id) {
            self.entities.remove(&entry.entity);
        }
        Some((entry.entity, entry.state))
    }

    /// Tracked entities with their states, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &StateRef)> {
        self.objects.values().map(|entry| (entry.entity, &entry.state))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_model::{Layout, SchemaRegistry, TypeSchema, Value, ValueKind};

    fn model() -> Model {
        let registry = SchemaRegistry::builder()
            .register(TypeSchema::root("Song").collection("tracks", "Track", Layout::List))
            .register(
                TypeSchema::child("Track", "Song", "tracks")
                    .content("name", ValueKind::Text)
                    .reference("link", "Track"),
            )
            .build()
            .unwrap();
        Model::new(Arc::new(registry), "Song").unwrap()
    }

    #[test]
    fn create_is_idempotent() {
        let model = model();
        let mut remote = Remote::new();
        let a = remote.create_object_state(&model, model.root()).unwrap();
        let b = remote.create_object_state(&model, model.root()).unwrap();
        assert_eq!(a, b);
        assert_eq!(remote.len(), 1);
    }

    #[test]
    fn mutual_references_terminate() {
        let mut model = model();
        let root = model.root();
        let a = model.create_indexed_child(root, "Track").unwrap();
        let b = model.create_indexed_child(root, "Track").unwrap();
        model.set_reference(a, "link", Some(b)).unwrap();
        model.set_reference(b, "link", Some(a)).unwrap();

        let mut remote = Remote::new();
        let state_a = remote.create_object_state(&model, a).unwrap();
        let state_b = remote.state_of(b).unwrap().clone();
        assert_eq!(state_a.references(), &[Some(state_b.id())]);
        assert_eq!(state_b.references(), &[Some(state_a.id())]);
        // Owner state was created on the way
        assert_eq!(state_a.owner(), remote.key(root));
        assert_eq!(remote.len(), 3);
    }

    #[test]
    fn update_keeps_identity_and_rejects_stale_base() {
        let mut model = model();
        let root = model.root();
        let track = model.create_indexed_child(root, "Track").unwrap();
        let mut remote = Remote::new();
        let first = remote.create_object_state(&model, track).unwrap();

        model.set(track, "name", "lead").unwrap();
        let second = remote.update_object_state(&model, track, &first).unwrap();
        assert_eq!(first.id(), second.id());
        assert_ne!(first, second);
        assert_eq!(second.content(), &[Value::from("lead")]);

        assert!(matches!(
            remote.update_object_state(&model, track, &first),
            Err(StateError::StaleState { .. })
        ));
    }

    #[test]
    fn staged_removals_keep_lookups_until_flushed() {
        let mut model = model();
        let root = model.root();
        let track = model.create_indexed_child(root, "Track").unwrap();
        let mut remote = Remote::new();
        let state = remote.create_object_state(&model, track).unwrap();
        let params = model.construction_parameter_objects(track).unwrap();

        remote.stage_removal(state.id());
        assert!(remote.state_of(track).is_some());
        assert!(remote.construction_parameter_states(track, &params).is_ok());
        assert_eq!(remote.flush_removals(), 1);
        assert_eq!(remote.key(track), None);
        assert_eq!(remote.flush_removals(), 0);
    }

    #[test]
    fn untie_dangling_clears_untracked_targets_only() {
        let mut model = model();
        let root = model.root();
        let a = model.create_indexed_child(root, "Track").unwrap();
        let b = model.create_indexed_child(root, "Track").unwrap();
        model.set_reference(a, "link", Some(b)).unwrap();
        let mut remote = Remote::new();
        let before = remote.create_object_state(&model, a).unwrap();
        assert_eq!(remote.untie_dangling(a), None);

        let target = remote.key(b).unwrap();
        remote.remove(target);
        let after = remote.untie_dangling(a).unwrap();
        assert_eq!(after.id(), before.id());
        assert_ne!(after, before);
        assert_eq!(after.references(), &[None]);
        assert_eq!(after.params(), before.params());
        assert_eq!(remote.state_of(a), Some(&after));
        assert_eq!(remote.untie_dangling(a), None);
    }

    #[test]
    fn insert_rejects_duplicates() {
        let model = model();
        let mut remote = Remote::new();
        let state = remote.create_object_state(&model, model.root()).unwrap();
        assert_eq!(
            remote.insert(EntityId::next(), state.clone()),
            Err(StateError::DuplicateObject(state.id()))
        );
    }

    #[test]
    fn unresolved_parameter_is_reported() {
        let mut model = model();
        let root = model.root();
        let track = model.create_indexed_child(root, "Track").unwrap();
        let remote = Remote::new();
        let params = model.construction_parameter_objects(track).unwrap();
        assert_eq!(
            remote.construction_parameter_states(track, &params),
            Err(StateError::UnresolvedParameter { entity: track, param: root })
        );
    }
}
