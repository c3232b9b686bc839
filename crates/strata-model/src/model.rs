//! Arena entity graph
//!
//! A [`Model`] owns every live entity of one data model instance, addressed
//! by [`EntityId`]. Ownership is explicit: each node stores its owner id and
//! key, and each owner stores its children in one collection per declared
//! collection field. Cross-references are reference slots holding entity ids,
//! indexed in reverse so that removing an entity can un-tie everything that
//! points at it.
//!
//! Once a journal is enabled the model records every local construction,
//! mutation and removal in its [`LocalChanges`], except while replaying a
//! pull.

use crate::error::ModelError;
use crate::ids::EntityId;
use crate::journal::{LocalChanges, Tombstone};
use crate::observer::{NoopSink, ObserverSink};
use crate::schema::{EntityKind, KeyKind, Layout, Placement, SchemaRegistry, TypeSchema};
use crate::value::{Param, Value};
use indexmap::{IndexMap, IndexSet};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Storage of one child collection field
#[derive(Debug, Clone)]
enum Collection {
    Set(IndexSet<EntityId>),
    List(BTreeMap<i64, EntityId>),
    Map(IndexMap<Param, EntityId>),
}

impl Collection {
    fn for_layout(layout: &Layout) -> Self {
        match layout {
            Layout::Set => Self::Set(IndexSet::new()),
            Layout::List => Self::List(BTreeMap::new()),
            Layout::Map(_) => Self::Map(IndexMap::new()),
        }
    }

    fn members(&self) -> Vec<EntityId> {
        match self {
            Self::Set(set) => set.iter().copied().collect(),
            Self::List(list) => list.values().copied().collect(),
            Self::Map(map) => map.values().copied().collect(),
        }
    }

    fn get(&self, key: &Param) -> Option<EntityId> {
        match (self, key) {
            (Self::List(list), Param::Value(Value::Int(ordinal))) => list.get(ordinal).copied(),
            (Self::Map(map), key) => map.get(key).copied(),
            _ => None,
        }
    }

    fn occupied(&self, key: Option<&Param>) -> bool {
        key.is_some_and(|key| self.get(key).is_some())
    }

    fn insert(&mut self, key: Option<&Param>, id: EntityId) {
        match (self, key) {
            (Self::Set(set), _) => {
                set.insert(id);
            }
            (Self::List(list), Some(Param::Value(Value::Int(ordinal)))) => {
                list.insert(*ordinal, id);
            }
            (Self::Map(map), Some(key)) => {
                map.insert(key.clone(), id);
            }
            // Keys are checked against the layout before insertion
            _ => {}
        }
    }

    fn remove(&mut self, key: Option<&Param>, id: EntityId) {
        match (self, key) {
            (Self::Set(set), _) => {
                set.shift_remove(&id);
            }
            (Self::List(list), Some(Param::Value(Value::Int(ordinal)))) => {
                if list.get(ordinal) == Some(&id) {
                    list.remove(ordinal);
                }
            }
            (Self::Map(map), Some(key)) => {
                if map.get(key) == Some(&id) {
                    map.shift_remove(key);
                }
            }
            _ => {}
        }
    }

    fn last_ordinal(&self) -> Option<i64> {
        match self {
            Self::List(list) => list.keys().next_back().copied(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    schema: Arc<TypeSchema>,
    owner: Option<EntityId>,
    key: Option<Param>,
    content: Vec<Value>,
    references: Vec<Option<EntityId>>,
    collections: Vec<Collection>,
    removing: bool,
}

impl Node {
    fn new(schema: Arc<TypeSchema>, owner: Option<EntityId>, key: Option<Param>) -> Self {
        let content = vec![Value::Null; schema.content_fields().len()];
        let references = vec![None; schema.reference_fields().len()];
        let collections = schema
            .collection_fields()
            .iter()
            .map(|c| Collection::for_layout(&c.layout))
            .collect();
        Self {
            schema,
            owner,
            key,
            content,
            references,
            collections,
            removing: false,
        }
    }

    fn params(&self) -> Vec<Param> {
        self.owner
            .map(Param::Entity)
            .into_iter()
            .chain(self.key.clone())
            .collect()
    }

    fn children(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.collections.iter().flat_map(Collection::members)
    }
}

/// Live entity tree of one data model instance
#[derive(Debug)]
pub struct Model {
    registry: Arc<SchemaRegistry>,
    root: EntityId,
    nodes: HashMap<EntityId, Node>,
    /// target -> (referrer, reference slot)
    referrers: HashMap<EntityId, IndexSet<(EntityId, usize)>>,
    /// key entity -> children keyed by it
    keyed_by: HashMap<EntityId, IndexSet<EntityId>>,
    /// Entities removed from this model; ids are never reused
    removed: HashSet<EntityId>,
    journal: Option<LocalChanges>,
    replaying: bool,
    sink: Arc<dyn ObserverSink>,
}

impl Model {
    /// Create a model holding a fresh root of `root_type`
    ///
    /// # Errors
    /// Returns [`ModelError::NotARoot`] if the type is a child type
    pub fn new(registry: Arc<SchemaRegistry>, root_type: &str) -> Result<Self, ModelError> {
        let schema = registry.get(root_type)?.clone();
        if schema.kind() != EntityKind::Root {
            return Err(ModelError::NotARoot(root_type.to_string()));
        }
        let root = EntityId::next();
        let mut nodes = HashMap::new();
        nodes.insert(root, Node::new(schema, None, None));
        tracing::debug!(%root, root_type, "model created");
        Ok(Self {
            registry,
            root,
            nodes,
            referrers: HashMap::new(),
            keyed_by: HashMap::new(),
            removed: HashSet::new(),
            journal: None,
            replaying: false,
            sink: Arc::new(NoopSink),
        })
    }

    /// Route removal and replay notifications to `sink`
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ObserverSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn set_sink(&mut self, sink: Arc<dyn ObserverSink>) {
        self.sink = sink;
    }

    #[inline]
    #[must_use]
    pub fn sink(&self) -> &Arc<dyn ObserverSink> {
        &self.sink
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> EntityId {
        self.root
    }

    /// Number of live entities, root included
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: a model holds at least its root
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Entity is live and not being removed
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.nodes.get(&id).is_some_and(|n| !n.removing)
    }

    fn node(&self, id: EntityId) -> Result<&Node, ModelError> {
        self.nodes
            .get(&id)
            .filter(|n| !n.removing)
            .ok_or(ModelError::UnknownEntity(id))
    }

    fn node_mut(&mut self, id: EntityId) -> Result<&mut Node, ModelError> {
        self.nodes
            .get_mut(&id)
            .filter(|n| !n.removing)
            .ok_or(ModelError::UnknownEntity(id))
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Construct a child from its declared construction parameters
    ///
    /// `params` is `[owner]` for set members and `[owner, key]` for list
    /// (`Value::Int` ordinal) and map members.
    ///
    /// # Errors
    /// Returns [`ModelError::ParameterMismatch`] if `params` do not match the
    /// type's declaration, or [`ModelError::DuplicateKey`] if the key is taken
    pub fn construct(&mut self, type_name: &str, params: Vec<Param>) -> Result<EntityId, ModelError> {
        let schema = self.registry.get(type_name)?.clone();
        let Placement::Child { owner: owner_type, collection } = schema.placement() else {
            return Err(ModelError::parameter_mismatch(
                type_name,
                "root types are not constructed as children",
            ));
        };
        let mut params = params.into_iter();
        let owner = params
            .next()
            .and_then(|p| p.entity())
            .ok_or_else(|| ModelError::parameter_mismatch(type_name, "first parameter must be the owner"))?;
        let key = params.next();
        if params.next().is_some() {
            return Err(ModelError::parameter_mismatch(type_name, "too many parameters"));
        }

        let owner_node = self.node(owner)?;
        if owner_node.schema.name() != owner_type {
            return Err(ModelError::parameter_mismatch(
                type_name,
                format!("owner must be '{owner_type}', got '{}'", owner_node.schema.name()),
            ));
        }
        let slot = owner_node
            .schema
            .collection_slot(collection)
            .ok_or_else(|| ModelError::unknown_field(owner_type, collection.as_str()))?;
        let layout = &owner_node.schema.collection_fields()[slot].layout;
        self.check_key(type_name, layout, key.as_ref())?;
        if owner_node.collections[slot].occupied(key.as_ref()) {
            return Err(ModelError::DuplicateKey {
                owner,
                field: collection.clone(),
                key: key.unwrap_or(Param::Value(Value::Null)),
            });
        }

        let id = EntityId::next();
        if let Some(Param::Entity(key_entity)) = &key {
            self.keyed_by.entry(*key_entity).or_default().insert(id);
        }
        if let Some(owner_node) = self.nodes.get_mut(&owner) {
            owner_node.collections[slot].insert(key.as_ref(), id);
        }
        self.nodes.insert(id, Node::new(schema, Some(owner), key));
        self.record(|journal| journal.record_created(id));
        tracing::trace!(entity = %id, type_name, %owner, "entity constructed");
        Ok(id)
    }

    fn check_key(&self, type_name: &str, layout: &Layout, key: Option<&Param>) -> Result<(), ModelError> {
        match (layout, key) {
            (Layout::Set, None) => Ok(()),
            (Layout::List, Some(Param::Value(Value::Int(_)))) => Ok(()),
            (Layout::Map(KeyKind::Value(kind)), Some(Param::Value(value)))
                if !value.is_null() && value.fits(*kind) =>
            {
                Ok(())
            }
            (Layout::Map(KeyKind::Entity(key_type)), Some(Param::Entity(key_entity))) => {
                let key_node = self.node(*key_entity)?;
                if key_node.schema.name() == key_type {
                    Ok(())
                } else {
                    Err(ModelError::parameter_mismatch(
                        type_name,
                        format!("key must be '{key_type}', got '{}'", key_node.schema.name()),
                    ))
                }
            }
            (Layout::Set, Some(_)) => Err(ModelError::parameter_mismatch(type_name, "set members take no key")),
            (_, None) => Err(ModelError::parameter_mismatch(type_name, "missing key parameter")),
            (_, Some(key)) => Err(ModelError::parameter_mismatch(type_name, format!("invalid key {key}"))),
        }
    }

    /// Construct a member of a set collection
    ///
    /// # Errors
    /// See [`Model::construct`]
    pub fn create_child(&mut self, owner: EntityId, type_name: &str) -> Result<EntityId, ModelError> {
        self.construct(type_name, vec![Param::Entity(owner)])
    }

    /// Construct a member of a map collection under `key`
    ///
    /// # Errors
    /// See [`Model::construct`]
    pub fn create_keyed_child(
        &mut self,
        owner: EntityId,
        type_name: &str,
        key: impl Into<Param>,
    ) -> Result<EntityId, ModelError> {
        self.construct(type_name, vec![Param::Entity(owner), key.into()])
    }

    /// Append a member to a list collection
    ///
    /// # Errors
    /// See [`Model::construct`]
    pub fn create_indexed_child(&mut self, owner: EntityId, type_name: &str) -> Result<EntityId, ModelError> {
        let ordinal = self.next_ordinal(owner, type_name)?;
        self.insert_indexed_child(owner, type_name, ordinal)
    }

    /// Insert a member into a list collection at `ordinal`
    ///
    /// # Errors
    /// See [`Model::construct`]
    pub fn insert_indexed_child(
        &mut self,
        owner: EntityId,
        type_name: &str,
        ordinal: i64,
    ) -> Result<EntityId, ModelError> {
        self.construct(type_name, vec![Param::Entity(owner), Param::Value(Value::Int(ordinal))])
    }

    /// Ordinal one past the last member of the list holding `type_name`
    ///
    /// # Errors
    /// Returns an error if `owner` is unknown, `type_name` is not placed in
    /// one of its collections, or the last member sits at `i64::MAX`
    pub fn next_ordinal(&self, owner: EntityId, type_name: &str) -> Result<i64, ModelError> {
        let schema = self.registry.get(type_name)?;
        let Placement::Child { collection, .. } = schema.placement() else {
            return Err(ModelError::parameter_mismatch(type_name, "root types have no ordinal"));
        };
        let owner_node = self.node(owner)?;
        let slot = owner_node
            .schema
            .collection_slot(collection)
            .ok_or_else(|| ModelError::unknown_field(owner_node.schema.name(), collection.as_str()))?;
        match owner_node.collections[slot].last_ordinal() {
            None => Ok(0),
            Some(last) => last
                .checked_add(1)
                .ok_or_else(|| ModelError::parameter_mismatch(type_name, "no ordinal left after the last member")),
        }
    }

    /// Move an uncommitted list member to another free ordinal
    ///
    /// Construction parameters of committed entities are fixed, so this is
    /// rejected for entities the journal does not know as created.
    ///
    /// # Errors
    /// Returns [`ModelError::ParameterMismatch`] for committed or non-list
    /// entities and [`ModelError::DuplicateKey`] if `ordinal` is taken
    pub fn reassign_ordinal(&mut self, id: EntityId, ordinal: i64) -> Result<(), ModelError> {
        let node = self.node(id)?;
        let type_name = node.schema.name().to_string();
        if node.schema.kind() != EntityKind::IndexedChild {
            return Err(ModelError::parameter_mismatch(&type_name, "not a list member"));
        }
        if self
            .journal
            .as_ref()
            .is_some_and(|j| j.status(id) != crate::journal::EntityStatus::Created)
        {
            return Err(ModelError::parameter_mismatch(&type_name, "ordinal of a committed entity is fixed"));
        }
        let (owner, slot, old_key) = self.owner_slot(id)?;
        let new_key = Param::Value(Value::Int(ordinal));
        let owner_node = self.node_mut(owner)?;
        let field = owner_node.schema.collection_fields()[slot].name.clone();
        if owner_node.collections[slot].occupied(Some(&new_key)) {
            return Err(ModelError::DuplicateKey { owner, field, key: new_key });
        }
        owner_node.collections[slot].remove(old_key.as_ref(), id);
        owner_node.collections[slot].insert(Some(&new_key), id);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.key = Some(new_key);
        }
        Ok(())
    }

    /// Owner id, collection slot in the owner and key of a child
    fn owner_slot(&self, id: EntityId) -> Result<(EntityId, usize, Option<Param>), ModelError> {
        let node = self.nodes.get(&id).ok_or(ModelError::UnknownEntity(id))?;
        let (Some(owner), Placement::Child { collection, .. }) = (node.owner, node.schema.placement()) else {
            return Err(ModelError::parameter_mismatch(node.schema.name(), "root has no owner"));
        };
        let owner_node = self.nodes.get(&owner).ok_or(ModelError::UnknownEntity(owner))?;
        let slot = owner_node
            .schema
            .collection_slot(collection)
            .ok_or_else(|| ModelError::unknown_field(owner_node.schema.name(), collection.as_str()))?;
        Ok((owner, slot, node.key.clone()))
    }

    // ------------------------------------------------------------------
    // Fields
    // ------------------------------------------------------------------

    /// Content value of `field`
    ///
    /// # Errors
    /// Returns an error for unknown entities or fields
    pub fn get(&self, id: EntityId, field: &str) -> Result<&Value, ModelError> {
        let node = self.node(id)?;
        let slot = node
            .schema
            .content_slot(field)
            .ok_or_else(|| ModelError::unknown_field(node.schema.name(), field))?;
        Ok(&node.content[slot])
    }

    /// Set a content field; unchanged values are not journaled
    ///
    /// # Errors
    /// Returns [`ModelError::TypeMismatch`] if the value does not fit the field
    pub fn set(&mut self, id: EntityId, field: &str, value: impl Into<Value>) -> Result<(), ModelError> {
        let node = self.node(id)?;
        let slot = node
            .schema
            .content_slot(field)
            .ok_or_else(|| ModelError::unknown_field(node.schema.name(), field))?;
        self.set_content_slot(id, slot, value.into())
    }

    /// Set a content field by slot
    ///
    /// # Errors
    /// Returns an error for unknown slots or mismatching values
    pub fn set_content_slot(&mut self, id: EntityId, slot: usize, value: Value) -> Result<(), ModelError> {
        let node = self.node_mut(id)?;
        let field = node
            .schema
            .content_fields()
            .get(slot)
            .ok_or_else(|| ModelError::unknown_field(node.schema.name(), slot.to_string()))?;
        if !value.fits(field.kind) {
            return Err(ModelError::TypeMismatch {
                type_name: node.schema.name().to_string(),
                field: field.name.clone(),
                expected: field.kind,
                actual: value,
            });
        }
        if node.content[slot] == value {
            return Ok(());
        }
        node.content[slot] = value;
        self.record(|journal| journal.record_changed(id));
        Ok(())
    }

    /// Target of a cross-reference field
    ///
    /// # Errors
    /// Returns an error for unknown entities or fields
    pub fn reference(&self, id: EntityId, field: &str) -> Result<Option<EntityId>, ModelError> {
        let node = self.node(id)?;
        let slot = node
            .schema
            .reference_slot(field)
            .ok_or_else(|| ModelError::unknown_field(node.schema.name(), field))?;
        Ok(node.references[slot])
    }

    /// Point a cross-reference at `target` (or clear it)
    ///
    /// # Errors
    /// Returns [`ModelError::ReferenceTypeMismatch`] if `target` has another
    /// type than the field declares
    pub fn set_reference(&mut self, id: EntityId, field: &str, target: Option<EntityId>) -> Result<(), ModelError> {
        let node = self.node(id)?;
        let slot = node
            .schema
            .reference_slot(field)
            .ok_or_else(|| ModelError::unknown_field(node.schema.name(), field))?;
        self.set_reference_slot(id, slot, target)
    }

    /// Point a cross-reference at `target` by slot
    ///
    /// # Errors
    /// See [`Model::set_reference`]
    pub fn set_reference_slot(&mut self, id: EntityId, slot: usize, target: Option<EntityId>) -> Result<(), ModelError> {
        let node = self.node(id)?;
        let field = node
            .schema
            .reference_fields()
            .get(slot)
            .ok_or_else(|| ModelError::unknown_field(node.schema.name(), slot.to_string()))?;
        if let Some(target) = target {
            let target_node = self.node(target)?;
            if target_node.schema.name() != field.target {
                return Err(ModelError::ReferenceTypeMismatch {
                    type_name: node.schema.name().to_string(),
                    field: field.name.clone(),
                    expected: field.target.clone(),
                    actual: target_node.schema.name().to_string(),
                });
            }
        }
        let previous = node.references[slot];
        if previous == target {
            return Ok(());
        }
        if let Some(previous) = previous {
            if let Some(set) = self.referrers.get_mut(&previous) {
                set.shift_remove(&(id, slot));
            }
        }
        if let Some(target) = target {
            self.referrers.entry(target).or_default().insert((id, slot));
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.references[slot] = target;
        }
        self.record(|journal| journal.record_changed(id));
        Ok(())
    }

    /// Content values, by slot
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownEntity`] for unknown entities
    pub fn content_values(&self, id: EntityId) -> Result<&[Value], ModelError> {
        Ok(&self.node(id)?.content)
    }

    /// Cross-reference targets, by slot
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownEntity`] for unknown entities
    pub fn reference_slots(&self, id: EntityId) -> Result<&[Option<EntityId>], ModelError> {
        Ok(&self.node(id)?.references)
    }

    /// Entities whose cross-references point at `target`
    #[must_use]
    pub fn referrers(&self, target: EntityId) -> Vec<EntityId> {
        let unique: IndexSet<EntityId> = self
            .referrers
            .get(&target)
            .map(|set| set.iter().map(|(referrer, _)| *referrer).collect())
            .unwrap_or_default();
        unique.into_iter().collect()
    }

    // ------------------------------------------------------------------
    // Tree
    // ------------------------------------------------------------------

    /// Descriptor of an entity's type
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownEntity`] for unknown entities
    pub fn schema_of(&self, id: EntityId) -> Result<&Arc<TypeSchema>, ModelError> {
        Ok(&self.node(id)?.schema)
    }

    /// Type name of an entity
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownEntity`] for unknown entities
    pub fn type_name(&self, id: EntityId) -> Result<&str, ModelError> {
        Ok(self.node(id)?.schema.name())
    }

    /// # Errors
    /// Returns [`ModelError::UnknownEntity`] for unknown entities
    pub fn kind(&self, id: EntityId) -> Result<EntityKind, ModelError> {
        Ok(self.node(id)?.schema.kind())
    }

    /// Owner of an entity, `None` for the root
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownEntity`] for unknown entities
    pub fn owner(&self, id: EntityId) -> Result<Option<EntityId>, ModelError> {
        Ok(self.node(id)?.owner)
    }

    /// Collection key of an entity, `None` for roots and set members
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownEntity`] for unknown entities
    pub fn key(&self, id: EntityId) -> Result<Option<&Param>, ModelError> {
        Ok(self.node(id)?.key.as_ref())
    }

    /// Live construction parameters: `[owner]` or `[owner, key]`
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownEntity`] for unknown entities
    pub fn construction_parameter_objects(&self, id: EntityId) -> Result<Vec<Param>, ModelError> {
        Ok(self.node(id)?.params())
    }

    /// Members of one collection field, in collection order
    ///
    /// # Errors
    /// Returns an error for unknown entities or fields
    pub fn children(&self, id: EntityId, field: &str) -> Result<Vec<EntityId>, ModelError> {
        let node = self.node(id)?;
        let slot = node
            .schema
            .collection_slot(field)
            .ok_or_else(|| ModelError::unknown_field(node.schema.name(), field))?;
        Ok(node.collections[slot].members())
    }

    /// Member of a list or map collection stored under `key`
    ///
    /// # Errors
    /// Returns an error for unknown entities or fields
    pub fn child(&self, id: EntityId, field: &str, key: &Param) -> Result<Option<EntityId>, ModelError> {
        let node = self.node(id)?;
        let slot = node
            .schema
            .collection_slot(field)
            .ok_or_else(|| ModelError::unknown_field(node.schema.name(), field))?;
        Ok(node.collections[slot].get(key))
    }

    /// Members of every collection field, in declaration order
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownEntity`] for unknown entities
    pub fn all_children(&self, id: EntityId) -> Result<Vec<EntityId>, ModelError> {
        Ok(self.node(id)?.children().collect())
    }

    /// `start` and all its descendants, in pre-order
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownEntity`] if `start` is unknown
    pub fn walk(&self, start: EntityId) -> Result<Vec<EntityId>, ModelError> {
        self.node(start)?;
        let mut order = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else { continue };
            order.push(id);
            let mut children: Vec<EntityId> = node.children().collect();
            children.reverse();
            stack.extend(children);
        }
        Ok(order)
    }

    // ------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------

    /// Remove a child and its whole subtree
    ///
    /// Descendants are removed in pre-order. Each removed entity is notified
    /// and journaled before it is detached, children keyed by a removed
    /// entity are removed with it, and cross-references pointing at a removed
    /// entity are cleared. Removing an entity that is being or has been
    /// removed is a no-op.
    ///
    /// # Errors
    /// Returns [`ModelError::RootRemoval`] for the root and
    /// [`ModelError::UnknownEntity`] for ids this model never held
    pub fn remove(&mut self, id: EntityId) -> Result<(), ModelError> {
        if self.removed.contains(&id) {
            return Ok(());
        }
        let node = self.nodes.get(&id).ok_or(ModelError::UnknownEntity(id))?;
        if node.owner.is_none() {
            return Err(ModelError::RootRemoval(id));
        }
        if node.removing {
            return Ok(());
        }
        self.remove_subtree(id);
        Ok(())
    }

    /// Entities [`Model::remove`] would remove along with `id`, in removal order
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownEntity`] if `id` is not live
    pub fn removal_scope(&self, id: EntityId) -> Result<Vec<EntityId>, ModelError> {
        self.node(id)?;
        let mut scope = IndexSet::new();
        self.collect_removal(id, &mut scope);
        Ok(scope.into_iter().collect())
    }

    fn collect_removal(&self, id: EntityId, scope: &mut IndexSet<EntityId>) {
        let Some(node) = self.nodes.get(&id).filter(|n| !n.removing) else { return };
        if !scope.insert(id) {
            return;
        }
        for child in node.children() {
            self.collect_removal(child, scope);
        }
        if let Some(dependents) = self.keyed_by.get(&id) {
            for &dependent in dependents {
                self.collect_removal(dependent, scope);
            }
        }
    }

    fn remove_subtree(&mut self, id: EntityId) {
        let Some(node) = self.nodes.get_mut(&id) else { return };
        if node.removing {
            return;
        }
        node.removing = true;
        let tombstone = Tombstone {
            type_name: node.schema.name().to_string(),
            params: node.params(),
        };
        let children: Vec<EntityId> = node.children().collect();

        self.sink.notify_removed(id);
        if let Some(journal) = self.journal.as_mut() {
            if self.replaying {
                journal.forget(id);
            } else {
                journal.record_deleted(id, tombstone);
            }
        }

        for child in children {
            self.remove_subtree(child);
        }
        if let Some(dependents) = self.keyed_by.remove(&id) {
            for dependent in dependents {
                self.remove_subtree(dependent);
            }
        }
        self.untie_referrers(id);
        self.detach(id);
    }

    fn untie_referrers(&mut self, target: EntityId) {
        let Some(referrers) = self.referrers.remove(&target) else { return };
        for (referrer, slot) in referrers {
            let Some(node) = self.nodes.get_mut(&referrer) else { continue };
            if node.references.get(slot) != Some(&Some(target)) {
                continue;
            }
            node.references[slot] = None;
            if !node.removing {
                self.record(|journal| journal.record_changed(referrer));
            }
        }
    }

    fn detach(&mut self, id: EntityId) {
        if let Ok((owner, slot, key)) = self.owner_slot(id) {
            if let Some(owner_node) = self.nodes.get_mut(&owner) {
                owner_node.collections[slot].remove(key.as_ref(), id);
            }
        }
        let Some(node) = self.nodes.remove(&id) else { return };
        self.removed.insert(id);
        for (slot, target) in node.references.iter().enumerate() {
            if let Some(set) = target.and_then(|t| self.referrers.get_mut(&t)) {
                set.shift_remove(&(id, slot));
            }
        }
        if let Some(Param::Entity(key_entity)) = &node.key {
            if let Some(set) = self.keyed_by.get_mut(key_entity) {
                set.shift_remove(&id);
            }
        }
    }

    // ------------------------------------------------------------------
    // Journal and replay
    // ------------------------------------------------------------------

    fn record(&mut self, f: impl FnOnce(&mut LocalChanges)) {
        if self.replaying {
            return;
        }
        if let Some(journal) = self.journal.as_mut() {
            f(journal);
        }
    }

    /// Start journaling local changes; existing entries are kept
    pub fn enable_journal(&mut self) {
        self.journal.get_or_insert_with(LocalChanges::new);
    }

    /// Stop journaling and hand back what was pending
    pub fn disable_journal(&mut self) -> Option<LocalChanges> {
        self.journal.take()
    }

    #[inline]
    #[must_use]
    pub fn is_journaled(&self) -> bool {
        self.journal.is_some()
    }

    #[inline]
    #[must_use]
    pub fn local_changes(&self) -> Option<&LocalChanges> {
        self.journal.as_ref()
    }

    #[inline]
    pub fn local_changes_mut(&mut self) -> Option<&mut LocalChanges> {
        self.journal.as_mut()
    }

    /// Suppress journaling while replaying remote changes
    pub fn set_replaying(&mut self, replaying: bool) {
        self.replaying = replaying;
    }

    #[inline]
    #[must_use]
    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    /// Forward a change notification for `id` to the observer sink
    pub fn notify_changed(&self, id: EntityId) {
        self.sink.notify_changed(id);
    }
}
