//! Immutable object states
//!
//! An [`ObjectState`] is a snapshot of one entity: its content values, its
//! cross-references and its construction parameters. References and object
//! parameters name other states by [`ObjectId`] and are resolved through a
//! [`Remote`](crate::Remote), so cyclic references need no shared ownership
//! and older states keep resolving after their targets moved on.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_model::Value;

static NEXT_OBJECT: AtomicU64 = AtomicU64::new(1);
static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// Identity of a versioned object, shared by all its successive states
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Allocate the next identity
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_OBJECT.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "o{}", self.0)
    }
}

/// Distinguishes successive states of the same object
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateVersion(u64);

impl StateVersion {
    fn next() -> Self {
        Self(NEXT_VERSION.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for StateVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Snapshot of one construction parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateParam {
    /// Another versioned object (owner or keying entity)
    Object(ObjectId),
    /// Immutable value (value key or list ordinal)
    Value(Value),
}

impl StateParam {
    #[inline]
    #[must_use]
    pub fn object(&self) -> Option<ObjectId> {
        match self {
            Self::Object(id) => Some(*id),
            Self::Value(_) => None,
        }
    }
}

/// Construction parameter snapshots: `[owner]` or `[owner, key]`
pub type StateParams = SmallVec<[StateParam; 2]>;

/// Shared handle to an immutable state
pub type StateRef = Arc<ObjectState>;

/// Immutable snapshot of one entity
///
/// Equality and hashing use `(id, version)` only: two states with identical
/// field values for different entities are different states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectState {
    id: ObjectId,
    version: StateVersion,
    type_name: Arc<str>,
    params: StateParams,
    content: Vec<Value>,
    references: Vec<Option<ObjectId>>,
}

impl ObjectState {
    pub(crate) fn new(
        id: ObjectId,
        type_name: Arc<str>,
        params: StateParams,
        content: Vec<Value>,
        references: Vec<Option<ObjectId>>,
    ) -> Self {
        Self {
            id,
            version: StateVersion::next(),
            type_name,
            params,
            content,
            references,
        }
    }

    /// Next version of this object with other reference targets
    pub(crate) fn with_references(&self, references: Vec<Option<ObjectId>>) -> Self {
        Self::new(
            self.id,
            Arc::clone(&self.type_name),
            self.params.clone(),
            self.content.clone(),
            references,
        )
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> StateVersion {
        self.version
    }

    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[inline]
    #[must_use]
    pub fn params(&self) -> &[StateParam] {
        &self.params
    }

    /// Content values, by slot
    #[inline]
    #[must_use]
    pub fn content(&self) -> &[Value] {
        &self.content
    }

    /// Cross-reference targets, by slot
    #[inline]
    #[must_use]
    pub fn references(&self) -> &[Option<ObjectId>] {
        &self.references
    }

    /// Owner object, `None` for roots
    #[must_use]
    pub fn owner(&self) -> Option<ObjectId> {
        self.params.first().and_then(StateParam::object)
    }

    /// Every object this state depends on: object parameters, then references
    pub fn dependencies(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.params
            .iter()
            .filter_map(StateParam::object)
            .chain(self.references.iter().flatten().copied())
    }

    /// Same fields as `other`, regardless of identity
    #[must_use]
    pub fn same_fields(&self, other: &Self) -> bool {
        self.type_name == other.type_name
            && self.params == other.params
            && self.content == other.content
            && self.references == other.references
    }
}

impl PartialEq for ObjectState {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.version == other.version
    }
}

impl Eq for ObjectState {}

impl Hash for ObjectState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.version.hash(state);
    }
}

impl Display for ObjectState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}@{})", self.type_name, self.id, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn state(id: ObjectId, pitch: i64) -> ObjectState {
        ObjectState::new(
            id,
            Arc::from("Note"),
            smallvec![StateParam::Object(ObjectId::next())],
            vec![Value::Int(pitch)],
            vec![None],
        )
    }

    #[test]
    fn identity_not_content_decides_equality() {
        let a = state(ObjectId::next(), 69);
        let b = state(ObjectId::next(), 69);
        assert_ne!(a, b);
        assert!(a.content() == b.content());
    }

    #[test]
    fn successive_states_share_id_but_differ() {
        let id = ObjectId::next();
        let before = state(id, 69);
        let after = state(id, 30);
        assert_eq!(before.id(), after.id());
        assert!(before.version() < after.version());
        assert_ne!(before, after);
    }

    #[test]
    fn dependencies_list_params_then_references() {
        let owner = ObjectId::next();
        let tie = ObjectId::next();
        let s = ObjectState::new(
            ObjectId::next(),
            Arc::from("Note"),
            smallvec![StateParam::Object(owner)],
            vec![],
            vec![Some(tie), None],
        );
        assert_eq!(s.dependencies().collect::<Vec<_>>(), vec![owner, tie]);
        assert_eq!(s.owner(), Some(owner));
    }

    #[test]
    fn state_serializes_for_inspection() {
        let s = state(ObjectId::next(), 42);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["type_name"], "Note");
        assert_eq!(json["content"][0]["Int"], 42);
    }
}
