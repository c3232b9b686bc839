//! Immutable field values and construction parameters
//!
//! [`Value`] is the only thing a content field may hold. It is immutable and
//! hashable, so it can also serve as a collection key. [`Param`] is one live
//! construction parameter: an entity (owner or keying entity) or a plain value.

use crate::ids::EntityId;
use crate::schema::ValueKind;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Immutable content value
///
/// Floats compare and hash by bit pattern so that `Value` is a lawful
/// `Eq + Hash` key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Value {
    /// Absent value; accepted by every content field
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// Shared immutable text
    Text(Arc<str>),
}

impl Value {
    /// Kind of this value (`None` for `Null`)
    #[inline]
    #[must_use]
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(ValueKind::Bool),
            Self::Int(_) => Some(ValueKind::Int),
            Self::Float(_) => Some(ValueKind::Float),
            Self::Text(_) => Some(ValueKind::Text),
        }
    }

    /// Whether a field of `kind` may hold this value
    #[inline]
    #[must_use]
    pub fn fits(&self, kind: ValueKind) -> bool {
        self.kind().map_or(true, |k| k == kind)
    }

    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[inline]
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Int(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::Text(v) => v.hash(state),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(Arc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(Arc::from(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// One live construction parameter
///
/// Children are constructed from `[owner]` or `[owner, key]`; keys are either
/// plain values, ordinals (`Value::Int`) or other entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Param {
    /// Another live entity
    Entity(EntityId),
    /// Immutable value
    Value(Value),
}

impl Param {
    /// Entity carried by this parameter, if any
    #[inline]
    #[must_use]
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            Self::Entity(id) => Some(*id),
            Self::Value(_) => None,
        }
    }

    /// Value carried by this parameter, if any
    #[inline]
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Entity(_) => None,
            Self::Value(v) => Some(v),
        }
    }
}

impl From<EntityId> for Param {
    fn from(id: EntityId) -> Self {
        Self::Entity(id)
    }
}

impl From<Value> for Param {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl Display for Param {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(id) => write!(f, "{id}"),
            Self::Value(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn float_values_are_hashable_keys() {
        let mut set = HashSet::new();
        set.insert(Value::Float(0.5));
        set.insert(Value::Float(0.5));
        set.insert(Value::Float(-0.0));
        set.insert(Value::Float(0.0));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn null_fits_every_kind() {
        assert!(Value::Null.fits(ValueKind::Int));
        assert!(Value::Null.fits(ValueKind::Text));
        assert!(Value::from(3).fits(ValueKind::Int));
        assert!(!Value::from(3).fits(ValueKind::Float));
    }

    #[test]
    fn option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("a")).as_text(), Some("a"));
    }

    #[test]
    fn value_serializes_through_serde() {
        let json = serde_json::to_string(&Value::from(69)).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Int(69));
    }
}
