//! Error types for live model operations

use crate::ids::EntityId;
use crate::schema::{SchemaError, ValueKind};
use crate::value::{Param, Value};

/// Errors raised by [`Model`](crate::Model) operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// Schema lookup failed
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Entity is not (or no longer) part of this model
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),

    /// Type has no field of that name or slot
    #[error("type '{type_name}' has no field '{field}'")]
    UnknownField { type_name: String, field: String },

    /// Content value does not match the declared kind
    #[error("field '{type_name}.{field}' expects {expected}, got {actual}")]
    TypeMismatch {
        type_name: String,
        field: String,
        expected: ValueKind,
        actual: Value,
    },

    /// Reference target has the wrong type
    #[error("reference '{type_name}.{field}' expects '{expected}', got '{actual}'")]
    ReferenceTypeMismatch {
        type_name: String,
        field: String,
        expected: String,
        actual: String,
    },

    /// Model constructed from a non-root type
    #[error("type '{0}' is not a root type")]
    NotARoot(String),

    /// Attempt to remove the root entity
    #[error("root entity {0} cannot be removed")]
    RootRemoval(EntityId),

    /// Construction parameters do not match the declared ones
    #[error("invalid construction parameters for '{type_name}': {reason}")]
    ParameterMismatch { type_name: String, reason: String },

    /// Collection already holds a child under that key
    #[error("collection '{field}' of {owner} already holds key {key}")]
    DuplicateKey {
        owner: EntityId,
        field: String,
        key: Param,
    },
}

impl ModelError {
    pub(crate) fn parameter_mismatch(type_name: &str, reason: impl Into<String>) -> Self {
        Self::ParameterMismatch {
            type_name: type_name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unknown_field(type_name: &str, field: impl Into<String>) -> Self {
        Self::UnknownField {
            type_name: type_name.to_string(),
            field: field.into(),
        }
    }
}
