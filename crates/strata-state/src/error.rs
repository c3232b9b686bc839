//! Errors raised by remote table operations

use crate::state::{ObjectId, StateVersion};
use strata_model::{EntityId, ModelError};

/// Remote lookup and update failures
///
/// All of these mean the remote and the live graph disagree; none is
/// recoverable by retrying.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StateError {
    /// Entity has no state in this remote
    #[error("entity {0} is not tracked by this remote")]
    UnknownEntity(EntityId),

    /// Construction parameter entity has no state in this remote
    #[error("construction parameter {param} of {entity} is not tracked by this remote")]
    UnresolvedParameter { entity: EntityId, param: EntityId },

    /// Cross-reference target is not a live entity
    #[error("{entity} references {target}, which is not live")]
    DanglingReference { entity: EntityId, target: EntityId },

    /// Update based on a state that is no longer current
    #[error("state {id}@{expected} is stale, current version is {found}")]
    StaleState {
        id: ObjectId,
        expected: StateVersion,
        found: StateVersion,
    },

    /// No state with this object id
    #[error("unknown object {0}")]
    UnknownObject(ObjectId),

    /// Object id already present
    #[error("object {0} is already tracked")]
    DuplicateObject(ObjectId),

    /// Entity already mapped to another object
    #[error("entity {entity} is already tracked as {existing}")]
    EntityAlreadyTracked { entity: EntityId, existing: ObjectId },

    /// Live model access failed
    #[error(transparent)]
    Model(#[from] ModelError),
}
