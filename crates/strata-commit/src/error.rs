//! Commit construction errors

use strata_model::{EntityId, ModelError};
use strata_state::{ObjectId, StateError};

/// Reasons a commit cannot be built from a local change journal
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommitError {
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Journaled deletion of an entity the remote never tracked
    #[error("deleted entity {0} has no state in the remote")]
    UntrackedDeletion(EntityId),

    /// Journaled change of an entity the remote never tracked
    #[error("changed entity {0} has no state in the remote")]
    UntrackedChange(EntityId),

    /// Roots are only ever change targets
    #[error("root entity {0} cannot be created or deleted by a commit")]
    RootNotCommittable(EntityId),

    /// Tombstone parameters disagree with the tracked state
    #[error("construction parameters of {entity} do not match state {object}")]
    ParameterMismatch { entity: EntityId, object: ObjectId },
}
