//! Error taxonomy of the transaction manager
//!
//! Schema violations never reach the manager: they are
//! [`SchemaError`](strata_model::SchemaError)s returned by the registry
//! builder, before any model exists. Manager operations fail with one of:
//! - usage errors, raised immediately for operations that cannot apply
//! - consistency violations, fatal: the target graph may be left partially
//!   updated and must not be used further

use strata_commit::{CommitError, CommitId};
use strata_model::{EntityId, ModelError, RepositoryId};
use strata_state::{ObjectId, StateError};

/// Main transaction error type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransactionError {
    /// Operation not applicable in the current configuration
    #[error("usage error: {0}")]
    Usage(#[from] UsageError),

    /// Remote, model and log disagree
    #[error("consistency violation: {0}")]
    Consistency(#[from] ConsistencyViolation),
}

impl TransactionError {
    /// Whether the caller asked for something that cannot apply
    #[inline]
    #[must_use]
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }

    /// Whether the affected repository is in an undefined state
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Consistency(_))
    }
}

impl From<CommitError> for TransactionError {
    fn from(err: CommitError) -> Self {
        Self::Consistency(ConsistencyViolation::Commit(err))
    }
}

impl From<StateError> for TransactionError {
    fn from(err: StateError) -> Self {
        Self::Consistency(ConsistencyViolation::State(err))
    }
}

/// Caller errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UsageError {
    /// No repository for this id
    #[error("transactions are not enabled for {0}")]
    TransactionsNotEnabled(RepositoryId),

    /// Root already versioned
    #[error("transactions are already enabled for {0}")]
    AlreadyEnabled(RepositoryId),

    /// A second model tried to become the initial root
    #[error("initial repository already exists: {0}")]
    InitialRootExists(RepositoryId),

    /// Another handle to the repository is still alive
    #[error("repository {0} is still in use")]
    RepositoryBusy(RepositoryId),

    /// Undo or redo without history
    #[error("history is not enabled for {0}")]
    HistoryNotEnabled(RepositoryId),

    /// Local mutation through the manager failed
    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

/// Fatal disagreement between a repository and the log
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConsistencyViolation {
    /// Pull needs a state the remote does not hold
    #[error("commit {commit}: object {object} is not tracked by {repository}")]
    MissingState {
        repository: RepositoryId,
        commit: CommitId,
        object: ObjectId,
    },

    /// Tracked object whose live entity is gone without a pending local deletion
    #[error("commit {commit}: entity {entity} of object {object} is not live")]
    MissingEntity {
        commit: CommitId,
        object: ObjectId,
        entity: EntityId,
    },

    /// Cross-reference target unresolved after a full pull
    #[error("commit {commit}: reference of {object} to {target} cannot be linked")]
    UnresolvedReference {
        commit: CommitId,
        object: ObjectId,
        target: ObjectId,
    },

    /// Creation parameter neither tracked nor created by the commit
    #[error("commit {commit}: parameter {parameter} of {object} cannot be resolved")]
    UnresolvedParameter {
        commit: CommitId,
        object: ObjectId,
        parameter: ObjectId,
    },

    /// Creation of an object the repository already tracks
    #[error("commit {commit}: object {object} already exists")]
    DuplicateObject { commit: CommitId, object: ObjectId },

    /// Commit asked to create or delete a root
    #[error("commit {commit}: object {object} is a root")]
    RootRecord { commit: CommitId, object: ObjectId },

    #[error(transparent)]
    Commit(CommitError),

    #[error(transparent)]
    State(StateError),

    #[error("model error during replay: {0}")]
    Model(ModelError),
}

/// Result type for transaction operations
pub type Result<T, E = TransactionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_are_classified() {
        let repo = RepositoryId::of_root(EntityId::next());
        let usage: TransactionError = UsageError::HistoryNotEnabled(repo).into();
        assert!(usage.is_usage());
        assert!(!usage.is_fatal());

        let fatal: TransactionError = ConsistencyViolation::DuplicateObject {
            commit: CommitId::ZERO,
            object: strata_state::ObjectId::next(),
        }
        .into();
        assert!(fatal.is_fatal());

        let state: TransactionError = StateError::UnknownEntity(EntityId::next()).into();
        assert!(state.is_fatal());
    }
}
