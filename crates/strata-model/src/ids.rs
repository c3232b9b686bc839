//! Identity primitives
//!
//! Provides [`EntityId`], the process-wide identity of a live entity, and
//! [`RepositoryId`], the identity of the workcopy anchored at a root entity.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ENTITY: AtomicU64 = AtomicU64::new(1);

/// Identity of one live entity
///
/// Allocated from a process-wide strictly monotonic counter. Never reused,
/// never derived from content. Cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Allocate the next identity
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_ENTITY.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw counter value
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Identity of a repository (one workcopy)
///
/// A repository is keyed by the id of the root entity it versions, so every
/// operation addressed "to a root" resolves without any extra registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepositoryId(EntityId);

impl RepositoryId {
    /// Repository id for the model anchored at `root`
    #[inline]
    #[must_use]
    pub const fn of_root(root: EntityId) -> Self {
        Self(root)
    }

    /// Root entity of the repository
    #[inline]
    #[must_use]
    pub const fn root(self) -> EntityId {
        self.0
    }
}

impl Display for RepositoryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "repo:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ids_strictly_increase() {
        let a = EntityId::next();
        let b = EntityId::next();
        let c = EntityId::next();
        assert!(a < b && b < c);
    }

    #[test]
    fn repository_id_wraps_root() {
        let root = EntityId::next();
        let repo = RepositoryId::of_root(root);
        assert_eq!(repo.root(), root);
        assert_eq!(repo.to_string(), format!("repo:{root}"));
    }
}
