//! Commit records and commits
//!
//! [`CommitRecords`] hold the three record tables of one diff, keyed by
//! object id in dependency-safe order. A [`Commit`] shares its records
//! behind an `Arc` together with a [`Direction`], so an inverted view costs
//! one pointer copy.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_model::RepositoryId;
use strata_state::{ObjectId, StateRef};

static NEXT_COMMIT: AtomicU64 = AtomicU64::new(1);

/// Position of a commit in the global log
///
/// Allocate only while holding the log lock, so that allocation order and
/// append order agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommitId(u64);

impl CommitId {
    /// Position before the first commit
    pub const ZERO: Self = Self(0);

    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_COMMIT.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for CommitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Before and after states of one changed object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub before: StateRef,
    pub after: StateRef,
}

/// Creation, deletion and change records of one diff
///
/// Creation and deletion states carry their construction parameters.
/// Deletion states are the pre-commit states, so every record table can be
/// replayed backwards.
#[derive(Debug, Clone, Default)]
pub struct CommitRecords {
    creations: IndexMap<ObjectId, StateRef>,
    deletions: IndexMap<ObjectId, StateRef>,
    changes: IndexMap<ObjectId, Change>,
}

impl CommitRecords {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_creation(&mut self, state: StateRef) {
        self.creations.insert(state.id(), state);
    }

    pub fn insert_deletion(&mut self, state: StateRef) {
        self.deletions.insert(state.id(), state);
    }

    pub fn insert_change(&mut self, before: StateRef, after: StateRef) {
        self.changes.insert(before.id(), Change { before, after });
    }

    #[inline]
    #[must_use]
    pub fn creations(&self) -> &IndexMap<ObjectId, StateRef> {
        &self.creations
    }

    #[inline]
    #[must_use]
    pub fn deletions(&self) -> &IndexMap<ObjectId, StateRef> {
        &self.deletions
    }

    #[inline]
    #[must_use]
    pub fn changes(&self) -> &IndexMap<ObjectId, Change> {
        &self.changes
    }

    pub(crate) fn creations_mut(&mut self) -> &mut IndexMap<ObjectId, StateRef> {
        &mut self.creations
    }

    pub(crate) fn deletions_mut(&mut self) -> &mut IndexMap<ObjectId, StateRef> {
        &mut self.deletions
    }

    pub(crate) fn changes_mut(&mut self) -> &mut IndexMap<ObjectId, Change> {
        &mut self.changes
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creations.is_empty() && self.deletions.is_empty() && self.changes.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CommitStats {
        CommitStats {
            creations: self.creations.len(),
            changes: self.changes.len(),
            deletions: self.deletions.len(),
        }
    }
}

/// Record counts of a commit, for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStats {
    pub creations: usize,
    pub changes: usize,
    pub deletions: usize,
}

impl CommitStats {
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.creations + self.changes + self.deletions
    }
}

impl Display for CommitStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+{} ~{} -{}",
            self.creations, self.changes, self.deletions
        )
    }
}

/// Whether a commit replays its records as built or backwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    /// Creations and deletions swap, changes run after -> before
    Inverse,
}

impl Direction {
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Forward => Self::Inverse,
            Self::Inverse => Self::Forward,
        }
    }
}

/// Immutable, totally ordered diff between two remote states
#[derive(Debug, Clone)]
pub struct Commit {
    id: CommitId,
    origin: Option<RepositoryId>,
    records: Arc<CommitRecords>,
    direction: Direction,
}

impl Commit {
    #[must_use]
    pub fn new(id: CommitId, records: CommitRecords) -> Self {
        Self {
            id,
            origin: None,
            records: Arc::new(records),
            direction: Direction::Forward,
        }
    }

    /// Repository the commit was published from
    #[must_use]
    pub fn with_origin(mut self, origin: RepositoryId) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Same view under another id
    #[must_use]
    pub fn with_id(&self, id: CommitId) -> Self {
        Self {
            id,
            ..self.clone()
        }
    }

    /// Inverted view under a fresh id, sharing the records
    #[must_use]
    pub fn inverted(&self, id: CommitId) -> Self {
        Self {
            id,
            origin: self.origin,
            records: Arc::clone(&self.records),
            direction: self.direction.flipped(),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> CommitId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn origin(&self) -> Option<RepositoryId> {
        self.origin
    }

    #[inline]
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Underlying records, as built
    #[inline]
    #[must_use]
    pub fn records(&self) -> &Arc<CommitRecords> {
        &self.records
    }

    fn creation_table(&self) -> &IndexMap<ObjectId, StateRef> {
        match self.direction {
            Direction::Forward => &self.records.creations,
            Direction::Inverse => &self.records.deletions,
        }
    }

    fn deletion_table(&self) -> &IndexMap<ObjectId, StateRef> {
        match self.direction {
            Direction::Forward => &self.records.deletions,
            Direction::Inverse => &self.records.creations,
        }
    }

    /// States to create, in dependency-safe order
    pub fn creations(&self) -> impl Iterator<Item = &StateRef> + '_ {
        self.creation_table().values()
    }

    /// States to delete, owners before their children
    pub fn deletions(&self) -> impl Iterator<Item = &StateRef> + '_ {
        self.deletion_table().values()
    }

    /// `(before, after)` pairs of changed objects
    pub fn changes(&self) -> impl Iterator<Item = (&StateRef, &StateRef)> + '_ {
        let direction = self.direction;
        self.records.changes.values().map(move |change| match direction {
            Direction::Forward => (&change.before, &change.after),
            Direction::Inverse => (&change.after, &change.before),
        })
    }

    /// Creation record of `id`, if any
    #[must_use]
    pub fn creation(&self, id: ObjectId) -> Option<&StateRef> {
        self.creation_table().get(&id)
    }

    /// Deletion record of `id`, if any
    #[must_use]
    pub fn deletion(&self, id: ObjectId) -> Option<&StateRef> {
        self.deletion_table().get(&id)
    }

    /// Change record of `id` as `(before, after)`, if any
    #[must_use]
    pub fn change(&self, id: ObjectId) -> Option<(&StateRef, &StateRef)> {
        self.records.changes.get(&id).map(|change| match self.direction {
            Direction::Forward => (&change.before, &change.after),
            Direction::Inverse => (&change.after, &change.before),
        })
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record counts as seen through this view
    #[must_use]
    pub fn stats(&self) -> CommitStats {
        let stats = self.records.stats();
        match self.direction {
            Direction::Forward => stats,
            Direction::Inverse => CommitStats {
                creations: stats.deletions,
                changes: stats.changes,
                deletions: stats.creations,
            },
        }
    }
}

impl Display for Commit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "commit {} ({})", self.id, self.stats())
    }
}
