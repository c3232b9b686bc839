//! Strata commits
//!
//! Invertible diffs between two remote states.
//!
//! # Core Concepts
//!
//! - [`CommitBuilder`]: turns a local change journal into [`CommitRecords`]
//! - [`Commit`]: records shared behind an `Arc`, viewed forward or inverted
//! - [`CommitRecords::absorb`] / [`Commit::merge`]: folding for undo checkpoints
//! - [`CommitId`]: total order of the global log

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod builder;
mod commit;
mod error;
mod merge;

#[cfg(test)]
mod test_support;

pub use builder::CommitBuilder;
pub use commit::{Change, Commit, CommitId, CommitRecords, CommitStats, Direction};
pub use error::CommitError;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
