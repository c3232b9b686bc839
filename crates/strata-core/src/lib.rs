//! Strata transaction manager
//!
//! Versions live entity models as independent workcopies that exchange
//! changes through one global, totally ordered commit log.
//!
//! # Core Concepts
//!
//! - [`TransactionManager`]: owns the repositories and the [`CommitLog`]
//! - [`Repository`]: a model, its remote baseline and its log position
//! - commit / pull / clone: publish local work, replay others' work, fork
//! - [`History`]: per-repository undo checkpoints built by folding commits
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strata_core::TransactionManager;
//! use strata_model::{Layout, Model, SchemaRegistry, TypeSchema, ValueKind};
//!
//! let registry = SchemaRegistry::builder()
//!     .register(TypeSchema::root("Song").collection("tracks", "Track", Layout::List))
//!     .register(TypeSchema::child("Track", "Song", "tracks").content("name", ValueKind::Text))
//!     .build()
//!     .unwrap();
//!
//! let manager = TransactionManager::new();
//! let model = Model::new(Arc::new(registry), "Song").unwrap();
//! let origin = manager.enable_transactions(model).unwrap();
//! let copy = manager.clone_repository(origin).unwrap();
//!
//! manager
//!     .with_model_mut(origin, |m| {
//!         let track = m.create_indexed_child(m.root(), "Track")?;
//!         m.set(track, "name", "bass")
//!     })
//!     .unwrap()
//!     .unwrap();
//! let commit = manager.commit(origin).unwrap().unwrap();
//! assert_eq!(commit.stats().creations, 1);
//!
//! manager.pull(copy).unwrap();
//! let tracks = manager
//!     .with_model(copy, |m| m.children(m.root(), "tracks").unwrap().len())
//!     .unwrap();
//! assert_eq!(tracks, 1);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod config;
mod error;
mod history;
mod log;
mod manager;
mod pull;
mod repository;

pub use config::TransactionConfig;
pub use error::{ConsistencyViolation, Result, TransactionError, UsageError};
pub use history::History;
pub use log::CommitLog;
pub use manager::TransactionManager;
pub use pull::PullStats;
pub use repository::Repository;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
