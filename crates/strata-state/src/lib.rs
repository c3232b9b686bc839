//! Strata object states
//!
//! Immutable snapshots of live entities and the per-repository table that
//! maps each live entity to its last agreed snapshot.
//!
//! # Overview
//!
//! - **ObjectState**: content values, references and construction parameters
//!   of one entity at one point in time, identified by `(ObjectId, StateVersion)`
//! - **Remote**: bijective `EntityId <-> ObjectId` table holding the current
//!   state of every tracked entity
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strata_model::{Model, SchemaRegistry, TypeSchema, ValueKind};
//! use strata_state::Remote;
//!
//! let registry = SchemaRegistry::builder()
//!     .register(TypeSchema::root("Song").content("title", ValueKind::Text))
//!     .build()
//!     .unwrap();
//! let mut model = Model::new(Arc::new(registry), "Song").unwrap();
//! model.set(model.root(), "title", "Intro").unwrap();
//!
//! let mut remote = Remote::new();
//! let state = remote.create_object_state(&model, model.root()).unwrap();
//! assert_eq!(state.content()[0].as_text(), Some("Intro"));
//! assert_eq!(remote.entity(state.id()), Some(model.root()));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod remote;
mod state;

pub use error::StateError;
pub use remote::Remote;
pub use state::{ObjectId, ObjectState, StateParam, StateParams, StateRef, StateVersion};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
