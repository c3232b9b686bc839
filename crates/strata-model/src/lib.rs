//! Strata live entity model
//!
//! Live, strongly-typed entity trees that the transactional layers version.
//!
//! # Core Concepts
//!
//! - [`SchemaRegistry`]: validated per-type descriptors ([`TypeSchema`])
//! - [`Model`]: arena of live entities addressed by [`EntityId`]
//! - [`Value`] / [`Param`]: immutable content values and construction parameters
//! - [`LocalChanges`]: created / changed / deleted journal since the last commit
//! - [`ObserverSink`]: where change and removal notifications go
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strata_model::{Layout, Model, SchemaRegistry, TypeSchema, ValueKind};
//!
//! let registry = SchemaRegistry::builder()
//!     .register(TypeSchema::root("Song").collection("tracks", "Track", Layout::List))
//!     .register(TypeSchema::child("Track", "Song", "tracks").content("name", ValueKind::Text))
//!     .build()
//!     .unwrap();
//!
//! let mut model = Model::new(Arc::new(registry), "Song").unwrap();
//! let track = model.create_indexed_child(model.root(), "Track").unwrap();
//! model.set(track, "name", "bass").unwrap();
//! assert_eq!(model.get(track, "name").unwrap().as_text(), Some("bass"));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod ids;
mod journal;
mod model;
mod observer;
mod schema;
mod value;

pub use error::ModelError;
pub use ids::{EntityId, RepositoryId};
pub use journal::{EntityStatus, LocalChanges, Tombstone};
pub use model::Model;
pub use observer::{EntityListener, ListenerRegistry, NoopSink, ObserverSink};
pub use schema::{
    CollectionField, ContentField, EntityKind, KeyKind, Layout, ParamKind, Placement,
    ReferenceField, SchemaError, SchemaRegistry, SchemaRegistryBuilder, TypeSchema, ValueKind,
};
pub use value::{Param, Value};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
