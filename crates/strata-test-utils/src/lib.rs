//! Testing utilities for the Strata workspace
//!
//! Shared schema fixture, model builders and convergence assertions.

#![allow(missing_docs)]

use std::sync::Arc;
use strata_core::{Repository, TransactionConfig, TransactionManager};
use strata_model::{
    EntityId, KeyKind, Layout, Model, RepositoryId, SchemaRegistry, TypeSchema, Value, ValueKind,
};
use strata_state::ObjectId;

/// Song / Track / Note / Marker / Accent schema
///
/// - `Song` (root): `title`, list `tracks`, reference `solo` to a track
/// - `Track`: `name`, set `notes`, text-keyed `markers`, note-keyed `accents`
/// - `Note`: `pitch`, reference `tie` to another note
/// - `Marker`: `label`
/// - `Accent`: `strength`, keyed by a note of the same track
pub fn music_registry() -> Arc<SchemaRegistry> {
    let registry = SchemaRegistry::builder()
        .register(
            TypeSchema::root("Song")
                .content("title", ValueKind::Text)
                .collection("tracks", "Track", Layout::List)
                .reference("solo", "Track"),
        )
        .register(
            TypeSchema::child("Track", "Song", "tracks")
                .content("name", ValueKind::Text)
                .collection("notes", "Note", Layout::Set)
                .collection("markers", "Marker", Layout::Map(KeyKind::Value(ValueKind::Text)))
                .collection("accents", "Accent", Layout::Map(KeyKind::Entity("Note".into()))),
        )
        .register(
            TypeSchema::child("Note", "Track", "notes")
                .content("pitch", ValueKind::Int)
                .reference("tie", "Note"),
        )
        .register(TypeSchema::child("Marker", "Track", "markers").content("label", ValueKind::Text))
        .register(TypeSchema::child("Accent", "Track", "accents").content("strength", ValueKind::Int))
        .build()
        .unwrap();
    Arc::new(registry)
}

pub fn new_song() -> Model {
    Model::new(music_registry(), "Song").unwrap()
}

pub fn add_track(model: &mut Model, name: &str) -> EntityId {
    let root = model.root();
    let track = model.create_indexed_child(root, "Track").unwrap();
    model.set(track, "name", name).unwrap();
    track
}

pub fn add_note(model: &mut Model, track: EntityId, pitch: i64) -> EntityId {
    let note = model.create_child(track, "Note").unwrap();
    model.set(note, "pitch", pitch).unwrap();
    note
}

pub fn add_marker(model: &mut Model, track: EntityId, key: &str, label: &str) -> EntityId {
    let marker = model.create_keyed_child(track, "Marker", Value::from(key)).unwrap();
    model.set(marker, "label", label).unwrap();
    marker
}

pub fn add_accent(model: &mut Model, track: EntityId, note: EntityId, strength: i64) -> EntityId {
    let accent = model.create_keyed_child(track, "Accent", note).unwrap();
    model.set(accent, "strength", strength).unwrap();
    accent
}

/// Manager with an initial song repository and a clone of it
pub fn manager_with_clone(config: TransactionConfig) -> (TransactionManager, RepositoryId, RepositoryId) {
    let manager = TransactionManager::with_config(config);
    let origin = manager.enable_transactions(new_song()).unwrap();
    let copy = manager.clone_repository(origin).unwrap();
    (manager, origin, copy)
}

/// Pitch of every note in a repository, sorted
pub fn pitches(manager: &TransactionManager, repo: RepositoryId) -> Vec<i64> {
    manager
        .with_model(repo, |m| {
            let mut out: Vec<i64> = m
                .walk(m.root())
                .unwrap()
                .into_iter()
                .filter(|&e| m.type_name(e).unwrap() == "Note")
                .map(|e| m.get(e, "pitch").unwrap().as_int().unwrap())
                .collect();
            out.sort_unstable();
            out
        })
        .unwrap()
}

/// Install a fmt subscriber honouring `RUST_LOG`; repeated calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One tracked entity, described through object ids only
#[derive(Debug, Clone, PartialEq)]
pub struct EntityOutline {
    pub object: ObjectId,
    pub type_name: String,
    pub owner: Option<ObjectId>,
    pub content: Vec<Value>,
    pub references: Vec<Option<ObjectId>>,
}

/// Live tree of a repository in object id order
///
/// Panics on live entities without a tracked state.
pub fn outline(repository: &Repository) -> Vec<EntityOutline> {
    let model = repository.model();
    let remote = repository.remote();
    let object = |entity: EntityId| {
        remote
            .key(entity)
            .unwrap_or_else(|| panic!("{entity} is live but not tracked"))
    };

    let mut out: Vec<EntityOutline> = model
        .walk(model.root())
        .unwrap()
        .into_iter()
        .map(|entity| EntityOutline {
            object: object(entity),
            type_name: model.type_name(entity).unwrap().to_string(),
            owner: model.owner(entity).unwrap().map(object),
            content: model.content_values(entity).unwrap().to_vec(),
            references: model
                .reference_slots(entity)
                .unwrap()
                .iter()
                .map(|target| target.map(object))
                .collect(),
        })
        .collect();
    out.sort_by_key(|e| e.object);
    out
}

/// Assert two repositories hold the same graph and neither has pending work
pub fn assert_converged(manager: &TransactionManager, a: RepositoryId, b: RepositoryId) {
    let a = manager.repository(a).unwrap();
    let b = manager.repository(b).unwrap();
    let (a, b) = (a.lock(), b.lock());
    assert!(!a.has_local_changes(), "{} has pending changes", a.id());
    assert!(!b.has_local_changes(), "{} has pending changes", b.id());
    assert_eq!(a.remote().len(), b.remote().len(), "tracked object counts differ");
    pretty_assertions::assert_eq!(outline(&a), outline(&b));
}
