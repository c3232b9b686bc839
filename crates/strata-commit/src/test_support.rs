use std::sync::Arc;
use strata_model::{EntityId, KeyKind, Layout, Model, SchemaRegistry, TypeSchema, ValueKind};
use strata_state::Remote;

pub(crate) fn registry() -> Arc<SchemaRegistry> {
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
                .collection("markers", "Marker", Layout::Map(KeyKind::Value(ValueKind::Text))),
        )
        .register(
            TypeSchema::child("Note", "Track", "notes")
                .content("pitch", ValueKind::Int)
                .reference("tie", "Note"),
        )
        .register(TypeSchema::child("Marker", "Track", "markers").content("label", ValueKind::Text))
        .build()
        .unwrap();
    Arc::new(registry)
}

/// Journaled song whose root is already tracked by the returned remote
pub(crate) fn journaled_song() -> (Model, Remote) {
    let mut model = Model::new(registry(), "Song").unwrap();
    let mut remote = Remote::new();
    remote.create_object_state(&model, model.root()).unwrap();
    model.enable_journal();
    (model, remote)
}

pub(crate) fn track_with_note(model: &mut Model) -> (EntityId, EntityId) {
    let root = model.root();
    let track = model.create_indexed_child(root, "Track").unwrap();
    let note = model.create_child(track, "Note").unwrap();
    (track, note)
}
