//! Observer sink
//!
//! The engine never stores listener state. It asks an [`ObserverSink`] for
//! the listeners of an entity and calls them at the points where a live graph
//! changes underneath its users: removal, and every mutation replayed by a
//! pull.

use crate::ids::EntityId;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// Receives change notifications for entities
pub trait EntityListener: Send + Sync {
    /// Entity content, references or child collections changed
    fn on_changed(&self, _entity: EntityId) {}

    /// Entity is being removed from its model
    fn on_removed(&self, _entity: EntityId) {}
}

/// Source of listeners for a given entity
pub trait ObserverSink: Send + Sync + Debug {
    /// Listeners registered for `entity`
    fn listeners(&self, entity: EntityId) -> Vec<Arc<dyn EntityListener>>;

    /// Call `on_changed` on every listener of `entity`
    fn notify_changed(&self, entity: EntityId) {
        for listener in self.listeners(entity) {
            listener.on_changed(entity);
        }
    }

    /// Call `on_removed` on every listener of `entity`
    fn notify_removed(&self, entity: EntityId) {
        for listener in self.listeners(entity) {
            listener.on_removed(entity);
        }
    }
}

/// Sink without listeners
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ObserverSink for NoopSink {
    fn listeners(&self, _entity: EntityId) -> Vec<Arc<dyn EntityListener>> {
        Vec::new()
    }
}

/// Listener table keyed by entity, plus listeners that watch everything
///
/// Entity ids are never reused, so the listeners of an entity are dropped
/// once they have been told it was removed.
#[derive(Default)]
pub struct ListenerRegistry {
    by_entity: DashMap<EntityId, Vec<Arc<dyn EntityListener>>>,
    global: RwLock<Vec<Arc<dyn EntityListener>>>,
}

impl ListenerRegistry {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen to one entity
    pub fn register(&self, entity: EntityId, listener: Arc<dyn EntityListener>) {
        self.by_entity.entry(entity).or_default().push(listener);
    }

    /// Listen to every entity
    pub fn register_global(&self, listener: Arc<dyn EntityListener>) {
        self.global.write().push(listener);
    }

    /// Drop the listeners of one entity
    pub fn unregister(&self, entity: EntityId) -> usize {
        self.by_entity
            .remove(&entity)
            .map_or(0, |(_, listeners)| listeners.len())
    }
}

impl Debug for ListenerRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("entities", &self.by_entity.len())
            .field("global", &self.global.read().len())
            .finish()
    }
}

impl ObserverSink for ListenerRegistry {
    fn listeners(&self, entity: EntityId) -> Vec<Arc<dyn EntityListener>> {
        let mut listeners = self.global.read().clone();
        if let Some(entry) = self.by_entity.get(&entity) {
            listeners.extend(entry.value().iter().cloned());
        }
        listeners
    }

    fn notify_removed(&self, entity: EntityId) {
        for listener in self.listeners(entity) {
            listener.on_removed(entity);
        }
        self.by_entity.remove(&entity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        changed: AtomicUsize,
        removed: AtomicUsize,
    }

    impl EntityListener for Counter {
        fn on_changed(&self, _entity: EntityId) {
            self.changed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_removed(&self, _entity: EntityId) {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn registry_routes_by_entity() {
        let registry = ListenerRegistry::new();
        let watched = EntityId::next();
        let other = EntityId::next();
        let counter = Arc::new(Counter::default());
        registry.register(watched, counter.clone());

        registry.notify_changed(watched);
        registry.notify_changed(other);
        registry.notify_removed(watched);

        assert_eq!(counter.changed.load(Ordering::SeqCst), 1);
        assert_eq!(counter.removed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removal_drops_entity_listeners() {
        let registry = ListenerRegistry::new();
        let removed = EntityId::next();
        let kept = EntityId::next();
        let counter = Arc::new(Counter::default());
        let global = Arc::new(Counter::default());
        registry.register(removed, counter.clone());
        registry.register(kept, counter.clone());
        registry.register_global(global.clone());

        registry.notify_removed(removed);
        registry.notify_changed(removed);
        assert_eq!(counter.removed.load(Ordering::SeqCst), 1);
        assert_eq!(counter.changed.load(Ordering::SeqCst), 0);
        assert_eq!(registry.unregister(removed), 0);
        assert_eq!(registry.unregister(kept), 1);

        // global listeners stay registered
        registry.notify_changed(kept);
        assert_eq!(global.changed.load(Ordering::SeqCst), 1);
        assert_eq!(global.removed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn global_listeners_see_everything() {
        let registry = ListenerRegistry::new();
        let counter = Arc::new(Counter::default());
        registry.register_global(counter.clone());

        registry.notify_changed(EntityId::next());
        registry.notify_changed(EntityId::next());

        assert_eq!(counter.changed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unregister_reports_count() {
        let registry = ListenerRegistry::new();
        let entity = EntityId::next();
        registry.register(entity, Arc::new(Counter::default()));
        registry.register(entity, Arc::new(Counter::default()));
        assert_eq!(registry.unregister(entity), 2);
        assert!(NoopSink.listeners(entity).is_empty());
    }
}
