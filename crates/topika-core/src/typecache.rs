//! # Type Cache
//!
//! In-memory store of resolved type definitions, keyed by type URI.
//!
//! Lifecycle: populated lazily on first access; invalidated explicitly on
//! type update; never time-expired. Readers share `Arc`-wrapped definitions
//! and never mutate cached entries in place; an invalidated entry is removed
//! and reloaded, not patched.
//!
//! The cache map is guarded by a single mutex so invalidation is atomic with
//! respect to concurrent `get`: reads may run concurrently, cache writes are
//! mutually exclusive with reads of the same key. No operation here
//! suspends; the lock is only held across an in-memory lookup or a
//! synchronous load.

use crate::storage::GraphStorage;
use crate::typedef::{TypeDef, load_type_def};
use crate::types::TopikaError;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cache of resolved type definitions.
#[derive(Debug, Default)]
pub struct TypeCache {
    inner: Mutex<BTreeMap<String, Arc<TypeDef>>>,
}

impl TypeCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A poisoned lock only means another thread panicked mid-read; the map
    /// itself is never left half-written, so recover the guard.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Arc<TypeDef>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve a type URI to its definition.
    ///
    /// Returns the cached definition if present; otherwise loads it from
    /// storage and caches it before returning. The lock is held across the
    /// load so a concurrent invalidation cannot interleave with it.
    pub fn get<S: GraphStorage>(
        &self,
        storage: &S,
        type_uri: &str,
    ) -> Result<Arc<TypeDef>, TopikaError> {
        let mut cache = self.lock();
        if let Some(def) = cache.get(type_uri) {
            return Ok(Arc::clone(def));
        }

        let def = Arc::new(load_type_def(storage, type_uri)?);
        tracing::debug!(type_uri, comp_defs = def.comp_defs.len(), "type loaded");
        cache.insert(type_uri.to_string(), Arc::clone(&def));
        Ok(def)
    }

    /// Remove a cached definition.
    ///
    /// Fails with `TypeNotCached` when the type is not cached; invalidation
    /// should only be requested after a load.
    pub fn invalidate(&self, type_uri: &str) -> Result<(), TopikaError> {
        match self.lock().remove(type_uri) {
            Some(_) => {
                tracing::debug!(type_uri, "type invalidated");
                Ok(())
            }
            None => Err(TopikaError::TypeNotCached(type_uri.to_string())),
        }
    }

    /// Whether a definition is currently cached.
    #[must_use]
    pub fn is_cached(&self, type_uri: &str) -> bool {
        self.lock().contains_key(type_uri)
    }

    /// Number of cached definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GraphStorage;
    use crate::index::IndexOp;
    use crate::model::{AssociationModel, PlayerModel, TopicModel};
    use crate::storage::MemStorage;
    use crate::types::{EntityId, SimpleValue};
    use crate::uris;
    use std::cell::Cell;

    /// Storage wrapper counting URI fetches, to observe cache hits.
    struct CountingStorage {
        inner: MemStorage,
        uri_fetches: Cell<usize>,
    }

    impl CountingStorage {
        fn new(inner: MemStorage) -> Self {
            Self {
                inner,
                uri_fetches: Cell::new(0),
            }
        }
    }

    impl GraphStorage for CountingStorage {
        fn store_topic(&mut self, model: &mut TopicModel) -> Result<EntityId, TopikaError> {
            self.inner.store_topic(model)
        }
        fn fetch_topic(&self, id: EntityId) -> Result<Option<TopicModel>, TopikaError> {
            self.inner.fetch_topic(id)
        }
        fn fetch_topic_by_uri(&self, uri: &str) -> Result<Option<TopicModel>, TopikaError> {
            self.uri_fetches.set(self.uri_fetches.get() + 1);
            self.inner.fetch_topic_by_uri(uri)
        }
        fn fetch_topic_by_value(
            &self,
            key: &str,
            value: &SimpleValue,
        ) -> Result<Option<TopicModel>, TopikaError> {
            self.inner.fetch_topic_by_value(key, value)
        }
        fn fetch_topics_by_value(
            &self,
            key: &str,
            value: &SimpleValue,
        ) -> Result<Vec<TopicModel>, TopikaError> {
            self.inner.fetch_topics_by_value(key, value)
        }
        fn query_fulltext(
            &self,
            term: &str,
            field: Option<&str>,
        ) -> Result<Vec<TopicModel>, TopikaError> {
            self.inner.query_fulltext(term, field)
        }
        fn store_association(
            &mut self,
            model: &mut AssociationModel,
        ) -> Result<EntityId, TopikaError> {
            self.inner.store_association(model)
        }
        fn fetch_association(
            &self,
            id: EntityId,
        ) -> Result<Option<AssociationModel>, TopikaError> {
            self.inner.fetch_association(id)
        }
        fn fetch_association_by_uri(
            &self,
            uri: &str,
        ) -> Result<Option<AssociationModel>, TopikaError> {
            self.inner.fetch_association_by_uri(uri)
        }
        fn associations_of(
            &self,
            entity: EntityId,
        ) -> Result<Vec<AssociationModel>, TopikaError> {
            self.inner.associations_of(entity)
        }
        fn store_value(&mut self, id: EntityId, value: SimpleValue) -> Result<(), TopikaError> {
            self.inner.store_value(id, value)
        }
        fn apply_index_op(&mut self, op: &IndexOp) -> Result<(), TopikaError> {
            self.inner.apply_index_op(op)
        }
        fn delete_topic(&mut self, id: EntityId) -> Result<(), TopikaError> {
            self.inner.delete_topic(id)
        }
        fn delete_association(&mut self, id: EntityId) -> Result<(), TopikaError> {
            self.inner.delete_association(id)
        }
        fn begin_transaction(&mut self) -> Result<(), TopikaError> {
            self.inner.begin_transaction()
        }
        fn commit_transaction(&mut self) -> Result<(), TopikaError> {
            self.inner.commit_transaction()
        }
        fn rollback_transaction(&mut self) -> Result<(), TopikaError> {
            self.inner.rollback_transaction()
        }
        fn topic_count(&self) -> Result<usize, TopikaError> {
            self.inner.topic_count()
        }
        fn association_count(&self) -> Result<usize, TopikaError> {
            self.inner.association_count()
        }
    }

    fn put(storage: &mut MemStorage, uri: &str, type_uri: &str, label: &str) -> EntityId {
        let mut model = TopicModel::new(type_uri, label).with_uri(uri);
        storage.store_topic(&mut model).expect("store")
    }

    fn link(
        storage: &mut MemStorage,
        assoc_type: &str,
        p1: (EntityId, &str),
        p2: (EntityId, &str),
    ) -> EntityId {
        let mut model = AssociationModel::new(
            assoc_type,
            PlayerModel::new(p1.0, p1.1),
            PlayerModel::new(p2.0, p2.1),
        );
        storage.store_association(&mut model).expect("store")
    }

    fn seed_person_type(storage: &mut MemStorage) {
        let card_one = put(storage, uris::ONE, uris::CARDINALITY, "One");
        let person = put(storage, "person", uris::TOPIC_TYPE, "Person");
        let address = put(storage, "address", uris::TOPIC_TYPE, "Address");
        let def = link(
            storage,
            uris::COMPOSITION_DEF,
            (person, uris::PARENT_TYPE),
            (address, uris::CHILD_TYPE),
        );
        storage.store_value(def, SimpleValue::Long(0)).expect("seq");
        link(
            storage,
            uris::COMPOSITION,
            (def, uris::PARENT),
            (card_one, uris::CHILD_CARDINALITY),
        );
    }

    #[test]
    fn second_get_hits_cache_without_storage_fetch() {
        let mut inner = MemStorage::new();
        seed_person_type(&mut inner);
        let storage = CountingStorage::new(inner);
        let cache = TypeCache::new();

        let first = cache.get(&storage, "person").expect("get");
        let fetches_after_load = storage.uri_fetches.get();
        assert!(fetches_after_load > 0);

        let second = cache.get(&storage, "person").expect("get");
        assert_eq!(storage.uri_fetches.get(), fetches_after_load);

        // Logically equal definitions.
        assert_eq!(first.comp_defs.len(), second.comp_defs.len());
        assert_eq!(first.uri, second.uri);
    }

    #[test]
    fn invalidate_uncached_fails() {
        let cache = TypeCache::new();
        assert!(matches!(
            cache.invalidate("person"),
            Err(TopikaError::TypeNotCached(uri)) if uri == "person"
        ));
    }

    #[test]
    fn invalidate_then_get_reloads() {
        let mut storage = MemStorage::new();
        seed_person_type(&mut storage);
        let cache = TypeCache::new();

        let before = cache.get(&storage, "person").expect("get");
        assert_eq!(before.comp_defs.len(), 1);

        // Grow the type behind the cache's back.
        let card_one = storage
            .fetch_topic_by_uri(uris::ONE)
            .expect("fetch")
            .expect("present")
            .id;
        let person = storage
            .fetch_topic_by_uri("person")
            .expect("fetch")
            .expect("present")
            .id;
        let name = put(&mut storage, "name", uris::TOPIC_TYPE, "Name");
        let def = link(
            &mut storage,
            uris::COMPOSITION_DEF,
            (person, uris::PARENT_TYPE),
            (name, uris::CHILD_TYPE),
        );
        storage.store_value(def, SimpleValue::Long(1)).expect("seq");
        link(
            &mut storage,
            uris::COMPOSITION,
            (def, uris::PARENT),
            (card_one, uris::CHILD_CARDINALITY),
        );

        // Stale until invalidated.
        let stale = cache.get(&storage, "person").expect("get");
        assert_eq!(stale.comp_defs.len(), 1);

        cache.invalidate("person").expect("invalidate");
        let fresh = cache.get(&storage, "person").expect("get");
        assert_eq!(fresh.comp_defs.len(), 2);
    }

    #[test]
    fn unknown_type_is_not_cached() {
        let storage = MemStorage::new();
        let cache = TypeCache::new();

        assert!(cache.get(&storage, "ghost").is_err());
        assert!(!cache.is_cached("ghost"));
        assert!(cache.is_empty());
    }
}
