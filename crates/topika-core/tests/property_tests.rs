//! # Property-Based Tests
//!
//! Determinism and round-trip invariants of the storage and composite
//! layers, verified with proptest.

use proptest::collection::vec;
use proptest::prelude::*;
use topika_core::{
    ChildTopicsModel, ChildValue, CompDefModel, GraphStorage, IndexMode, IndexOp, MemStorage,
    SimpleValue, TopicEngine, TopicModel, TypeModel, index_ops, storage::tokenize,
};

fn person_engine() -> TopicEngine<MemStorage> {
    let mut engine = TopicEngine::new(MemStorage::new()).expect("engine");
    engine
        .create_type(TypeModel::topic_type("address", "Address"))
        .expect("address type");
    engine
        .create_type(
            TypeModel::topic_type("person", "Person").with_comp_def(CompDefModel::one("address")),
        )
        .expect("person type");
    engine
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Stored topics round-trip their simple value and URI exactly.
    #[test]
    fn topic_roundtrips_value_and_uri(
        value in "[a-zA-Z0-9 ]{1,40}",
        uri in "[a-z][a-z0-9.]{1,30}"
    ) {
        let mut storage = MemStorage::new();
        let mut topic = TopicModel::new("note", value.clone()).with_uri(uri.clone());
        let id = storage.store_topic(&mut topic).expect("store");

        let fetched = storage.fetch_topic(id).expect("fetch").expect("present");
        prop_assert_eq!(fetched.value, SimpleValue::Text(value));
        prop_assert_eq!(fetched.uri, Some(uri));
    }

    /// The same store sequence produces the same id assignment.
    #[test]
    fn id_assignment_is_deterministic(values in vec("[a-z]{1,10}", 1..20)) {
        let mut storage1 = MemStorage::new();
        let mut storage2 = MemStorage::new();

        for value in &values {
            let mut t1 = TopicModel::new("note", value.clone());
            let mut t2 = TopicModel::new("note", value.clone());
            let id1 = storage1.store_topic(&mut t1).expect("store");
            let id2 = storage2.store_topic(&mut t2).expect("store");
            prop_assert_eq!(id1, id2);
        }
        prop_assert_eq!(
            storage1.topic_count().expect("count"),
            storage2.topic_count().expect("count")
        );
    }

    /// Writing a "one" slot repeatedly overwrites; the read returns exactly
    /// the last value and no child entities accumulate.
    #[test]
    fn single_slot_overwrites_without_accumulation(
        values in vec("[a-zA-Z0-9 ]{1,20}", 1..6)
    ) {
        let mut engine = person_engine();
        let alice = engine
            .create_topic(TopicModel::new("person", "Alice"))
            .expect("create");

        let mut count_after_first = None;
        for value in &values {
            let mut children = ChildTopicsModel::new();
            children.set_value("address", value.clone());
            engine.set_child_topics(alice.id, &children).expect("set");
            if count_after_first.is_none() {
                count_after_first = Some(engine.storage().topic_count().expect("count"));
            }
        }

        prop_assert_eq!(
            Some(engine.storage().topic_count().expect("count")),
            count_after_first
        );

        let read = engine.child_topics(alice.id).expect("read");
        let last = values.last().expect("nonempty").clone();
        prop_assert_eq!(
            read.one("address"),
            Some(&ChildValue::Value(SimpleValue::Text(last)))
        );
    }

    /// Full-text tokens are lowercase, non-empty, and free of separators.
    #[test]
    fn tokenize_normalizes(text in "\\PC{0,64}") {
        for token in tokenize(&text) {
            prop_assert!(!token.is_empty());
            prop_assert_eq!(token.clone(), token.to_lowercase());
            prop_assert!(token.chars().all(char::is_alphanumeric));
        }
    }

    /// For a value change, removals of the old value always precede
    /// additions of the new one, per index.
    #[test]
    fn index_ops_remove_before_add(
        old in "[a-zA-Z]{1,12}",
        new in "[a-zA-Z]{1,12}"
    ) {
        let ops = index_ops(
            &[IndexMode::FulltextKey],
            "note",
            Some(&SimpleValue::Text(old)),
            &SimpleValue::Text(new),
            topika_core::EntityId(1),
        );

        let key_remove = ops.iter().position(|op| matches!(op, IndexOp::RemoveKey { .. }));
        let key_add = ops.iter().position(|op| matches!(op, IndexOp::AddKey { .. }));
        let ft_remove = ops
            .iter()
            .position(|op| matches!(op, IndexOp::RemoveFulltext { .. }));
        let ft_add = ops
            .iter()
            .position(|op| matches!(op, IndexOp::AddFulltext { .. }));

        prop_assert!(key_remove < key_add);
        prop_assert!(ft_remove < ft_add);
    }

    /// Type resolutions without an intervening invalidation are logically
    /// equal.
    #[test]
    fn type_cache_is_idempotent(extra_slots in 0usize..3) {
        let mut engine = TopicEngine::new(MemStorage::new()).expect("engine");
        engine
            .create_type(TypeModel::topic_type("address", "Address"))
            .expect("address type");
        let mut person = TypeModel::topic_type("person", "Person");
        for i in 0..extra_slots {
            person = person.with_comp_def(
                CompDefModel::many("address").with_uri(format!("person.slot{i}")),
            );
        }
        engine.create_type(person).expect("person type");

        let first = engine.get_type("person").expect("get");
        let second = engine.get_type("person").expect("get");

        prop_assert_eq!(first.comp_defs.len(), second.comp_defs.len());
        prop_assert_eq!(&first.uri, &second.uri);
        let uris1: Vec<_> = first.comp_defs.iter().map(|cd| cd.slot_uri().to_string()).collect();
        let uris2: Vec<_> = second.comp_defs.iter().map(|cd| cd.slot_uri().to_string()).collect();
        prop_assert_eq!(uris1, uris2);
    }
}
