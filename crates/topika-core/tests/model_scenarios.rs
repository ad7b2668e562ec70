//! # Model Scenario Tests
//!
//! End-to-end scenarios over the engine facade:
//! - Composite values assembled from live type definitions
//! - Index-mode driven lookup and search
//! - Role-type directed traversal
//! - Type cache lifecycle
//! - Persistence over the redb backend

use topika_core::{
    AssociationModel, ChildTopicsModel, ChildValue, CompDefModel, DataType, GraphStorage,
    IndexMode, MemStorage, PlayerModel, RedbStorage, SimpleValue, TopicEngine, TopicModel,
    TopikaError, TraversalFilter, TypeModel, uris,
};

fn engine() -> TopicEngine<MemStorage> {
    TopicEngine::new(MemStorage::new()).expect("engine")
}

fn composite(value: Option<&ChildValue>) -> Option<&ChildTopicsModel> {
    match value {
        Some(ChildValue::Composite(children)) => Some(children),
        _ => None,
    }
}

// =============================================================================
// COMPOSITE VALUES
// =============================================================================

mod composite_values {
    use super::*;

    fn address_book_engine() -> TopicEngine<MemStorage> {
        let mut engine = engine();
        engine
            .create_type(TypeModel::topic_type("street", "Street"))
            .expect("street type");
        engine
            .create_type(TypeModel::topic_type("city", "City"))
            .expect("city type");
        engine
            .create_type(
                TypeModel::topic_type("address", "Address")
                    .with_data_type(DataType::Composite)
                    .with_comp_def(CompDefModel::one("street"))
                    .with_comp_def(CompDefModel::one("city")),
            )
            .expect("address type");
        engine
            .create_type(
                TypeModel::topic_type("person", "Person")
                    .with_comp_def(CompDefModel::one("address")),
            )
            .expect("person type");
        engine
    }

    /// Create a Person with a composite Address of exactly two fields and
    /// read it back: both fields present, nothing else.
    #[test]
    fn person_address_scenario() {
        let mut engine = address_book_engine();

        let mut address = ChildTopicsModel::new();
        address
            .set_value("street", "Main St")
            .set_value("city", "Springfield");
        let mut person = TopicModel::new("person", "Homer");
        person
            .children
            .set_composite("address", address);
        let homer = engine.create_topic(person).expect("create");

        let children = engine.child_topics(homer.id).expect("children");
        let address = composite(children.one("address")).expect("composite address");
        assert_eq!(address.len(), 2);
        assert_eq!(
            address.one("street"),
            Some(&ChildValue::Value(SimpleValue::from("Main St")))
        );
        assert_eq!(
            address.one("city"),
            Some(&ChildValue::Value(SimpleValue::from("Springfield")))
        );
    }

    /// Updating one field of a nested composite leaves the sibling field
    /// untouched and creates no duplicate children.
    #[test]
    fn nested_update_preserves_siblings() {
        let mut engine = address_book_engine();

        let mut address = ChildTopicsModel::new();
        address
            .set_value("street", "Main St")
            .set_value("city", "Springfield");
        let mut person = TopicModel::new("person", "Homer");
        person.children.set_composite("address", address);
        let homer = engine.create_topic(person).expect("create");

        let topics_before = engine.storage().topic_count().expect("count");

        let mut patch = ChildTopicsModel::new();
        let mut address_patch = ChildTopicsModel::new();
        address_patch.set_value("street", "Evergreen Terrace");
        patch.set_composite("address", address_patch);
        engine.set_child_topics(homer.id, &patch).expect("set");

        assert_eq!(engine.storage().topic_count().expect("count"), topics_before);
        let children = engine.child_topics(homer.id).expect("children");
        let address = composite(children.one("address")).expect("composite address");
        assert_eq!(
            address.one("street"),
            Some(&ChildValue::Value(SimpleValue::from("Evergreen Terrace")))
        );
        assert_eq!(
            address.one("city"),
            Some(&ChildValue::Value(SimpleValue::from("Springfield")))
        );
    }

    /// A multi-valued slot: add then read contains the value; detach then
    /// read no longer contains it.
    #[test]
    fn many_slot_add_and_remove() {
        let mut engine = engine();
        engine
            .create_type(TypeModel::topic_type("phone", "Phone"))
            .expect("phone type");
        engine
            .create_type(
                TypeModel::topic_type("person", "Person")
                    .with_comp_def(CompDefModel::many("phone")),
            )
            .expect("person type");

        let alice = engine
            .create_topic(TopicModel::new("person", "Alice"))
            .expect("create");

        let mut add = ChildTopicsModel::new();
        add.add_value("phone", "555-111").add_value("phone", "555-222");
        engine.set_child_topics(alice.id, &add).expect("add");

        let phones = engine.child_topics(alice.id).expect("children");
        let listed = phones.many("phone").expect("list");
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&ChildValue::Value(SimpleValue::from("555-111"))));

        let target = engine
            .related_topics(
                alice.id,
                &TraversalFilter::any()
                    .assoc_type(uris::COMPOSITION)
                    .others_type("phone"),
            )
            .expect("traverse")
            .into_iter()
            .find(|rel| rel.topic.value == SimpleValue::from("555-111"))
            .expect("phone");

        let mut remove = ChildTopicsModel::new();
        remove.add_deletion("phone", target.topic.id);
        engine.set_child_topics(alice.id, &remove).expect("remove");

        let phones = engine.child_topics(alice.id).expect("children");
        let listed = phones.many("phone").expect("list");
        assert_eq!(listed.len(), 1);
        assert!(!listed.contains(&ChildValue::Value(SimpleValue::from("555-111"))));
    }
}

// =============================================================================
// INDEXING
// =============================================================================

mod indexing {
    use super::*;

    /// FULLTEXT_KEY on a Note type: the full-text query is case-insensitive
    /// and finds both notes; the exact-key query is case-sensitive and finds
    /// only the literal match.
    #[test]
    fn fulltext_key_scenario() {
        let mut engine = engine();
        engine
            .create_type(
                TypeModel::topic_type("note", "Note").with_index_mode(IndexMode::FulltextKey),
            )
            .expect("note type");

        engine
            .create_topic(TopicModel::new("note", "Haskell"))
            .expect("note 1");
        engine
            .create_topic(TopicModel::new("note", "haskell code"))
            .expect("note 2");

        let fulltext = engine.search_topics("haskell", None).expect("search");
        assert_eq!(fulltext.len(), 2);

        let exact = engine
            .topics_by_value("note", &SimpleValue::from("Haskell"))
            .expect("by value");
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].value, SimpleValue::from("Haskell"));

        let wrong_case = engine
            .topics_by_value("note", &SimpleValue::from("HASKELL"))
            .expect("by value");
        assert!(wrong_case.is_empty());
    }

    /// An OFF-mode type is invisible to both indexes.
    #[test]
    fn off_mode_indexes_nothing() {
        let mut engine = engine();
        engine
            .create_type(TypeModel::topic_type("secret", "Secret").with_index_mode(IndexMode::Off))
            .expect("secret type");
        engine
            .create_topic(TopicModel::new("secret", "hidden treasure"))
            .expect("create");

        assert!(engine.search_topics("treasure", None).expect("search").is_empty());
        assert!(engine
            .topics_by_value("secret", &SimpleValue::from("hidden treasure"))
            .expect("by value")
            .is_empty());
    }

    /// Field-scoped search only looks at one index key.
    #[test]
    fn field_scoped_search() {
        let mut engine = engine();
        for (uri, label) in [("note", "Note"), ("comment", "Comment")] {
            engine
                .create_type(
                    TypeModel::topic_type(uri, label).with_index_mode(IndexMode::Fulltext),
                )
                .expect("type");
        }
        engine
            .create_topic(TopicModel::new("note", "rust patterns"))
            .expect("note");
        engine
            .create_topic(TopicModel::new("comment", "rust questions"))
            .expect("comment");

        assert_eq!(engine.search_topics("rust", None).expect("search").len(), 2);
        let scoped = engine.search_topics("rust", Some("note")).expect("search");
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].type_uri, "note");
    }
}

// =============================================================================
// TRAVERSAL
// =============================================================================

mod traversal_semantics {
    use super::*;

    /// For an association connecting P1 (role R1) and P2 (role R2),
    /// traversing from P1 with (my=R1, others=R2) returns P2 and vice versa.
    #[test]
    fn bidirectional_symmetry() {
        let mut engine = engine();
        engine
            .create_type(TypeModel::topic_type("person", "Person"))
            .expect("person");
        engine
            .create_type(TypeModel::assoc_type("employment", "Employment"))
            .expect("employment");
        let employee_role = TopicModel::new(uris::ROLE_TYPE, "Employee").with_uri("role.employee");
        let employer_role = TopicModel::new(uris::ROLE_TYPE, "Employer").with_uri("role.employer");
        engine.create_topic(employee_role).expect("role");
        engine.create_topic(employer_role).expect("role");

        let alice = engine
            .create_topic(TopicModel::new("person", "Alice"))
            .expect("alice");
        let acme = engine
            .create_topic(TopicModel::new("person", "Acme"))
            .expect("acme");
        engine
            .create_association(AssociationModel::new(
                "employment",
                PlayerModel::new(alice.id, "role.employee"),
                PlayerModel::new(acme.id, "role.employer"),
            ))
            .expect("associate");

        let forward = engine
            .related_topic(
                alice.id,
                &TraversalFilter::any()
                    .my_role("role.employee")
                    .others_role("role.employer"),
            )
            .expect("traverse")
            .expect("match");
        assert_eq!(forward.topic.id, acme.id);

        let backward = engine
            .related_topic(
                acme.id,
                &TraversalFilter::any()
                    .my_role("role.employer")
                    .others_role("role.employee"),
            )
            .expect("traverse")
            .expect("match");
        assert_eq!(backward.topic.id, alice.id);
    }

    /// Two definitions differing only in role types: role-filtered
    /// traversals diverge, null-filtered traversals coincide.
    #[test]
    fn role_filters_distinguish_definitions() {
        let mut engine = engine();
        engine
            .create_type(TypeModel::topic_type("person", "Person"))
            .expect("person");
        for (uri, label) in [
            ("role.author", "Author"),
            ("role.reviewer", "Reviewer"),
            ("role.document", "Document"),
        ] {
            engine
                .create_topic(TopicModel::new(uris::ROLE_TYPE, label).with_uri(uri))
                .expect("role");
        }
        engine
            .create_type(
                TypeModel::topic_type("document", "Document")
                    .with_comp_def(
                        CompDefModel::one("person")
                            .aggregation()
                            .with_roles("role.document", "role.author")
                            .with_uri("document.author"),
                    )
                    .with_comp_def(
                        CompDefModel::one("person")
                            .aggregation()
                            .with_roles("role.document", "role.reviewer")
                            .with_uri("document.reviewer"),
                    ),
            )
            .expect("document type");

        let alice = engine
            .create_topic(TopicModel::new("person", "Alice"))
            .expect("alice");
        let bob = engine
            .create_topic(TopicModel::new("person", "Bob"))
            .expect("bob");
        let mut doc = TopicModel::new("document", "Roadmap");
        doc.children.set_ref("document.author", alice.id);
        doc.children.set_ref("document.reviewer", bob.id);
        let doc = engine.create_topic(doc).expect("doc");

        let authors = engine
            .related_topics(
                doc.id,
                &TraversalFilter::any()
                    .assoc_type(uris::AGGREGATION)
                    .others_role("role.author"),
            )
            .expect("traverse");
        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0].topic.id, alice.id);

        let reviewers = engine
            .related_topics(
                doc.id,
                &TraversalFilter::any()
                    .assoc_type(uris::AGGREGATION)
                    .others_role("role.reviewer"),
            )
            .expect("traverse");
        assert_eq!(reviewers.len(), 1);
        assert_eq!(reviewers[0].topic.id, bob.id);

        let everyone = engine
            .related_topics(
                doc.id,
                &TraversalFilter::any().assoc_type(uris::AGGREGATION),
            )
            .expect("traverse");
        assert_eq!(everyone.len(), 2);
    }
}

// =============================================================================
// TYPE CACHE LIFECYCLE
// =============================================================================

mod type_cache {
    use super::*;

    #[test]
    fn invalidate_uncached_fails_with_not_found() {
        let engine = engine();
        assert!(matches!(
            engine.invalidate_type(uris::CARDINALITY),
            Err(TopikaError::TypeNotCached(_))
        ));
    }

    #[test]
    fn comp_def_mutation_is_visible_after_invalidation() {
        let mut engine = engine();
        engine
            .create_type(TypeModel::topic_type("tag", "Tag"))
            .expect("tag");
        engine
            .create_type(TypeModel::topic_type("note", "Note"))
            .expect("note");

        assert!(engine.get_type("note").expect("get").comp_defs.is_empty());

        engine
            .add_comp_def("note", &CompDefModel::many("tag"))
            .expect("add");
        let def = engine.get_type("note").expect("get");
        assert_eq!(def.comp_defs.len(), 1);
        assert_eq!(def.comp_defs[0].slot_uri(), "tag");

        engine.remove_comp_def("note", "tag").expect("remove");
        assert!(engine.get_type("note").expect("get").comp_defs.is_empty());
    }
}

// =============================================================================
// PERSISTENT BACKEND
// =============================================================================

mod redb_backend {
    use super::*;
    use tempfile::TempDir;

    /// The full composite scenario over the disk-backed engine, surviving a
    /// close and reopen.
    #[test]
    fn composite_scenario_survives_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("graph.redb");

        let homer_id = {
            let storage = RedbStorage::open(&path).expect("open");
            let mut engine = TopicEngine::new(storage).expect("engine");
            engine
                .create_type(TypeModel::topic_type("street", "Street"))
                .expect("street type");
            engine
                .create_type(
                    TypeModel::topic_type("address", "Address")
                        .with_data_type(DataType::Composite)
                        .with_comp_def(CompDefModel::one("street")),
                )
                .expect("address type");
            engine
                .create_type(
                    TypeModel::topic_type("person", "Person")
                        .with_comp_def(CompDefModel::one("address")),
                )
                .expect("person type");

            let mut address = ChildTopicsModel::new();
            address.set_value("street", "Evergreen Terrace");
            let mut homer = TopicModel::new("person", "Homer");
            homer.children.set_composite("address", address);
            engine.create_topic(homer).expect("create").id
        };

        let storage = RedbStorage::open(&path).expect("reopen");
        let engine = TopicEngine::new(storage).expect("engine");

        let children = engine.child_topics(homer_id).expect("children");
        let address = composite(children.one("address")).expect("composite address");
        assert_eq!(
            address.one("street"),
            Some(&ChildValue::Value(SimpleValue::from("Evergreen Terrace")))
        );
    }

    /// Index entries written through the engine are queryable after reopen.
    #[test]
    fn index_survives_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("graph.redb");

        {
            let storage = RedbStorage::open(&path).expect("open");
            let mut engine = TopicEngine::new(storage).expect("engine");
            engine
                .create_type(
                    TypeModel::topic_type("note", "Note")
                        .with_index_mode(IndexMode::FulltextKey),
                )
                .expect("note type");
            engine
                .create_topic(TopicModel::new("note", "Haskell"))
                .expect("note");
        }

        let storage = RedbStorage::open(&path).expect("reopen");
        let engine = TopicEngine::new(storage).expect("engine");
        assert_eq!(engine.search_topics("haskell", None).expect("search").len(), 1);
        assert_eq!(
            engine
                .topics_by_value("note", &SimpleValue::from("Haskell"))
                .expect("by value")
                .len(),
            1
        );
    }

    /// Bootstrap over redb is idempotent across reopen.
    #[test]
    fn bootstrap_survives_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("graph.redb");

        let (topics, assocs) = {
            let storage = RedbStorage::open(&path).expect("open");
            let engine = TopicEngine::new(storage).expect("engine");
            (
                engine.storage().topic_count().expect("count"),
                engine.storage().association_count().expect("count"),
            )
        };

        let storage = RedbStorage::open(&path).expect("reopen");
        let engine = TopicEngine::new(storage).expect("engine");
        assert_eq!(engine.storage().topic_count().expect("count"), topics);
        assert_eq!(
            engine.storage().association_count().expect("count"),
            assocs
        );
    }
}
