//! # Engine Facade
//!
//! The upward-facing service combining a storage backend with the type
//! cache: entity and type CRUD, lookup and search, child-topic accessors,
//! and relation-filtered traversal.
//!
//! Every mutating operation runs inside a storage transaction; nested engine
//! operations share the outer transaction, so each `begin` is paired with
//! exactly one commit or rollback. On construction the engine bootstraps the
//! core vocabulary idempotently, making a fresh store self-describing.

use crate::composite::Composer;
use crate::index::index_ops;
use crate::model::{AssociationModel, ChildTopicsModel, PlayerModel, TopicModel};
use crate::storage::GraphStorage;
use crate::traversal::{RelatedTopic, TraversalFilter, related_topic, related_topics};
use crate::typecache::TypeCache;
use crate::typedef::{CompDefKind, CompDefModel, TypeDef, TypeKind, TypeModel};
use crate::types::{EntityId, SimpleValue, TopikaError};
use crate::uris;
use std::collections::BTreeSet;
use std::sync::Arc;

// =============================================================================
// CORE VOCABULARY
// =============================================================================

/// The built-in vocabulary: (uri, type uri, label).
///
/// Order matters only in that it reads top-down; creation is two-pass, so
/// forward references (the self-typed meta type included) are fine.
const VOCABULARY: &[(&str, &str, &str)] = &[
    // Type families
    (uris::META_TYPE, uris::META_TYPE, "Meta Type"),
    (uris::TOPIC_TYPE, uris::META_TYPE, "Topic Type"),
    (uris::ASSOC_TYPE, uris::META_TYPE, "Association Type"),
    (uris::ROLE_TYPE, uris::META_TYPE, "Role Type"),
    // Built-in topic types
    (uris::DATA_TYPE, uris::TOPIC_TYPE, "Data Type"),
    (uris::CARDINALITY, uris::TOPIC_TYPE, "Cardinality"),
    (uris::INDEX_MODE, uris::TOPIC_TYPE, "Index Mode"),
    (uris::VIEW_CONFIG, uris::TOPIC_TYPE, "View Configuration"),
    // Data types
    (uris::TEXT, uris::DATA_TYPE, "Text"),
    (uris::NUMBER, uris::DATA_TYPE, "Number"),
    (uris::BOOLEAN, uris::DATA_TYPE, "Boolean"),
    (uris::COMPOSITE, uris::DATA_TYPE, "Composite"),
    // Cardinalities
    (uris::ONE, uris::CARDINALITY, "One"),
    (uris::MANY, uris::CARDINALITY, "Many"),
    // Index modes
    (uris::INDEX_OFF, uris::INDEX_MODE, "Off"),
    (uris::INDEX_KEY, uris::INDEX_MODE, "Key"),
    (uris::INDEX_FULLTEXT, uris::INDEX_MODE, "Full Text"),
    (uris::INDEX_FULLTEXT_KEY, uris::INDEX_MODE, "Full Text Key"),
    // Role types
    (uris::PARENT, uris::ROLE_TYPE, "Parent"),
    (uris::CHILD, uris::ROLE_TYPE, "Child"),
    (uris::PARENT_TYPE, uris::ROLE_TYPE, "Parent Type"),
    (uris::CHILD_TYPE, uris::ROLE_TYPE, "Child Type"),
    (uris::TYPE_ROLE, uris::ROLE_TYPE, "Type"),
    (uris::INSTANCE, uris::ROLE_TYPE, "Instance"),
    (uris::PARENT_ROLE, uris::ROLE_TYPE, "Parent Role"),
    (uris::CHILD_ROLE, uris::ROLE_TYPE, "Child Role"),
    (uris::PARENT_CARDINALITY, uris::ROLE_TYPE, "Parent Cardinality"),
    (uris::CHILD_CARDINALITY, uris::ROLE_TYPE, "Child Cardinality"),
    (uris::DEFAULT_ROLE, uris::ROLE_TYPE, "Default"),
    // Association types
    (uris::COMPOSITION, uris::ASSOC_TYPE, "Composition"),
    (uris::AGGREGATION, uris::ASSOC_TYPE, "Aggregation"),
    (uris::COMPOSITION_DEF, uris::ASSOC_TYPE, "Composition Definition"),
    (uris::AGGREGATION_DEF, uris::ASSOC_TYPE, "Aggregation Definition"),
    (uris::INSTANTIATION, uris::ASSOC_TYPE, "Instantiation"),
];

// =============================================================================
// ENGINE
// =============================================================================

/// The engine facade over a storage backend.
pub struct TopicEngine<S: GraphStorage> {
    storage: S,
    types: TypeCache,
    /// Transaction nesting depth; only depth 0 begins and ends storage
    /// transactions.
    tx_depth: usize,
}

impl<S: GraphStorage> TopicEngine<S> {
    /// Create an engine on the given storage, bootstrapping the core
    /// vocabulary when absent.
    pub fn new(storage: S) -> Result<Self, TopikaError> {
        let mut engine = Self {
            storage,
            types: TypeCache::new(),
            tx_depth: 0,
        };
        engine.bootstrap()?;
        Ok(engine)
    }

    /// Get a reference to the storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Get a reference to the type cache.
    pub fn types(&self) -> &TypeCache {
        &self.types
    }

    /// Consume the engine, returning the storage backend.
    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Run a mutating operation inside a transaction. Nested calls share the
    /// outer transaction; only the outermost call commits or rolls back.
    fn in_tx<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, TopikaError>,
    ) -> Result<T, TopikaError> {
        if self.tx_depth > 0 {
            return f(self);
        }
        self.storage.begin_transaction()?;
        self.tx_depth = 1;
        let result = f(self);
        self.tx_depth = 0;
        match result {
            Ok(value) => {
                self.storage.commit_transaction()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.storage.rollback_transaction() {
                    tracing::warn!(error = %rollback_err, "rollback after failed operation failed");
                }
                Err(e)
            }
        }
    }

    // =========================================================================
    // BOOTSTRAP
    // =========================================================================

    /// Create the core vocabulary topics and their instantiation links.
    /// Idempotent: existing entries are left untouched.
    fn bootstrap(&mut self) -> Result<(), TopikaError> {
        self.in_tx(|e| {
            let mut created = 0usize;
            for &(uri, type_uri, label) in VOCABULARY {
                if e.storage.fetch_topic_by_uri(uri)?.is_none() {
                    let mut topic = TopicModel::new(type_uri, label).with_uri(uri);
                    e.storage.store_topic(&mut topic)?;
                    created += 1;
                }
            }

            // Second pass: instantiation links, once every topic exists.
            for &(uri, type_uri, _) in VOCABULARY {
                let topic = e.require_topic_by_uri(uri)?;
                let instantiated = e.storage.associations_of(topic.id)?.iter().any(|assoc| {
                    assoc.type_uri == uris::INSTANTIATION
                        && assoc
                            .players()
                            .iter()
                            .any(|p| p.target == topic.id && p.role_type_uri == uris::INSTANCE)
                });
                if !instantiated {
                    let type_topic = e.require_topic_by_uri(type_uri)?;
                    e.connect_instantiation(type_topic.id, topic.id)?;
                }
            }

            if created > 0 {
                tracing::info!(topics = created, "core vocabulary bootstrapped");
            }
            Ok(())
        })
    }

    // =========================================================================
    // TOPICS
    // =========================================================================

    /// Create a topic. Returns the model with its assigned id.
    pub fn create_topic(&mut self, model: TopicModel) -> Result<TopicModel, TopikaError> {
        model.validate()?;
        self.in_tx(|e| {
            let type_def = e.types.get(&e.storage, &model.type_uri)?;
            let mut model = model;
            let children = std::mem::take(&mut model.children);

            e.storage.store_topic(&mut model)?;
            e.connect_instantiation(type_def.id, model.id)?;
            for op in index_ops(
                &type_def.index_modes,
                &model.type_uri,
                None,
                &model.value,
                model.id,
            ) {
                e.storage.apply_index_op(&op)?;
            }
            if !children.is_empty() {
                Composer::integrate(&mut e.storage, &e.types, model.id, &type_def, &children)?;
            }
            tracing::debug!(id = %model.id, type_uri = %model.type_uri, "topic created");
            Ok(model)
        })
    }

    /// Get a topic by id.
    pub fn topic(&self, id: EntityId) -> Result<TopicModel, TopikaError> {
        self.storage
            .fetch_topic(id)?
            .ok_or(TopikaError::EntityNotFound(id))
    }

    /// Get a topic by its URI alias.
    pub fn topic_by_uri(&self, uri: &str) -> Result<TopicModel, TopikaError> {
        self.require_topic_by_uri(uri)
    }

    /// Get the single topic filed under `(key, value)`, if any.
    pub fn topic_by_value(
        &self,
        key: &str,
        value: &SimpleValue,
    ) -> Result<Option<TopicModel>, TopikaError> {
        self.storage.fetch_topic_by_value(key, value)
    }

    /// Get all topics filed under `(key, value)`.
    pub fn topics_by_value(
        &self,
        key: &str,
        value: &SimpleValue,
    ) -> Result<Vec<TopicModel>, TopikaError> {
        self.storage.fetch_topics_by_value(key, value)
    }

    /// All instances of a type, via instantiation links.
    pub fn topics_by_type(&self, type_uri: &str) -> Result<Vec<TopicModel>, TopikaError> {
        let type_topic = self.require_topic_by_uri(type_uri)?;
        let filter = TraversalFilter::any()
            .assoc_type(uris::INSTANTIATION)
            .my_role(uris::TYPE_ROLE)
            .others_role(uris::INSTANCE);
        Ok(related_topics(&self.storage, type_topic.id, &filter)?
            .into_iter()
            .map(|rel| rel.topic)
            .collect())
    }

    /// Case-insensitive full-text search, optionally narrowed to one field.
    pub fn search_topics(
        &self,
        term: &str,
        field_uri: Option<&str>,
    ) -> Result<Vec<TopicModel>, TopikaError> {
        self.storage.query_fulltext(term, field_uri)
    }

    /// Update a topic's URI, value, and children. The id must be assigned;
    /// retyping is not supported.
    pub fn update_topic(&mut self, model: &TopicModel) -> Result<(), TopikaError> {
        model.validate()?;
        if !model.id.is_assigned() {
            return Err(TopikaError::InvalidModel(
                "update requires an assigned id".to_string(),
            ));
        }
        self.in_tx(|e| {
            let old = e
                .storage
                .fetch_topic(model.id)?
                .ok_or(TopikaError::EntityNotFound(model.id))?;
            if old.type_uri != model.type_uri {
                return Err(TopikaError::InvalidModel(format!(
                    "cannot retype topic {} from \"{}\" to \"{}\"",
                    model.id, old.type_uri, model.type_uri
                )));
            }
            let type_def = e.types.get(&e.storage, &model.type_uri)?;

            let ops = if old.value == model.value {
                Vec::new()
            } else {
                index_ops(
                    &type_def.index_modes,
                    &model.type_uri,
                    Some(&old.value),
                    &model.value,
                    model.id,
                )
            };
            let mut record = model.clone();
            e.storage.store_topic(&mut record)?;
            for op in &ops {
                e.storage.apply_index_op(op)?;
            }
            if !model.children.is_empty() {
                Composer::integrate(
                    &mut e.storage,
                    &e.types,
                    model.id,
                    &type_def,
                    &model.children,
                )?;
            }
            // A type topic's label lives in the cached definition too.
            if TypeKind::from_type_uri(&model.type_uri).is_some()
                && let Some(uri) = &model.uri
            {
                e.invalidate_if_cached(uri)?;
            }
            Ok(())
        })
    }

    /// Delete a topic and every association it plays in, higher-order
    /// associations included.
    pub fn delete_topic(&mut self, id: EntityId) -> Result<(), TopikaError> {
        self.in_tx(|e| {
            let topic = e
                .storage
                .fetch_topic(id)?
                .ok_or(TopikaError::EntityNotFound(id))?;
            let mut visited = BTreeSet::new();
            e.delete_incident_associations(id, &mut visited)?;
            e.storage.delete_topic(id)?;
            if TypeKind::from_type_uri(&topic.type_uri).is_some()
                && let Some(uri) = &topic.uri
            {
                e.invalidate_if_cached(uri)?;
            }
            tracing::debug!(id = %id, "topic deleted");
            Ok(())
        })
    }

    // =========================================================================
    // ASSOCIATIONS
    // =========================================================================

    /// Create an association. Returns the model with its assigned id.
    pub fn create_association(
        &mut self,
        model: AssociationModel,
    ) -> Result<AssociationModel, TopikaError> {
        model.validate()?;
        self.in_tx(|e| {
            let type_def = e.types.get(&e.storage, &model.type_uri)?;
            let mut model = model;
            let children = std::mem::take(&mut model.children);

            e.storage.store_association(&mut model)?;
            e.connect_instantiation(type_def.id, model.id)?;
            for op in index_ops(
                &type_def.index_modes,
                &model.type_uri,
                None,
                &model.value,
                model.id,
            ) {
                e.storage.apply_index_op(&op)?;
            }
            if !children.is_empty() {
                Composer::integrate(&mut e.storage, &e.types, model.id, &type_def, &children)?;
            }
            tracing::debug!(id = %model.id, type_uri = %model.type_uri, "association created");
            Ok(model)
        })
    }

    /// Get an association by id.
    pub fn association(&self, id: EntityId) -> Result<AssociationModel, TopikaError> {
        self.storage
            .fetch_association(id)?
            .ok_or(TopikaError::EntityNotFound(id))
    }

    /// Update an association's URI, value, players, and children.
    pub fn update_association(&mut self, model: &AssociationModel) -> Result<(), TopikaError> {
        model.validate()?;
        if !model.id.is_assigned() {
            return Err(TopikaError::InvalidModel(
                "update requires an assigned id".to_string(),
            ));
        }
        self.in_tx(|e| {
            let old = e
                .storage
                .fetch_association(model.id)?
                .ok_or(TopikaError::EntityNotFound(model.id))?;
            if old.type_uri != model.type_uri {
                return Err(TopikaError::InvalidModel(format!(
                    "cannot retype association {} from \"{}\" to \"{}\"",
                    model.id, old.type_uri, model.type_uri
                )));
            }
            let type_def = e.types.get(&e.storage, &model.type_uri)?;

            let ops = if old.value == model.value {
                Vec::new()
            } else {
                index_ops(
                    &type_def.index_modes,
                    &model.type_uri,
                    Some(&old.value),
                    &model.value,
                    model.id,
                )
            };
            let mut record = model.clone();
            e.storage.store_association(&mut record)?;
            for op in &ops {
                e.storage.apply_index_op(op)?;
            }
            if !model.children.is_empty() {
                Composer::integrate(
                    &mut e.storage,
                    &e.types,
                    model.id,
                    &type_def,
                    &model.children,
                )?;
            }
            Ok(())
        })
    }

    /// Delete an association, cascading to higher-order associations
    /// targeting it.
    pub fn delete_association(&mut self, id: EntityId) -> Result<(), TopikaError> {
        self.in_tx(|e| {
            e.storage
                .fetch_association(id)?
                .ok_or(TopikaError::EntityNotFound(id))?;
            let mut visited = BTreeSet::new();
            visited.insert(id.value());
            e.delete_incident_associations(id, &mut visited)?;
            e.storage.delete_association(id)?;
            Ok(())
        })
    }

    /// Delete all associations an entity plays in, recursively covering
    /// higher-order associations.
    fn delete_incident_associations(
        &mut self,
        entity: EntityId,
        visited: &mut BTreeSet<i64>,
    ) -> Result<(), TopikaError> {
        for assoc in self.storage.associations_of(entity)? {
            if !visited.insert(assoc.id.value()) {
                continue;
            }
            self.delete_incident_associations(assoc.id, visited)?;
            self.storage.delete_association(assoc.id)?;
        }
        Ok(())
    }

    // =========================================================================
    // CHILD TOPICS
    // =========================================================================

    /// Assemble the composite value of a topic or association.
    pub fn child_topics(&self, id: EntityId) -> Result<ChildTopicsModel, TopikaError> {
        let type_uri = self.entity_type_uri(id)?;
        let type_def = self.types.get(&self.storage, &type_uri)?;
        Composer::fetch(&self.storage, &self.types, id, &type_def)
    }

    /// Apply a composite value to a topic or association.
    pub fn set_child_topics(
        &mut self,
        id: EntityId,
        children: &ChildTopicsModel,
    ) -> Result<(), TopikaError> {
        self.in_tx(|e| {
            let type_uri = e.entity_type_uri(id)?;
            let type_def = e.types.get(&e.storage, &type_uri)?;
            Composer::integrate(&mut e.storage, &e.types, id, &type_def, children)
        })
    }

    fn entity_type_uri(&self, id: EntityId) -> Result<String, TopikaError> {
        if let Some(topic) = self.storage.fetch_topic(id)? {
            return Ok(topic.type_uri);
        }
        if let Some(assoc) = self.storage.fetch_association(id)? {
            return Ok(assoc.type_uri);
        }
        Err(TopikaError::EntityNotFound(id))
    }

    // =========================================================================
    // TRAVERSAL
    // =========================================================================

    /// All topics related to the entity under the filter.
    pub fn related_topics(
        &self,
        id: EntityId,
        filter: &TraversalFilter,
    ) -> Result<Vec<RelatedTopic>, TopikaError> {
        related_topics(&self.storage, id, filter)
    }

    /// The single topic related under the filter; `Ambiguity` on more than
    /// one match.
    pub fn related_topic(
        &self,
        id: EntityId,
        filter: &TraversalFilter,
    ) -> Result<Option<RelatedTopic>, TopikaError> {
        related_topic(&self.storage, id, filter)
    }

    // =========================================================================
    // TYPES
    // =========================================================================

    /// Resolve a type URI, from cache when possible.
    pub fn get_type(&self, type_uri: &str) -> Result<Arc<TypeDef>, TopikaError> {
        self.types.get(&self.storage, type_uri)
    }

    /// Drop a cached type definition. Fails with `TypeNotCached` when the
    /// type was never loaded.
    pub fn invalidate_type(&self, type_uri: &str) -> Result<(), TopikaError> {
        self.types.invalidate(type_uri)
    }

    /// Create a type from its model: the type topic plus data type, index
    /// modes, view configuration, and composition definitions, all as graph
    /// data. Returns the loaded definition.
    pub fn create_type(&mut self, model: TypeModel) -> Result<Arc<TypeDef>, TopikaError> {
        let uri = model.uri.clone();
        self.in_tx(|e| {
            let mut topic = TopicModel::new(model.kind.type_uri(), model.label.clone())
                .with_uri(model.uri.clone());
            topic.validate()?;
            e.storage.store_topic(&mut topic)?;

            let family = e.require_topic_by_uri(model.kind.type_uri())?;
            e.connect_instantiation(family.id, topic.id)?;

            e.attach_meta(topic.id, model.data_type.uri())?;
            for mode in &model.index_modes {
                e.attach_meta(topic.id, mode.uri())?;
            }
            if let Some(config) = &model.view_config {
                e.attach_view_config(topic.id, config)?;
            }
            for (seq, comp_def) in model.comp_defs.iter().enumerate() {
                e.create_comp_def(topic.id, comp_def, seq as i64)?;
            }
            tracing::debug!(type_uri = %model.uri, kind = ?model.kind, "type created");
            Ok(())
        })?;
        self.types.get(&self.storage, &uri)
    }

    /// Append a child slot to an existing type and invalidate its cached
    /// definition in the same logical operation.
    pub fn add_comp_def(
        &mut self,
        type_uri: &str,
        comp_def: &CompDefModel,
    ) -> Result<(), TopikaError> {
        self.in_tx(|e| {
            let type_topic = e.require_type_topic(type_uri)?;
            let seq = e.comp_def_count(type_topic.id)? as i64;
            e.create_comp_def(type_topic.id, comp_def, seq)?;
            e.invalidate_if_cached(type_uri)
        })
    }

    /// Remove a child slot (and its cardinality/role attachments) from a
    /// type, invalidating the cached definition.
    pub fn remove_comp_def(&mut self, type_uri: &str, slot_uri: &str) -> Result<(), TopikaError> {
        self.in_tx(|e| {
            let type_def = e.types.get(&e.storage, type_uri)?;
            let comp_def = type_def.comp_def(slot_uri).ok_or_else(|| {
                TopikaError::InvalidModel(format!(
                    "type \"{type_uri}\" has no child slot \"{slot_uri}\""
                ))
            })?;
            let mut visited = BTreeSet::new();
            visited.insert(comp_def.id.value());
            e.delete_incident_associations(comp_def.id, &mut visited)?;
            e.storage.delete_association(comp_def.id)?;
            e.invalidate_if_cached(type_uri)
        })
    }

    /// Rewrite the slot order of a type. `order` must be a permutation of
    /// the current slot URIs.
    pub fn reorder_comp_defs(
        &mut self,
        type_uri: &str,
        order: &[&str],
    ) -> Result<(), TopikaError> {
        self.in_tx(|e| {
            let type_def = e.types.get(&e.storage, type_uri)?;
            if order.len() != type_def.comp_defs.len() {
                return Err(TopikaError::InvalidModel(format!(
                    "order lists {} slots, type \"{type_uri}\" has {}",
                    order.len(),
                    type_def.comp_defs.len()
                )));
            }
            for (seq, slot_uri) in order.iter().enumerate() {
                let comp_def = type_def.comp_def(slot_uri).ok_or_else(|| {
                    TopikaError::InvalidModel(format!(
                        "type \"{type_uri}\" has no child slot \"{slot_uri}\""
                    ))
                })?;
                e.storage
                    .store_value(comp_def.id, SimpleValue::Long(seq as i64))?;
            }
            e.invalidate_if_cached(type_uri)
        })
    }

    /// Delete a type: its definition associations and attachments, then the
    /// type topic itself. Fails while instances still exist.
    pub fn delete_type(&mut self, type_uri: &str) -> Result<(), TopikaError> {
        self.in_tx(|e| {
            let type_topic = e.require_type_topic(type_uri)?;
            if !e.topics_by_type(type_uri)?.is_empty() {
                return Err(TopikaError::InvalidModel(format!(
                    "type \"{type_uri}\" still has instances"
                )));
            }
            let mut visited = BTreeSet::new();
            e.delete_incident_associations(type_topic.id, &mut visited)?;
            e.storage.delete_topic(type_topic.id)?;
            e.invalidate_if_cached(type_uri)?;
            tracing::debug!(type_uri, "type deleted");
            Ok(())
        })
    }

    // =========================================================================
    // INTERNAL HELPERS
    // =========================================================================

    fn require_topic_by_uri(&self, uri: &str) -> Result<TopicModel, TopikaError> {
        self.storage
            .fetch_topic_by_uri(uri)?
            .ok_or_else(|| TopikaError::UriNotFound(uri.to_string()))
    }

    fn require_type_topic(&self, uri: &str) -> Result<TopicModel, TopikaError> {
        let topic = self.require_topic_by_uri(uri)?;
        if TypeKind::from_type_uri(&topic.type_uri).is_none() {
            return Err(TopikaError::InvalidModel(format!(
                "\"{uri}\" is not a type topic"
            )));
        }
        Ok(topic)
    }

    fn connect_instantiation(
        &mut self,
        type_topic: EntityId,
        instance: EntityId,
    ) -> Result<(), TopikaError> {
        let mut assoc = AssociationModel::new(
            uris::INSTANTIATION,
            PlayerModel::new(type_topic, uris::TYPE_ROLE),
            PlayerModel::new(instance, uris::INSTANCE),
        );
        self.storage.store_association(&mut assoc)?;
        Ok(())
    }

    /// Attach a vocabulary topic (data type, cardinality, index mode) under
    /// the generic child role.
    fn attach_meta(&mut self, owner: EntityId, meta_uri: &str) -> Result<(), TopikaError> {
        self.attach_meta_as(owner, meta_uri, uris::CHILD)
    }

    fn attach_meta_as(
        &mut self,
        owner: EntityId,
        meta_uri: &str,
        child_role: &str,
    ) -> Result<(), TopikaError> {
        let meta = self.require_topic_by_uri(meta_uri)?;
        let mut assoc = AssociationModel::new(
            uris::COMPOSITION,
            PlayerModel::new(owner, uris::PARENT),
            PlayerModel::new(meta.id, child_role),
        );
        self.storage.store_association(&mut assoc)?;
        Ok(())
    }

    fn attach_view_config(
        &mut self,
        owner: EntityId,
        config: &serde_json::Value,
    ) -> Result<(), TopikaError> {
        let vc_type = self.require_topic_by_uri(uris::VIEW_CONFIG)?;
        let mut topic = TopicModel::new(
            uris::VIEW_CONFIG,
            SimpleValue::Text(config.to_string()),
        );
        self.storage.store_topic(&mut topic)?;
        self.connect_instantiation(vc_type.id, topic.id)?;

        let mut assoc = AssociationModel::new(
            uris::COMPOSITION,
            PlayerModel::new(owner, uris::PARENT),
            PlayerModel::new(topic.id, uris::CHILD),
        );
        self.storage.store_association(&mut assoc)?;
        Ok(())
    }

    fn create_comp_def(
        &mut self,
        parent_type: EntityId,
        model: &CompDefModel,
        seq: i64,
    ) -> Result<(), TopikaError> {
        let child_type = self.require_topic_by_uri(&model.child_type_uri)?;

        let mut assoc = AssociationModel::new(
            model.kind.def_type_uri(),
            PlayerModel::new(parent_type, uris::PARENT_TYPE),
            PlayerModel::new(child_type.id, uris::CHILD_TYPE),
        )
        .with_value(SimpleValue::Long(seq));
        if let Some(slot_uri) = &model.uri {
            assoc = assoc.with_uri(slot_uri);
        }
        self.storage.store_association(&mut assoc)?;

        self.attach_meta_as(assoc.id, model.cardinality.uri(), uris::CHILD_CARDINALITY)?;
        if let Some(cardinality) = model.parent_cardinality {
            self.attach_meta_as(assoc.id, cardinality.uri(), uris::PARENT_CARDINALITY)?;
        }
        if let Some(role_uri) = &model.parent_role_uri {
            self.require_role_type(role_uri)?;
            self.attach_meta_as(assoc.id, role_uri, uris::PARENT_ROLE)?;
        }
        if let Some(role_uri) = &model.child_role_uri {
            self.require_role_type(role_uri)?;
            self.attach_meta_as(assoc.id, role_uri, uris::CHILD_ROLE)?;
        }
        Ok(())
    }

    fn require_role_type(&self, uri: &str) -> Result<(), TopikaError> {
        let topic = self.require_topic_by_uri(uri)?;
        if topic.type_uri != uris::ROLE_TYPE {
            return Err(TopikaError::InvalidModel(format!(
                "\"{uri}\" is not a role type"
            )));
        }
        Ok(())
    }

    fn comp_def_count(&self, type_topic: EntityId) -> Result<usize, TopikaError> {
        Ok(self
            .storage
            .associations_of(type_topic)?
            .iter()
            .filter(|assoc| {
                CompDefKind::from_def_type_uri(&assoc.type_uri).is_some()
                    && assoc
                        .players()
                        .iter()
                        .any(|p| p.target == type_topic && p.role_type_uri == uris::PARENT_TYPE)
            })
            .count())
    }

    fn invalidate_if_cached(&self, type_uri: &str) -> Result<(), TopikaError> {
        if self.types.is_cached(type_uri) {
            self.types.invalidate(type_uri)?;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
