//! # In-Memory Storage Engine
//!
//! The deterministic reference implementation of the storage contract.
//! All data structures use `BTreeMap`/`BTreeSet` for deterministic ordering;
//! a transaction snapshots the whole state and rollback restores it.

use crate::index::IndexOp;
use crate::model::{AssociationModel, ChildTopicsModel, TopicModel};
use crate::storage::{GraphStorage, tokenize};
use crate::types::{EntityId, SimpleValue, TopikaError};
use std::collections::{BTreeMap, BTreeSet};

/// The complete storage state, cloneable for snapshot rollback.
#[derive(Debug, Clone, Default)]
struct State {
    /// Topic records by id.
    topics: BTreeMap<i64, TopicModel>,

    /// Association records by id.
    assocs: BTreeMap<i64, AssociationModel>,

    /// URI alias index, topic namespace.
    topic_uris: BTreeMap<String, i64>,

    /// URI alias index, association namespace.
    assoc_uris: BTreeMap<String, i64>,

    /// Exact-match value index: (field, canonical value) -> entity ids.
    key_index: BTreeMap<(String, String), BTreeSet<i64>>,

    /// Full-text index: (field, token) -> entity ids.
    fulltext_index: BTreeMap<(String, String), BTreeSet<i64>>,

    /// Incidence index: entity id -> ids of associations it plays in.
    players: BTreeMap<i64, BTreeSet<i64>>,

    /// Next available entity id (topics and associations share the sequence).
    next_id: i64,
}

/// In-memory storage engine.
#[derive(Debug, Default)]
pub struct MemStorage {
    state: State,
    /// Pre-transaction snapshot; `Some` while a transaction is active.
    snapshot: Option<Box<State>>,
}

impl MemStorage {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = self.state.next_id;
        self.state.next_id = self.state.next_id.saturating_add(1);
        EntityId(id)
    }

    fn claim_uri(
        uris: &mut BTreeMap<String, i64>,
        old_uri: Option<&str>,
        new_uri: Option<&str>,
        id: i64,
    ) -> Result<(), TopikaError> {
        if old_uri == new_uri {
            return Ok(());
        }
        if let Some(uri) = new_uri {
            if uris.get(uri).is_some_and(|&owner| owner != id) {
                return Err(TopikaError::UriTaken(uri.to_string()));
            }
            uris.insert(uri.to_string(), id);
        }
        if let Some(uri) = old_uri {
            if uris.get(uri).is_some_and(|&owner| owner == id) && Some(uri) != new_uri {
                uris.remove(uri);
            }
        }
        Ok(())
    }

    fn register_players(&mut self, assoc_id: i64, assoc: &AssociationModel) {
        for player in assoc.players() {
            self.state
                .players
                .entry(player.target.value())
                .or_default()
                .insert(assoc_id);
        }
    }

    fn unregister_players(&mut self, assoc_id: i64, assoc: &AssociationModel) {
        for player in assoc.players() {
            if let Some(set) = self.state.players.get_mut(&player.target.value()) {
                set.remove(&assoc_id);
                if set.is_empty() {
                    self.state.players.remove(&player.target.value());
                }
            }
        }
    }

    /// Remove every index entry referring to the entity.
    fn purge_index_entries(&mut self, id: i64) {
        for index in [&mut self.state.key_index, &mut self.state.fulltext_index] {
            index.retain(|_, ids| {
                ids.remove(&id);
                !ids.is_empty()
            });
        }
    }

    fn ids_for_token(&self, token: &str, field: Option<&str>) -> BTreeSet<i64> {
        match field {
            Some(field) => self
                .state
                .fulltext_index
                .get(&(field.to_string(), token.to_string()))
                .cloned()
                .unwrap_or_default(),
            None => {
                let mut ids = BTreeSet::new();
                for ((_, indexed_token), entry) in &self.state.fulltext_index {
                    if indexed_token == token {
                        ids.extend(entry.iter().copied());
                    }
                }
                ids
            }
        }
    }

    fn topics_for_ids(&self, ids: &BTreeSet<i64>) -> Vec<TopicModel> {
        ids.iter()
            .filter_map(|id| self.state.topics.get(id).cloned())
            .collect()
    }
}

impl GraphStorage for MemStorage {
    fn store_topic(&mut self, model: &mut TopicModel) -> Result<EntityId, TopikaError> {
        if model.id.is_assigned() {
            let id = model.id.value();
            let old_uri = self
                .state
                .topics
                .get(&id)
                .ok_or(TopikaError::EntityNotFound(model.id))?
                .uri
                .clone();
            Self::claim_uri(
                &mut self.state.topic_uris,
                old_uri.as_deref(),
                model.uri.as_deref(),
                id,
            )?;
        } else {
            let id = self.allocate_id();
            Self::claim_uri(&mut self.state.topic_uris, None, model.uri.as_deref(), id.value())?;
            model.id = id;
        }

        // Records never carry composite values; children are graph structure.
        let mut record = model.clone();
        record.children = ChildTopicsModel::new();
        self.state.topics.insert(model.id.value(), record);
        Ok(model.id)
    }

    fn fetch_topic(&self, id: EntityId) -> Result<Option<TopicModel>, TopikaError> {
        Ok(self.state.topics.get(&id.value()).cloned())
    }

    fn fetch_topic_by_uri(&self, uri: &str) -> Result<Option<TopicModel>, TopikaError> {
        Ok(self
            .state
            .topic_uris
            .get(uri)
            .and_then(|id| self.state.topics.get(id))
            .cloned())
    }

    fn fetch_topic_by_value(
        &self,
        key: &str,
        value: &SimpleValue,
    ) -> Result<Option<TopicModel>, TopikaError> {
        let mut topics = self.fetch_topics_by_value(key, value)?;
        match topics.len() {
            0 => Ok(None),
            1 => Ok(topics.pop()),
            count => Err(TopikaError::ambiguity(
                format!("value lookup \"{key}\""),
                count,
            )),
        }
    }

    fn fetch_topics_by_value(
        &self,
        key: &str,
        value: &SimpleValue,
    ) -> Result<Vec<TopicModel>, TopikaError> {
        let ids = self
            .state
            .key_index
            .get(&(key.to_string(), value.index_key()))
            .cloned()
            .unwrap_or_default();
        Ok(self.topics_for_ids(&ids))
    }

    fn query_fulltext(
        &self,
        term: &str,
        field: Option<&str>,
    ) -> Result<Vec<TopicModel>, TopikaError> {
        let tokens = tokenize(term);
        let Some(first) = tokens.first() else {
            return Ok(Vec::new());
        };

        let mut ids = self.ids_for_token(first, field);
        for token in &tokens[1..] {
            if ids.is_empty() {
                break;
            }
            let matching = self.ids_for_token(token, field);
            ids = ids.intersection(&matching).copied().collect();
        }
        Ok(self.topics_for_ids(&ids))
    }

    fn store_association(&mut self, model: &mut AssociationModel) -> Result<EntityId, TopikaError> {
        if model.id.is_assigned() {
            let id = model.id.value();
            let old = self
                .state
                .assocs
                .get(&id)
                .cloned()
                .ok_or(TopikaError::EntityNotFound(model.id))?;
            Self::claim_uri(
                &mut self.state.assoc_uris,
                old.uri.as_deref(),
                model.uri.as_deref(),
                id,
            )?;
            self.unregister_players(id, &old);
        } else {
            let id = self.allocate_id();
            Self::claim_uri(&mut self.state.assoc_uris, None, model.uri.as_deref(), id.value())?;
            model.id = id;
        }

        let mut record = model.clone();
        record.children = ChildTopicsModel::new();
        self.register_players(model.id.value(), &record);
        self.state.assocs.insert(model.id.value(), record);
        Ok(model.id)
    }

    fn fetch_association(&self, id: EntityId) -> Result<Option<AssociationModel>, TopikaError> {
        Ok(self.state.assocs.get(&id.value()).cloned())
    }

    fn fetch_association_by_uri(
        &self,
        uri: &str,
    ) -> Result<Option<AssociationModel>, TopikaError> {
        Ok(self
            .state
            .assoc_uris
            .get(uri)
            .and_then(|id| self.state.assocs.get(id))
            .cloned())
    }

    fn associations_of(&self, entity: EntityId) -> Result<Vec<AssociationModel>, TopikaError> {
        let Some(ids) = self.state.players.get(&entity.value()) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| self.state.assocs.get(id).cloned())
            .collect())
    }

    fn store_value(&mut self, id: EntityId, value: SimpleValue) -> Result<(), TopikaError> {
        if let Some(topic) = self.state.topics.get_mut(&id.value()) {
            topic.value = value;
            return Ok(());
        }
        if let Some(assoc) = self.state.assocs.get_mut(&id.value()) {
            assoc.value = value;
            return Ok(());
        }
        Err(TopikaError::EntityNotFound(id))
    }

    fn apply_index_op(&mut self, op: &IndexOp) -> Result<(), TopikaError> {
        match op {
            IndexOp::AddKey {
                field,
                value,
                entity,
            } => {
                self.state
                    .key_index
                    .entry((field.clone(), value.clone()))
                    .or_default()
                    .insert(entity.value());
            }
            IndexOp::RemoveKey {
                field,
                value,
                entity,
            } => {
                let key = (field.clone(), value.clone());
                if let Some(ids) = self.state.key_index.get_mut(&key) {
                    ids.remove(&entity.value());
                    if ids.is_empty() {
                        self.state.key_index.remove(&key);
                    }
                }
            }
            IndexOp::AddFulltext {
                field,
                text,
                entity,
            } => {
                for token in tokenize(text) {
                    self.state
                        .fulltext_index
                        .entry((field.clone(), token))
                        .or_default()
                        .insert(entity.value());
                }
            }
            IndexOp::RemoveFulltext {
                field,
                text,
                entity,
            } => {
                for token in tokenize(text) {
                    let key = (field.clone(), token);
                    if let Some(ids) = self.state.fulltext_index.get_mut(&key) {
                        ids.remove(&entity.value());
                        if ids.is_empty() {
                            self.state.fulltext_index.remove(&key);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn delete_topic(&mut self, id: EntityId) -> Result<(), TopikaError> {
        let record = self
            .state
            .topics
            .remove(&id.value())
            .ok_or(TopikaError::EntityNotFound(id))?;
        if let Some(uri) = &record.uri {
            self.state.topic_uris.remove(uri);
        }
        self.state.players.remove(&id.value());
        self.purge_index_entries(id.value());
        Ok(())
    }

    fn delete_association(&mut self, id: EntityId) -> Result<(), TopikaError> {
        let record = self
            .state
            .assocs
            .remove(&id.value())
            .ok_or(TopikaError::EntityNotFound(id))?;
        if let Some(uri) = &record.uri {
            self.state.assoc_uris.remove(uri);
        }
        self.unregister_players(id.value(), &record);
        self.state.players.remove(&id.value());
        self.purge_index_entries(id.value());
        Ok(())
    }

    fn begin_transaction(&mut self) -> Result<(), TopikaError> {
        if self.snapshot.is_some() {
            return Err(TopikaError::Storage(
                "transaction already active".to_string(),
            ));
        }
        self.snapshot = Some(Box::new(self.state.clone()));
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<(), TopikaError> {
        if self.snapshot.take().is_none() {
            return Err(TopikaError::Storage("no active transaction".to_string()));
        }
        Ok(())
    }

    fn rollback_transaction(&mut self) -> Result<(), TopikaError> {
        match self.snapshot.take() {
            Some(snapshot) => {
                self.state = *snapshot;
                Ok(())
            }
            None => Err(TopikaError::Storage("no active transaction".to_string())),
        }
    }

    fn topic_count(&self) -> Result<usize, TopikaError> {
        Ok(self.state.topics.len())
    }

    fn association_count(&self) -> Result<usize, TopikaError> {
        Ok(self.state.assocs.len())
    }
}

// =============================================================================
// TESTS
// =============================================================================
