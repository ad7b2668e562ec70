//! # redb-backed Storage Engine
//!
//! A disk-backed implementation of the storage contract using the redb
//! embedded database:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//! - Zero configuration
//!
//! ## Transaction model
//!
//! Mutations are buffered in an in-memory overlay (records, tombstones,
//! index operations) and flushed in a single redb write transaction at
//! commit. In-memory state (URI caches, id sequence) is restored from
//! backups on rollback and only becomes definitive after a successful
//! commit. Reads consult the overlay first, so a transaction sees its own
//! writes; value-index lookups reflect committed state.

use crate::index::IndexOp;
use crate::model::{AssociationModel, PlayerModel, TopicModel};
use crate::storage::{GraphStorage, tokenize};
use crate::types::{EntityId, SimpleValue, TopikaError};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Table for topics: id -> serialized TopicRecord.
const TOPICS: TableDefinition<i64, &[u8]> = TableDefinition::new("topics");

/// Table for associations: id -> serialized AssocRecord.
const ASSOCS: TableDefinition<i64, &[u8]> = TableDefinition::new("assocs");

/// URI alias index, topic namespace: uri -> id.
const TOPIC_URIS: TableDefinition<&str, i64> = TableDefinition::new("topic_uris");

/// URI alias index, association namespace: uri -> id.
const ASSOC_URIS: TableDefinition<&str, i64> = TableDefinition::new("assoc_uris");

/// Incidence index: (entity id, association id) -> marker.
const PLAYERS: TableDefinition<(i64, i64), u8> = TableDefinition::new("players");

/// Exact-match value index: (field, canonical value, entity id) -> marker.
const KEY_INDEX: TableDefinition<(&str, &str, i64), u8> = TableDefinition::new("key_index");

/// Full-text index: (field, token, entity id) -> marker.
const FULLTEXT_INDEX: TableDefinition<(&str, &str, i64), u8> =
    TableDefinition::new("fulltext_index");

/// Table for metadata: key string -> value i64.
const METADATA: TableDefinition<&str, i64> = TableDefinition::new("metadata");

fn storage_err(e: impl std::fmt::Display) -> TopikaError {
    TopikaError::Storage(e.to_string())
}

// =============================================================================
// RECORDS
// =============================================================================

/// On-disk form of a topic, postcard-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TopicRecord {
    uri: Option<String>,
    type_uri: String,
    value: SimpleValue,
}

impl TopicRecord {
    fn from_model(model: &TopicModel) -> Self {
        Self {
            uri: model.uri.clone(),
            type_uri: model.type_uri.clone(),
            value: model.value.clone(),
        }
    }

    fn into_model(self, id: i64) -> TopicModel {
        let mut model = TopicModel::new(self.type_uri, self.value);
        model.id = EntityId(id);
        model.uri = self.uri;
        model
    }
}

/// On-disk form of an association, postcard-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AssocRecord {
    uri: Option<String>,
    type_uri: String,
    value: SimpleValue,
    players: [(i64, String); 2],
}

impl AssocRecord {
    fn from_model(model: &AssociationModel) -> Self {
        Self {
            uri: model.uri.clone(),
            type_uri: model.type_uri.clone(),
            value: model.value.clone(),
            players: [
                (
                    model.player1.target.value(),
                    model.player1.role_type_uri.clone(),
                ),
                (
                    model.player2.target.value(),
                    model.player2.role_type_uri.clone(),
                ),
            ],
        }
    }

    fn into_model(self, id: i64) -> AssociationModel {
        let [(t1, r1), (t2, r2)] = self.players;
        let mut model = AssociationModel::new(
            self.type_uri,
            PlayerModel::new(EntityId(t1), r1),
            PlayerModel::new(EntityId(t2), r2),
        );
        model.id = EntityId(id);
        model.uri = self.uri;
        model.value = self.value;
        model
    }
}

// =============================================================================
// TRANSACTION OVERLAY
// =============================================================================

/// Buffered state of the active transaction.
#[derive(Debug, Default)]
struct Overlay {
    /// Staged topic records; `None` is a tombstone.
    topics: BTreeMap<i64, Option<TopicRecord>>,
    /// Staged association records; `None` is a tombstone.
    assocs: BTreeMap<i64, Option<AssocRecord>>,
    /// Staged URI table writes, topic namespace; `None` removes the alias.
    topic_uri_ops: BTreeMap<String, Option<i64>>,
    /// Staged URI table writes, association namespace.
    assoc_uri_ops: BTreeMap<String, Option<i64>>,
    /// Incidence entries to add at commit.
    players_add: BTreeSet<(i64, i64)>,
    /// Incidence entries to remove at commit.
    players_remove: BTreeSet<(i64, i64)>,
    /// Index operations to apply at commit, in order.
    index_ops: Vec<IndexOp>,
    /// Entities whose index and incidence entries are purged at commit.
    purge_ids: BTreeSet<i64>,
    /// In-memory state backups for rollback.
    next_id_backup: i64,
    topic_uri_cache_backup: BTreeMap<String, i64>,
    assoc_uri_cache_backup: BTreeMap<String, i64>,
}

// =============================================================================
// STORAGE
// =============================================================================

/// A disk-backed storage engine using redb.
pub struct RedbStorage {
    /// The redb database handle.
    db: Database,
    /// In-memory URI caches for fast alias lookups.
    topic_uri_cache: BTreeMap<String, i64>,
    assoc_uri_cache: BTreeMap<String, i64>,
    /// Next available entity id.
    next_id: i64,
    /// Active transaction, if any.
    tx: Option<Overlay>,
}

impl std::fmt::Debug for RedbStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStorage")
            .field("topic_uri_cache_size", &self.topic_uri_cache.len())
            .field("assoc_uri_cache_size", &self.assoc_uri_cache.len())
            .field("next_id", &self.next_id)
            .field("tx_active", &self.tx.is_some())
            .finish_non_exhaustive()
    }
}

impl RedbStorage {
    /// Open or create a storage database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TopikaError> {
        let db = Database::create(path.as_ref()).map_err(storage_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(storage_err)?;
            let _ = write_txn.open_table(TOPICS).map_err(storage_err)?;
            let _ = write_txn.open_table(ASSOCS).map_err(storage_err)?;
            let _ = write_txn.open_table(TOPIC_URIS).map_err(storage_err)?;
            let _ = write_txn.open_table(ASSOC_URIS).map_err(storage_err)?;
            let _ = write_txn.open_table(PLAYERS).map_err(storage_err)?;
            let _ = write_txn.open_table(KEY_INDEX).map_err(storage_err)?;
            let _ = write_txn.open_table(FULLTEXT_INDEX).map_err(storage_err)?;
            let _ = write_txn.open_table(METADATA).map_err(storage_err)?;
            write_txn.commit().map_err(storage_err)?;
        }

        let read_txn = db.begin_read().map_err(storage_err)?;

        let next_id = {
            let table = read_txn.open_table(METADATA).map_err(storage_err)?;
            table
                .get("next_id")
                .map_err(storage_err)?
                .map(|v| v.value())
                .unwrap_or(0)
        };

        let topic_uri_cache = Self::load_uri_cache(&read_txn, TOPIC_URIS)?;
        let assoc_uri_cache = Self::load_uri_cache(&read_txn, ASSOC_URIS)?;

        Ok(Self {
            db,
            topic_uri_cache,
            assoc_uri_cache,
            next_id,
            tx: None,
        })
    }

    fn load_uri_cache(
        read_txn: &redb::ReadTransaction,
        def: TableDefinition<&str, i64>,
    ) -> Result<BTreeMap<String, i64>, TopikaError> {
        let table = read_txn.open_table(def).map_err(storage_err)?;
        let mut cache = BTreeMap::new();
        for entry in table.iter().map_err(storage_err)? {
            let (key, value) = entry.map_err(storage_err)?;
            cache.insert(key.value().to_string(), value.value());
        }
        Ok(cache)
    }

    /// Compact the database (optional optimization).
    pub fn compact(&mut self) -> Result<(), TopikaError> {
        self.db.compact().map_err(storage_err)?;
        Ok(())
    }

    /// Run a mutation inside the active transaction, or wrap it in its own
    /// begin/commit pair when none is active.
    fn mutate<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, TopikaError>,
    ) -> Result<T, TopikaError> {
        if self.tx.is_some() {
            return f(self);
        }
        self.begin_transaction()?;
        match f(self) {
            Ok(value) => {
                self.commit_transaction()?;
                Ok(value)
            }
            Err(e) => {
                // Best effort: the original error is the one reported.
                if let Err(rollback_err) = self.rollback_transaction() {
                    tracing::warn!(error = %rollback_err, "rollback after failed mutation failed");
                }
                Err(e)
            }
        }
    }

    fn overlay(&mut self) -> Result<&mut Overlay, TopikaError> {
        self.tx
            .as_mut()
            .ok_or_else(|| TopikaError::Storage("no active transaction".to_string()))
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        EntityId(id)
    }

    // -------------------------------------------------------------------------
    // Overlay-aware record reads
    // -------------------------------------------------------------------------

    fn read_topic_record(&self, id: i64) -> Result<Option<TopicRecord>, TopikaError> {
        if let Some(overlay) = &self.tx
            && let Some(staged) = overlay.topics.get(&id)
        {
            return Ok(staged.clone());
        }
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(TOPICS).map_err(storage_err)?;
        match table.get(id).map_err(storage_err)? {
            Some(data) => {
                let record: TopicRecord = postcard::from_bytes(data.value())
                    .map_err(|e| TopikaError::Serialization(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn read_assoc_record(&self, id: i64) -> Result<Option<AssocRecord>, TopikaError> {
        if let Some(overlay) = &self.tx
            && let Some(staged) = overlay.assocs.get(&id)
        {
            return Ok(staged.clone());
        }
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(ASSOCS).map_err(storage_err)?;
        match table.get(id).map_err(storage_err)? {
            Some(data) => {
                let record: AssocRecord = postcard::from_bytes(data.value())
                    .map_err(|e| TopikaError::Serialization(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Ids filed under `(field, value)` in the exact-match index.
    fn key_index_ids(&self, field: &str, value: &str) -> Result<BTreeSet<i64>, TopikaError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(KEY_INDEX).map_err(storage_err)?;
        let mut ids = BTreeSet::new();
        for entry in table
            .range((field, value, i64::MIN)..=(field, value, i64::MAX))
            .map_err(storage_err)?
        {
            let (key, _) = entry.map_err(storage_err)?;
            let (_, _, id) = key.value();
            ids.insert(id);
        }
        Ok(ids)
    }

    /// Ids whose full-text entries contain the token, optionally narrowed to
    /// one field.
    fn fulltext_ids(&self, token: &str, field: Option<&str>) -> Result<BTreeSet<i64>, TopikaError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(FULLTEXT_INDEX).map_err(storage_err)?;
        let mut ids = BTreeSet::new();
        match field {
            Some(field) => {
                for entry in table
                    .range((field, token, i64::MIN)..=(field, token, i64::MAX))
                    .map_err(storage_err)?
                {
                    let (key, _) = entry.map_err(storage_err)?;
                    let (_, _, id) = key.value();
                    ids.insert(id);
                }
            }
            None => {
                for entry in table.iter().map_err(storage_err)? {
                    let (key, _) = entry.map_err(storage_err)?;
                    let (_, indexed_token, id) = key.value();
                    if indexed_token == token {
                        ids.insert(id);
                    }
                }
            }
        }
        Ok(ids)
    }

    fn topics_for_ids(&self, ids: &BTreeSet<i64>) -> Result<Vec<TopicModel>, TopikaError> {
        let mut topics = Vec::new();
        for &id in ids {
            if let Some(record) = self.read_topic_record(id)? {
                topics.push(record.into_model(id));
            }
        }
        Ok(topics)
    }

    // -------------------------------------------------------------------------
    // Commit helpers
    // -------------------------------------------------------------------------

    fn flush_overlay(&mut self, overlay: &Overlay) -> Result<(), TopikaError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut topics_table = write_txn.open_table(TOPICS).map_err(storage_err)?;
            for (&id, staged) in &overlay.topics {
                match staged {
                    Some(record) => {
                        let bytes = postcard::to_allocvec(record)
                            .map_err(|e| TopikaError::Serialization(e.to_string()))?;
                        topics_table
                            .insert(id, bytes.as_slice())
                            .map_err(storage_err)?;
                    }
                    None => {
                        topics_table.remove(id).map_err(storage_err)?;
                    }
                }
            }

            let mut assocs_table = write_txn.open_table(ASSOCS).map_err(storage_err)?;
            for (&id, staged) in &overlay.assocs {
                match staged {
                    Some(record) => {
                        let bytes = postcard::to_allocvec(record)
                            .map_err(|e| TopikaError::Serialization(e.to_string()))?;
                        assocs_table
                            .insert(id, bytes.as_slice())
                            .map_err(storage_err)?;
                    }
                    None => {
                        assocs_table.remove(id).map_err(storage_err)?;
                    }
                }
            }

            let mut topic_uris_table = write_txn.open_table(TOPIC_URIS).map_err(storage_err)?;
            for (uri, staged) in &overlay.topic_uri_ops {
                match staged {
                    Some(id) => {
                        topic_uris_table
                            .insert(uri.as_str(), *id)
                            .map_err(storage_err)?;
                    }
                    None => {
                        topic_uris_table.remove(uri.as_str()).map_err(storage_err)?;
                    }
                }
            }

            let mut assoc_uris_table = write_txn.open_table(ASSOC_URIS).map_err(storage_err)?;
            for (uri, staged) in &overlay.assoc_uri_ops {
                match staged {
                    Some(id) => {
                        assoc_uris_table
                            .insert(uri.as_str(), *id)
                            .map_err(storage_err)?;
                    }
                    None => {
                        assoc_uris_table.remove(uri.as_str()).map_err(storage_err)?;
                    }
                }
            }

            let mut players_table = write_txn.open_table(PLAYERS).map_err(storage_err)?;
            for &(entity, assoc) in &overlay.players_remove {
                players_table.remove((entity, assoc)).map_err(storage_err)?;
            }
            for &(entity, assoc) in &overlay.players_add {
                players_table
                    .insert((entity, assoc), 0u8)
                    .map_err(storage_err)?;
            }

            let mut key_table = write_txn.open_table(KEY_INDEX).map_err(storage_err)?;
            let mut fulltext_table = write_txn.open_table(FULLTEXT_INDEX).map_err(storage_err)?;
            for op in &overlay.index_ops {
                match op {
                    IndexOp::AddKey {
                        field,
                        value,
                        entity,
                    } => {
                        key_table
                            .insert((field.as_str(), value.as_str(), entity.value()), 0u8)
                            .map_err(storage_err)?;
                    }
                    IndexOp::RemoveKey {
                        field,
                        value,
                        entity,
                    } => {
                        key_table
                            .remove((field.as_str(), value.as_str(), entity.value()))
                            .map_err(storage_err)?;
                    }
                    IndexOp::AddFulltext {
                        field,
                        text,
                        entity,
                    } => {
                        for token in tokenize(text) {
                            fulltext_table
                                .insert((field.as_str(), token.as_str(), entity.value()), 0u8)
                                .map_err(storage_err)?;
                        }
                    }
                    IndexOp::RemoveFulltext {
                        field,
                        text,
                        entity,
                    } => {
                        for token in tokenize(text) {
                            fulltext_table
                                .remove((field.as_str(), token.as_str(), entity.value()))
                                .map_err(storage_err)?;
                        }
                    }
                }
            }

            // Purge index and incidence entries of deleted entities.
            if !overlay.purge_ids.is_empty() {
                let mut stale_keys = Vec::new();
                for entry in key_table.iter().map_err(storage_err)? {
                    let (key, _) = entry.map_err(storage_err)?;
                    let (field, value, id) = key.value();
                    if overlay.purge_ids.contains(&id) {
                        stale_keys.push((field.to_string(), value.to_string(), id));
                    }
                }
                for (field, value, id) in stale_keys {
                    key_table
                        .remove((field.as_str(), value.as_str(), id))
                        .map_err(storage_err)?;
                }

                let mut stale_tokens = Vec::new();
                for entry in fulltext_table.iter().map_err(storage_err)? {
                    let (key, _) = entry.map_err(storage_err)?;
                    let (field, token, id) = key.value();
                    if overlay.purge_ids.contains(&id) {
                        stale_tokens.push((field.to_string(), token.to_string(), id));
                    }
                }
                for (field, token, id) in stale_tokens {
                    fulltext_table
                        .remove((field.as_str(), token.as_str(), id))
                        .map_err(storage_err)?;
                }

                let mut stale_players = Vec::new();
                for &id in &overlay.purge_ids {
                    for entry in players_table
                        .range((id, i64::MIN)..=(id, i64::MAX))
                        .map_err(storage_err)?
                    {
                        let (key, _) = entry.map_err(storage_err)?;
                        stale_players.push(key.value());
                    }
                }
                for key in stale_players {
                    players_table.remove(key).map_err(storage_err)?;
                }
            }

            let mut meta_table = write_txn.open_table(METADATA).map_err(storage_err)?;
            meta_table
                .insert("next_id", self.next_id)
                .map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;
        Ok(())
    }
}

// =============================================================================
// GRAPHSTORAGE TRAIT IMPLEMENTATION
// =============================================================================

impl GraphStorage for RedbStorage {
    fn store_topic(&mut self, model: &mut TopicModel) -> Result<EntityId, TopikaError> {
        let mut staged = model.clone();
        let id = self.mutate(|this| {
            let old_uri = if staged.id.is_assigned() {
                let existing = this
                    .read_topic_record(staged.id.value())?
                    .ok_or(TopikaError::EntityNotFound(staged.id))?;
                existing.uri
            } else {
                staged.id = this.allocate_id();
                None
            };
            let id = staged.id.value();

            if old_uri.as_deref() != staged.uri.as_deref() {
                if let Some(uri) = &staged.uri {
                    if this.topic_uri_cache.get(uri).is_some_and(|&owner| owner != id) {
                        return Err(TopikaError::UriTaken(uri.clone()));
                    }
                    this.topic_uri_cache.insert(uri.clone(), id);
                    this.overlay()?.topic_uri_ops.insert(uri.clone(), Some(id));
                }
                if let Some(uri) = old_uri.filter(|u| Some(u) != staged.uri.as_ref()) {
                    this.topic_uri_cache.remove(&uri);
                    this.overlay()?.topic_uri_ops.insert(uri, None);
                }
            }

            let record = TopicRecord::from_model(&staged);
            this.overlay()?.topics.insert(id, Some(record));
            Ok(staged.id)
        })?;
        model.id = id;
        Ok(id)
    }

    fn fetch_topic(&self, id: EntityId) -> Result<Option<TopicModel>, TopikaError> {
        Ok(self
            .read_topic_record(id.value())?
            .map(|record| record.into_model(id.value())))
    }

    fn fetch_topic_by_uri(&self, uri: &str) -> Result<Option<TopicModel>, TopikaError> {
        match self.topic_uri_cache.get(uri) {
            Some(&id) => self.fetch_topic(EntityId(id)),
            None => Ok(None),
        }
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
        let ids = self.key_index_ids(key, &value.index_key())?;
        self.topics_for_ids(&ids)
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

        let mut ids = self.fulltext_ids(first, field)?;
        for token in &tokens[1..] {
            if ids.is_empty() {
                break;
            }
            let matching = self.fulltext_ids(token, field)?;
            ids = ids.intersection(&matching).copied().collect();
        }
        self.topics_for_ids(&ids)
    }

    fn store_association(&mut self, model: &mut AssociationModel) -> Result<EntityId, TopikaError> {
        let mut staged = model.clone();
        let id = self.mutate(|this| {
            let old = if staged.id.is_assigned() {
                Some(
                    this.read_assoc_record(staged.id.value())?
                        .ok_or(TopikaError::EntityNotFound(staged.id))?,
                )
            } else {
                staged.id = this.allocate_id();
                None
            };
            let id = staged.id.value();
            let old_uri = old.as_ref().and_then(|o| o.uri.clone());

            if old_uri.as_deref() != staged.uri.as_deref() {
                if let Some(uri) = &staged.uri {
                    if this.assoc_uri_cache.get(uri).is_some_and(|&owner| owner != id) {
                        return Err(TopikaError::UriTaken(uri.clone()));
                    }
                    this.assoc_uri_cache.insert(uri.clone(), id);
                    this.overlay()?.assoc_uri_ops.insert(uri.clone(), Some(id));
                }
                if let Some(uri) = old_uri.filter(|u| Some(u) != staged.uri.as_ref()) {
                    this.assoc_uri_cache.remove(&uri);
                    this.overlay()?.assoc_uri_ops.insert(uri, None);
                }
            }

            let record = AssocRecord::from_model(&staged);
            let overlay = this.overlay()?;
            if let Some(old_record) = old {
                for (target, _) in old_record.players {
                    overlay.players_add.remove(&(target, id));
                    overlay.players_remove.insert((target, id));
                }
            }
            for (target, _) in &record.players {
                overlay.players_remove.remove(&(*target, id));
                overlay.players_add.insert((*target, id));
            }
            overlay.assocs.insert(id, Some(record));
            Ok(staged.id)
        })?;
        model.id = id;
        Ok(id)
    }

    fn fetch_association(&self, id: EntityId) -> Result<Option<AssociationModel>, TopikaError> {
        Ok(self
            .read_assoc_record(id.value())?
            .map(|record| record.into_model(id.value())))
    }

    fn fetch_association_by_uri(
        &self,
        uri: &str,
    ) -> Result<Option<AssociationModel>, TopikaError> {
        match self.assoc_uri_cache.get(uri) {
            Some(&id) => self.fetch_association(EntityId(id)),
            None => Ok(None),
        }
    }

    fn associations_of(&self, entity: EntityId) -> Result<Vec<AssociationModel>, TopikaError> {
        let mut ids = BTreeSet::new();
        {
            let read_txn = self.db.begin_read().map_err(storage_err)?;
            let table = read_txn.open_table(PLAYERS).map_err(storage_err)?;
            for entry in table
                .range((entity.value(), i64::MIN)..=(entity.value(), i64::MAX))
                .map_err(storage_err)?
            {
                let (key, _) = entry.map_err(storage_err)?;
                let (_, assoc_id) = key.value();
                ids.insert(assoc_id);
            }
        }
        if let Some(overlay) = &self.tx {
            for &(target, assoc_id) in &overlay.players_add {
                if target == entity.value() {
                    ids.insert(assoc_id);
                }
            }
            for &(target, assoc_id) in &overlay.players_remove {
                if target == entity.value() {
                    ids.remove(&assoc_id);
                }
            }
        }

        let mut assocs = Vec::new();
        for id in ids {
            if let Some(record) = self.read_assoc_record(id)? {
                assocs.push(record.into_model(id));
            }
        }
        Ok(assocs)
    }

    fn store_value(&mut self, id: EntityId, value: SimpleValue) -> Result<(), TopikaError> {
        self.mutate(|this| {
            if let Some(mut record) = this.read_topic_record(id.value())? {
                record.value = value;
                this.overlay()?.topics.insert(id.value(), Some(record));
                return Ok(());
            }
            if let Some(mut record) = this.read_assoc_record(id.value())? {
                record.value = value;
                this.overlay()?.assocs.insert(id.value(), Some(record));
                return Ok(());
            }
            Err(TopikaError::EntityNotFound(id))
        })
    }

    fn apply_index_op(&mut self, op: &IndexOp) -> Result<(), TopikaError> {
        let op = op.clone();
        self.mutate(|this| {
            this.overlay()?.index_ops.push(op);
            Ok(())
        })
    }

    fn delete_topic(&mut self, id: EntityId) -> Result<(), TopikaError> {
        self.mutate(|this| {
            let record = this
                .read_topic_record(id.value())?
                .ok_or(TopikaError::EntityNotFound(id))?;
            if let Some(uri) = &record.uri {
                this.topic_uri_cache.remove(uri);
                this.overlay()?.topic_uri_ops.insert(uri.clone(), None);
            }
            let overlay = this.overlay()?;
            overlay.topics.insert(id.value(), None);
            overlay.purge_ids.insert(id.value());
            Ok(())
        })
    }

    fn delete_association(&mut self, id: EntityId) -> Result<(), TopikaError> {
        self.mutate(|this| {
            let record = this
                .read_assoc_record(id.value())?
                .ok_or(TopikaError::EntityNotFound(id))?;
            if let Some(uri) = &record.uri {
                this.assoc_uri_cache.remove(uri);
                this.overlay()?.assoc_uri_ops.insert(uri.clone(), None);
            }
            let overlay = this.overlay()?;
            for (target, _) in &record.players {
                overlay.players_add.remove(&(*target, id.value()));
                overlay.players_remove.insert((*target, id.value()));
            }
            overlay.assocs.insert(id.value(), None);
            overlay.purge_ids.insert(id.value());
            Ok(())
        })
    }

    fn begin_transaction(&mut self) -> Result<(), TopikaError> {
        if self.tx.is_some() {
            return Err(TopikaError::Storage(
                "transaction already active".to_string(),
            ));
        }
        self.tx = Some(Overlay {
            next_id_backup: self.next_id,
            topic_uri_cache_backup: self.topic_uri_cache.clone(),
            assoc_uri_cache_backup: self.assoc_uri_cache.clone(),
            ..Overlay::default()
        });
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<(), TopikaError> {
        let overlay = self
            .tx
            .take()
            .ok_or_else(|| TopikaError::Storage("no active transaction".to_string()))?;
        match self.flush_overlay(&overlay) {
            Ok(()) => Ok(()),
            Err(e) => {
                // The write transaction never committed; restore in-memory
                // state as a rollback would.
                self.next_id = overlay.next_id_backup;
                self.topic_uri_cache = overlay.topic_uri_cache_backup;
                self.assoc_uri_cache = overlay.assoc_uri_cache_backup;
                Err(e)
            }
        }
    }

    fn rollback_transaction(&mut self) -> Result<(), TopikaError> {
        let overlay = self
            .tx
            .take()
            .ok_or_else(|| TopikaError::Storage("no active transaction".to_string()))?;
        self.next_id = overlay.next_id_backup;
        self.topic_uri_cache = overlay.topic_uri_cache_backup;
        self.assoc_uri_cache = overlay.assoc_uri_cache_backup;
        Ok(())
    }

    fn topic_count(&self) -> Result<usize, TopikaError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(TOPICS).map_err(storage_err)?;
        let mut count = 0usize;
        for entry in table.iter().map_err(storage_err)? {
            entry.map_err(storage_err)?;
            count += 1;
        }
        if let Some(overlay) = &self.tx {
            for (id, staged) in &overlay.topics {
                let on_disk = {
                    let txn = self.db.begin_read().map_err(storage_err)?;
                    let t = txn.open_table(TOPICS).map_err(storage_err)?;
                    t.get(*id).map_err(storage_err)?.is_some()
                };
                match (staged.is_some(), on_disk) {
                    (true, false) => count += 1,
                    (false, true) => count = count.saturating_sub(1),
                    _ => {}
                }
            }
        }
        Ok(count)
    }

    fn association_count(&self) -> Result<usize, TopikaError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(ASSOCS).map_err(storage_err)?;
        let mut count = 0usize;
        for entry in table.iter().map_err(storage_err)? {
            entry.map_err(storage_err)?;
            count += 1;
        }
        if let Some(overlay) = &self.tx {
            for (id, staged) in &overlay.assocs {
                let on_disk = {
                    let txn = self.db.begin_read().map_err(storage_err)?;
                    let t = txn.open_table(ASSOCS).map_err(storage_err)?;
                    t.get(*id).map_err(storage_err)?.is_some()
                };
                match (staged.is_some(), on_disk) {
                    (true, false) => count += 1,
                    (false, true) => count = count.saturating_sub(1),
                    _ => {}
                }
            }
        }
        Ok(count)
    }
}

// =============================================================================
// TESTS
// =============================================================================
