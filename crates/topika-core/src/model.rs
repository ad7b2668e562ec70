//! # Object Model
//!
//! Mutable DTOs for topics and associations, independent of storage.
//!
//! A model has no identity requirement until persisted (`id` stays at the
//! `UNASSIGNED` sentinel). After persistence the id is fixed and subsequent
//! updates target the same id. Persistence itself is delegated to the
//! storage contract; nothing here mutates anything but in-memory fields.

use crate::types::{EntityId, SimpleValue, TopikaError};
use crate::uris::{MAX_URI_LENGTH, MAX_VALUE_LENGTH};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// PLAYER
// =============================================================================

/// One endpoint of an association: a target entity paired with the role it
/// plays.
///
/// The target may be a topic or, for higher-order associations, another
/// association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerModel {
    pub target: EntityId,
    pub role_type_uri: String,
}

impl PlayerModel {
    /// Create a new player binding.
    #[must_use]
    pub fn new(target: EntityId, role_type_uri: impl Into<String>) -> Self {
        Self {
            target,
            role_type_uri: role_type_uri.into(),
        }
    }
}

// =============================================================================
// TOPIC
// =============================================================================

/// Model of a topic: a graph node representing a domain entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicModel {
    /// `EntityId::UNASSIGNED` until the storage layer assigns one.
    #[serde(default)]
    pub id: EntityId,
    /// Optional unique alias within the topic namespace.
    #[serde(default)]
    pub uri: Option<String>,
    /// URI of this topic's type.
    pub type_uri: String,
    /// The simple value; `Empty` for composite topics.
    #[serde(default)]
    pub value: SimpleValue,
    /// The hierarchical value, keyed by composition-definition URI.
    #[serde(default)]
    pub children: ChildTopicsModel,
}

impl TopicModel {
    /// Create a new unpersisted topic model.
    #[must_use]
    pub fn new(type_uri: impl Into<String>, value: impl Into<SimpleValue>) -> Self {
        Self {
            id: EntityId::UNASSIGNED,
            uri: None,
            type_uri: type_uri.into(),
            value: value.into(),
            children: ChildTopicsModel::new(),
        }
    }

    /// Set the URI alias.
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the composite value.
    #[must_use]
    pub fn with_children(mut self, children: ChildTopicsModel) -> Self {
        self.children = children;
        self
    }

    /// Validate the model before it reaches storage.
    pub fn validate(&self) -> Result<(), TopikaError> {
        validate_type_uri(&self.type_uri)?;
        if let Some(uri) = &self.uri {
            validate_uri(uri)?;
        }
        validate_value(&self.value)
    }

    /// Serialize to a generic JSON value tree for transport.
    pub fn to_json(&self) -> Result<serde_json::Value, TopikaError> {
        serde_json::to_value(self).map_err(|e| TopikaError::Serialization(e.to_string()))
    }
}

// =============================================================================
// ASSOCIATION
// =============================================================================

/// Model of an association: a typed edge with exactly two players.
///
/// The two-player invariant is structural (two named fields, not a list).
/// The role-type pair need not be distinct; traversal matches by role type,
/// not by physical player slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationModel {
    #[serde(default)]
    pub id: EntityId,
    /// Optional unique alias within the association namespace.
    #[serde(default)]
    pub uri: Option<String>,
    pub type_uri: String,
    #[serde(default)]
    pub value: SimpleValue,
    pub player1: PlayerModel,
    pub player2: PlayerModel,
    #[serde(default)]
    pub children: ChildTopicsModel,
}

impl AssociationModel {
    /// Create a new unpersisted association model.
    #[must_use]
    pub fn new(type_uri: impl Into<String>, player1: PlayerModel, player2: PlayerModel) -> Self {
        Self {
            id: EntityId::UNASSIGNED,
            uri: None,
            type_uri: type_uri.into(),
            value: SimpleValue::Empty,
            player1,
            player2,
            children: ChildTopicsModel::new(),
        }
    }

    /// Set the URI alias.
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the simple value.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<SimpleValue>) -> Self {
        self.value = value.into();
        self
    }

    /// Both players, in physical slot order.
    #[must_use]
    pub fn players(&self) -> [&PlayerModel; 2] {
        [&self.player1, &self.player2]
    }

    /// Whether the given entity plays in this association.
    #[must_use]
    pub fn involves(&self, entity: EntityId) -> bool {
        self.player1.target == entity || self.player2.target == entity
    }

    /// The player opposite to the given physical slot (0 or 1).
    #[must_use]
    pub fn other_player(&self, slot: usize) -> &PlayerModel {
        if slot == 0 { &self.player2 } else { &self.player1 }
    }

    /// Validate the model before it reaches storage.
    pub fn validate(&self) -> Result<(), TopikaError> {
        validate_type_uri(&self.type_uri)?;
        if let Some(uri) = &self.uri {
            validate_uri(uri)?;
        }
        validate_value(&self.value)?;
        for player in self.players() {
            if !player.target.is_assigned() {
                return Err(TopikaError::InvalidModel(
                    "association player targets an unassigned entity".to_string(),
                ));
            }
            validate_uri(&player.role_type_uri)?;
        }
        Ok(())
    }

    /// Serialize to a generic JSON value tree for transport.
    pub fn to_json(&self) -> Result<serde_json::Value, TopikaError> {
        serde_json::to_value(self).map_err(|e| TopikaError::Serialization(e.to_string()))
    }
}

// =============================================================================
// CHILD TOPICS (COMPOSITE VALUE)
// =============================================================================

/// One entry of a child slot.
///
/// The reference/deletion distinction is a closed variant, so "reference and
/// deletion reference are mutually exclusive" holds by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildValue {
    /// A plain simple value: creates or updates the child entity.
    Value(SimpleValue),
    /// A nested composite value for a composite-typed child.
    Composite(ChildTopicsModel),
    /// Reference to an existing entity by id; rewires without creating.
    Ref(EntityId),
    /// Reference to an existing entity by URI; rewires without creating.
    RefByUri(String),
    /// Marker meaning "detach this existing child".
    Deletion(EntityId),
}

/// A child slot holds a single entry or an ordered list, never both.
///
/// Cardinality is structural here but *enforced* by the owning type's
/// composition definition, not by the value itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildSlot {
    One(ChildValue),
    Many(Vec<ChildValue>),
}

/// The composite value of an entity: composition-definition URI mapped to a
/// child slot.
///
/// An empty composite has no invalid intermediate state; a missing slot means
/// "no value", never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChildTopicsModel {
    slots: BTreeMap<String, ChildSlot>,
}

impl ChildTopicsModel {
    /// Create an empty composite value.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no slot is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of populated slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Get a slot by composition-definition URI.
    #[must_use]
    pub fn get(&self, comp_def_uri: &str) -> Option<&ChildSlot> {
        self.slots.get(comp_def_uri)
    }

    /// Get the single entry of a slot, if it is single-valued.
    #[must_use]
    pub fn one(&self, comp_def_uri: &str) -> Option<&ChildValue> {
        match self.slots.get(comp_def_uri) {
            Some(ChildSlot::One(value)) => Some(value),
            _ => None,
        }
    }

    /// Get the entries of a slot, if it is multi-valued.
    #[must_use]
    pub fn many(&self, comp_def_uri: &str) -> Option<&[ChildValue]> {
        match self.slots.get(comp_def_uri) {
            Some(ChildSlot::Many(values)) => Some(values),
            _ => None,
        }
    }

    /// Replace a single-valued slot.
    pub fn set(&mut self, comp_def_uri: impl Into<String>, value: ChildValue) -> &mut Self {
        self.slots.insert(comp_def_uri.into(), ChildSlot::One(value));
        self
    }

    /// Append to a multi-valued slot, creating it if absent.
    ///
    /// A pre-existing single entry is promoted into a list of one.
    pub fn add(&mut self, comp_def_uri: impl Into<String>, value: ChildValue) -> &mut Self {
        let entry = self
            .slots
            .entry(comp_def_uri.into())
            .or_insert_with(|| ChildSlot::Many(Vec::new()));
        match entry {
            ChildSlot::Many(values) => values.push(value),
            ChildSlot::One(existing) => {
                let first = existing.clone();
                *entry = ChildSlot::Many(vec![first, value]);
            }
        }
        self
    }

    /// Drop a slot entirely.
    pub fn clear_slot(&mut self, comp_def_uri: &str) -> Option<ChildSlot> {
        self.slots.remove(comp_def_uri)
    }

    /// Set a single plain value.
    pub fn set_value(
        &mut self,
        comp_def_uri: impl Into<String>,
        value: impl Into<SimpleValue>,
    ) -> &mut Self {
        self.set(comp_def_uri, ChildValue::Value(value.into()))
    }

    /// Set a single nested composite.
    pub fn set_composite(
        &mut self,
        comp_def_uri: impl Into<String>,
        children: ChildTopicsModel,
    ) -> &mut Self {
        self.set(comp_def_uri, ChildValue::Composite(children))
    }

    /// Set a single reference by id.
    pub fn set_ref(&mut self, comp_def_uri: impl Into<String>, target: EntityId) -> &mut Self {
        self.set(comp_def_uri, ChildValue::Ref(target))
    }

    /// Set a single reference by URI.
    pub fn set_ref_by_uri(
        &mut self,
        comp_def_uri: impl Into<String>,
        uri: impl Into<String>,
    ) -> &mut Self {
        self.set(comp_def_uri, ChildValue::RefByUri(uri.into()))
    }

    /// Set a single deletion reference.
    pub fn set_deletion(&mut self, comp_def_uri: impl Into<String>, target: EntityId) -> &mut Self {
        self.set(comp_def_uri, ChildValue::Deletion(target))
    }

    /// Append a plain value.
    pub fn add_value(
        &mut self,
        comp_def_uri: impl Into<String>,
        value: impl Into<SimpleValue>,
    ) -> &mut Self {
        self.add(comp_def_uri, ChildValue::Value(value.into()))
    }

    /// Append a reference by id.
    pub fn add_ref(&mut self, comp_def_uri: impl Into<String>, target: EntityId) -> &mut Self {
        self.add(comp_def_uri, ChildValue::Ref(target))
    }

    /// Append a deletion reference (detaches one matching element).
    pub fn add_deletion(&mut self, comp_def_uri: impl Into<String>, target: EntityId) -> &mut Self {
        self.add(comp_def_uri, ChildValue::Deletion(target))
    }

    /// Iterate slots in deterministic (URI) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChildSlot)> {
        self.slots.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

fn validate_uri(uri: &str) -> Result<(), TopikaError> {
    if uri.is_empty() {
        return Err(TopikaError::InvalidModel("empty URI".to_string()));
    }
    if uri.len() > MAX_URI_LENGTH {
        return Err(TopikaError::InvalidModel(format!(
            "URI exceeds {MAX_URI_LENGTH} bytes"
        )));
    }
    Ok(())
}

fn validate_type_uri(type_uri: &str) -> Result<(), TopikaError> {
    validate_uri(type_uri)
        .map_err(|_| TopikaError::InvalidModel("missing or oversized type URI".to_string()))
}

fn validate_value(value: &SimpleValue) -> Result<(), TopikaError> {
    if let SimpleValue::Text(text) = value
        && text.len() > MAX_VALUE_LENGTH
    {
        return Err(TopikaError::InvalidModel(format!(
            "text value exceeds {MAX_VALUE_LENGTH} bytes"
        )));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
