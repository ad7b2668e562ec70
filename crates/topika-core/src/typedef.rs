//! # Type System
//!
//! Types are first-class graph data: a type is a topic whose value is a human
//! label, with data type, index modes, composition definitions, and view
//! configuration all attached as related topics and associations. This
//! module defines the loaded, in-memory form (`TypeDef`) and the mutable DTO
//! used for creating types (`TypeModel`), plus the loader that assembles a
//! `TypeDef` from storage through the traversal engine.

use crate::index::IndexMode;
use crate::model::TopicModel;
use crate::storage::GraphStorage;
use crate::traversal::{TraversalFilter, related_topic, related_topics};
use crate::types::{EntityId, SimpleValue, TopikaError};
use crate::uris;
use serde::{Deserialize, Serialize};

// =============================================================================
// TYPE KIND
// =============================================================================

/// Family membership of a type topic, resolved once at load time.
///
/// Dispatch on family is exhaustive matching over this closed variant, never
/// string comparison against type URIs scattered through the codebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    MetaType,
    TopicType,
    AssocType,
    RoleType,
}

impl TypeKind {
    /// Classify a type topic by its own type URI.
    #[must_use]
    pub fn from_type_uri(uri: &str) -> Option<Self> {
        match uri {
            uris::META_TYPE => Some(Self::MetaType),
            uris::TOPIC_TYPE => Some(Self::TopicType),
            uris::ASSOC_TYPE => Some(Self::AssocType),
            uris::ROLE_TYPE => Some(Self::RoleType),
            _ => None,
        }
    }

    /// The type URI a type topic of this kind carries.
    #[must_use]
    pub const fn type_uri(self) -> &'static str {
        match self {
            Self::MetaType => uris::META_TYPE,
            Self::TopicType => uris::TOPIC_TYPE,
            Self::AssocType => uris::ASSOC_TYPE,
            Self::RoleType => uris::ROLE_TYPE,
        }
    }
}

// =============================================================================
// DATA TYPE
// =============================================================================

/// How a type's simple value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    #[default]
    Text,
    Number,
    Boolean,
    /// The entity's value lives in its children, not in a simple value.
    Composite,
}

impl DataType {
    /// Resolve a data-type topic URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            uris::TEXT => Some(Self::Text),
            uris::NUMBER => Some(Self::Number),
            uris::BOOLEAN => Some(Self::Boolean),
            uris::COMPOSITE => Some(Self::Composite),
            _ => None,
        }
    }

    /// The data-type topic URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Text => uris::TEXT,
            Self::Number => uris::NUMBER,
            Self::Boolean => uris::BOOLEAN,
            Self::Composite => uris::COMPOSITE,
        }
    }
}

// =============================================================================
// CARDINALITY
// =============================================================================

/// Whether a child slot holds one or many children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    One,
    Many,
}

impl Cardinality {
    /// Resolve a cardinality topic URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            uris::ONE => Some(Self::One),
            uris::MANY => Some(Self::Many),
            _ => None,
        }
    }

    /// The cardinality topic URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::One => uris::ONE,
            Self::Many => uris::MANY,
        }
    }
}

// =============================================================================
// COMPOSITION DEFINITIONS
// =============================================================================

/// Whether a child slot composes (owns) or aggregates (shares) its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompDefKind {
    Composition,
    Aggregation,
}

impl CompDefKind {
    /// Resolve a definition-association type URI.
    #[must_use]
    pub fn from_def_type_uri(uri: &str) -> Option<Self> {
        match uri {
            uris::COMPOSITION_DEF => Some(Self::Composition),
            uris::AGGREGATION_DEF => Some(Self::Aggregation),
            _ => None,
        }
    }

    /// Type of the type-level definition association.
    #[must_use]
    pub const fn def_type_uri(self) -> &'static str {
        match self {
            Self::Composition => uris::COMPOSITION_DEF,
            Self::Aggregation => uris::AGGREGATION_DEF,
        }
    }

    /// Type of the instance-level association a definition materializes.
    #[must_use]
    pub const fn instance_type_uri(self) -> &'static str {
        match self {
            Self::Composition => uris::COMPOSITION,
            Self::Aggregation => uris::AGGREGATION,
        }
    }
}

/// One child slot of a parent type, loaded from graph data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompDef {
    /// Id of the definition association.
    pub id: EntityId,
    /// Custom slot URI; the child type URI identifies the slot when absent.
    pub uri: Option<String>,
    pub kind: CompDefKind,
    pub child_type_uri: String,
    /// Mandatory; loading fails with `MissingCardinality` when absent.
    pub cardinality: Cardinality,
    /// Optional, unlike the child cardinality.
    pub parent_cardinality: Option<Cardinality>,
    /// Optional: an absent role type means "no explicit role", a valid state.
    pub parent_role_uri: Option<String>,
    pub child_role_uri: Option<String>,
}

impl CompDef {
    /// The URI this slot is keyed by in a `ChildTopicsModel`.
    #[must_use]
    pub fn slot_uri(&self) -> &str {
        self.uri.as_deref().unwrap_or(&self.child_type_uri)
    }

    /// Role the parent plays in materialized instance associations.
    ///
    /// The explicit role type when declared; the generic parent role
    /// otherwise.
    #[must_use]
    pub fn parent_role(&self) -> &str {
        self.parent_role_uri.as_deref().unwrap_or(uris::PARENT)
    }

    /// Role the child plays in materialized instance associations.
    #[must_use]
    pub fn child_role(&self) -> &str {
        self.child_role_uri.as_deref().unwrap_or(uris::CHILD)
    }

    /// Filter matching this definition's instance-level associations.
    ///
    /// Declared role types are enforced; an absent role type enforces
    /// nothing on that axis.
    #[must_use]
    pub fn instance_filter(&self) -> TraversalFilter {
        let mut filter = TraversalFilter::any()
            .assoc_type(self.kind.instance_type_uri())
            .others_type(self.child_type_uri.clone());
        if let Some(role) = &self.parent_role_uri {
            filter = filter.my_role(role.clone());
        }
        if let Some(role) = &self.child_role_uri {
            filter = filter.others_role(role.clone());
        }
        filter
    }
}

// =============================================================================
// TYPE DEFINITION
// =============================================================================

/// A fully resolved type definition.
///
/// Loaded once, shared read-only out of the type cache; an invalidated
/// definition is reloaded, never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    /// Id of the type topic.
    pub id: EntityId,
    pub uri: String,
    /// The human label (the type topic's value).
    pub label: String,
    pub kind: TypeKind,
    pub data_type: DataType,
    pub index_modes: Vec<IndexMode>,
    /// Ordered; the order is part of type identity for rendering purposes.
    pub comp_defs: Vec<CompDef>,
    /// Opaque metadata passed through to view layers.
    pub view_config: Option<serde_json::Value>,
}

impl TypeDef {
    /// Find a child slot by its slot URI.
    #[must_use]
    pub fn comp_def(&self, slot_uri: &str) -> Option<&CompDef> {
        self.comp_defs.iter().find(|cd| cd.slot_uri() == slot_uri)
    }

    /// Whether instances carry their value in children.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        self.data_type == DataType::Composite
    }
}

// =============================================================================
// TYPE MODEL (mutable DTO for type creation)
// =============================================================================

/// One child slot as submitted for type creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompDefModel {
    pub kind: CompDefKind,
    pub child_type_uri: String,
    pub cardinality: Cardinality,
    #[serde(default)]
    pub parent_cardinality: Option<Cardinality>,
    #[serde(default)]
    pub parent_role_uri: Option<String>,
    #[serde(default)]
    pub child_role_uri: Option<String>,
    /// Custom slot URI for types with several slots of the same child type.
    #[serde(default)]
    pub uri: Option<String>,
}

impl CompDefModel {
    /// A single-valued composition slot.
    #[must_use]
    pub fn one(child_type_uri: impl Into<String>) -> Self {
        Self {
            kind: CompDefKind::Composition,
            child_type_uri: child_type_uri.into(),
            cardinality: Cardinality::One,
            parent_cardinality: None,
            parent_role_uri: None,
            child_role_uri: None,
            uri: None,
        }
    }

    /// A multi-valued composition slot.
    #[must_use]
    pub fn many(child_type_uri: impl Into<String>) -> Self {
        Self {
            cardinality: Cardinality::Many,
            ..Self::one(child_type_uri)
        }
    }

    /// Turn the slot into an aggregation.
    #[must_use]
    pub fn aggregation(mut self) -> Self {
        self.kind = CompDefKind::Aggregation;
        self
    }

    /// Declare the parent-side cardinality.
    #[must_use]
    pub fn with_parent_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.parent_cardinality = Some(cardinality);
        self
    }

    /// Declare explicit role types for materialized associations.
    #[must_use]
    pub fn with_roles(
        mut self,
        parent_role_uri: impl Into<String>,
        child_role_uri: impl Into<String>,
    ) -> Self {
        self.parent_role_uri = Some(parent_role_uri.into());
        self.child_role_uri = Some(child_role_uri.into());
        self
    }

    /// Assign a custom slot URI.
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }
}

/// Mutable DTO for creating a type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeModel {
    pub uri: String,
    pub kind: TypeKind,
    pub label: String,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub index_modes: Vec<IndexMode>,
    #[serde(default)]
    pub comp_defs: Vec<CompDefModel>,
    #[serde(default)]
    pub view_config: Option<serde_json::Value>,
}

impl TypeModel {
    /// A new topic type.
    #[must_use]
    pub fn topic_type(uri: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            kind: TypeKind::TopicType,
            label: label.into(),
            data_type: DataType::default(),
            index_modes: Vec::new(),
            comp_defs: Vec::new(),
            view_config: None,
        }
    }

    /// A new association type.
    #[must_use]
    pub fn assoc_type(uri: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::AssocType,
            ..Self::topic_type(uri, label)
        }
    }

    /// Set the data type.
    #[must_use]
    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Add an index mode.
    #[must_use]
    pub fn with_index_mode(mut self, mode: IndexMode) -> Self {
        self.index_modes.push(mode);
        self
    }

    /// Add a child slot.
    #[must_use]
    pub fn with_comp_def(mut self, comp_def: CompDefModel) -> Self {
        self.comp_defs.push(comp_def);
        self
    }

    /// Attach an opaque view configuration.
    #[must_use]
    pub fn with_view_config(mut self, config: serde_json::Value) -> Self {
        self.view_config = Some(config);
        self
    }
}

// =============================================================================
// LOADER
// =============================================================================

/// Load a complete type definition from graph data.
///
/// The definition is assembled through the traversal engine: data type,
/// index modes, and view configuration are related topics of the type topic;
/// each composition definition is a definition association whose cardinality
/// and role types are related topics of the association itself.
pub fn load_type_def<S: GraphStorage>(
    storage: &S,
    type_uri: &str,
) -> Result<TypeDef, TopikaError> {
    let topic = storage
        .fetch_topic_by_uri(type_uri)?
        .ok_or_else(|| TopikaError::UriNotFound(type_uri.to_string()))?;
    let kind = TypeKind::from_type_uri(&topic.type_uri).ok_or_else(|| {
        TopikaError::InvalidModel(format!("\"{type_uri}\" is not a type topic"))
    })?;

    let data_type = match attached_topic_uri(storage, topic.id, uris::CHILD, uris::DATA_TYPE)? {
        Some(uri) => DataType::from_uri(&uri)
            .ok_or_else(|| TopikaError::InvalidModel(format!("unknown data type \"{uri}\"")))?,
        None => DataType::default(),
    };

    let mut index_modes = Vec::new();
    for rel in related_topics(
        storage,
        topic.id,
        &meta_filter(uris::CHILD, uris::INDEX_MODE),
    )? {
        let uri = require_uri(&rel.topic)?;
        let mode = IndexMode::from_uri(&uri)
            .ok_or_else(|| TopikaError::InvalidModel(format!("unknown index mode \"{uri}\"")))?;
        index_modes.push(mode);
    }

    let view_config = related_topic(
        storage,
        topic.id,
        &meta_filter(uris::CHILD, uris::VIEW_CONFIG),
    )?
    .map(|rel| {
        let raw = rel.topic.value.to_string();
        serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
    });

    let comp_defs = load_comp_defs(storage, &topic)?;

    Ok(TypeDef {
        id: topic.id,
        uri: topic.uri.clone().unwrap_or_else(|| type_uri.to_string()),
        label: topic.value.to_string(),
        kind,
        data_type,
        index_modes,
        comp_defs,
        view_config,
    })
}

fn load_comp_defs<S: GraphStorage>(
    storage: &S,
    type_topic: &TopicModel,
) -> Result<Vec<CompDef>, TopikaError> {
    // Collect definition associations where the type plays the parent-type
    // role; the sequence number in the association value gives the order.
    let mut defs: Vec<(i64, CompDef)> = Vec::new();

    for assoc in storage.associations_of(type_topic.id)? {
        let Some(kind) = CompDefKind::from_def_type_uri(&assoc.type_uri) else {
            continue;
        };
        let Some((slot, _)) = assoc
            .players()
            .into_iter()
            .enumerate()
            .find(|(_, p)| p.target == type_topic.id && p.role_type_uri == uris::PARENT_TYPE)
        else {
            continue;
        };
        let child_player = assoc.other_player(slot);
        if child_player.role_type_uri != uris::CHILD_TYPE {
            continue;
        }
        let child_topic = storage
            .fetch_topic(child_player.target)?
            .ok_or(TopikaError::EntityNotFound(child_player.target))?;
        let child_type_uri = require_uri(&child_topic)?;

        // Child cardinality is required; the parent cardinality and both
        // role types are optional.
        let cardinality = match attached_topic_uri(
            storage,
            assoc.id,
            uris::CHILD_CARDINALITY,
            uris::CARDINALITY,
        )? {
            Some(uri) => Cardinality::from_uri(&uri).ok_or_else(|| {
                TopikaError::InvalidModel(format!("unknown cardinality \"{uri}\""))
            })?,
            None => return Err(TopikaError::MissingCardinality(child_type_uri)),
        };
        let parent_cardinality = match attached_topic_uri(
            storage,
            assoc.id,
            uris::PARENT_CARDINALITY,
            uris::CARDINALITY,
        )? {
            Some(uri) => Some(Cardinality::from_uri(&uri).ok_or_else(|| {
                TopikaError::InvalidModel(format!("unknown cardinality \"{uri}\""))
            })?),
            None => None,
        };

        let parent_role_uri =
            attached_topic_uri(storage, assoc.id, uris::PARENT_ROLE, uris::ROLE_TYPE)?;
        let child_role_uri =
            attached_topic_uri(storage, assoc.id, uris::CHILD_ROLE, uris::ROLE_TYPE)?;

        let seq = match assoc.value {
            SimpleValue::Long(seq) => seq,
            _ => i64::MAX,
        };
        defs.push((
            seq,
            CompDef {
                id: assoc.id,
                uri: assoc.uri.clone(),
                kind,
                child_type_uri,
                cardinality,
                parent_cardinality,
                parent_role_uri,
                child_role_uri,
            },
        ));
    }

    defs.sort_by(|a, b| (a.0, a.1.id).cmp(&(b.0, b.1.id)));
    Ok(defs.into_iter().map(|(_, def)| def).collect())
}

/// Filter for metadata topics attached under the generic composition
/// association.
fn meta_filter(others_role: &str, others_type: &str) -> TraversalFilter {
    TraversalFilter::any()
        .assoc_type(uris::COMPOSITION)
        .my_role(uris::PARENT)
        .others_role(others_role)
        .others_type(others_type)
}

/// URI of the single metadata topic of the given type attached to the
/// entity under the given role, if present.
fn attached_topic_uri<S: GraphStorage>(
    storage: &S,
    entity: EntityId,
    attachment_role: &str,
    meta_type_uri: &str,
) -> Result<Option<String>, TopikaError> {
    match related_topic(storage, entity, &meta_filter(attachment_role, meta_type_uri))? {
        Some(rel) => Ok(Some(require_uri(&rel.topic)?)),
        None => Ok(None),
    }
}

fn require_uri(topic: &TopicModel) -> Result<String, TopikaError> {
    topic.uri.clone().ok_or_else(|| {
        TopikaError::InvalidModel(format!("topic {} carries no URI", topic.id))
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssociationModel, PlayerModel};
    use crate::storage::MemStorage;

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

    /// Assemble a "person" type with one "address" child slot from raw
    /// storage primitives.
    fn seed_person_type(storage: &mut MemStorage) -> EntityId {
        let card_one = put(storage, uris::ONE, uris::CARDINALITY, "One");
        let _card_many = put(storage, uris::MANY, uris::CARDINALITY, "Many");
        let person = put(storage, "person", uris::TOPIC_TYPE, "Person");
        let address = put(storage, "address", uris::TOPIC_TYPE, "Address");

        let def = link(
            storage,
            uris::COMPOSITION_DEF,
            (person, uris::PARENT_TYPE),
            (address, uris::CHILD_TYPE),
        );
        storage
            .store_value(def, SimpleValue::Long(0))
            .expect("seq");
        link(
            storage,
            uris::COMPOSITION,
            (def, uris::PARENT),
            (card_one, uris::CHILD_CARDINALITY),
        );
        person
    }

    #[test]
    fn kind_classification_is_closed() {
        assert_eq!(
            TypeKind::from_type_uri(uris::TOPIC_TYPE),
            Some(TypeKind::TopicType)
        );
        assert_eq!(
            TypeKind::from_type_uri(uris::ASSOC_TYPE),
            Some(TypeKind::AssocType)
        );
        assert_eq!(
            TypeKind::from_type_uri(uris::META_TYPE),
            Some(TypeKind::MetaType)
        );
        assert_eq!(
            TypeKind::from_type_uri(uris::ROLE_TYPE),
            Some(TypeKind::RoleType)
        );
        assert_eq!(TypeKind::from_type_uri("person"), None);
    }

    #[test]
    fn load_resolves_comp_def_and_defaults() {
        let mut storage = MemStorage::new();
        seed_person_type(&mut storage);

        let def = load_type_def(&storage, "person").expect("load");
        assert_eq!(def.kind, TypeKind::TopicType);
        assert_eq!(def.label, "Person");
        // No data type attached: defaults to text.
        assert_eq!(def.data_type, DataType::Text);
        assert_eq!(def.comp_defs.len(), 1);

        let cd = &def.comp_defs[0];
        assert_eq!(cd.child_type_uri, "address");
        assert_eq!(cd.cardinality, Cardinality::One);
        assert_eq!(cd.parent_cardinality, None);
        assert_eq!(cd.parent_role_uri, None);
        assert_eq!(cd.child_role_uri, None);
        assert_eq!(cd.slot_uri(), "address");
        // Materialization falls back to the generic roles.
        assert_eq!(cd.parent_role(), uris::PARENT);
        assert_eq!(cd.child_role(), uris::CHILD);
    }

    #[test]
    fn parent_cardinality_is_optional_but_loaded() {
        let mut storage = MemStorage::new();
        seed_person_type(&mut storage);
        let card_many = storage
            .fetch_topic_by_uri(uris::MANY)
            .expect("fetch")
            .expect("present")
            .id;

        let def = load_type_def(&storage, "person").expect("load");
        link(
            &mut storage,
            uris::COMPOSITION,
            (def.comp_defs[0].id, uris::PARENT),
            (card_many, uris::PARENT_CARDINALITY),
        );

        let reloaded = load_type_def(&storage, "person").expect("reload");
        assert_eq!(
            reloaded.comp_defs[0].parent_cardinality,
            Some(Cardinality::Many)
        );
    }

    #[test]
    fn missing_cardinality_fails() {
        let mut storage = MemStorage::new();
        let person = put(&mut storage, "person", uris::TOPIC_TYPE, "Person");
        let address = put(&mut storage, "address", uris::TOPIC_TYPE, "Address");
        link(
            &mut storage,
            uris::COMPOSITION_DEF,
            (person, uris::PARENT_TYPE),
            (address, uris::CHILD_TYPE),
        );

        assert!(matches!(
            load_type_def(&storage, "person"),
            Err(TopikaError::MissingCardinality(uri)) if uri == "address"
        ));
    }

    #[test]
    fn loading_a_non_type_fails() {
        let mut storage = MemStorage::new();
        put(&mut storage, "person", uris::TOPIC_TYPE, "Person");
        let mut instance = TopicModel::new("person", "Alice").with_uri("person.alice");
        storage.store_topic(&mut instance).expect("store");

        assert!(matches!(
            load_type_def(&storage, "person.alice"),
            Err(TopikaError::InvalidModel(_))
        ));
    }

    #[test]
    fn loading_unknown_uri_fails() {
        let storage = MemStorage::new();
        assert!(matches!(
            load_type_def(&storage, "nope"),
            Err(TopikaError::UriNotFound(_))
        ));
    }

    #[test]
    fn explicit_roles_are_loaded_and_enforced_in_filter() {
        let mut storage = MemStorage::new();
        seed_person_type(&mut storage);
        let author_role = put(&mut storage, "role.author", uris::ROLE_TYPE, "Author");
        let work_role = put(&mut storage, "role.work", uris::ROLE_TYPE, "Work");

        let def = load_type_def(&storage, "person").expect("load");
        let def_assoc = def.comp_defs[0].id;
        link(
            &mut storage,
            uris::COMPOSITION,
            (def_assoc, uris::PARENT),
            (work_role, uris::PARENT_ROLE),
        );
        link(
            &mut storage,
            uris::COMPOSITION,
            (def_assoc, uris::PARENT),
            (author_role, uris::CHILD_ROLE),
        );

        let reloaded = load_type_def(&storage, "person").expect("reload");
        let cd = &reloaded.comp_defs[0];
        assert_eq!(cd.parent_role_uri.as_deref(), Some("role.work"));
        assert_eq!(cd.child_role_uri.as_deref(), Some("role.author"));

        let filter = cd.instance_filter();
        assert_eq!(filter.my_role_uri.as_deref(), Some("role.work"));
        assert_eq!(filter.others_role_uri.as_deref(), Some("role.author"));
    }

    #[test]
    fn comp_defs_are_ordered_by_sequence() {
        let mut storage = MemStorage::new();
        let card_one = put(&mut storage, uris::ONE, uris::CARDINALITY, "One");
        let person = put(&mut storage, "person", uris::TOPIC_TYPE, "Person");
        let address = put(&mut storage, "address", uris::TOPIC_TYPE, "Address");
        let name = put(&mut storage, "name", uris::TOPIC_TYPE, "Name");

        // Insert "address" first but give "name" the lower sequence number.
        let def_address = link(
            &mut storage,
            uris::COMPOSITION_DEF,
            (person, uris::PARENT_TYPE),
            (address, uris::CHILD_TYPE),
        );
        storage
            .store_value(def_address, SimpleValue::Long(1))
            .expect("seq");
        link(
            &mut storage,
            uris::COMPOSITION,
            (def_address, uris::PARENT),
            (card_one, uris::CHILD_CARDINALITY),
        );

        let def_name = link(
            &mut storage,
            uris::COMPOSITION_DEF,
            (person, uris::PARENT_TYPE),
            (name, uris::CHILD_TYPE),
        );
        storage
            .store_value(def_name, SimpleValue::Long(0))
            .expect("seq");
        link(
            &mut storage,
            uris::COMPOSITION,
            (def_name, uris::PARENT),
            (card_one, uris::CHILD_CARDINALITY),
        );

        let def = load_type_def(&storage, "person").expect("load");
        let slots: Vec<_> = def.comp_defs.iter().map(|cd| cd.slot_uri()).collect();
        assert_eq!(slots, vec!["name", "address"]);
    }
}
