//! # Composite Value Engine
//!
//! Translates between the flat storage representation (each child is its own
//! entity connected by an instance-level association) and the hierarchical
//! `ChildTopicsModel` view, driven by the live composition definitions of
//! the parent's type.
//!
//! Reads never fail merely because an optional child is missing; absence is
//! "no value". Only a cardinality violation (more than one child in a "one"
//! slot) is an error.

use crate::index::index_ops;
use crate::model::{
    AssociationModel, ChildSlot, ChildTopicsModel, ChildValue, PlayerModel, TopicModel,
};
use crate::storage::GraphStorage;
use crate::traversal::{related_topic, related_topics};
use crate::typecache::TypeCache;
use crate::typedef::{Cardinality, CompDef, TypeDef};
use crate::types::{EntityId, SimpleValue, TopikaError};
use crate::uris;
use crate::uris::MAX_COMPOSITE_DEPTH;

/// The composite read/write engine.
///
/// Stateless; all state lives in the storage and the type cache.
pub struct Composer;

impl Composer {
    // =========================================================================
    // READ
    // =========================================================================

    /// Assemble the composite value of an entity.
    pub fn fetch<S: GraphStorage>(
        storage: &S,
        types: &TypeCache,
        entity: EntityId,
        type_def: &TypeDef,
    ) -> Result<ChildTopicsModel, TopikaError> {
        Self::fetch_at(storage, types, entity, type_def, 0)
    }

    fn fetch_at<S: GraphStorage>(
        storage: &S,
        types: &TypeCache,
        entity: EntityId,
        type_def: &TypeDef,
        depth: usize,
    ) -> Result<ChildTopicsModel, TopikaError> {
        ensure_depth(depth)?;
        let mut children = ChildTopicsModel::new();
        for cd in &type_def.comp_defs {
            match cd.cardinality {
                Cardinality::One => {
                    if let Some(rel) = related_topic(storage, entity, &cd.instance_filter())? {
                        children.set(
                            cd.slot_uri(),
                            Self::child_value(storage, types, &rel.topic, depth)?,
                        );
                    }
                }
                Cardinality::Many => {
                    for rel in related_topics(storage, entity, &cd.instance_filter())? {
                        children.add(
                            cd.slot_uri(),
                            Self::child_value(storage, types, &rel.topic, depth)?,
                        );
                    }
                }
            }
        }
        Ok(children)
    }

    fn child_value<S: GraphStorage>(
        storage: &S,
        types: &TypeCache,
        child: &TopicModel,
        depth: usize,
    ) -> Result<ChildValue, TopikaError> {
        let child_type = types.get(storage, &child.type_uri)?;
        if child_type.is_composite() {
            Ok(ChildValue::Composite(Self::fetch_at(
                storage,
                types,
                child.id,
                &child_type,
                depth + 1,
            )?))
        } else {
            Ok(ChildValue::Value(child.value.clone()))
        }
    }

    // =========================================================================
    // WRITE
    // =========================================================================

    /// Apply a composite value to an entity.
    ///
    /// Single-valued slots overwrite; multi-valued slots append. References
    /// rewire to existing entities; deletion references detach.
    pub fn integrate<S: GraphStorage>(
        storage: &mut S,
        types: &TypeCache,
        entity: EntityId,
        type_def: &TypeDef,
        children: &ChildTopicsModel,
    ) -> Result<(), TopikaError> {
        Self::integrate_at(storage, types, entity, type_def, children, 0)
    }

    fn integrate_at<S: GraphStorage>(
        storage: &mut S,
        types: &TypeCache,
        entity: EntityId,
        type_def: &TypeDef,
        children: &ChildTopicsModel,
        depth: usize,
    ) -> Result<(), TopikaError> {
        ensure_depth(depth)?;
        for (slot_uri, slot) in children.iter() {
            let cd = type_def.comp_def(slot_uri).ok_or_else(|| {
                TopikaError::InvalidModel(format!(
                    "type \"{}\" has no child slot \"{slot_uri}\"",
                    type_def.uri
                ))
            })?;
            match (cd.cardinality, slot) {
                (Cardinality::One, ChildSlot::One(value)) => {
                    Self::integrate_one(storage, types, entity, cd, value, depth)?;
                }
                (Cardinality::Many, ChildSlot::Many(values)) => {
                    for value in values {
                        Self::append_entry(storage, types, entity, cd, value, depth)?;
                    }
                }
                (Cardinality::One, ChildSlot::Many(_)) => {
                    return Err(TopikaError::InvalidModel(format!(
                        "slot \"{slot_uri}\" holds one child, got a list"
                    )));
                }
                (Cardinality::Many, ChildSlot::One(_)) => {
                    return Err(TopikaError::InvalidModel(format!(
                        "slot \"{slot_uri}\" holds many children, got a single value"
                    )));
                }
            }
        }
        Ok(())
    }

    fn integrate_one<S: GraphStorage>(
        storage: &mut S,
        types: &TypeCache,
        parent: EntityId,
        cd: &CompDef,
        value: &ChildValue,
        depth: usize,
    ) -> Result<(), TopikaError> {
        match value {
            ChildValue::Value(simple) => {
                match related_topic(&*storage, parent, &cd.instance_filter())? {
                    Some(rel) => {
                        Self::update_child_value(storage, types, &rel.topic, simple.clone())
                    }
                    None => {
                        let child = Self::create_child(storage, types, cd, simple.clone())?;
                        Self::connect(storage, cd, parent, child)?;
                        Ok(())
                    }
                }
            }
            ChildValue::Composite(nested) => {
                let child_type = types.get(&*storage, &cd.child_type_uri)?;
                let child = match related_topic(&*storage, parent, &cd.instance_filter())? {
                    Some(rel) => rel.topic.id,
                    None => {
                        let child = Self::create_child(storage, types, cd, SimpleValue::Empty)?;
                        Self::connect(storage, cd, parent, child)?;
                        child
                    }
                };
                Self::integrate_at(storage, types, child, &child_type, nested, depth + 1)
            }
            ChildValue::Ref(target) => Self::rewire_one(storage, parent, cd, *target),
            ChildValue::RefByUri(uri) => {
                let target = storage
                    .fetch_topic_by_uri(uri)?
                    .ok_or_else(|| TopikaError::UriNotFound(uri.clone()))?
                    .id;
                Self::rewire_one(storage, parent, cd, target)
            }
            ChildValue::Deletion(target) => Self::detach(storage, parent, cd, *target),
        }
    }

    fn append_entry<S: GraphStorage>(
        storage: &mut S,
        types: &TypeCache,
        parent: EntityId,
        cd: &CompDef,
        value: &ChildValue,
        depth: usize,
    ) -> Result<(), TopikaError> {
        match value {
            ChildValue::Value(simple) => {
                let child = Self::create_child(storage, types, cd, simple.clone())?;
                Self::connect(storage, cd, parent, child)?;
                Ok(())
            }
            ChildValue::Composite(nested) => {
                let child_type = types.get(&*storage, &cd.child_type_uri)?;
                let child = Self::create_child(storage, types, cd, SimpleValue::Empty)?;
                Self::connect(storage, cd, parent, child)?;
                Self::integrate_at(storage, types, child, &child_type, nested, depth + 1)
            }
            ChildValue::Ref(target) => Self::attach(storage, parent, cd, *target),
            ChildValue::RefByUri(uri) => {
                let target = storage
                    .fetch_topic_by_uri(uri)?
                    .ok_or_else(|| TopikaError::UriNotFound(uri.clone()))?
                    .id;
                Self::attach(storage, parent, cd, target)
            }
            ChildValue::Deletion(target) => Self::detach(storage, parent, cd, *target),
        }
    }

    /// Point a single-valued slot at an existing entity without creating one.
    fn rewire_one<S: GraphStorage>(
        storage: &mut S,
        parent: EntityId,
        cd: &CompDef,
        target: EntityId,
    ) -> Result<(), TopikaError> {
        Self::check_ref_target(&*storage, cd, target)?;
        match related_topic(&*storage, parent, &cd.instance_filter())? {
            Some(rel) if rel.topic.id == target => Ok(()),
            Some(rel) => {
                let old = rel.topic.id;
                let mut assoc = rel.assoc;
                if assoc.player1.target == old
                    && assoc.player1.role_type_uri == cd.child_role()
                {
                    assoc.player1.target = target;
                } else if assoc.player2.target == old {
                    assoc.player2.target = target;
                } else {
                    assoc.player1.target = target;
                }
                storage.store_association(&mut assoc)?;
                Ok(())
            }
            None => {
                Self::connect(storage, cd, parent, target)?;
                Ok(())
            }
        }
    }

    /// Attach an existing entity to a multi-valued slot; a no-op when
    /// already attached.
    fn attach<S: GraphStorage>(
        storage: &mut S,
        parent: EntityId,
        cd: &CompDef,
        target: EntityId,
    ) -> Result<(), TopikaError> {
        Self::check_ref_target(&*storage, cd, target)?;
        let attached = related_topics(&*storage, parent, &cd.instance_filter())?
            .iter()
            .any(|rel| rel.topic.id == target);
        if !attached {
            Self::connect(storage, cd, parent, target)?;
        }
        Ok(())
    }

    /// A reference target must exist and carry the slot's child type; a
    /// mismatched reference would be invisible to the type-filtered read.
    fn check_ref_target<S: GraphStorage>(
        storage: &S,
        cd: &CompDef,
        target: EntityId,
    ) -> Result<(), TopikaError> {
        let topic = storage
            .fetch_topic(target)?
            .ok_or(TopikaError::EntityNotFound(target))?;
        if topic.type_uri != cd.child_type_uri {
            return Err(TopikaError::InvalidModel(format!(
                "referenced entity {target} is not of type \"{}\"",
                cd.child_type_uri
            )));
        }
        Ok(())
    }

    /// Detach one matching child. Detaching a child that is not attached is
    /// a no-op; the child entity itself is removed when nothing but its
    /// instantiation still refers to it.
    fn detach<S: GraphStorage>(
        storage: &mut S,
        parent: EntityId,
        cd: &CompDef,
        target: EntityId,
    ) -> Result<(), TopikaError> {
        let Some(rel) = related_topics(&*storage, parent, &cd.instance_filter())?
            .into_iter()
            .find(|rel| rel.topic.id == target)
        else {
            return Ok(());
        };
        storage.delete_association(rel.assoc.id)?;

        let remaining = storage.associations_of(target)?;
        if remaining
            .iter()
            .all(|assoc| assoc.type_uri == uris::INSTANTIATION)
        {
            for assoc in remaining {
                storage.delete_association(assoc.id)?;
            }
            storage.delete_topic(target)?;
        }
        Ok(())
    }

    /// Create a child entity of the slot's child type, with instantiation
    /// and value indexing.
    fn create_child<S: GraphStorage>(
        storage: &mut S,
        types: &TypeCache,
        cd: &CompDef,
        value: SimpleValue,
    ) -> Result<EntityId, TopikaError> {
        let child_type = types.get(&*storage, &cd.child_type_uri)?;

        let mut topic = TopicModel::new(cd.child_type_uri.clone(), value.clone());
        storage.store_topic(&mut topic)?;

        let mut instantiation = AssociationModel::new(
            uris::INSTANTIATION,
            PlayerModel::new(child_type.id, uris::TYPE_ROLE),
            PlayerModel::new(topic.id, uris::INSTANCE),
        );
        storage.store_association(&mut instantiation)?;

        for op in index_ops(
            &child_type.index_modes,
            &cd.child_type_uri,
            None,
            &value,
            topic.id,
        ) {
            storage.apply_index_op(&op)?;
        }
        Ok(topic.id)
    }

    /// Materialize the instance-level association for a slot.
    fn connect<S: GraphStorage>(
        storage: &mut S,
        cd: &CompDef,
        parent: EntityId,
        child: EntityId,
    ) -> Result<EntityId, TopikaError> {
        let mut assoc = AssociationModel::new(
            cd.kind.instance_type_uri(),
            PlayerModel::new(parent, cd.parent_role()),
            PlayerModel::new(child, cd.child_role()),
        );
        storage.store_association(&mut assoc)
    }

    /// Overwrite an existing child's simple value, keeping its indexes
    /// current.
    fn update_child_value<S: GraphStorage>(
        storage: &mut S,
        types: &TypeCache,
        child: &TopicModel,
        value: SimpleValue,
    ) -> Result<(), TopikaError> {
        if child.value == value {
            return Ok(());
        }
        let child_type = types.get(&*storage, &child.type_uri)?;
        let ops = index_ops(
            &child_type.index_modes,
            &child.type_uri,
            Some(&child.value),
            &value,
            child.id,
        );
        storage.store_value(child.id, value)?;
        for op in &ops {
            storage.apply_index_op(op)?;
        }
        Ok(())
    }
}

fn ensure_depth(depth: usize) -> Result<(), TopikaError> {
    if depth >= MAX_COMPOSITE_DEPTH {
        return Err(TopikaError::InvalidModel(format!(
            "composite nesting exceeds {MAX_COMPOSITE_DEPTH} levels"
        )));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
