//! # Traversal Engine
//!
//! Relation-filtered walks from one entity to related topics.
//!
//! Filtering happens here, not in the storage engines, so the direction
//! semantics are implemented exactly once: a traversal with my-role R1 and
//! others-role R2 matches associations where the caller plays R1 and the
//! other side plays R2 regardless of which physical player slot stores which
//! role.

use crate::model::TopicModel;
use crate::storage::GraphStorage;
use crate::types::{EntityId, TopikaError};
use std::collections::BTreeSet;

// =============================================================================
// FILTER
// =============================================================================

/// Conjunctive traversal filter. A `None` axis matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalFilter {
    /// Association type to follow.
    pub assoc_type_uri: Option<String>,
    /// Role the starting entity must play.
    pub my_role_uri: Option<String>,
    /// Role the other side must play.
    pub others_role_uri: Option<String>,
    /// Type of the related topic.
    pub others_type_uri: Option<String>,
}

impl TraversalFilter {
    /// The wide-open filter: follows every association.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Restrict to one association type.
    #[must_use]
    pub fn assoc_type(mut self, uri: impl Into<String>) -> Self {
        self.assoc_type_uri = Some(uri.into());
        self
    }

    /// Restrict the role played by the starting entity.
    #[must_use]
    pub fn my_role(mut self, uri: impl Into<String>) -> Self {
        self.my_role_uri = Some(uri.into());
        self
    }

    /// Restrict the role played by the other side.
    #[must_use]
    pub fn others_role(mut self, uri: impl Into<String>) -> Self {
        self.others_role_uri = Some(uri.into());
        self
    }

    /// Restrict the type of the related topic.
    #[must_use]
    pub fn others_type(mut self, uri: impl Into<String>) -> Self {
        self.others_type_uri = Some(uri.into());
        self
    }

    fn describe(&self, entity: EntityId) -> String {
        let axis = |value: &Option<String>| value.as_deref().unwrap_or("*").to_string();
        format!(
            "related topic of entity {entity} (assoc={}, my role={}, others role={}, others type={})",
            axis(&self.assoc_type_uri),
            axis(&self.my_role_uri),
            axis(&self.others_role_uri),
            axis(&self.others_type_uri),
        )
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// A related topic together with the association that relates it.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedTopic {
    pub topic: TopicModel,
    pub assoc: crate::model::AssociationModel,
}

// =============================================================================
// TRAVERSAL
// =============================================================================

/// All topics related to the entity under the filter, in storage order.
///
/// Non-topic targets (higher-order associations) are skipped. A self-loop
/// association contributes each matching role pairing once.
pub fn related_topics<S: GraphStorage>(
    storage: &S,
    entity: EntityId,
    filter: &TraversalFilter,
) -> Result<Vec<RelatedTopic>, TopikaError> {
    let mut results = Vec::new();
    let mut seen: BTreeSet<(EntityId, EntityId)> = BTreeSet::new();

    for assoc in storage.associations_of(entity)? {
        if let Some(wanted) = &filter.assoc_type_uri
            && assoc.type_uri != *wanted
        {
            continue;
        }

        // Role-type match, not positional match, determines direction:
        // try both player slots as "mine".
        for (slot, player) in assoc.players().into_iter().enumerate() {
            if player.target != entity {
                continue;
            }
            if let Some(wanted) = &filter.my_role_uri
                && player.role_type_uri != *wanted
            {
                continue;
            }
            let other = assoc.other_player(slot);
            if let Some(wanted) = &filter.others_role_uri
                && other.role_type_uri != *wanted
            {
                continue;
            }
            let Some(topic) = storage.fetch_topic(other.target)? else {
                continue;
            };
            if let Some(wanted) = &filter.others_type_uri
                && topic.type_uri != *wanted
            {
                continue;
            }
            if !seen.insert((assoc.id, topic.id)) {
                continue;
            }
            results.push(RelatedTopic {
                topic,
                assoc: assoc.clone(),
            });
        }
    }
    Ok(results)
}

/// The single topic related under the filter.
///
/// Zero matches is `Ok(None)`; more than one fails with `Ambiguity` rather
/// than silently picking the first, since silently choosing would mask data
/// corruption.
pub fn related_topic<S: GraphStorage>(
    storage: &S,
    entity: EntityId,
    filter: &TraversalFilter,
) -> Result<Option<RelatedTopic>, TopikaError> {
    let mut matches = related_topics(storage, entity, filter)?;
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        count => Err(TopikaError::ambiguity(filter.describe(entity), count)),
    }
}

// =============================================================================
// TESTS
// =============================================================================
