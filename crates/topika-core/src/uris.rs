//! # Core Vocabulary
//!
//! The built-in meta-model URIs and hard input limits for the Topika core.
//!
//! Topika starts with zero domain data but a fixed vocabulary. Every constant
//! here names a topic or association type that the engine bootstraps on
//! startup; all further type definitions are ordinary graph data built from
//! these.

// =============================================================================
// TYPE FAMILIES
// =============================================================================

/// Type of all topic types ("Person", "Note", ...).
pub const TOPIC_TYPE: &str = "topika.core.topic_type";

/// Type of all association types ("Composition", custom relation types, ...).
pub const ASSOC_TYPE: &str = "topika.core.assoc_type";

/// Type of the type-system roots themselves.
pub const META_TYPE: &str = "topika.core.meta_type";

/// Type of all role types.
pub const ROLE_TYPE: &str = "topika.core.role_type";

// =============================================================================
// ASSOCIATION TYPES
// =============================================================================

/// Instance-level parent/child association created by a composition definition.
pub const COMPOSITION: &str = "topika.core.composition";

/// Instance-level parent/child association created by an aggregation definition.
pub const AGGREGATION: &str = "topika.core.aggregation";

/// Type-level association declaring a composition child slot.
pub const COMPOSITION_DEF: &str = "topika.core.composition_def";

/// Type-level association declaring an aggregation child slot.
pub const AGGREGATION_DEF: &str = "topika.core.aggregation_def";

/// Links every entity to its type topic.
pub const INSTANTIATION: &str = "topika.core.instantiation";

// =============================================================================
// ROLE TYPES
// =============================================================================

/// Default parent role in instance-level composition/aggregation associations.
pub const PARENT: &str = "topika.core.parent";

/// Default child role in instance-level composition/aggregation associations.
pub const CHILD: &str = "topika.core.child";

/// Parent-type side of a composition/aggregation definition.
pub const PARENT_TYPE: &str = "topika.core.parent_type";

/// Child-type side of a composition/aggregation definition.
pub const CHILD_TYPE: &str = "topika.core.child_type";

/// The type side of an instantiation association.
pub const TYPE_ROLE: &str = "topika.core.type";

/// The instance side of an instantiation association.
pub const INSTANCE: &str = "topika.core.instance";

/// Role under which a definition's parent role type is attached.
pub const PARENT_ROLE: &str = "topika.core.parent_role";

/// Role under which a definition's child role type is attached.
pub const CHILD_ROLE: &str = "topika.core.child_role";

/// Role under which a definition's parent cardinality is attached.
pub const PARENT_CARDINALITY: &str = "topika.core.parent_cardinality";

/// Role under which a definition's child cardinality is attached.
pub const CHILD_CARDINALITY: &str = "topika.core.child_cardinality";

/// Generic role for attached metadata topics (data type, cardinality, ...).
pub const DEFAULT_ROLE: &str = "topika.core.default";

// =============================================================================
// DATA TYPES
// =============================================================================

/// Type of the data-type topics below.
pub const DATA_TYPE: &str = "topika.core.data_type";

pub const TEXT: &str = "topika.core.text";
pub const NUMBER: &str = "topika.core.number";
pub const BOOLEAN: &str = "topika.core.boolean";
pub const COMPOSITE: &str = "topika.core.composite";

// =============================================================================
// CARDINALITY
// =============================================================================

/// Type of the cardinality topics below.
pub const CARDINALITY: &str = "topika.core.cardinality";

pub const ONE: &str = "topika.core.one";
pub const MANY: &str = "topika.core.many";

// =============================================================================
// INDEX MODES
// =============================================================================

/// Type of the index-mode topics below.
pub const INDEX_MODE: &str = "topika.core.index_mode";

pub const INDEX_OFF: &str = "topika.core.index.off";
pub const INDEX_KEY: &str = "topika.core.index.key";
pub const INDEX_FULLTEXT: &str = "topika.core.index.fulltext";
pub const INDEX_FULLTEXT_KEY: &str = "topika.core.index.fulltext_key";

// =============================================================================
// VIEW CONFIGURATION
// =============================================================================

/// Type of the opaque view-configuration topics attached to types.
pub const VIEW_CONFIG: &str = "topika.core.view_config";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for URI strings.
///
/// URIs longer than this are rejected by model validation.
pub const MAX_URI_LENGTH: usize = 256;

/// Maximum length for text values.
///
/// Values longer than this (64KB) are rejected by model validation.
/// This prevents memory exhaustion from malicious or malformed input.
pub const MAX_VALUE_LENGTH: usize = 65536;

/// Maximum recursion depth for composite value reads and writes.
///
/// All composite operations must be computationally bounded. A type graph
/// deeper than this (or a cyclic one) is rejected instead of looping.
pub const MAX_COMPOSITE_DEPTH: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_uris_are_namespaced() {
        for uri in [
            TOPIC_TYPE,
            ASSOC_TYPE,
            META_TYPE,
            ROLE_TYPE,
            COMPOSITION,
            AGGREGATION,
            COMPOSITION_DEF,
            AGGREGATION_DEF,
            INSTANTIATION,
            CARDINALITY,
            INDEX_MODE,
            DATA_TYPE,
            VIEW_CONFIG,
        ] {
            assert!(uri.starts_with("topika.core."));
            assert!(uri.len() <= MAX_URI_LENGTH);
        }
    }

    #[test]
    fn composite_depth_is_bounded() {
        assert!(MAX_COMPOSITE_DEPTH >= 8);
        assert!(MAX_COMPOSITE_DEPTH <= 128);
    }
}
