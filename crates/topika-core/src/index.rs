//! # Indexing Policy
//!
//! Maps index modes onto storage-level index operations.
//!
//! The policy computes *which* operations to invoke against the storage
//! contract; actual index mechanics (tokenization, case folding of the
//! full-text index) are the storage engine's responsibility.

use crate::types::{EntityId, SimpleValue};
use crate::uris;
use serde::{Deserialize, Serialize};

// =============================================================================
// INDEX MODE
// =============================================================================

/// Policy controlling whether and how a simple value is indexed for lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMode {
    /// No index.
    Off,
    /// Exact-match index, case preserved.
    Key,
    /// Tokenized, case-insensitive index.
    Fulltext,
    /// Both exact and tokenized.
    FulltextKey,
}

impl IndexMode {
    /// Resolve an index-mode topic URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            uris::INDEX_OFF => Some(Self::Off),
            uris::INDEX_KEY => Some(Self::Key),
            uris::INDEX_FULLTEXT => Some(Self::Fulltext),
            uris::INDEX_FULLTEXT_KEY => Some(Self::FulltextKey),
            _ => None,
        }
    }

    /// The index-mode topic URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Off => uris::INDEX_OFF,
            Self::Key => uris::INDEX_KEY,
            Self::Fulltext => uris::INDEX_FULLTEXT,
            Self::FulltextKey => uris::INDEX_FULLTEXT_KEY,
        }
    }

    /// Whether this mode feeds the exact-match index.
    #[must_use]
    pub const fn indexes_key(self) -> bool {
        matches!(self, Self::Key | Self::FulltextKey)
    }

    /// Whether this mode feeds the full-text index.
    #[must_use]
    pub const fn indexes_fulltext(self) -> bool {
        matches!(self, Self::Fulltext | Self::FulltextKey)
    }
}

// =============================================================================
// INDEX OPERATIONS
// =============================================================================

/// A single storage-level index operation.
///
/// `field` is the index key the entry is filed under (the entity's type URI);
/// the value is carried in canonical string form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOp {
    RemoveKey {
        field: String,
        value: String,
        entity: EntityId,
    },
    AddKey {
        field: String,
        value: String,
        entity: EntityId,
    },
    RemoveFulltext {
        field: String,
        text: String,
        entity: EntityId,
    },
    AddFulltext {
        field: String,
        text: String,
        entity: EntityId,
    },
}

/// Compute the index operations for a simple-value write.
///
/// The old indexed value is removed before the new one is indexed. Empty
/// values are never indexed; an empty new value therefore only produces
/// removals. The returned list is empty when no active mode covers the
/// affected index.
#[must_use]
pub fn index_ops(
    modes: &[IndexMode],
    field: &str,
    old: Option<&SimpleValue>,
    new: &SimpleValue,
    entity: EntityId,
) -> Vec<IndexOp> {
    let key = modes.iter().any(|m| m.indexes_key());
    let fulltext = modes.iter().any(|m| m.indexes_fulltext());

    let mut ops = Vec::new();
    let old_nonempty = old.filter(|v| !v.is_empty());

    if key {
        if let Some(old_value) = old_nonempty {
            ops.push(IndexOp::RemoveKey {
                field: field.to_string(),
                value: old_value.index_key(),
                entity,
            });
        }
        if !new.is_empty() {
            ops.push(IndexOp::AddKey {
                field: field.to_string(),
                value: new.index_key(),
                entity,
            });
        }
    }
    if fulltext {
        if let Some(old_value) = old_nonempty {
            ops.push(IndexOp::RemoveFulltext {
                field: field.to_string(),
                text: old_value.index_key(),
                entity,
            });
        }
        if !new.is_empty() {
            ops.push(IndexOp::AddFulltext {
                field: field.to_string(),
                text: new.index_key(),
                entity,
            });
        }
    }
    ops
}

// =============================================================================
// TESTS
// =============================================================================
