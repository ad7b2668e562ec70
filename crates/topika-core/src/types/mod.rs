//! # Core Type Definitions
//!
//! This module contains the base types of the Topika object model:
//! - Entity identity (`EntityId`)
//! - Simple values (`SimpleValue`)
//! - Error types (`TopikaError`)
//!
//! ## Identity Guarantees
//!
//! - An `EntityId` is assigned exactly once, at creation, by the storage
//!   layer; before creation it is the `UNASSIGNED` sentinel.
//! - Topics and associations draw from one id sequence; topic URIs and
//!   association URIs are separate namespaces.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// ENTITY IDENTITY
// =============================================================================

/// Unique identifier for a topic or association.
///
/// Ids are caller-opaque 64-bit integers assigned by the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub i64);

impl EntityId {
    /// Sentinel id of a model that has not been persisted yet.
    pub const UNASSIGNED: Self = Self(-1);

    /// Whether this id has been assigned by the storage layer.
    #[must_use]
    pub const fn is_assigned(self) -> bool {
        self.0 >= 0
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::UNASSIGNED
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// SIMPLE VALUE
// =============================================================================

/// The simple (non-composite) value of a topic or association.
///
/// How a value is interpreted is decided by its type's data type, which is
/// itself graph data. `Empty` is the value of composite entities and of
/// entities that carry no value at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SimpleValue {
    Text(String),
    Int(i32),
    Long(i64),
    Double(f64),
    Boolean(bool),
    #[default]
    Empty,
}

impl SimpleValue {
    /// Whether this is the empty value.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Get the text content, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Canonical string form used as the exact-match index key.
    ///
    /// Case is preserved for text; the full-text index applies its own
    /// normalization on top of this.
    #[must_use]
    pub fn index_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SimpleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Long(l) => write!(f, "{l}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Empty => Ok(()),
        }
    }
}

impl From<&str> for SimpleValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SimpleValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for SimpleValue {
    fn from(l: i64) -> Self {
        Self::Long(l)
    }
}

impl From<bool> for SimpleValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Topika core.
///
/// - No silent failures
/// - Use `Result<T, TopikaError>` for fallible operations
/// - The core never panics; all errors are reported to the immediate caller
/// - No retries inside the core; the calling layer decides whether a storage
///   failure is transient
#[derive(Debug, Error)]
pub enum TopikaError {
    /// No entity exists with the given id.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// No entity exists with the given URI.
    #[error("No entity with URI \"{0}\"")]
    UriNotFound(String),

    /// A type was asked to be invalidated that is not in the cache.
    #[error("Type \"{0}\" is not cached")]
    TypeNotCached(String),

    /// A query expecting at most one result found more than one.
    ///
    /// This always indicates either a data-modeling mistake or a genuinely
    /// unsupported many-to-one assumption; the core never silently picks the
    /// first result.
    #[error("Ambiguous result for {context}: expected at most 1, got {count}")]
    Ambiguity { context: String, count: usize },

    /// A composition definition has no cardinality assigned.
    #[error("Composition definition \"{0}\" has no cardinality")]
    MissingCardinality(String),

    /// A model failed validation before it reached storage.
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// The URI is already taken within its namespace.
    #[error("URI \"{0}\" is already taken")]
    UriTaken(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Any failure surfaced by the storage contract.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl TopikaError {
    /// Build an ambiguity error for a query context.
    #[must_use]
    pub fn ambiguity(context: impl Into<String>, count: usize) -> Self {
        Self::Ambiguity {
            context: context.into(),
            count,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
