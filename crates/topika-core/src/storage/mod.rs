//! # Storage Layer
//!
//! The storage contract consumed by the core, plus the two in-repo engines:
//! - [`MemStorage`]: deterministic in-memory store (BTreeMap-based)
//! - [`RedbStorage`]: disk-backed store using the redb embedded database
//!
//! The contract is deliberately small: CRUD and lookup primitives over
//! topics and associations. Relation filtering, composite assembly, and the
//! indexing policy live above it; the engines only have to store records,
//! maintain lookup indexes, and honor transaction pairing.

mod memory;
mod redb_store;

pub use memory::MemStorage;
pub use redb_store::RedbStorage;

use crate::index::IndexOp;
use crate::model::{AssociationModel, TopicModel};
use crate::types::{EntityId, SimpleValue, TopikaError};

// =============================================================================
// GRAPHSTORAGE TRAIT
// =============================================================================

/// The storage contract.
///
/// All fallible operations return `Result<T, TopikaError>` so in-memory and
/// persistent engines can be used uniformly. Fetched models carry an empty
/// composite value; child topics are graph structure, assembled above this
/// layer.
///
/// ## Transactions
///
/// At most one transaction is active at a time (single logical writer).
/// Every `begin_transaction` must be paired with `commit_transaction` or
/// `rollback_transaction`; the engines reject unpaired calls.
pub trait GraphStorage {
    /// Persist a topic model.
    ///
    /// Assigns a fresh id if the model's id is unassigned, writing it back
    /// into the model; otherwise updates the record with that id. Fails with
    /// `UriTaken` when the model's URI belongs to another topic.
    fn store_topic(&mut self, model: &mut TopicModel) -> Result<EntityId, TopikaError>;

    /// Fetch a topic by id. Absence is `Ok(None)`, not an error.
    fn fetch_topic(&self, id: EntityId) -> Result<Option<TopicModel>, TopikaError>;

    /// Fetch a topic by its URI alias.
    fn fetch_topic_by_uri(&self, uri: &str) -> Result<Option<TopicModel>, TopikaError>;

    /// Fetch the single topic filed under `(key, value)` in the exact-match
    /// index. Fails with `Ambiguity` if the index holds more than one.
    fn fetch_topic_by_value(
        &self,
        key: &str,
        value: &SimpleValue,
    ) -> Result<Option<TopicModel>, TopikaError>;

    /// Fetch all topics filed under `(key, value)` in the exact-match index.
    fn fetch_topics_by_value(
        &self,
        key: &str,
        value: &SimpleValue,
    ) -> Result<Vec<TopicModel>, TopikaError>;

    /// Case-insensitive full-text query. Every whitespace-separated term must
    /// match; `field` restricts the search to one index key. Results are
    /// complete, never truncated.
    fn query_fulltext(
        &self,
        term: &str,
        field: Option<&str>,
    ) -> Result<Vec<TopicModel>, TopikaError>;

    /// Persist an association model. Id assignment as for `store_topic`.
    fn store_association(&mut self, model: &mut AssociationModel) -> Result<EntityId, TopikaError>;

    /// Fetch an association by id.
    fn fetch_association(&self, id: EntityId) -> Result<Option<AssociationModel>, TopikaError>;

    /// Fetch an association by its URI alias.
    fn fetch_association_by_uri(
        &self,
        uri: &str,
    ) -> Result<Option<AssociationModel>, TopikaError>;

    /// All associations in which the entity (topic or association) plays,
    /// in storage order.
    fn associations_of(&self, entity: EntityId) -> Result<Vec<AssociationModel>, TopikaError>;

    /// Overwrite the simple value of a topic or association.
    ///
    /// This is the raw store; index maintenance is driven separately through
    /// `apply_index_op`.
    fn store_value(&mut self, id: EntityId, value: SimpleValue) -> Result<(), TopikaError>;

    /// Apply one index operation computed by the indexing policy.
    fn apply_index_op(&mut self, op: &IndexOp) -> Result<(), TopikaError>;

    /// Delete a topic and all its index entries.
    ///
    /// Incident associations are the caller's responsibility and must be
    /// deleted first.
    fn delete_topic(&mut self, id: EntityId) -> Result<(), TopikaError>;

    /// Delete an association and all its index entries.
    fn delete_association(&mut self, id: EntityId) -> Result<(), TopikaError>;

    /// Begin a transaction. Fails if one is already active.
    fn begin_transaction(&mut self) -> Result<(), TopikaError>;

    /// Commit the active transaction. Fails if none is active.
    fn commit_transaction(&mut self) -> Result<(), TopikaError>;

    /// Roll back the active transaction, restoring the pre-begin state.
    fn rollback_transaction(&mut self) -> Result<(), TopikaError>;

    /// Total number of topics.
    fn topic_count(&self) -> Result<usize, TopikaError>;

    /// Total number of associations.
    fn association_count(&self) -> Result<usize, TopikaError>;
}

// =============================================================================
// FULL-TEXT TOKENIZATION
// =============================================================================

/// Tokenize text for the full-text index: lowercase, split on
/// non-alphanumeric boundaries, drop empty tokens.
///
/// Both engines share this so a value indexed by one is found by the same
/// query against the other.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_splits() {
        assert_eq!(tokenize("Haskell code"), vec!["haskell", "code"]);
        assert_eq!(tokenize("foo-bar_baz"), vec!["foo", "bar", "baz"]);
    }

    #[test]
    fn tokenize_drops_empty_tokens() {
        assert_eq!(tokenize("  ,, "), Vec::<String>::new());
        assert_eq!(tokenize(""), Vec::<String>::new());
    }
}
