//! # topika-core
//!
//! The semantic core of Topika - THE MODEL.
//!
//! Topika is a knowledge-graph platform whose domain model is entirely
//! data-driven: every topic, every association, and every type definition is
//! itself stored as graph data, not as compiled schema. This crate implements
//! the object model, the composite-value engine that reads and writes
//! hierarchical values according to live type definitions, the runtime type
//! system with its explicitly invalidated cache, the relation-filtered
//! traversal engine, and the indexing policy - all layered above the
//! `GraphStorage` contract.
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: no async, no network dependencies; all calls are synchronous
//! - Single logical writer per entity; the type-cache mutex is the only lock
//! - Every transaction begin is paired with commit or rollback
//! - No silent failures: ambiguous results and missing type metadata are
//!   errors, never guesses

// =============================================================================
// MODULES
// =============================================================================

pub mod composite;
pub mod engine;
pub mod index;
pub mod model;
pub mod storage;
pub mod traversal;
pub mod typecache;
pub mod typedef;
pub mod types;
pub mod uris;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{EntityId, SimpleValue, TopikaError};

// =============================================================================
// RE-EXPORTS: Object Model
// =============================================================================

pub use model::{
    AssociationModel, ChildSlot, ChildTopicsModel, ChildValue, PlayerModel, TopicModel,
};

// =============================================================================
// RE-EXPORTS: Storage
// =============================================================================

pub use storage::{GraphStorage, MemStorage, RedbStorage};

// =============================================================================
// RE-EXPORTS: Type System
// =============================================================================

pub use typecache::TypeCache;
pub use typedef::{
    Cardinality, CompDef, CompDefKind, CompDefModel, DataType, TypeDef, TypeKind, TypeModel,
};

// =============================================================================
// RE-EXPORTS: Engines
// =============================================================================

pub use composite::Composer;
pub use engine::TopicEngine;
pub use index::{IndexMode, IndexOp, index_ops};
pub use traversal::{RelatedTopic, TraversalFilter, related_topic, related_topics};
