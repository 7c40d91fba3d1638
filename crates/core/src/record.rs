//! The append-only state history model
//!
//! [`StateRecord`] is one immutable append to an entity's history. For a
//! fixed [`EntityRef`], the set of records ordered by `id` is the complete
//! history and the record with the maximum `id` is the current state.

use crate::record_id::RecordId;
use serde::{Deserialize, Serialize};

/// Opaque key/value payload attached to a record by a transition's effect
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Reference to one tracked entity
///
/// `entity_type` is a key into the registry; `entity_id` is opaque to the
/// engine. Used as the grouping key for history, caching, and batching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    /// Registry key naming the entity type (e.g. "order", "task")
    pub entity_type: String,
    /// Opaque identifier of the tracked entity
    pub entity_id: String,
}

impl EntityRef {
    /// Create a new entity reference
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl std::fmt::Display for EntityRef {
    /// Display in the format: entity_type/entity_id
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// One immutable append to an entity's state history
///
/// Once persisted a record is never updated or deleted. Sorting records by
/// `id` equals chronological order, so "current state" is simply the record
/// with the maximum `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Time-ordered identifier; the sort key for history
    pub id: RecordId,
    /// The entity this record belongs to
    pub entity: EntityRef,
    /// State after this transition, drawn from the schema's state set
    pub state: String,
    /// State before this transition; `None` for the initial record
    pub previous_state: Option<String>,
    /// Name of the transition that produced this record
    pub transition: Option<String>,
    /// Who or what caused the transition
    pub actor: Option<String>,
    /// Human-readable explanation
    pub reason: Option<String>,
    /// Payload produced by the transition's effect
    pub metadata: Metadata,
    /// Caller-supplied token letting the store reject duplicate appends
    pub idempotency_key: Option<String>,
}

impl StateRecord {
    /// Create a record with only the required fields set
    pub fn new(id: RecordId, entity: EntityRef, state: impl Into<String>) -> Self {
        Self {
            id,
            entity,
            state: state.into(),
            previous_state: None,
            transition: None,
            actor: None,
            reason: None,
            metadata: Metadata::new(),
            idempotency_key: None,
        }
    }
}

impl std::fmt::Display for StateRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.previous_state {
            Some(prev) => write!(f, "{}: {} -> {}", self.entity, prev, self.state),
            None => write!(f, "{}: -> {}", self.entity, self.state),
        }
    }
}
