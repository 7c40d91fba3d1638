//! State record persistence for traject
//!
//! This crate defines the [`StateStore`] contract — append-only
//! persistence of immutable [`StateRecord`]s with latest-and-history
//! queries — and ships [`MemoryStore`], a sharded in-memory
//! implementation.
//!
//! ## Contract
//!
//! - `append` is a pure insert. It never updates or deletes existing
//!   records and never blocks appends for other entities.
//! - `latest` is "max id for this entity".
//! - `history` returns records in ascending `id` order; because ids embed
//!   time, `since_id` doubles as a time-range filter.
//! - Conditional appends ([`AppendCondition::NoCurrent`] /
//!   [`AppendCondition::CurrentIs`]) are checked atomically with the
//!   insert, giving the engine its optimistic concurrency primitive.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;

pub use memory::MemoryStore;

use traject_core::{EntityRef, RecordId, StateRecord, StoreError};

/// Precondition checked atomically with an append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendCondition {
    /// Insert unconditionally (imports, backfill)
    Any,
    /// Insert only if the entity has no records yet
    NoCurrent,
    /// Insert only if the entity's latest record has exactly this id
    CurrentIs(RecordId),
}

impl AppendCondition {
    /// The condition asserting the given observed latest id
    ///
    /// `None` (no history observed) maps to [`AppendCondition::NoCurrent`].
    pub fn from_observed(latest: Option<RecordId>) -> Self {
        match latest {
            Some(id) => AppendCondition::CurrentIs(id),
            None => AppendCondition::NoCurrent,
        }
    }
}

/// Bounds for a history query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Maximum number of records to return (`None` = no bound)
    pub limit: Option<usize>,
    /// Only return records with an id strictly greater than this
    pub since_id: Option<RecordId>,
    /// Only return records with an id less than or equal to this
    pub until_id: Option<RecordId>,
}

impl HistoryQuery {
    /// Query with only a limit set
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            since_id: None,
            until_id: None,
        }
    }

    /// Query for everything after the given id
    pub fn since(id: RecordId) -> Self {
        Self {
            limit: None,
            since_id: Some(id),
            until_id: None,
        }
    }

    /// Query for ids in `(since, until]`
    pub fn between(since: RecordId, until: RecordId) -> Self {
        Self {
            limit: None,
            since_id: Some(since),
            until_id: Some(until),
        }
    }
}

/// Append-only persistence of immutable state records
///
/// Implementations must be safe for unsynchronized concurrent use. The
/// store is always the source of truth; caches built above it must be
/// reconcilable from it.
pub trait StateStore: Send + Sync {
    /// Append a record, atomically checking `condition`
    ///
    /// Fails with [`StoreError::PreconditionFailed`] when the condition
    /// does not hold and with [`StoreError::Duplicate`] when the record
    /// carries an idempotency key that was already accepted for the same
    /// entity. Never mutates existing records.
    fn append(&self, record: StateRecord, condition: AppendCondition) -> Result<(), StoreError>;

    /// The record with the maximum id for this entity, if any
    fn latest(&self, entity: &EntityRef) -> Result<Option<StateRecord>, StoreError>;

    /// Records for this entity in ascending id order, bounded by `query`
    fn history(&self, entity: &EntityRef, query: &HistoryQuery)
        -> Result<Vec<StateRecord>, StoreError>;

    /// Latest records for many entities of one type in a single call
    ///
    /// The result is parallel to `entity_ids`; entities with no history
    /// map to `None` rather than failing the batch.
    fn latest_batch(
        &self,
        entity_type: &str,
        entity_ids: &[String],
    ) -> Result<Vec<Option<StateRecord>>, StoreError>;

    /// Histories for many entities of one type in a single call
    ///
    /// `query` applies per entity. The result is parallel to
    /// `entity_ids`; entities with no history map to an empty vector.
    fn history_batch(
        &self,
        entity_type: &str,
        entity_ids: &[String],
        query: &HistoryQuery,
    ) -> Result<Vec<Vec<StateRecord>>, StoreError>;
}
