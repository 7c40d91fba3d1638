//! In-memory sharded store
//!
//! DashMap keyed by entity type, FxHashMap of per-entity record vectors
//! inside each shard. Appends for one entity lock only that entity type's
//! shard; reads go through DashMap's lock-free read guards. Entities of
//! different types never contend.
//!
//! Records inside an entity's vector stay sorted by id because appends for
//! one entity are serialized by the conditional check; a slow writer that
//! lost the race is rejected before it can insert out of order.

use crate::{AppendCondition, HistoryQuery, StateStore};
use dashmap::DashMap;
use rustc_hash::FxHashMap;
use traject_core::{EntityRef, RecordId, StateRecord, StoreError};

/// Per-entity-type shard
#[derive(Debug, Default)]
struct TypeShard {
    /// entity_id -> records in ascending id order
    records: FxHashMap<String, Vec<StateRecord>>,
    /// (entity_id, idempotency_key) -> id of the record that consumed it
    idempotency: FxHashMap<(String, String), RecordId>,
}

impl TypeShard {
    fn latest_id(&self, entity_id: &str) -> Option<RecordId> {
        self.records
            .get(entity_id)
            .and_then(|records| records.last())
            .map(|record| record.id)
    }
}

/// Apply a query's bounds to one entity's sorted record vector
fn page(records: &[StateRecord], query: &HistoryQuery) -> Vec<StateRecord> {
    let start = match query.since_id {
        Some(since) => records.partition_point(|r| r.id <= since),
        None => 0,
    };
    let end = match query.until_id {
        Some(until) => records.partition_point(|r| r.id <= until),
        None => records.len(),
    };
    let mut result: Vec<StateRecord> = records[start..end.max(start)].to_vec();
    if let Some(limit) = query.limit {
        result.truncate(limit);
    }
    result
}

/// Sharded in-memory [`StateStore`]
///
/// # Thread Safety
///
/// All operations are thread-safe. The conditional append holds the
/// entity type's shard guard across check and insert, which makes
/// [`AppendCondition::CurrentIs`] a true compare-and-swap.
#[derive(Debug, Default)]
pub struct MemoryStore {
    shards: DashMap<String, TypeShard>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all entities
    pub fn record_count(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.records.values().map(Vec::len).sum::<usize>())
            .sum()
    }

    /// Number of records for one entity
    pub fn entity_record_count(&self, entity: &EntityRef) -> usize {
        self.shards
            .get(&entity.entity_type)
            .and_then(|shard| shard.records.get(&entity.entity_id).map(Vec::len))
            .unwrap_or(0)
    }
}

impl StateStore for MemoryStore {
    fn append(&self, record: StateRecord, condition: AppendCondition) -> Result<(), StoreError> {
        let entity = record.entity.clone();
        let mut shard = self.shards.entry(entity.entity_type.clone()).or_default();

        if let Some(key) = &record.idempotency_key {
            let idem_key = (entity.entity_id.clone(), key.clone());
            if let Some(existing) = shard.idempotency.get(&idem_key) {
                return Err(StoreError::Duplicate {
                    entity,
                    existing: *existing,
                });
            }
        }

        let actual = shard.latest_id(&entity.entity_id);
        let holds = match condition {
            AppendCondition::Any => true,
            AppendCondition::NoCurrent => actual.is_none(),
            AppendCondition::CurrentIs(expected) => actual == Some(expected),
        };
        if !holds {
            let expected = match condition {
                AppendCondition::CurrentIs(id) => Some(id),
                _ => None,
            };
            return Err(StoreError::PreconditionFailed {
                entity,
                expected,
                actual,
            });
        }

        if let Some(key) = &record.idempotency_key {
            shard
                .idempotency
                .insert((entity.entity_id.clone(), key.clone()), record.id);
        }

        let records = shard.records.entry(entity.entity_id.clone()).or_default();
        // Unconditional appends may arrive out of id order; keep the vector
        // sorted so latest() stays "last element"
        match records.last() {
            Some(last) if last.id > record.id => {
                let position = records.partition_point(|r| r.id < record.id);
                records.insert(position, record);
            }
            _ => records.push(record),
        }

        tracing::debug!(entity = %entity, "appended state record");
        Ok(())
    }

    fn latest(&self, entity: &EntityRef) -> Result<Option<StateRecord>, StoreError> {
        Ok(self
            .shards
            .get(&entity.entity_type)
            .and_then(|shard| {
                shard
                    .records
                    .get(&entity.entity_id)
                    .and_then(|records| records.last().cloned())
            }))
    }

    fn history(
        &self,
        entity: &EntityRef,
        query: &HistoryQuery,
    ) -> Result<Vec<StateRecord>, StoreError> {
        let Some(shard) = self.shards.get(&entity.entity_type) else {
            return Ok(Vec::new());
        };
        let Some(records) = shard.records.get(&entity.entity_id) else {
            return Ok(Vec::new());
        };
        Ok(page(records, query))
    }

    fn latest_batch(
        &self,
        entity_type: &str,
        entity_ids: &[String],
    ) -> Result<Vec<Option<StateRecord>>, StoreError> {
        let shard = self.shards.get(entity_type);
        Ok(entity_ids
            .iter()
            .map(|entity_id| {
                shard.as_ref().and_then(|shard| {
                    shard
                        .records
                        .get(entity_id)
                        .and_then(|records| records.last().cloned())
                })
            })
            .collect())
    }

    fn history_batch(
        &self,
        entity_type: &str,
        entity_ids: &[String],
        query: &HistoryQuery,
    ) -> Result<Vec<Vec<StateRecord>>, StoreError> {
        let shard = self.shards.get(entity_type);
        Ok(entity_ids
            .iter()
            .map(|entity_id| {
                shard
                    .as_ref()
                    .and_then(|shard| shard.records.get(entity_id))
                    .map(|records| page(records, query))
                    .unwrap_or_default()
            })
            .collect())
    }
}
