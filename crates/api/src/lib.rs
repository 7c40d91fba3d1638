//! Public façade over the state-tracking engine
//!
//! [`Tracker`] is the surface consumed by outer layers (a REST API, a
//! worker, a reporting job): current-state and history lookups, transition
//! execution, and batched bulk queries.
//!
//! ## Bulk discipline
//!
//! The bulk operations group requested entities by entity type and issue
//! one batched store query per group — the store call count is bounded by
//! the number of distinct entity types, not the number of entities. An
//! entity with no history maps to an explicit `None` marker; partial
//! misses never abort a batch.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::collections::HashMap;
use std::sync::Arc;
use traject_core::{EngineError, EntityRef, RecordId, StateRecord};
use traject_engine::TransitionEngine;
use traject_store::{HistoryQuery, StateStore};

/// Entry point for callers of the state-tracking core
///
/// Cheap to clone; all shared state lives behind `Arc`s.
#[derive(Clone)]
pub struct Tracker {
    engine: Arc<TransitionEngine>,
    store: Arc<dyn StateStore>,
}

impl Tracker {
    /// Wrap an engine and the store it writes to
    pub fn new(engine: Arc<TransitionEngine>, store: Arc<dyn StateStore>) -> Self {
        Self { engine, store }
    }

    /// Current state of one entity, `None` if it has no history
    pub fn current_state(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<String>, EngineError> {
        self.engine.current_state(entity_type, entity_id)
    }

    /// State history in ascending id order
    pub fn state_history(
        &self,
        entity_type: &str,
        entity_id: &str,
        limit: Option<usize>,
        since_id: Option<RecordId>,
    ) -> Result<Vec<StateRecord>, EngineError> {
        self.engine.history(entity_type, entity_id, limit, since_id)
    }

    /// Execute a named transition on an entity
    pub fn execute_transition(
        &self,
        entity_type: &str,
        entity_id: &str,
        transition_name: &str,
        payload: serde_json::Value,
        actor: Option<&str>,
    ) -> Result<StateRecord, EngineError> {
        self.engine
            .execute(entity_type, entity_id, transition_name, payload, actor)
    }

    /// Names of transitions valid from the entity's current state
    pub fn valid_transitions(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<String>, EngineError> {
        self.engine.valid_transitions(entity_type, entity_id)
    }

    /// Current states for many entities, one store call per entity type
    ///
    /// Every requested key gets a result entry; entities with no history
    /// map to `None`.
    pub fn bulk_current_states(
        &self,
        entities: &[(String, String)],
    ) -> Result<HashMap<EntityRef, Option<String>>, EngineError> {
        let mut result = HashMap::with_capacity(entities.len());
        for (entity_type, ids) in group_by_type(entities) {
            let batch = self
                .store
                .latest_batch(entity_type, &ids)
                .map_err(EngineError::Storage)?;
            for (entity_id, latest) in ids.into_iter().zip(batch) {
                result.insert(
                    EntityRef::new(entity_type, entity_id),
                    latest.map(|record| record.state),
                );
            }
        }
        tracing::debug!(requested = entities.len(), "bulk current-state lookup");
        Ok(result)
    }

    /// Histories for many entities, one store call per entity type
    ///
    /// Same batching discipline as [`Tracker::bulk_current_states`];
    /// entities with no history map to an empty list.
    pub fn bulk_history(
        &self,
        entities: &[(String, String)],
        limit: Option<usize>,
    ) -> Result<HashMap<EntityRef, Vec<StateRecord>>, EngineError> {
        let query = HistoryQuery {
            limit,
            since_id: None,
            until_id: None,
        };
        let mut result = HashMap::with_capacity(entities.len());
        for (entity_type, ids) in group_by_type(entities) {
            let batch = self
                .store
                .history_batch(entity_type, &ids, &query)
                .map_err(EngineError::Storage)?;
            for (entity_id, history) in ids.into_iter().zip(batch) {
                result.insert(EntityRef::new(entity_type, entity_id), history);
            }
        }
        Ok(result)
    }

    /// Preload the current-state cache for many entities
    ///
    /// One batched store read per entity type. Returns the number of
    /// cache entries installed; untracked entities are skipped.
    pub fn warm_cache(&self, entities: &[(String, String)]) -> Result<usize, EngineError> {
        let mut warmed = 0;
        for (entity_type, ids) in group_by_type(entities) {
            warmed += self.engine.warm_cache(entity_type, &ids)?;
        }
        Ok(warmed)
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker").finish()
    }
}

/// Group `(entity_type, entity_id)` pairs by type, preserving duplicates
fn group_by_type(entities: &[(String, String)]) -> HashMap<&str, Vec<String>> {
    let mut groups: HashMap<&str, Vec<String>> = HashMap::new();
    for (entity_type, entity_id) in entities {
        groups
            .entry(entity_type.as_str())
            .or_default()
            .push(entity_id.clone());
    }
    groups
}
