//! Transition execution engine
//!
//! [`TransitionEngine`] combines the store, the cache, and the registry
//! into the validated transition mechanism: it resolves the transition's
//! rules, reads current state cache-then-store, validates, computes the
//! target state and effect metadata, and commits a fresh record with an
//! optimistic concurrency check.
//!
//! ## Commit sequence
//!
//! ```text
//! 1. resolve schema + transition      (NotFound on unknown keys)
//! 2. read (current_state, current_id) via cache, store on miss
//! 3. validate(context)                (InvalidTransition, nothing written)
//! 4. target_state(context), effect(context)
//! 5. mint a fresh RecordId
//! 6. conditional append: latest id must still equal current_id
//!                                     (Conflict on violation, nothing written)
//! 7. write-through cache set          (only after the append is acknowledged)
//! ```
//!
//! Step 6 is the correctness-critical piece. The store never locks, so
//! two concurrent executions against the same entity could both validate
//! against the same stale state; the conditional append turns that into a
//! single-writer-wins race with an explicit, observable [`EngineError::Conflict`]
//! for the loser. Per entity, committed records therefore form a valid
//! linear history: no two records derive from the same parent id.
//!
//! An execution cancelled before step 6 leaves no trace; after step 6 it
//! is already committed. The engine holds no locks across store or cache
//! calls.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;

pub use config::EngineConfig;

use std::sync::Arc;
use traject_cache::StateCache;
use traject_core::{
    EngineError, EntityRef, Metadata, RecordId, RecordIdGenerator, StateRecord, StoreError,
    TransitionContext,
};
use traject_registry::Registry;
use traject_store::{AppendCondition, HistoryQuery, StateStore};

/// Validates and executes state transitions
///
/// Shared-resource policy: the store is append-only and safe for
/// unsynchronized concurrent writers; the cache is mutated only through
/// its compare-and-set; the registry is read-only after startup. The
/// engine itself is therefore freely shareable behind an `Arc`.
pub struct TransitionEngine {
    store: Arc<dyn StateStore>,
    cache: Arc<dyn StateCache>,
    registry: Arc<Registry>,
    ids: RecordIdGenerator,
    config: EngineConfig,
}

impl TransitionEngine {
    /// Create an engine with default configuration
    pub fn new(
        store: Arc<dyn StateStore>,
        cache: Arc<dyn StateCache>,
        registry: Arc<Registry>,
    ) -> Self {
        Self::with_config(store, cache, registry, EngineConfig::default())
    }

    /// Create an engine with explicit configuration
    pub fn with_config(
        store: Arc<dyn StateStore>,
        cache: Arc<dyn StateCache>,
        registry: Arc<Registry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            cache,
            registry,
            ids: RecordIdGenerator::new(),
            config,
        }
    }

    /// The registry this engine resolves against
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Execute a named transition on an entity
    ///
    /// Returns the committed record on success. `NotFound` and
    /// `InvalidTransition` are terminal (fix the request); `Conflict`
    /// is retryable after re-reading; `Storage` is propagated unmodified
    /// and never retried here, because a blind retry after an ambiguous
    /// append could duplicate the transition — callers needing safe
    /// retries use [`TransitionEngine::execute_idempotent`].
    pub fn execute(
        &self,
        entity_type: &str,
        entity_id: &str,
        transition_name: &str,
        payload: serde_json::Value,
        actor: Option<&str>,
    ) -> Result<StateRecord, EngineError> {
        self.execute_inner(entity_type, entity_id, transition_name, payload, actor, None)
    }

    /// Execute with a caller-supplied idempotency key
    ///
    /// The store rejects a second append carrying the same key for the
    /// same entity, so retrying after an ambiguous storage failure cannot
    /// apply the transition twice.
    pub fn execute_idempotent(
        &self,
        entity_type: &str,
        entity_id: &str,
        transition_name: &str,
        payload: serde_json::Value,
        actor: Option<&str>,
        idempotency_key: &str,
    ) -> Result<StateRecord, EngineError> {
        self.execute_inner(
            entity_type,
            entity_id,
            transition_name,
            payload,
            actor,
            Some(idempotency_key.to_string()),
        )
    }

    /// Execute, retrying on `Conflict` up to the configured attempt count
    ///
    /// Each retry re-reads current state and re-validates. Terminal
    /// errors and storage failures are never retried.
    pub fn execute_with_retry(
        &self,
        entity_type: &str,
        entity_id: &str,
        transition_name: &str,
        payload: serde_json::Value,
        actor: Option<&str>,
    ) -> Result<StateRecord, EngineError> {
        let mut attempts = 0;
        loop {
            match self.execute(
                entity_type,
                entity_id,
                transition_name,
                payload.clone(),
                actor,
            ) {
                Err(error @ EngineError::Conflict { .. }) => {
                    attempts += 1;
                    if attempts > self.config.conflict_retries {
                        return Err(error);
                    }
                    tracing::debug!(
                        entity_type,
                        entity_id,
                        transition = transition_name,
                        attempt = attempts,
                        "conflict, retrying"
                    );
                }
                result => return result,
            }
        }
    }

    fn execute_inner(
        &self,
        entity_type: &str,
        entity_id: &str,
        transition_name: &str,
        payload: serde_json::Value,
        actor: Option<&str>,
        idempotency_key: Option<String>,
    ) -> Result<StateRecord, EngineError> {
        let schema = self
            .registry
            .resolve(entity_type)
            .ok_or_else(|| EngineError::NotFound {
                entity_type: entity_type.to_string(),
            })?;
        let transition =
            schema
                .transition(transition_name)
                .ok_or_else(|| EngineError::UnknownTransition {
                    entity_type: entity_type.to_string(),
                    transition: transition_name.to_string(),
                })?;

        let entity = EntityRef::new(entity_type, entity_id);
        let current = self.read_current(&entity)?;
        let (current_state, current_id) = match current {
            Some((state, id)) => (Some(state), Some(id)),
            None => (None, None),
        };

        let ctx = TransitionContext::new(
            current_state.clone(),
            payload,
            actor.map(str::to_string),
        );

        if !transition.validate(&ctx) {
            tracing::debug!(
                entity = %entity,
                transition = transition_name,
                from = ?current_state,
                "transition rejected by validation"
            );
            return Err(EngineError::InvalidTransition {
                from: current_state,
                transition: transition_name.to_string(),
            });
        }

        let target_state = transition.target_state(&ctx);
        if !schema.is_declared_state(&target_state) {
            return Err(EngineError::UndeclaredState {
                entity_type: entity_type.to_string(),
                state: target_state,
            });
        }
        let metadata: Metadata = transition.effect(&ctx);
        let reason = transition.reason(&ctx);

        let record = StateRecord {
            id: self.ids.next(),
            entity: entity.clone(),
            state: target_state,
            previous_state: current_state.clone(),
            transition: Some(transition_name.to_string()),
            actor: ctx.actor.clone(),
            reason,
            metadata,
            idempotency_key,
        };

        // Optimistic concurrency check, atomic with the append: the latest
        // id must still be the one validation ran against
        let condition = AppendCondition::from_observed(current_id);
        match self.store.append(record.clone(), condition) {
            Ok(()) => {}
            Err(StoreError::PreconditionFailed { .. }) => {
                tracing::debug!(entity = %entity, transition = transition_name, "lost optimistic race");
                return Err(EngineError::Conflict { entity });
            }
            Err(StoreError::Duplicate { existing, .. }) => {
                // The retry lost to its own earlier success; the caller
                // re-reads and observes the applied state
                tracing::debug!(entity = %entity, %existing, "idempotency key already consumed");
                return Err(EngineError::Conflict { entity });
            }
            Err(error) => {
                tracing::error!(entity = %entity, transition = transition_name, %error, "append failed");
                return Err(EngineError::Storage(error));
            }
        }

        // Write-through only after the append is acknowledged; a cache
        // failure here costs latency on the next read, nothing more
        if let Err(error) =
            self.cache
                .set_if_newer(&entity, &record.state, record.id, self.config.cache_ttl())
        {
            tracing::warn!(entity = %entity, %error, "cache write-through failed");
        }

        tracing::info!(
            entity = %entity,
            transition = transition_name,
            from = ?record.previous_state,
            to = %record.state,
            record_id = %record.id,
            "transition committed"
        );
        Ok(record)
    }

    /// Current state of an entity
    ///
    /// Cache-then-store; a miss populates the cache. Returns `None` for
    /// an entity with no history. Unknown entity types fail with
    /// `NotFound`.
    pub fn current_state(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<String>, EngineError> {
        self.require_entity_type(entity_type)?;
        let entity = EntityRef::new(entity_type, entity_id);
        Ok(self.read_current(&entity)?.map(|(state, _)| state))
    }

    /// State history in ascending id order
    ///
    /// `limit` defaults to the configured history page size; `since_id`
    /// is exclusive and doubles as a time-range bound because ids embed
    /// time.
    pub fn history(
        &self,
        entity_type: &str,
        entity_id: &str,
        limit: Option<usize>,
        since_id: Option<RecordId>,
    ) -> Result<Vec<StateRecord>, EngineError> {
        self.require_entity_type(entity_type)?;
        let entity = EntityRef::new(entity_type, entity_id);
        let query = HistoryQuery {
            limit: Some(limit.unwrap_or(self.config.history_limit)),
            since_id,
            until_id: None,
        };
        self.store
            .history(&entity, &query)
            .map_err(EngineError::Storage)
    }

    /// History of records committed at or after `since`
    ///
    /// No timestamp index involved: the exclusive `since_id` bound is the
    /// ceiling of the preceding millisecond.
    pub fn history_since(
        &self,
        entity_type: &str,
        entity_id: &str,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<StateRecord>, EngineError> {
        self.history(entity_type, entity_id, None, Self::before(since))
    }

    /// History of records committed between `start` and `end`, inclusive
    /// at millisecond resolution
    pub fn history_between(
        &self,
        entity_type: &str,
        entity_id: &str,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<StateRecord>, EngineError> {
        self.require_entity_type(entity_type)?;
        let entity = EntityRef::new(entity_type, entity_id);
        let query = HistoryQuery {
            limit: Some(self.config.history_limit),
            since_id: Self::before(start),
            until_id: Some(RecordId::ceil(end)),
        };
        self.store
            .history(&entity, &query)
            .map_err(EngineError::Storage)
    }

    /// Exclusive id bound admitting every id minted at or after `ts`
    fn before(ts: chrono::DateTime<chrono::Utc>) -> Option<RecordId> {
        let prev = ts - chrono::Duration::milliseconds(1);
        (ts.timestamp_millis() > 0).then(|| RecordId::ceil(prev))
    }

    /// Names of transitions whose validation accepts the current state
    ///
    /// Validation runs with an empty payload, so transitions that only
    /// inspect payload data are reported as valid.
    pub fn valid_transitions(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<String>, EngineError> {
        let schema = self
            .registry
            .resolve(entity_type)
            .ok_or_else(|| EngineError::NotFound {
                entity_type: entity_type.to_string(),
            })?;
        let entity = EntityRef::new(entity_type, entity_id);
        let current_state = self.read_current(&entity)?.map(|(state, _)| state);
        let ctx = TransitionContext::new(current_state, serde_json::Value::Null, None);

        Ok(schema
            .transitions()
            .filter(|t| t.validate(&ctx))
            .map(|t| t.name().to_string())
            .collect())
    }

    /// Preload the cache with current states for entities of one type
    ///
    /// One batched store read; entities with no history are skipped.
    /// Returns the number of entries installed. Cache failures skip the
    /// entry rather than failing the warm.
    pub fn warm_cache(
        &self,
        entity_type: &str,
        entity_ids: &[String],
    ) -> Result<usize, EngineError> {
        self.require_entity_type(entity_type)?;
        let batch = self
            .store
            .latest_batch(entity_type, entity_ids)
            .map_err(EngineError::Storage)?;

        let mut warmed = 0;
        for (entity_id, latest) in entity_ids.iter().zip(batch) {
            let Some(record) = latest else { continue };
            let entity = EntityRef::new(entity_type, entity_id.clone());
            match self
                .cache
                .set_if_newer(&entity, &record.state, record.id, self.config.cache_ttl())
            {
                Ok(()) => warmed += 1,
                Err(error) => {
                    tracing::warn!(entity = %entity, %error, "cache warm failed");
                }
            }
        }
        tracing::debug!(entity_type, requested = entity_ids.len(), warmed, "cache warmed");
        Ok(warmed)
    }

    /// Read `(state, id)` of the latest record, cache first
    fn read_current(
        &self,
        entity: &EntityRef,
    ) -> Result<Option<(String, RecordId)>, EngineError> {
        match self.cache.get(entity) {
            Ok(Some(cached)) => {
                tracing::debug!(entity = %entity, state = %cached.state, "cache hit");
                return Ok(Some((cached.state, cached.record_id)));
            }
            Ok(None) => {}
            Err(error) => {
                // Cache failures are never load-bearing; degrade to a miss
                tracing::warn!(entity = %entity, %error, "cache read failed, falling back to store");
            }
        }

        let Some(latest) = self
            .store
            .latest(entity)
            .map_err(EngineError::Storage)?
        else {
            return Ok(None);
        };

        if let Err(error) =
            self.cache
                .set_if_newer(entity, &latest.state, latest.id, self.config.cache_ttl())
        {
            tracing::warn!(entity = %entity, %error, "cache population failed");
        }
        Ok(Some((latest.state, latest.id)))
    }

    fn require_entity_type(&self, entity_type: &str) -> Result<(), EngineError> {
        if self.registry.resolve(entity_type).is_none() {
            return Err(EngineError::NotFound {
                entity_type: entity_type.to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for TransitionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionEngine")
            .field("config", &self.config)
            .finish()
    }
}
