//! # Traject
//!
//! Append-only entity state tracking with declarative, validated
//! transitions.
//!
//! Traject keeps an immutable history of state changes for arbitrary
//! domain entities, answers "what state is this entity in" from a
//! write-through cache, and executes named transitions that are
//! validated against a process-wide registry — all without locking:
//! concurrent writers on the same entity are resolved by an optimistic
//! check at append time.
//!
//! ## Quick Start
//!
//! ```
//! use traject::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Registered once at startup, immutable afterward
//! let mut builder = RegistryBuilder::new();
//! builder.register_entity_type(EntityTypeSchema::new(
//!     "order",
//!     ["CREATED", "PROCESSING", "SHIPPED"],
//!     "CREATED",
//! ))?;
//! builder.register_transition("order", FnTransition::to_state("create", "CREATED"))?;
//! builder.register_transition(
//!     "order",
//!     FnTransition::to_state("process_order", "PROCESSING").from_states(["CREATED"], false),
//! )?;
//!
//! let store = Arc::new(MemoryStore::new());
//! let engine = Arc::new(TransitionEngine::new(
//!     store.clone(),
//!     Arc::new(MemoryCache::new()),
//!     Arc::new(builder.build()),
//! ));
//! let tracker = Tracker::new(engine, store);
//!
//! tracker.execute_transition("order", "order-1", "create", serde_json::Value::Null, None)?;
//! assert_eq!(
//!     tracker.current_state("order", "order-1")?.as_deref(),
//!     Some("CREATED"),
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! - [`RecordIdGenerator`] - monotonic, time-ordered record identifiers
//! - [`StateStore`] / [`MemoryStore`] - append-only record persistence
//! - [`StateCache`] / [`MemoryCache`] - TTL'd write-through current-state cache
//! - [`Registry`] - entity-type schemas and transition definitions
//! - [`TransitionEngine`] - validated execution with optimistic concurrency
//! - [`Tracker`] - the façade outer layers consume

#![warn(missing_docs)]

pub mod prelude;

pub use traject_api::Tracker;
pub use traject_cache::{CachedState, MemoryCache, StateCache};
pub use traject_core::{
    CacheError, EngineError, EntityRef, Metadata, RecordId, RecordIdGenerator, RegistryError,
    StateRecord, StoreError, TransitionContext,
};
pub use traject_engine::{EngineConfig, TransitionEngine};
pub use traject_registry::{
    EntityTypeSchema, FnTransition, Registry, RegistryBuilder, Transition,
};
pub use traject_store::{AppendCondition, HistoryQuery, MemoryStore, StateStore};
