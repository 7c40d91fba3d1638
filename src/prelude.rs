//! Convenience re-exports for common usage
//!
//! ```
//! use traject::prelude::*;
//! ```

pub use crate::{
    EngineConfig, EngineError, EntityRef, EntityTypeSchema, FnTransition, MemoryCache,
    MemoryStore, RecordId, Registry, RegistryBuilder, StateCache, StateRecord, StateStore,
    Tracker, Transition, TransitionContext, TransitionEngine,
};
