//! Write-through current-state cache
//!
//! The cache is a latency optimization, never a source of truth: every
//! entry is reconcilable from the store, and a backend failure is treated
//! as a miss by callers. Correctness is protected by two rules:
//!
//! 1. **Write-through after commit**: entries are written only after the
//!    store acknowledged the append, so a hit never reflects an
//!    unpersisted state.
//! 2. **Compare-and-set**: [`StateCache::set_if_newer`] refuses to
//!    overwrite an entry whose record id is greater, so a slow writer
//!    cannot clobber the entry a faster, later writer installed.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;

pub use memory::MemoryCache;

use std::time::Duration;
use traject_core::{CacheError, EntityRef, RecordId};

/// Cached current state of one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedState {
    /// The entity's current state value
    pub state: String,
    /// Id of the record that produced this state
    pub record_id: RecordId,
}

/// Key/value cache of current state per entity
///
/// Implementations must be safe for unsynchronized concurrent use.
pub trait StateCache: Send + Sync {
    /// Look up the cached state, `None` on miss or expiry
    fn get(&self, entity: &EntityRef) -> Result<Option<CachedState>, CacheError>;

    /// Install `state` unless a newer record id is already cached
    ///
    /// The guard is atomic: concurrent `set_if_newer` calls leave the
    /// entry with the greatest record id regardless of arrival order.
    fn set_if_newer(
        &self,
        entity: &EntityRef,
        state: &str,
        id: RecordId,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Drop the entry for this entity, if present
    fn invalidate(&self, entity: &EntityRef) -> Result<(), CacheError>;
}
