//! In-memory TTL cache
//!
//! DashMap-backed implementation of [`StateCache`]. Expiry is lazy: an
//! expired entry is dropped by the `get` that observes it. The
//! compare-and-set in `set_if_newer` runs under the entry guard, so the
//! id comparison and the overwrite are atomic.

use crate::{CachedState, StateCache};
use dashmap::DashMap;
use std::time::{Duration, Instant};
use traject_core::{CacheError, EntityRef, RecordId};

#[derive(Debug, Clone)]
struct Entry {
    state: String,
    record_id: RecordId,
    expires_at: Instant,
}

/// In-memory [`StateCache`] with per-entry TTL
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<EntityRef, Entry>,
}

impl MemoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (possibly expired, not yet collected) entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StateCache for MemoryCache {
    fn get(&self, entity: &EntityRef) -> Result<Option<CachedState>, CacheError> {
        let expired = match self.entries.get(entity) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(CachedState {
                    state: entry.state.clone(),
                    record_id: entry.record_id,
                }));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            // Re-check under the removal to avoid dropping a fresh entry
            // installed between the read above and now
            self.entries
                .remove_if(entity, |_, entry| entry.expires_at <= Instant::now());
        }
        Ok(None)
    }

    fn set_if_newer(
        &self,
        entity: &EntityRef,
        state: &str,
        id: RecordId,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut slot = self.entries.entry(entity.clone()).or_insert_with(|| Entry {
            state: state.to_string(),
            record_id: id,
            expires_at: Instant::now() + ttl,
        });
        // A greater cached id means a later writer already went through;
        // an expired entry loses its guard
        let stale = slot.record_id > id && slot.expires_at > Instant::now();
        if !stale {
            slot.state = state.to_string();
            slot.record_id = id;
            slot.expires_at = Instant::now() + ttl;
        }
        Ok(())
    }

    fn invalidate(&self, entity: &EntityRef) -> Result<(), CacheError> {
        self.entries.remove(entity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use traject_core::RecordIdGenerator;

    const TTL: Duration = Duration::from_secs(300);

    #[test]
    fn test_set_and_get() {
        let cache = MemoryCache::new();
        let gen = RecordIdGenerator::new();
        let entity = EntityRef::new("order", "1");

        cache.set_if_newer(&entity, "CREATED", gen.next(), TTL).unwrap();
        let hit = cache.get(&entity).unwrap().unwrap();
        assert_eq!(hit.state, "CREATED");
    }

    #[test]
    fn test_miss_for_unknown_entity() {
        let cache = MemoryCache::new();
        assert!(cache.get(&EntityRef::new("order", "none")).unwrap().is_none());
    }

    #[test]
    fn test_newer_id_overwrites() {
        let cache = MemoryCache::new();
        let gen = RecordIdGenerator::new();
        let entity = EntityRef::new("order", "1");

        let older = gen.next();
        let newer = gen.next();
        cache.set_if_newer(&entity, "CREATED", older, TTL).unwrap();
        cache.set_if_newer(&entity, "PROCESSING", newer, TTL).unwrap();

        let hit = cache.get(&entity).unwrap().unwrap();
        assert_eq!(hit.state, "PROCESSING");
        assert_eq!(hit.record_id, newer);
    }

    #[test]
    fn test_older_id_does_not_overwrite() {
        let cache = MemoryCache::new();
        let gen = RecordIdGenerator::new();
        let entity = EntityRef::new("order", "1");

        let older = gen.next();
        let newer = gen.next();
        // Fast writer lands first, slow writer arrives late with the
        // smaller id
        cache.set_if_newer(&entity, "PROCESSING", newer, TTL).unwrap();
        cache.set_if_newer(&entity, "CREATED", older, TTL).unwrap();

        let hit = cache.get(&entity).unwrap().unwrap();
        assert_eq!(hit.state, "PROCESSING");
        assert_eq!(hit.record_id, newer);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = MemoryCache::new();
        let gen = RecordIdGenerator::new();
        let entity = EntityRef::new("order", "1");

        cache
            .set_if_newer(&entity, "CREATED", gen.next(), Duration::ZERO)
            .unwrap();
        assert!(cache.get(&entity).unwrap().is_none());
        // The expired entry was collected by the miss above
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entry_loses_cas_guard() {
        let cache = MemoryCache::new();
        let gen = RecordIdGenerator::new();
        let entity = EntityRef::new("order", "1");

        let older = gen.next();
        let newer = gen.next();
        cache
            .set_if_newer(&entity, "PROCESSING", newer, Duration::ZERO)
            .unwrap();
        // Expired entries must not block re-population from the store,
        // even with a smaller id
        cache.set_if_newer(&entity, "CREATED", older, TTL).unwrap();
        assert_eq!(cache.get(&entity).unwrap().unwrap().state, "CREATED");
    }

    #[test]
    fn test_invalidate() {
        let cache = MemoryCache::new();
        let gen = RecordIdGenerator::new();
        let entity = EntityRef::new("order", "1");

        cache.set_if_newer(&entity, "CREATED", gen.next(), TTL).unwrap();
        cache.invalidate(&entity).unwrap();
        assert!(cache.get(&entity).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_set_keeps_greatest_id() {
        use std::sync::Arc;

        let cache = Arc::new(MemoryCache::new());
        let gen = RecordIdGenerator::new();
        let entity = EntityRef::new("order", "1");
        let ids: Vec<_> = (0..16).map(|_| gen.next()).collect();
        let greatest = *ids.iter().max().unwrap();

        let handles: Vec<_> = ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| {
                let cache = Arc::clone(&cache);
                let entity = entity.clone();
                std::thread::spawn(move || {
                    cache
                        .set_if_newer(&entity, &format!("S{i}"), id, TTL)
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(cache.get(&entity).unwrap().unwrap().record_id, greatest);
    }
}
