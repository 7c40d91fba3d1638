//! Shared test instrumentation

// Each test binary uses its own subset of the counters
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use traject::{
    AppendCondition, EntityRef, HistoryQuery, MemoryStore, StateRecord, StateStore, StoreError,
};

/// Store wrapper counting calls per operation
///
/// Lets tests assert that reads were served from the cache (no `latest`
/// round-trip) and that bulk queries stay bounded by the number of
/// entity-type groups.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: MemoryStore,
    pub appends: AtomicUsize,
    pub latest_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    pub history_batch_calls: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest_count(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst)
    }

    pub fn batch_count(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn history_count(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub fn history_batch_count(&self) -> usize {
        self.history_batch_calls.load(Ordering::SeqCst)
    }

    pub fn record_count(&self) -> usize {
        self.inner.record_count()
    }

    pub fn entity_record_count(&self, entity: &EntityRef) -> usize {
        self.inner.entity_record_count(entity)
    }
}

impl StateStore for CountingStore {
    fn append(&self, record: StateRecord, condition: AppendCondition) -> Result<(), StoreError> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        self.inner.append(record, condition)
    }

    fn latest(&self, entity: &EntityRef) -> Result<Option<StateRecord>, StoreError> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.latest(entity)
    }

    fn history(
        &self,
        entity: &EntityRef,
        query: &HistoryQuery,
    ) -> Result<Vec<StateRecord>, StoreError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.history(entity, query)
    }

    fn latest_batch(
        &self,
        entity_type: &str,
        entity_ids: &[String],
    ) -> Result<Vec<Option<StateRecord>>, StoreError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.latest_batch(entity_type, entity_ids)
    }

    fn history_batch(
        &self,
        entity_type: &str,
        entity_ids: &[String],
        query: &HistoryQuery,
    ) -> Result<Vec<Vec<StateRecord>>, StoreError> {
        self.history_batch_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.history_batch(entity_type, entity_ids, query)
    }
}
