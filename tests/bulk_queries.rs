//! Bulk query batching discipline
//!
//! Verifies that the façade issues one batched store call per entity
//! type regardless of how many entities are requested, and that every
//! requested key gets an answer.

mod common;

use common::CountingStore;
use std::sync::Arc;
use traject::prelude::*;

const TYPES: [(&str, &str, &str); 3] = [
    ("order", "create", "CREATED"),
    ("task", "open", "OPEN"),
    ("shipment", "queue", "QUEUED"),
];

fn registry() -> Registry {
    let mut builder = RegistryBuilder::new();
    for (entity_type, transition, state) in TYPES {
        builder
            .register_entity_type(EntityTypeSchema::new(entity_type, [state], state))
            .unwrap();
        builder
            .register_transition(entity_type, FnTransition::to_state(transition, state))
            .unwrap();
    }
    builder.build()
}

fn tracker_with_store() -> (Tracker, Arc<CountingStore>) {
    let store = Arc::new(CountingStore::new());
    let engine = Arc::new(TransitionEngine::new(
        store.clone(),
        Arc::new(MemoryCache::new()),
        Arc::new(registry()),
    ));
    (Tracker::new(engine, store.clone()), store)
}

#[test]
fn one_store_call_per_entity_type() {
    let (tracker, store) = tracker_with_store();

    // 900 entities with history, spread over three types; every third id
    // per type is left untracked
    let mut request = Vec::new();
    for (entity_type, transition, _) in TYPES {
        for i in 0..300 {
            let id = format!("{entity_type}-{i}");
            if i % 3 != 0 {
                tracker
                    .execute_transition(entity_type, &id, transition, serde_json::Value::Null, None)
                    .unwrap();
            }
            request.push((entity_type.to_string(), id));
        }
    }

    let latest_before = store.latest_count();
    let states = tracker.bulk_current_states(&request).unwrap();

    assert_eq!(store.batch_count(), TYPES.len(), "one batch per type");
    assert_eq!(
        store.latest_count(),
        latest_before,
        "bulk reads must never degrade to per-entity lookups"
    );

    // Every requested key is answered, misses as explicit None
    assert_eq!(states.len(), request.len());
    for (entity_type, id) in &request {
        let entry = &states[&EntityRef::new(entity_type, id)];
        let index: usize = id.rsplit('-').next().unwrap().parse().unwrap();
        if index % 3 == 0 {
            assert_eq!(entry, &None, "untracked {entity_type}/{id}");
        } else {
            assert!(entry.is_some(), "tracked {entity_type}/{id}");
        }
    }
}

#[test]
fn empty_request_issues_no_store_calls() {
    let (tracker, store) = tracker_with_store();
    let states = tracker.bulk_current_states(&[]).unwrap();
    assert!(states.is_empty());
    assert_eq!(store.batch_count(), 0);
}

#[test]
fn single_type_request_is_one_call() {
    let (tracker, store) = tracker_with_store();
    tracker
        .execute_transition("order", "o1", "create", serde_json::Value::Null, None)
        .unwrap();

    let request: Vec<_> = (0..50)
        .map(|i| ("order".to_string(), format!("o{i}")))
        .collect();
    let states = tracker.bulk_current_states(&request).unwrap();

    assert_eq!(store.batch_count(), 1);
    assert_eq!(states.len(), 50);
    assert_eq!(
        states[&EntityRef::new("order", "o1")].as_deref(),
        Some("CREATED")
    );
    assert_eq!(states[&EntityRef::new("order", "o2")], None);
}

#[test]
fn bulk_history_one_store_call_per_entity_type() {
    let (tracker, store) = tracker_with_store();
    for i in 0..100 {
        tracker
            .execute_transition("order", &format!("o{i}"), "create", serde_json::Value::Null, None)
            .unwrap();
    }
    tracker
        .execute_transition("task", "t1", "open", serde_json::Value::Null, None)
        .unwrap();

    let mut request: Vec<_> = (0..100)
        .map(|i| ("order".to_string(), format!("o{i}")))
        .collect();
    request.push(("task".to_string(), "t1".to_string()));

    let histories = tracker.bulk_history(&request, None).unwrap();
    assert_eq!(histories.len(), 101);
    assert_eq!(
        store.history_batch_count(),
        2,
        "store calls are bounded by distinct entity types, not entities"
    );
    assert_eq!(
        store.history_count(),
        0,
        "bulk history must never degrade to per-entity lookups"
    );
}

#[test]
fn bulk_history_respects_limit_and_misses() {
    let (tracker, _) = tracker_with_store();
    tracker
        .execute_transition("order", "o1", "create", serde_json::Value::Null, None)
        .unwrap();
    tracker
        .execute_transition("task", "t1", "open", serde_json::Value::Null, None)
        .unwrap();

    let request = vec![
        ("order".to_string(), "o1".to_string()),
        ("order".to_string(), "missing".to_string()),
        ("task".to_string(), "t1".to_string()),
    ];
    let histories = tracker.bulk_history(&request, Some(10)).unwrap();

    assert_eq!(histories.len(), 3);
    assert_eq!(histories[&EntityRef::new("order", "o1")].len(), 1);
    assert!(histories[&EntityRef::new("order", "missing")].is_empty());
    assert_eq!(histories[&EntityRef::new("task", "t1")][0].state, "OPEN");
}
