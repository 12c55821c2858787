use super::*;
use crate::event::Payload;
use serde_json::json;

fn make_event(id: &str, user: &str) -> ActivityEvent {
    ActivityEvent::new(id, user, "LOGIN", Payload::new())
}

#[tokio::test]
async fn test_try_accept_then_duplicate() {
    let store = IdempotentStore::new();
    let event = make_event("1", "u1");

    assert!(store.try_accept(event.clone()).await);
    assert!(!store.try_accept(event).await);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_empty_store_lists_nothing() {
    let store = IdempotentStore::new();
    assert!(store.is_empty().await);
    assert!(store.list().await.is_empty());
}

#[tokio::test]
async fn test_first_seen_wins_on_conflicting_duplicate() {
    let store = IdempotentStore::new();
    let mut payload = Payload::new();
    payload.insert("device".to_string(), json!("desktop"));

    assert!(store.try_accept(make_event("1", "u1")).await);
    assert!(
        !store
            .try_accept(ActivityEvent::new("1", "u2", "LOGOUT", payload))
            .await
    );

    let events = store.list().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].user_id(), "u1");
    assert_eq!(events[0].event_type(), "LOGIN");
}

#[tokio::test]
async fn test_list_preserves_insertion_order() {
    let store = IdempotentStore::new();
    for id in ["c", "a", "b", "a", "d"] {
        store.try_accept(make_event(id, "u1")).await;
    }

    let ids: Vec<String> = store
        .list()
        .await
        .iter()
        .map(|e| e.event_id().to_string())
        .collect();
    assert_eq!(ids, vec!["c", "a", "b", "d"]);
}

#[tokio::test]
async fn test_list_is_detached_snapshot() {
    let store = IdempotentStore::new();
    store.try_accept(make_event("1", "u1")).await;

    let mut snapshot = store.list().await;
    snapshot.clear();
    snapshot.push(Arc::new(make_event("intruder", "u9")));

    let events = store.list().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id(), "1");
    assert!(!store.contains("intruder").await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_accept_exactly_once() {
    let store = Arc::new(IdempotentStore::new());
    let event = make_event("shared", "u1");

    let tasks: Vec<_> = (0..64)
        .map(|_| {
            let store = Arc::clone(&store);
            let event = event.clone();
            tokio::spawn(async move { store.try_accept(event).await })
        })
        .collect();

    let mut accepted = 0;
    for task in tasks {
        if task.await.unwrap() {
            accepted += 1;
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(store.len().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_ids_lose_nothing() {
    let store = Arc::new(IdempotentStore::new());

    let tasks: Vec<_> = (0..200)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.try_accept(make_event(&i.to_string(), "u1")).await })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap());
    }

    assert_eq!(store.len().await, 200);
    for i in 0..200 {
        assert!(store.contains(&i.to_string()).await);
    }
}

#[tokio::test]
async fn test_reset_clears_and_readmits() {
    let store = IdempotentStore::new();
    store.try_accept(make_event("1", "u1")).await;
    store.try_accept(make_event("2", "u1")).await;

    store.reset().await;

    assert!(store.list().await.is_empty());
    assert!(!store.contains("1").await);
    assert!(store.try_accept(make_event("1", "u1")).await);
}
