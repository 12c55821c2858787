//! Idempotent in-memory store of processed events.
//!
//! Gives exactly-once visibility of events delivered at-least-once.
//! Lifetime is the process lifetime; nothing is persisted.
//!
//! Holds two structures behind one lock:
//! - `events`: accepted events in first-seen order (enumeration)
//! - `seen`: accepted event ids (O(1) membership)
//!
//! An id is in `seen` iff exactly one event with that id is in `events`.
//! Both are only ever mutated together under the same write guard.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::event::ActivityEvent;

#[derive(Default)]
struct Inner {
    events: Vec<Arc<ActivityEvent>>,
    seen: HashSet<String>,
}

/// Process-wide store with an atomic check-and-insert.
///
/// Shared by handle (`Arc<IdempotentStore>`) between the consumer, which
/// writes, and the query endpoint, which reads.
#[derive(Default)]
pub struct IdempotentStore {
    inner: RwLock<Inner>,
}

impl IdempotentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept an event unless its id has been seen before.
    ///
    /// Returns `true` if the event was newly accepted, `false` for a
    /// duplicate. A duplicate leaves state untouched even if its other fields
    /// differ: first-seen wins. Concurrent calls with the same id yield
    /// exactly one `true`.
    pub async fn try_accept(&self, event: ActivityEvent) -> bool {
        let mut inner = self.inner.write().await;
        if inner.seen.contains(event.event_id()) {
            return false;
        }
        inner.seen.insert(event.event_id().to_string());
        inner.events.push(Arc::new(event));
        true
    }

    /// Snapshot of accepted events in first-seen order.
    ///
    /// The returned vector is owned by the caller and its elements are
    /// immutable, so nothing done with it can reach back into the store.
    pub async fn list(&self) -> Vec<Arc<ActivityEvent>> {
        self.inner.read().await.events.clone()
    }

    pub async fn contains(&self, event_id: &str) -> bool {
        self.inner.read().await.seen.contains(event_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.events.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Clear all accepted events and ids in one step.
    #[cfg(any(test, feature = "test-utils"))]
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.events.clear();
        inner.seen.clear();
    }
}

#[cfg(test)]
mod tests;
