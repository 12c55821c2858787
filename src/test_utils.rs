//! Test utilities and mock handlers.
//!
//! Helpers shared by unit tests across modules.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use serde_json::json;
use tokio::sync::Mutex;

use crate::bus::{Delivery, MessageHandler};
use crate::event::{ActivityEvent, Payload};

/// Handler that counts deliveries.
#[derive(Default)]
pub struct CountingHandler {
    count: Arc<AtomicUsize>,
}

impl CountingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.count)
    }
}

impl MessageHandler for CountingHandler {
    fn handle(&self, _delivery: Delivery) -> BoxFuture<'static, ()> {
        let count = Arc::clone(&self.count);
        Box::pin(async move {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// Handler that keeps every delivery it sees.
#[derive(Default)]
pub struct RecordingHandler {
    deliveries: Arc<Mutex<Vec<Delivery>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Arc<Mutex<Vec<Delivery>>> {
        Arc::clone(&self.deliveries)
    }
}

impl MessageHandler for RecordingHandler {
    fn handle(&self, delivery: Delivery) -> BoxFuture<'static, ()> {
        let deliveries = Arc::clone(&self.deliveries);
        Box::pin(async move {
            deliveries.lock().await.push(delivery);
        })
    }
}

/// A LOGIN event from the given user with a small payload.
pub fn make_event(event_id: &str, user_id: &str) -> ActivityEvent {
    let mut payload = Payload::new();
    payload.insert("device".to_string(), json!("mobile"));
    ActivityEvent::new(event_id, user_id, "LOGIN", payload)
}

/// Wire bytes of an event.
pub fn wire(event: &ActivityEvent) -> Bytes {
    Bytes::from(event.to_wire().expect("event serializes"))
}

/// A delivery carrying the given payload at a fixed position.
pub fn delivery(payload: impl Into<Bytes>) -> Delivery {
    Delivery::new(payload, "user-activity-events", 0, 0)
}
