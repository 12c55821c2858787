//! Consumer side of the pipeline.
//!
//! `EventConsumer` is the per-message handler the bus calls for every
//! delivered message:
//! 1. decode the payload into an `ActivityEvent`
//! 2. route it through `IdempotentStore::try_accept`
//! 3. record the outcome
//!
//! A malformed payload is reported to the dead-letter sink and skipped.
//! Neither a malformed payload nor a duplicate is an error; the handler
//! always completes and the bus always acknowledges.

mod state;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{info, warn};

use crate::bus::{Delivery, MessageHandler};
use crate::dlq::{DeadLetter, DeadLetterPublisher};
use crate::event::ActivityEvent;
use crate::store::IdempotentStore;

pub use state::{ConsumerState, StateTracker};

/// What happened to one delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// First delivery of this event id; now visible in the store.
    Processed,
    /// Event id already accepted; store unchanged.
    Duplicate,
    /// Payload could not be decoded; reported and dropped.
    Skipped,
}

/// Running totals of consumer outcomes.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    processed: AtomicU64,
    duplicates: AtomicU64,
    skipped: AtomicU64,
}

/// Point-in-time copy of `ConsumerStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub duplicates: u64,
    pub skipped: u64,
}

impl ConsumerStats {
    fn record(&self, outcome: ConsumeOutcome) {
        let counter = match outcome {
            ConsumeOutcome::Processed => &self.processed,
            ConsumeOutcome::Duplicate => &self.duplicates,
            ConsumeOutcome::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Routes delivered messages into the idempotent store.
///
/// Cheap to clone; clones share the store, sink and counters.
#[derive(Clone)]
pub struct EventConsumer {
    store: Arc<IdempotentStore>,
    dead_letters: Arc<dyn DeadLetterPublisher>,
    stats: Arc<ConsumerStats>,
}

impl EventConsumer {
    pub fn new(store: Arc<IdempotentStore>, dead_letters: Arc<dyn DeadLetterPublisher>) -> Self {
        Self {
            store,
            dead_letters,
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    /// Process one delivered message.
    pub async fn process(&self, delivery: &Delivery) -> ConsumeOutcome {
        let outcome = match ActivityEvent::from_wire(&delivery.payload) {
            Ok(event) => self.accept(event).await,
            Err(e) => {
                warn!(
                    topic = %delivery.topic,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    error = %e,
                    "Skipping malformed message"
                );

                let dead_letter = DeadLetter::from_delivery(delivery, e.to_string());
                if let Err(dlq_err) = self.dead_letters.publish(dead_letter).await {
                    warn!(error = %dlq_err, "Failed to report malformed message");
                }
                ConsumeOutcome::Skipped
            }
        };

        self.stats.record(outcome);
        outcome
    }

    async fn accept(&self, event: ActivityEvent) -> ConsumeOutcome {
        let event_id = event.event_id().to_string();
        let event_type = event.event_type().to_string();
        let user_id = event.user_id().to_string();

        if self.store.try_accept(event).await {
            info!(
                event_id = %event_id,
                event_type = %event_type,
                user_id = %user_id,
                "Processed"
            );
            ConsumeOutcome::Processed
        } else {
            info!(event_id = %event_id, "Duplicate skipped");
            ConsumeOutcome::Duplicate
        }
    }
}

impl MessageHandler for EventConsumer {
    fn handle(&self, delivery: Delivery) -> BoxFuture<'static, ()> {
        let consumer = self.clone();
        Box::pin(async move {
            consumer.process(&delivery).await;
        })
    }
}
