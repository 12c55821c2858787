//! Activity Pipeline - idempotent user-activity event ingestion
//!
//! Events are submitted over HTTP, published to a broker and consumed back
//! into an in-memory store. The broker delivers at least once; the store
//! makes each event id visible exactly once.
//!
//! ```text
//! POST /events/generate -> EventPublisher -> [EventBus] -> EventConsumer
//!                                                             |
//! GET /events/processed <----------------------------- IdempotentStore
//! ```

pub mod bus;
pub mod config;
pub mod consumer;
pub mod dlq;
pub mod event;
pub mod handlers;
pub mod ids;
pub mod publisher;
pub mod store;
pub mod utils;

#[cfg(test)]
mod test_utils;

pub use event::ActivityEvent;
pub use store::IdempotentStore;
