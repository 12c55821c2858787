//! Hands newly minted events to the broker.
//!
//! One attempt per event, bounded by a timeout. Retry policy, if any,
//! belongs to the caller.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{error, info};

use crate::bus::{BusError, EventBus};
use crate::event::{ActivityEvent, EventError};

/// Errors surfaced to the caller of `EventPublisher::publish`.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to encode event: {0}")]
    Serialization(#[from] EventError),

    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("Broker rejected event: {0}")]
    Transport(#[from] BusError),
}

pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
    timeout: Duration,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn EventBus>, timeout: Duration) -> Self {
        Self { bus, timeout }
    }

    /// Serialize the event and submit it to the broker once.
    pub async fn publish(&self, event: &ActivityEvent) -> Result<(), PublishError> {
        let payload = Bytes::from(event.to_wire()?);

        let result = match tokio::time::timeout(self.timeout, self.bus.publish(payload)).await {
            Ok(sent) => sent.map_err(PublishError::from),
            Err(_) => Err(PublishError::Timeout(self.timeout)),
        };

        match &result {
            Ok(()) => info!(event_id = %event.event_id(), "Sent event"),
            Err(e) => error!(event_id = %event.event_id(), error = %e, "Failed to publish event"),
        }
        result
    }
}
