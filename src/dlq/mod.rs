//! Dead letter sink for messages the consumer could not decode.
//!
//! Skipping a poison message keeps the consumer loop moving; the sink is
//! where the skipped message is reported. The default sink only relies on
//! the consumer's warn log. `ChannelDeadLetterPublisher` hands dead letters
//! to an in-process receiver for inspection or forwarding.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::bus::Delivery;

/// Errors that can occur during DLQ operations.
#[derive(Debug, thiserror::Error)]
pub enum DlqError {
    #[error("Failed to publish to DLQ: {0}")]
    PublishFailed(String),
}

/// A skipped message and why it was skipped.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// Raw message body as delivered.
    pub payload: Bytes,
    /// Human-readable reason for rejection.
    pub reason: String,
    /// Source topic.
    pub topic: String,
    /// Source partition.
    pub partition: i32,
    /// Source offset.
    pub offset: i64,
    /// When the message was skipped.
    pub occurred_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn from_delivery(delivery: &Delivery, reason: impl Into<String>) -> Self {
        Self {
            payload: delivery.payload.clone(),
            reason: reason.into(),
            topic: delivery.topic.clone(),
            partition: delivery.partition,
            offset: delivery.offset,
            occurred_at: Utc::now(),
        }
    }
}

/// Destination for dead letters.
#[async_trait]
pub trait DeadLetterPublisher: Send + Sync {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError>;

    /// Whether dead letters go anywhere beyond the log.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Drops dead letters; the consumer's warn log is the only record.
pub struct NoopDeadLetterPublisher;

#[async_trait]
impl DeadLetterPublisher for NoopDeadLetterPublisher {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        debug!(
            topic = %dead_letter.topic,
            offset = dead_letter.offset,
            reason = %dead_letter.reason,
            "DLQ not configured, dead letter dropped"
        );
        Ok(())
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// Sends dead letters to an in-process receiver.
pub struct ChannelDeadLetterPublisher {
    sender: mpsc::UnboundedSender<DeadLetter>,
}

impl ChannelDeadLetterPublisher {
    /// Create a publisher and the receiver that collects its dead letters.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeadLetter>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl DeadLetterPublisher for ChannelDeadLetterPublisher {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        self.sender
            .send(dead_letter)
            .map_err(|e| DlqError::PublishFailed(format!("Receiver dropped: {}", e)))
    }
}

/// DLQ configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DlqConfig {
    /// Collect dead letters on an in-process channel.
    pub enabled: bool,
}

impl DlqConfig {
    pub fn is_configured(&self) -> bool {
        self.enabled
    }
}

/// Create the dead letter publisher selected by configuration.
///
/// Returns the receiver when dead letters are collected; the caller decides
/// where they go from there.
pub fn create_publisher(
    config: &DlqConfig,
) -> (
    Arc<dyn DeadLetterPublisher>,
    Option<mpsc::UnboundedReceiver<DeadLetter>>,
) {
    if config.is_configured() {
        let (publisher, receiver) = ChannelDeadLetterPublisher::new();
        info!("Dead letter channel enabled");
        (Arc::new(publisher), Some(receiver))
    } else {
        (Arc::new(NoopDeadLetterPublisher), None)
    }
}
