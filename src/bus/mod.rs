//! Broker abstraction for event propagation.
//!
//! This module contains:
//! - `EventBus` trait: publish serialized events, run the consumer loop
//! - `MessageHandler` trait: per-message processing on the consumer side
//! - `Delivery`: a message as handed over by the broker
//! - Bus configuration types and the `init_event_bus` factory
//! - Implementations: Kafka, in-process channel, mock, redelivery wrapper
//!
//! Delivery is at-least-once. Buses never attach a partition key, so no
//! ordering holds between different events. Handlers cannot reject a
//! message: once a handler returns, the bus acknowledges the message.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::info;

use crate::consumer::ConsumerState;

// Implementation modules
pub mod channel;
mod dispatch;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod mock;
#[cfg(any(test, feature = "redelivery"))]
pub mod redelivery;

// Re-exports
pub use channel::ChannelEventBus;
#[cfg(feature = "kafka")]
pub use kafka::{KafkaEventBus, KafkaEventBusConfig};
pub use mock::MockEventBus;
#[cfg(any(test, feature = "redelivery"))]
pub use redelivery::{RedeliveryConfig, RedeliveryEventBus};

// ============================================================================
// Traits
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Publish timed out: {0}")]
    Timeout(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Subscribe not supported for this bus type")]
    SubscribeNotSupported,

    #[error("{0} support requires the '{1}' feature")]
    FeatureDisabled(&'static str, &'static str),
}

/// A message as delivered by the broker.
///
/// Topic, partition and offset are carried for diagnostics only; nothing
/// downstream interprets them.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub payload: Bytes,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl Delivery {
    pub fn new(
        payload: impl Into<Bytes>,
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
    ) -> Self {
        Self {
            payload: payload.into(),
            topic: topic.into(),
            partition,
            offset,
        }
    }
}

/// Handler for messages pulled from the bus.
///
/// Infallible by signature: every outcome, including a malformed payload,
/// is handled inside the handler and the message is then acknowledged.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, delivery: Delivery) -> BoxFuture<'static, ()>;
}

/// Interface to the broker.
///
/// Implementations:
/// - `KafkaEventBus`: Apache Kafka via rdkafka
/// - `ChannelEventBus`: in-process broadcast channel
/// - `MockEventBus`: records publishes for testing
/// - `RedeliveryEventBus`: duplicates publishes of a wrapped bus
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Hand one serialized event to the broker.
    ///
    /// Resolves once the broker acknowledges or refuses the message. Never
    /// retries.
    async fn publish(&self, payload: Bytes) -> Result<()>;

    /// Register a handler for delivered messages.
    async fn subscribe(&self, handler: Arc<dyn MessageHandler>) -> Result<()>;

    /// Connect, subscribe and spawn the consumer loop.
    ///
    /// Fails if the broker cannot be reached or the subscription is
    /// rejected; the consumer is then left `Disconnected`.
    async fn start_consuming(&self) -> Result<()> {
        Err(BusError::SubscribeNotSupported)
    }

    /// Stop fetching, let the in-flight message finish, release the consumer.
    async fn shutdown(&self) {}

    /// Current consumer state.
    fn state(&self) -> ConsumerState;

    /// Observe consumer state transitions.
    fn watch_state(&self) -> watch::Receiver<ConsumerState>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Messaging type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagingType {
    /// In-process broadcast channel (single process, no broker).
    #[default]
    Channel,
    /// Apache Kafka.
    Kafka,
}

/// Messaging configuration (discriminated union).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Messaging type discriminator.
    #[serde(rename = "type")]
    pub messaging_type: MessagingType,
    /// Upper bound on a single publish, in milliseconds.
    pub publish_timeout_ms: u64,
    /// Kafka-specific configuration.
    pub kafka: KafkaConfig,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            messaging_type: MessagingType::Channel,
            publish_timeout_ms: 5000,
            kafka: KafkaConfig::default(),
        }
    }
}

impl MessagingConfig {
    pub fn publish_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.publish_timeout_ms)
    }
}

/// Kafka-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Topic carrying activity events.
    pub topic: String,
    /// Consumer group ID.
    pub group_id: String,
    /// Client ID reported to the broker.
    pub client_id: String,
    /// Start from the earliest offset when the group has no committed offset.
    pub from_beginning: bool,
    /// How long startup waits for broker metadata, in milliseconds.
    pub startup_timeout_ms: u64,
    /// SASL username (optional, for authenticated clusters).
    pub sasl_username: Option<String>,
    /// SASL password (optional, for authenticated clusters).
    pub sasl_password: Option<String>,
    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512).
    pub sasl_mechanism: Option<String>,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL).
    pub security_protocol: Option<String>,
    /// SSL CA certificate path (for SSL connections).
    pub ssl_ca_location: Option<String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            topic: "user-activity-events".to_string(),
            group_id: "user-activity-consumer-group".to_string(),
            client_id: "event-driven-microservice".to_string(),
            from_beginning: true,
            startup_timeout_ms: 10_000,
            sasl_username: None,
            sasl_password: None,
            sasl_mechanism: None,
            security_protocol: None,
            ssl_ca_location: None,
        }
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Initialize the event bus selected by configuration.
///
/// The returned bus both publishes and consumes. Kafka requires the `kafka`
/// feature.
pub async fn init_event_bus(config: &MessagingConfig) -> Result<Arc<dyn EventBus>> {
    match config.messaging_type {
        MessagingType::Channel => {
            let bus = ChannelEventBus::new();
            info!(messaging_type = "channel", "Event bus initialized");
            Ok(Arc::new(bus))
        }
        MessagingType::Kafka => {
            #[cfg(feature = "kafka")]
            {
                let kafka_config = KafkaEventBusConfig::from_config(&config.kafka)
                    .with_send_timeout(config.publish_timeout());
                let bus = KafkaEventBus::new(kafka_config).await?;
                info!(messaging_type = "kafka", "Event bus initialized");
                Ok(Arc::new(bus))
            }

            #[cfg(not(feature = "kafka"))]
            {
                Err(BusError::FeatureDisabled("Kafka", "kafka"))
            }
        }
    }
}
