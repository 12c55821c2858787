//! Kafka event bus implementation.
//!
//! One topic carries every activity event; one consumer group consumes it.
//! Records are produced without a key, so the broker picks the partition
//! and no ordering holds between events.
//!
//! Offsets are committed only after the handler returns, whatever its
//! outcome, which keeps the window between broker receipt and store insert
//! as narrow as the consumer allows. Uncommitted messages come back after a
//! rebalance or restart; the idempotent store absorbs the duplicates.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message as KafkaMessage;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::dispatch::{dispatch_to_handlers, Handlers};
use super::{BusError, Delivery, EventBus, KafkaConfig, MessageHandler, Result};
use crate::consumer::{ConsumerState, StateTracker};

/// Configuration for Kafka connection.
#[derive(Clone, Debug)]
pub struct KafkaEventBusConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Topic for activity events.
    pub topic: String,
    /// Consumer group ID (required for consuming).
    pub group_id: Option<String>,
    /// Client ID reported to the broker.
    pub client_id: String,
    /// Read from the earliest offset when the group has none committed.
    pub from_beginning: bool,
    /// Upper bound on a single produce call.
    pub send_timeout: Duration,
    /// Upper bound on the startup metadata check.
    pub startup_timeout: Duration,
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

impl KafkaEventBusConfig {
    /// Create config for publishing only.
    pub fn publisher(bootstrap_servers: impl Into<String>, topic: impl Into<String>) -> Self {
        let defaults = KafkaConfig::default();
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            topic: topic.into(),
            group_id: None,
            client_id: defaults.client_id,
            from_beginning: defaults.from_beginning,
            send_timeout: Duration::from_secs(5),
            startup_timeout: Duration::from_millis(defaults.startup_timeout_ms),
            sasl_username: None,
            sasl_password: None,
            sasl_mechanism: None,
            security_protocol: None,
            ssl_ca_location: None,
        }
    }

    /// Create config for publishing and consuming with a group.
    pub fn subscriber(
        bootstrap_servers: impl Into<String>,
        topic: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            group_id: Some(group_id.into()),
            ..Self::publisher(bootstrap_servers, topic)
        }
    }

    /// Build from application configuration.
    pub fn from_config(config: &KafkaConfig) -> Self {
        let mut cfg = Self::subscriber(&config.bootstrap_servers, &config.topic, &config.group_id)
            .with_client_id(&config.client_id)
            .with_from_beginning(config.from_beginning)
            .with_startup_timeout(Duration::from_millis(config.startup_timeout_ms));

        if let (Some(user), Some(pass), Some(mechanism)) = (
            &config.sasl_username,
            &config.sasl_password,
            &config.sasl_mechanism,
        ) {
            cfg = cfg.with_sasl(user, pass, mechanism);
        }

        if let Some(ref protocol) = config.security_protocol {
            cfg = cfg.with_security_protocol(protocol);
        }

        if let Some(ref ca) = config.ssl_ca_location {
            cfg = cfg.with_ssl_ca(ca);
        }

        cfg
    }

    /// Add SASL authentication.
    pub fn with_sasl(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        mechanism: impl Into<String>,
    ) -> Self {
        self.sasl_username = Some(username.into());
        self.sasl_password = Some(password.into());
        self.sasl_mechanism = Some(mechanism.into());
        self.security_protocol = Some("SASL_SSL".to_string());
        self
    }

    /// Set security protocol.
    pub fn with_security_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.security_protocol = Some(protocol.into());
        self
    }

    /// Set SSL CA certificate location.
    pub fn with_ssl_ca(mut self, ca_location: impl Into<String>) -> Self {
        self.ssl_ca_location = Some(ca_location.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_from_beginning(mut self, from_beginning: bool) -> Self {
        self.from_beginning = from_beginning;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Build a ClientConfig for producers.
    ///
    /// Broker-default durability; no idempotent producer, since
    /// deduplication is the consumer's job.
    fn build_producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("client.id", &self.client_id);
        config.set(
            "message.timeout.ms",
            self.send_timeout.as_millis().to_string(),
        );

        self.apply_security_config(&mut config);
        config
    }

    /// Build a ClientConfig for consumers.
    fn build_consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("client.id", &self.client_id);
        config.set("enable.auto.commit", "false");
        config.set(
            "auto.offset.reset",
            if self.from_beginning {
                "earliest"
            } else {
                "latest"
            },
        );

        if let Some(ref group_id) = self.group_id {
            config.set("group.id", group_id);
        }

        self.apply_security_config(&mut config);
        config
    }

    /// Apply security settings to a ClientConfig.
    fn apply_security_config(&self, config: &mut ClientConfig) {
        if let Some(ref protocol) = self.security_protocol {
            config.set("security.protocol", protocol);
        }

        if let Some(ref mechanism) = self.sasl_mechanism {
            config.set("sasl.mechanism", mechanism);
        }

        if let Some(ref username) = self.sasl_username {
            config.set("sasl.username", username);
        }

        if let Some(ref password) = self.sasl_password {
            config.set("sasl.password", password);
        }

        if let Some(ref ca_location) = self.ssl_ca_location {
            config.set("ssl.ca.location", ca_location);
        }
    }
}

/// Kafka event bus implementation.
///
/// Publishes to a single topic and consumes it with one consumer group.
/// librdkafka handles reconnects and rebalances; the consumer loop only
/// stops on a fatal client error.
pub struct KafkaEventBus {
    producer: FutureProducer,
    config: KafkaEventBusConfig,
    handlers: Handlers,
    consumer: Option<Arc<StreamConsumer>>,
    state: StateTracker,
    stop: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl KafkaEventBus {
    /// Create a new Kafka event bus.
    ///
    /// Client creation does not contact the broker; reachability is checked
    /// by `start_consuming`.
    pub async fn new(config: KafkaEventBusConfig) -> Result<Self> {
        let producer: FutureProducer = config
            .build_producer_config()
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka producer: {}", e)))?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            topic = %config.topic,
            "Kafka producer created"
        );

        // Create consumer if group_id is configured
        let consumer = if config.group_id.is_some() {
            let consumer: StreamConsumer =
                config.build_consumer_config().create().map_err(|e| {
                    BusError::Connection(format!("Failed to create Kafka consumer: {}", e))
                })?;
            Some(Arc::new(consumer))
        } else {
            None
        };

        let (stop, _) = watch::channel(false);

        Ok(Self {
            producer,
            config,
            handlers: Arc::new(RwLock::new(Vec::new())),
            consumer,
            state: StateTracker::new(),
            stop,
            task: Mutex::new(None),
        })
    }

    /// Fetch topic metadata to prove the broker is reachable.
    ///
    /// librdkafka's metadata call blocks, so it runs off the async runtime.
    async fn check_broker(&self, consumer: Arc<StreamConsumer>) -> Result<()> {
        let topic = self.config.topic.clone();
        let timeout = self.config.startup_timeout;

        let metadata = tokio::task::spawn_blocking(move || {
            consumer.fetch_metadata(Some(&topic), timeout).map(|md| {
                md.topics()
                    .iter()
                    .find(|t| t.name() == topic)
                    .and_then(|t| t.error())
                    .map(|code| format!("{:?}", RDKafkaErrorCode::from(code)))
            })
        })
        .await
        .map_err(|e| BusError::Connection(format!("Metadata task failed: {}", e)))?
        .map_err(|e| BusError::Connection(format!("Kafka broker unreachable: {}", e)))?;

        if let Some(topic_error) = metadata {
            // Topics may be auto-created on first produce; not fatal.
            warn!(topic = %self.config.topic, error = %topic_error, "Topic metadata reported an error");
        }

        Ok(())
    }
}

/// Errors after which librdkafka will not recover on its own.
fn is_fatal(error: &KafkaError) -> bool {
    matches!(error.rdkafka_error_code(), Some(RDKafkaErrorCode::Fatal))
}

fn map_send_error(error: KafkaError) -> BusError {
    match error.rdkafka_error_code() {
        Some(RDKafkaErrorCode::MessageTimedOut) => {
            BusError::Timeout(format!("Kafka did not acknowledge in time: {}", error))
        }
        _ => BusError::Publish(format!("Failed to publish: {}", error)),
    }
}

#[async_trait]
impl EventBus for KafkaEventBus {
    async fn publish(&self, payload: Bytes) -> Result<()> {
        let record = FutureRecord::<(), [u8]>::to(&self.config.topic).payload(&payload[..]);

        let (partition, offset) = self
            .producer
            .send(record, self.config.send_timeout)
            .await
            .map_err(|(e, _)| map_send_error(e))?;

        debug!(
            topic = %self.config.topic,
            partition,
            offset,
            "Published message to Kafka"
        );

        Ok(())
    }

    async fn subscribe(&self, handler: Arc<dyn MessageHandler>) -> Result<()> {
        if self.consumer.is_none() {
            return Err(BusError::Subscribe(
                "Cannot subscribe: no consumer configured. Use KafkaEventBusConfig::subscriber()"
                    .to_string(),
            ));
        }

        let mut handlers = self.handlers.write().await;
        handlers.push(handler);

        Ok(())
    }

    async fn start_consuming(&self) -> Result<()> {
        let consumer = self
            .consumer
            .as_ref()
            .ok_or_else(|| {
                BusError::Subscribe(
                    "No consumer configured. Use KafkaEventBusConfig::subscriber()".to_string(),
                )
            })?
            .clone();

        let mut task = self.task.lock().await;
        if task.is_some() {
            return Ok(());
        }

        self.check_broker(Arc::clone(&consumer)).await?;

        consumer
            .subscribe(&[self.config.topic.as_str()])
            .map_err(|e| BusError::Subscribe(format!("Failed to subscribe to topic: {}", e)))?;

        info!(topic = %self.config.topic, group_id = ?self.config.group_id, "Subscribed to Kafka topic");
        self.state.set(ConsumerState::Subscribed);

        let handlers = self.handlers.clone();
        let state = self.state.clone();
        let mut stop = self.stop.subscribe();

        self.state.set(ConsumerState::Running);

        // Spawn consumer task
        *task = Some(tokio::spawn(async move {
            let mut stream = consumer.stream();

            loop {
                let next = tokio::select! {
                    biased;
                    _ = stop.changed() => {
                        state.set(ConsumerState::Disconnected);
                        break;
                    }
                    next = stream.next() => next,
                };

                match next {
                    Some(Ok(message)) => {
                        let delivery = Delivery::new(
                            Bytes::copy_from_slice(message.payload().unwrap_or_default()),
                            message.topic(),
                            message.partition(),
                            message.offset(),
                        );

                        dispatch_to_handlers(&handlers, delivery).await;

                        // Commit after the handler, regardless of its outcome
                        if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                            error!(error = %e, "Failed to commit offset");
                        }
                    }
                    Some(Err(e)) if is_fatal(&e) => {
                        error!(error = %e, "Fatal Kafka consumer error, stopping");
                        state.set(ConsumerState::Failed);
                        break;
                    }
                    Some(Err(e)) => {
                        // Transient; librdkafka reconnects and rebalances on its own
                        warn!(error = %e, "Kafka consumer error");
                    }
                    None => {
                        error!("Kafka message stream ended");
                        state.set(ConsumerState::Failed);
                        break;
                    }
                }
            }

            drop(stream);
            // Flush pending async commits before leaving the group
            if let Err(e) = consumer.commit_consumer_state(CommitMode::Sync) {
                debug!(error = %e, "No offsets committed on shutdown");
            }
            consumer.unsubscribe();
        }));

        Ok(())
    }

    async fn shutdown(&self) {
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = self.stop.send(true);
            if let Err(e) = task.await {
                error!(error = %e, "Kafka consumer task failed");
            }
            info!("Kafka consumer stopped");
        }
    }

    fn state(&self) -> ConsumerState {
        self.state.get()
    }

    fn watch_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests;
