//! activity-pipeline: user-activity ingestion service
//!
//! Accepts activity events over HTTP, publishes them to the broker and
//! consumes them back into the idempotent store.
//!
//! ## Architecture
//! ```text
//! [HTTP :3000] -> [EventPublisher] -> [Event Bus] -> [EventConsumer]
//!      ^                                                   |
//!      |                                                   v
//!      +---------------- GET /events/processed ---- [IdempotentStore]
//! ```
//!
//! ## Configuration
//! - `--config <path>` or ACTIVITY_CONFIG: YAML config file
//! - ACTIVITY__*: nested overrides, e.g. ACTIVITY__MESSAGING__TYPE=kafka
//! - KAFKA_BROKER, KAFKA_TOPIC, KAFKA_GROUP_ID, PORT: legacy overrides
//! - ACTIVITY_LOG / ACTIVITY_LOG_FORMAT: log filter and format

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use activity_pipeline::bus::init_event_bus;
use activity_pipeline::config::Config;
use activity_pipeline::consumer::{ConsumerState, EventConsumer};
use activity_pipeline::dlq::create_publisher;
use activity_pipeline::handlers::http::{serve, AppState};
use activity_pipeline::ids::UuidGenerator;
use activity_pipeline::publisher::EventPublisher;
use activity_pipeline::store::IdempotentStore;
use activity_pipeline::utils::bootstrap::{init_tracing, parse_config_path, shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    let addr = config.server.bind_addr()?;

    info!(messaging_type = ?config.messaging.messaging_type, "Connecting to event bus");
    let bus = init_event_bus(&config.messaging).await?;

    let store = Arc::new(IdempotentStore::new());
    let (dead_letters, dead_letter_rx) = create_publisher(&config.dlq);
    if let Some(mut receiver) = dead_letter_rx {
        tokio::spawn(async move {
            while let Some(dead_letter) = receiver.recv().await {
                warn!(
                    topic = %dead_letter.topic,
                    partition = dead_letter.partition,
                    offset = dead_letter.offset,
                    reason = %dead_letter.reason,
                    bytes = dead_letter.payload.len(),
                    "Dead letter"
                );
            }
        });
    }

    let consumer = EventConsumer::new(Arc::clone(&store), dead_letters);
    let stats = consumer.stats();
    bus.subscribe(Arc::new(consumer)).await?;

    // HTTP never starts without a healthy consumer.
    bus.start_consuming().await.map_err(|e| {
        error!(error = %e, "Consumer failed to start");
        e
    })?;

    let state = AppState {
        publisher: Arc::new(EventPublisher::new(
            Arc::clone(&bus),
            config.messaging.publish_timeout(),
        )),
        store,
        ids: Arc::new(UuidGenerator),
        bus: Arc::clone(&bus),
        stats,
    };

    let consumer_failed = Arc::new(AtomicBool::new(false));
    let shutdown = {
        let consumer_failed = Arc::clone(&consumer_failed);
        let mut consumer_state = bus.watch_state();
        async move {
            let failed = async move {
                consumer_state
                    .wait_for(|s| *s == ConsumerState::Failed)
                    .await
                    .is_ok()
            };
            tokio::select! {
                () = shutdown_signal() => {}
                true = failed => {
                    error!("Consumer failed, shutting down");
                    consumer_failed.store(true, Ordering::SeqCst);
                }
            }
        }
    };

    info!("Service running, press Ctrl+C to exit");
    serve(state, addr, shutdown).await?;

    bus.shutdown().await;
    info!("Service stopped");

    if consumer_failed.load(Ordering::SeqCst) {
        return Err("consumer stopped after an unrecoverable broker failure".into());
    }
    Ok(())
}
