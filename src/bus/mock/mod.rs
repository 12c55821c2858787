//! Mock event bus implementation for testing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{watch, RwLock};

use super::{BusError, EventBus, MessageHandler, Result};
use crate::consumer::{ConsumerState, StateTracker};

/// Mock event bus for testing.
///
/// Records published payloads. Can be switched to fail or to stall each
/// publish for a fixed delay. Never consumes.
#[derive(Default)]
pub struct MockEventBus {
    published: RwLock<Vec<Bytes>>,
    fail_on_publish: RwLock<bool>,
    publish_delay: RwLock<Option<Duration>>,
    state: StateTracker,
}

impl MockEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn set_publish_delay(&self, delay: Option<Duration>) {
        *self.publish_delay.write().await = delay;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn take_published(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.published.write().await)
    }
}

#[async_trait]
impl EventBus for MockEventBus {
    async fn publish(&self, payload: Bytes) -> Result<()> {
        let delay = *self.publish_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_on_publish.read().await {
            return Err(BusError::Connection("Mock publish failure".to_string()));
        }
        self.published.write().await.push(payload);
        Ok(())
    }

    async fn subscribe(&self, _handler: Arc<dyn MessageHandler>) -> Result<()> {
        Err(BusError::SubscribeNotSupported)
    }

    fn state(&self) -> ConsumerState {
        self.state.get()
    }

    fn watch_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }
}
