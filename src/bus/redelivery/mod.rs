//! Redelivering event bus wrapper for testing duplicate delivery.
//!
//! Wraps any `EventBus` implementation and publishes some messages a
//! second time, based on a configurable probability. Reproduces the
//! duplicates an at-least-once broker produces after producer retries or
//! consumer rebalances.
//!
//! # Example
//!
//! ```ignore
//! use activity_pipeline::bus::{ChannelEventBus, RedeliveryConfig, RedeliveryEventBus};
//!
//! // Every message is delivered twice
//! let bus = RedeliveryEventBus::new(ChannelEventBus::new(), RedeliveryConfig::always());
//!
//! // Or 10% of messages are delivered twice
//! let bus = RedeliveryEventBus::new(ChannelEventBus::new(), RedeliveryConfig::with_rate(0.1));
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{EventBus, MessageHandler, Result};
use crate::consumer::ConsumerState;

/// Configuration for redelivery behavior.
#[derive(Clone, Debug)]
pub struct RedeliveryConfig {
    /// Probability of publishing a message a second time (0.0 to 1.0).
    pub duplicate_rate: f64,
    /// Whether to log duplicated messages.
    pub log_duplicates: bool,
}

impl Default for RedeliveryConfig {
    fn default() -> Self {
        Self::none()
    }
}

impl RedeliveryConfig {
    /// Never duplicate (pass-through).
    pub fn none() -> Self {
        Self {
            duplicate_rate: 0.0,
            log_duplicates: false,
        }
    }

    /// Duplicate with the given probability, clamped to 0.0..=1.0.
    pub fn with_rate(rate: f64) -> Self {
        Self {
            duplicate_rate: rate.clamp(0.0, 1.0),
            log_duplicates: true,
        }
    }

    /// Duplicate every message.
    pub fn always() -> Self {
        Self::with_rate(1.0)
    }

    pub fn is_active(&self) -> bool {
        self.duplicate_rate > 0.0
    }
}

/// Statistics for the redelivery bus.
#[derive(Debug, Default)]
pub struct RedeliveryStats {
    /// Publishes requested by callers.
    pub total: AtomicU64,
    /// Publishes that were sent a second time.
    pub duplicated: AtomicU64,
}

impl RedeliveryStats {
    /// Snapshot as `(total, duplicated)`.
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.total.load(Ordering::Relaxed),
            self.duplicated.load(Ordering::Relaxed),
        )
    }
}

/// Wrapper that publishes some messages twice.
pub struct RedeliveryEventBus<B: EventBus> {
    inner: B,
    config: RedeliveryConfig,
    stats: Arc<RedeliveryStats>,
}

impl<B: EventBus> RedeliveryEventBus<B> {
    pub fn new(inner: B, config: RedeliveryConfig) -> Self {
        if config.is_active() {
            warn!(
                duplicate_rate = config.duplicate_rate,
                "Redelivery event bus enabled - messages may be delivered twice"
            );
        }

        Self {
            inner,
            config,
            stats: Arc::new(RedeliveryStats::default()),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn stats(&self) -> &RedeliveryStats {
        &self.stats
    }

    fn should_duplicate(&self) -> bool {
        if self.config.duplicate_rate <= 0.0 {
            return false;
        }
        if self.config.duplicate_rate >= 1.0 {
            return true;
        }
        rand::rng().random::<f64>() < self.config.duplicate_rate
    }
}

#[async_trait]
impl<B: EventBus> EventBus for RedeliveryEventBus<B> {
    async fn publish(&self, payload: Bytes) -> Result<()> {
        self.stats.total.fetch_add(1, Ordering::Relaxed);

        self.inner.publish(payload.clone()).await?;

        if self.should_duplicate() {
            self.stats.duplicated.fetch_add(1, Ordering::Relaxed);
            if self.config.log_duplicates {
                debug!(bytes = payload.len(), "Redelivering message");
            }
            self.inner.publish(payload).await?;
        }

        Ok(())
    }

    async fn subscribe(&self, handler: Arc<dyn MessageHandler>) -> Result<()> {
        self.inner.subscribe(handler).await
    }

    async fn start_consuming(&self) -> Result<()> {
        self.inner.start_consuming().await
    }

    async fn shutdown(&self) {
        self.inner.shutdown().await
    }

    fn state(&self) -> ConsumerState {
        self.inner.state()
    }

    fn watch_state(&self) -> watch::Receiver<ConsumerState> {
        self.inner.watch_state()
    }
}
