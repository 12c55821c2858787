//! In-memory channel-based event bus for standalone mode.
//!
//! Uses a tokio broadcast channel as the broker within a single process.
//! Ideal for local development and testing without an external broker.
//! Every publish gets the next offset on partition 0.
//!
//! `publish` waits while the slowest consumer is `CHANNEL_CAPACITY` messages
//! behind, so an accepted message is never overwritten before it is read.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{broadcast, watch, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::dispatch::{dispatch_to_handlers, Handlers};
use super::{Delivery, EventBus, MessageHandler, Result};
use crate::consumer::{ConsumerState, StateTracker};

/// Channel capacity for broadcast.
const CHANNEL_CAPACITY: usize = 1024;

/// Topic name reported on channel deliveries.
pub const CHANNEL_TOPIC: &str = "channel";

/// Broker state shared by every bus built over one channel.
struct Channel {
    sender: broadcast::Sender<Delivery>,
    next_offset: AtomicI64,
    /// Held across the capacity check and the send.
    publish_lock: Mutex<()>,
    /// Signalled whenever a consumer frees a slot.
    space: Notify,
}

/// In-memory event bus using a tokio broadcast channel.
///
/// The same instance publishes and consumes. Buses created with
/// `with_shared_channel` let several consumers observe one stream.
pub struct ChannelEventBus {
    channel: Arc<Channel>,
    handlers: Handlers,
    state: StateTracker,
    stop: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for ChannelEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelEventBus {
    /// Create a new channel event bus.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        info!(capacity = CHANNEL_CAPACITY, "Channel event bus initialized");
        Self::from_channel(Arc::new(Channel {
            sender,
            next_offset: AtomicI64::new(0),
            publish_lock: Mutex::new(()),
            space: Notify::new(),
        }))
    }

    fn from_channel(channel: Arc<Channel>) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            channel,
            handlers: Arc::new(RwLock::new(Vec::new())),
            state: StateTracker::new(),
            stop,
            task: Mutex::new(None),
        }
    }

    /// Create a new bus that shares this bus's channel but has its own
    /// handlers and consumer loop.
    pub fn with_shared_channel(&self) -> Self {
        Self::from_channel(Arc::clone(&self.channel))
    }
}

#[async_trait]
impl EventBus for ChannelEventBus {
    async fn publish(&self, payload: Bytes) -> Result<()> {
        let channel = &self.channel;
        let _guard = channel.publish_lock.lock().await;

        // Queued values count until every receiver has read them.
        while channel.sender.len() >= CHANNEL_CAPACITY {
            debug!("Channel full, waiting for consumer");
            channel.space.notified().await;
        }

        let offset = channel.next_offset.fetch_add(1, Ordering::SeqCst);
        let delivery = Delivery::new(payload, CHANNEL_TOPIC, 0, offset);

        // Send to channel (ignore error if no receivers)
        match channel.sender.send(delivery) {
            Ok(receiver_count) => {
                debug!(
                    offset,
                    receivers = receiver_count,
                    "Published message to channel"
                );
            }
            Err(_) => {
                debug!(offset, "Published message (no receivers)");
            }
        }

        Ok(())
    }

    async fn subscribe(&self, handler: Arc<dyn MessageHandler>) -> Result<()> {
        let count = {
            let mut handlers = self.handlers.write().await;
            handlers.push(handler);
            handlers.len()
        };

        info!(handler_count = count, "Handler subscribed to channel bus");

        Ok(())
    }

    async fn start_consuming(&self) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Ok(());
        }

        let mut receiver = self.channel.sender.subscribe();
        self.state.set(ConsumerState::Subscribed);
        self.state.set(ConsumerState::Running);

        let handlers = self.handlers.clone();
        let channel = Arc::clone(&self.channel);
        let state = self.state.clone();
        let mut stop = self.stop.subscribe();

        *task = Some(tokio::spawn(async move {
            loop {
                // Only the wait for the next message is interruptible;
                // a message already received is always processed to the end.
                let next = tokio::select! {
                    biased;
                    _ = stop.changed() => {
                        state.set(ConsumerState::Disconnected);
                        break;
                    }
                    next = receiver.recv() => next,
                };

                match next {
                    Ok(delivery) => {
                        channel.space.notify_one();
                        debug!(offset = delivery.offset, "Received message via channel");
                        dispatch_to_handlers(&handlers, delivery).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        error!(skipped = n, "Channel consumer lost messages, stopping consumer");
                        state.set(ConsumerState::Failed);
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        error!("Channel closed, stopping consumer");
                        state.set(ConsumerState::Failed);
                        break;
                    }
                }
            }

            // Release any publisher waiting on this receiver's backlog.
            drop(receiver);
            channel.space.notify_one();
        }));

        info!("Channel consumer started");

        Ok(())
    }

    async fn shutdown(&self) {
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = self.stop.send(true);
            if let Err(e) = task.await {
                error!(error = %e, "Channel consumer task failed");
            }
            info!("Channel consumer stopped");
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
