//! Consumer lifecycle state.
//!
//! ```text
//! Disconnected -> Subscribed -> Running -> Failed
//!                                  ^  |
//!                                  +--+  (per message)
//! ```
//!
//! `Running` has no terminal state under normal operation. Graceful
//! shutdown returns the consumer to `Disconnected`.

use std::fmt;

use tokio::sync::watch;
use tracing::{error, info};

/// Where a broker consumer is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsumerState {
    #[default]
    Disconnected,
    Subscribed,
    Running,
    Failed,
}

impl ConsumerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Subscribed => "subscribed",
            Self::Running => "running",
            Self::Failed => "failed",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publishes state transitions to any number of observers.
///
/// Each bus owns one tracker; startup code and the health endpoint observe
/// it through `watch::Receiver`s.
#[derive(Debug, Clone)]
pub struct StateTracker {
    sender: watch::Sender<ConsumerState>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(ConsumerState::Disconnected);
        Self { sender }
    }

    pub fn get(&self) -> ConsumerState {
        *self.sender.borrow()
    }

    pub fn set(&self, next: ConsumerState) {
        let prev = self.sender.send_replace(next);
        if prev == next {
            return;
        }
        if next == ConsumerState::Failed {
            error!(from = %prev, to = %next, "Consumer state changed");
        } else {
            info!(from = %prev, to = %next, "Consumer state changed");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConsumerState> {
        self.sender.subscribe()
    }
}
