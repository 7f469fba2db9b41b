//! Local broadcast hub.
//!
//! Typed pub/sub used for cross-instance markers (`AuthStateUpdated`,
//! `SettingsUpdated`), connectivity signals and auth lifecycle signals.
//! Built on `tokio::sync::broadcast`; every subscription owns its receiver
//! and is detached as soon as it is dropped or explicitly unsubscribed.

use inkpost_core::signal::{SyncEvent, Topic};
use std::collections::HashSet;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Default capacity of the hub channel.
/// Large enough for bursts of markers without lagging slow listeners.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct BroadcastHub {
    sender: broadcast::Sender<SyncEvent>,
}

impl std::fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _rx) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event and returns how many subscriptions received it.
    ///
    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: SyncEvent) -> usize {
        tracing::trace!(topic = ?event.topic(), "[BroadcastHub] publish");
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribes to the given topics.
    pub fn subscribe(&self, topics: &[Topic]) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            topics: topics.iter().copied().collect(),
        }
    }

    /// Subscribes to every topic.
    pub fn subscribe_all(&self) -> Subscription {
        self.subscribe(&[])
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription. Dropping it unsubscribes.
pub struct Subscription {
    receiver: broadcast::Receiver<SyncEvent>,
    /// Empty means all topics.
    topics: HashSet<Topic>,
}

impl Subscription {
    fn accepts(&self, event: &SyncEvent) -> bool {
        self.topics.is_empty() || self.topics.contains(&event.topic())
    }

    /// Waits for the next matching event. Returns `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("[BroadcastHub] subscriber lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next matching event already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<SyncEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drains every matching event already queued.
    pub fn drain(&mut self) -> Vec<SyncEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Detaches from the hub.
    pub fn unsubscribe(self) {
        drop(self);
    }
}
