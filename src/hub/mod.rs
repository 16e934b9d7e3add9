//! BroadcastHub - Subscriber Fan-Out
//!
//! ## Responsibilities
//!
//! - Connection management for one feed type
//! - Fan-out of produced artifacts to every current subscriber
//! - Pruning of subscribers whose transport has gone away
//!
//! Two process-wide instances exist: the preview hub (base64 JPEG frames
//! and error payload text) and the event hub (structured JSON events).
//! Each subscriber gets its own unbounded channel, so delivery paths are
//! independent and one slow peer cannot starve the others; the only place
//! that blocks on a network write is that subscriber's own socket task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Hub instance for one feed type
pub struct BroadcastHub<T> {
    /// Subscriber channels keyed by connection id
    connections: RwLock<HashMap<Uuid, mpsc::UnboundedSender<T>>>,
    connection_count: AtomicU64,
    /// Feed label for logging ("preview", "events")
    feed: &'static str,
}

/// Preview frame feed (base64 JPEG text)
pub type PreviewHub = BroadcastHub<String>;

/// Generic structured event feed
pub type EventHub = BroadcastHub<serde_json::Value>;

impl<T: Clone + Send + 'static> BroadcastHub<T> {
    /// Create a new hub for the given feed type
    pub fn new(feed: &'static str) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
            feed,
        }
    }

    /// Register a new subscriber
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<T>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, tx);
        }
        self.connection_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(feed = self.feed, subscriber = %id, "Subscriber connected");
        (id, rx)
    }

    /// Remove a subscriber
    pub async fn unregister(&self, id: &Uuid) {
        let mut connections = self.connections.write().await;
        if connections.remove(id).is_some() {
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(feed = self.feed, subscriber = %id, "Subscriber disconnected");
        }
    }

    /// True while the subscriber is still registered
    pub async fn is_subscribed(&self, id: &Uuid) -> bool {
        self.connections.read().await.contains_key(id)
    }

    /// Deliver a payload to one subscriber
    ///
    /// Returns false and deregisters the subscriber if its channel has
    /// closed (the receiving socket task is gone).
    pub async fn send_to(&self, id: &Uuid, payload: T) -> bool {
        let delivered = {
            let connections = self.connections.read().await;
            match connections.get(id) {
                Some(tx) => tx.send(payload).is_ok(),
                None => return false,
            }
        };

        if !delivered {
            self.unregister(id).await;
        }
        delivered
    }

    /// Deliver a payload to every current subscriber
    ///
    /// A failed delivery deregisters that subscriber without aborting
    /// delivery to the rest.
    pub async fn broadcast(&self, payload: T) {
        let mut dropped = Vec::new();
        {
            let connections = self.connections.read().await;
            for (id, tx) in connections.iter() {
                if tx.send(payload.clone()).is_err() {
                    dropped.push(*id);
                }
            }
        }

        for id in dropped {
            tracing::warn!(feed = self.feed, subscriber = %id, "Dropping unreachable subscriber");
            self.unregister(&id).await;
        }
    }

    /// Number of current subscribers
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }
}
