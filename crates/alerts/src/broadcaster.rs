//! Alert fan-out to live subscribers.
//!
//! Each subscriber owns a bounded queue. Publishing never waits: a subscriber
//! whose queue is full is treated as dead, removed, and its queue closed.

use dashmap::DashMap;
use pricewatch_core::PriceAlert;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Identifier assigned to a subscriber on connect.
pub type SubscriberId = u64;

/// Receiving end of one subscription.
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    rx: mpsc::Receiver<PriceAlert>,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next alert, or `None` once the broadcaster dropped this subscriber.
    pub async fn recv(&mut self) -> Option<PriceAlert> {
        self.rx.recv().await
    }

    /// Non-blocking receive, mostly for tests and draining.
    pub fn try_recv(&mut self) -> Option<PriceAlert> {
        self.rx.try_recv().ok()
    }
}

/// Thread-safe set of live subscribers.
#[derive(Debug)]
pub struct AlertBroadcaster {
    subscribers: DashMap<SubscriberId, mpsc::Sender<PriceAlert>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl AlertBroadcaster {
    /// Create a broadcaster whose subscribers each buffer up to `capacity` alerts.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> Subscriber {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.insert(id, tx);
        info!(subscriber = id, total = self.subscribers.len(), "Subscriber connected");
        Subscriber { id, rx }
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.subscribers.remove(&id).is_some() {
            info!(subscriber = id, total = self.subscribers.len(), "Subscriber disconnected");
        }
    }

    /// Deliver `alert` to every current subscriber. Returns how many accepted it.
    pub fn publish(&self, alert: &PriceAlert) -> usize {
        // Snapshot so no shard lock is held while sending.
        let targets: Vec<(SubscriberId, mpsc::Sender<PriceAlert>)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(alert.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(subscriber = id, "Subscriber queue full, dropping subscriber");
                    dead.push(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(subscriber = id, "Subscriber gone, removing");
                    dead.push(id);
                }
            }
        }

        for id in dead {
            // Dropping the last sender closes the queue.
            self.subscribers.remove(&id);
        }

        info!(
            item = %alert.item_id,
            price = %alert.current_price,
            delivered,
            "Alert published"
        );
        delivered
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for AlertBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
