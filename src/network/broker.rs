//! Live Update Broker
//!
//! Fans encoded frames out to every connected viewer. Each viewer owns a
//! bounded queue; the broker keeps only weak handles to them and never
//! waits on one. A full queue loses the frame, and the next publish
//! supersedes it.

use std::collections::BTreeMap;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::network::protocol::encode_event;

/// Identity of one registered viewer queue.
pub type SubscriberId = Uuid;

/// A viewer's end of the broker.
///
/// Holds the only strong sender, so dropping a subscription without
/// unregistering still lets the broker notice and prune it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<String>,
    _tx: mpsc::Sender<String>,
}

impl Subscription {
    /// Identity in the broker.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next frame. `None` once closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Take a frame if one is queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

/// Counts from one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Frames queued.
    pub delivered: usize,
    /// Frames lost to full queues.
    pub dropped: usize,
    /// Dead subscribers removed.
    pub pruned: usize,
}

/// Registry of viewer queues.
#[derive(Debug, Default)]
pub struct Broadcaster {
    clients: RwLock<BTreeMap<SubscriberId, mpsc::WeakSender<String>>>,
}

impl Broadcaster {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new viewer with a queue of `capacity` frames.
    pub async fn register(&self, capacity: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = Uuid::new_v4();

        self.clients.write().await.insert(id, tx.downgrade());
        debug!(subscriber = %id, "viewer registered");

        Subscription { id, rx, _tx: tx }
    }

    /// Remove a viewer, then close its queue.
    pub async fn unregister(&self, subscription: Subscription) {
        let Subscription { id, mut rx, _tx } = subscription;

        self.clients.write().await.remove(&id);
        rx.close();
        debug!(subscriber = %id, "viewer unregistered");
    }

    /// Send one event to every registered viewer without blocking.
    pub async fn publish(&self, event: &str, payload: &str) -> PublishReport {
        let frame = encode_event(event, payload);
        let mut report = PublishReport::default();
        let mut dead = Vec::new();

        {
            let clients = self.clients.read().await;
            for (id, weak) in clients.iter() {
                let Some(tx) = weak.upgrade() else {
                    dead.push(*id);
                    continue;
                };
                match tx.try_send(frame.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!(subscriber = %id, event, "viewer queue full, dropping frame");
                        report.dropped += 1;
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
                }
            }
        }

        if !dead.is_empty() {
            let mut clients = self.clients.write().await;
            for id in &dead {
                clients.remove(id);
            }
            report.pruned = dead.len();
        }

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(event, ?report, bytes = frame.len(), "published");

        report
    }

    /// Number of registered viewers.
    pub async fn subscriber_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let broker = Broadcaster::new();
        let report = broker.publish("board", "<div/>").await;
        assert_eq!(report, PublishReport::default());
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let broker = Broadcaster::new();
        let mut a = broker.register(8).await;
        let mut b = broker.register(8).await;
        assert_eq!(broker.subscriber_count().await, 2);

        let report = broker.publish("players", "line1\nline2").await;
        assert_eq!(report.delivered, 2);

        let expected = "event: players\ndata: line1\ndata: line2\n\n";
        assert_eq!(a.recv().await.as_deref(), Some(expected));
        assert_eq!(b.recv().await.as_deref(), Some(expected));
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let broker = Broadcaster::new();
        let mut slow = broker.register(2).await;
        let mut fast = broker.register(8).await;

        for i in 0..5 {
            broker.publish("dice", &i.to_string()).await;
            // Fast consumer keeps up
            assert!(fast.recv().await.is_some());
        }

        // Slow consumer only got the first two
        assert_eq!(slow.try_recv().as_deref(), Some("event: dice\ndata: 0\n\n"));
        assert_eq!(slow.try_recv().as_deref(), Some("event: dice\ndata: 1\n\n"));
        assert_eq!(slow.try_recv(), None);

        // Still registered and receiving once drained
        let report = broker.publish("dice", "5").await;
        assert_eq!(report.delivered, 2);
        assert_eq!(slow.try_recv().as_deref(), Some("event: dice\ndata: 5\n\n"));
    }

    #[tokio::test]
    async fn test_unregister_removes_and_closes() {
        let broker = Broadcaster::new();
        let sub = broker.register(8).await;
        let other = broker.register(8).await;

        broker.unregister(sub).await;
        assert_eq!(broker.subscriber_count().await, 1);

        let report = broker.publish("board", "x").await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.pruned, 0);

        broker.unregister(other).await;
        assert_eq!(broker.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let broker = Broadcaster::new();
        let sub = broker.register(8).await;
        drop(sub);

        assert_eq!(broker.subscriber_count().await, 1);
        let report = broker.publish("board", "x").await;
        assert_eq!(report.pruned, 1);
        assert_eq!(report.delivered, 0);
        assert_eq!(broker.subscriber_count().await, 0);
    }
}
