//! In-process realtime change-feed.
//!
//! Every committed insert/update is published once on a broadcast channel.
//! Each subscription owns a forwarding task that filters the broadcast down
//! to its conversation pair and pushes [`FeedEvent`]s onto the subscriber's
//! mpsc channel.  The first event on every subscription is the
//! `Subscribed` acknowledgment.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use parley_shared::constants::{FEED_BROADCAST_CAPACITY, FEED_CHANNEL_CAPACITY};
use parley_shared::{ChannelStatus, ConversationKey, FeedEvent, Subscription, SubscriptionId};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One published row change, tagged with the pair it belongs to.
#[derive(Debug, Clone)]
struct Change {
    key: ConversationKey,
    payload: Value,
}

#[derive(Clone)]
pub struct Feed {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    tx: broadcast::Sender<Change>,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<SubscriptionId, JoinHandle<()>>>,
}

impl Feed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(FeedInner {
                tx,
                next_id: AtomicU64::new(1),
                tasks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Publish a change payload for the pair `key`.
    pub fn publish(&self, key: &ConversationKey, payload: Value) {
        let receivers = self.inner.tx.send(Change {
            key: key.clone(),
            payload,
        });
        match receivers {
            Ok(n) => debug!(topic = %key, receivers = n, "Published change"),
            Err(_) => debug!(topic = %key, "Published change with no subscribers"),
        }
    }

    pub async fn subscribe(&self, key: &ConversationKey) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        let mut changes = self.inner.tx.subscribe();

        // Capacity is fresh, this cannot block.
        let _ = tx.send(FeedEvent::Status(ChannelStatus::Subscribed)).await;

        let topic_key = key.clone();
        let handle = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) if change.key == topic_key => {
                        if tx.send(FeedEvent::Change(change.payload)).await.is_err() {
                            debug!(sub = %id, "Subscriber dropped, stopping forwarder");
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(sub = %id, skipped = n, "Subscriber lagged behind the feed");
                        let _ = tx
                            .send(FeedEvent::Status(ChannelStatus::ChannelError(format!(
                                "subscriber lagged, {n} events dropped"
                            ))))
                            .await;
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        let _ = tx.send(FeedEvent::Status(ChannelStatus::Closed)).await;
                        break;
                    }
                }
            }
        });

        if let Ok(mut tasks) = self.inner.tasks.lock() {
            tasks.retain(|_, h| !h.is_finished());
            tasks.insert(id, handle);
        }

        info!(sub = %id, topic = %key, "Subscription opened");

        Subscription {
            id,
            key: key.clone(),
            events: rx,
        }
    }

    /// Stop forwarding for `id`.  The subscriber's receiver then yields `None`.
    /// Returns `false` when the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let handle = match self.inner.tasks.lock() {
            Ok(mut tasks) => tasks.remove(&id),
            Err(_) => None,
        };
        match handle {
            Some(h) => {
                h.abort();
                info!(sub = %id, "Subscription closed");
                true
            }
            None => false,
        }
    }

    /// Number of live subscriptions.
    pub fn active_subscriptions(&self) -> usize {
        match self.inner.tasks.lock() {
            Ok(tasks) => tasks.values().filter(|h| !h.is_finished()).count(),
            Err(_) => 0,
        }
    }
}

impl Default for Feed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(a: &str, b: &str) -> ConversationKey {
        ConversationKey::new(a.into(), b.into())
    }

    #[tokio::test]
    async fn test_ack_then_filtered_changes() {
        let feed = Feed::new();
        let mut sub = feed.subscribe(&key("u1", "u2")).await;

        assert_eq!(
            sub.recv().await,
            Some(FeedEvent::Status(ChannelStatus::Subscribed))
        );

        feed.publish(&key("u1", "u3"), json!({ "other": true }));
        feed.publish(&key("u2", "u1"), json!({ "mine": true }));

        assert_eq!(
            sub.recv().await,
            Some(FeedEvent::Change(json!({ "mine": true })))
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_channel() {
        let feed = Feed::new();
        let mut sub = feed.subscribe(&key("u1", "u2")).await;
        let _ack = sub.recv().await;

        assert_eq!(feed.active_subscriptions(), 1);
        assert!(feed.unsubscribe(sub.id));
        assert!(!feed.unsubscribe(sub.id));

        assert_eq!(sub.recv().await, None);
        assert_eq!(feed.active_subscriptions(), 0);
    }
}
