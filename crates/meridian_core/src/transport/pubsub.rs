/// In-process topic registry
use super::{PubSub, TopicMessage};
use crate::types::SubscriberId;
use dashmap::DashMap;
use std::collections::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

/// Publish/subscribe over a concurrent topic map.
///
/// Sinks that have closed are pruned on the next publish to their topic;
/// topics with no subscribers left are removed.
#[derive(Debug, Default)]
pub struct LocalPubSub {
    topics: DashMap<String, HashMap<SubscriberId, mpsc::Sender<TopicMessage>>>,
}

impl LocalPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|s| s.len()).unwrap_or(0)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

impl PubSub for LocalPubSub {
    fn publish(&self, topic: &str, message: TopicMessage) {
        {
            let Some(mut subscribers) = self.topics.get_mut(topic) else {
                trace!(topic, "No subscribers");
                return;
            };
            subscribers.retain(|id, sink| match sink.try_send(message.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    debug!(topic, subscriber = %id, "Subscriber lagging, dropped topic message");
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });
        }
        self.topics.remove_if(topic, |_, subscribers| subscribers.is_empty());
    }

    fn subscribe(&self, topic: &str, subscriber: SubscriberId, sink: mpsc::Sender<TopicMessage>) {
        self.topics
            .entry(topic.to_string())
            .or_default()
            .insert(subscriber, sink);
    }

    fn unsubscribe(&self, topic: &str, subscriber: SubscriberId) {
        if let Some(mut subscribers) = self.topics.get_mut(topic) {
            subscribers.remove(&subscriber);
        }
        self.topics.remove_if(topic, |_, subscribers| subscribers.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoPoint, RawPosition};

    fn position(id: &str) -> TopicMessage {
        TopicMessage::Position(RawPosition::new(id, 1, GeoPoint::new(1.0, 2.0)))
    }

    #[tokio::test]
    async fn delivers_only_to_topic_subscribers() {
        let pubsub = LocalPubSub::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        pubsub.subscribe("region-1-0-0", SubscriberId::new(), tx_a);
        pubsub.subscribe("region-1-1-0", SubscriberId::new(), tx_b);

        pubsub.publish("region-1-0-0", position("u1"));

        assert!(matches!(rx_a.try_recv(), Ok(TopicMessage::Position(p)) if p.id == "u1"));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_removes_empty_topics() {
        let pubsub = LocalPubSub::new();
        let id = SubscriberId::new();
        let (tx, _rx) = mpsc::channel(8);
        pubsub.subscribe("region-2-1-1", id, tx);
        assert_eq!(pubsub.subscriber_count("region-2-1-1"), 1);

        pubsub.unsubscribe("region-2-1-1", id);
        assert_eq!(pubsub.subscriber_count("region-2-1-1"), 0);
        assert_eq!(pubsub.topic_count(), 0);
    }

    #[tokio::test]
    async fn closed_sinks_are_pruned_and_full_sinks_skipped() {
        let pubsub = LocalPubSub::new();
        let (closed_tx, closed_rx) = mpsc::channel(1);
        let (full_tx, mut full_rx) = mpsc::channel(1);
        pubsub.subscribe("t", SubscriberId::new(), closed_tx);
        pubsub.subscribe("t", SubscriberId::new(), full_tx);
        drop(closed_rx);

        pubsub.publish("t", position("a"));
        pubsub.publish("t", position("b"));

        assert_eq!(pubsub.subscriber_count("t"), 1);
        assert!(matches!(full_rx.try_recv(), Ok(TopicMessage::Position(p)) if p.id == "a"));
        assert!(full_rx.try_recv().is_err());
    }
}
