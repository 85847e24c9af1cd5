//! Shared fixtures: recording fakes for the transport seams and cluster wiring.

use crate::manager::{manager_channel, ManagerCommand, ManagerHandle, RegionManager};
use crate::settings::AggregationSettings;
use crate::transport::{LocalPubSub, ManagerRouter, PubSub, RingRouter, TopicMessage};
use crate::types::{NodeId, SubscriberId};
use crate::AggregationError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn test_settings(max_zoom_depth: u8) -> AggregationSettings {
    AggregationSettings {
        max_zoom_depth,
        summary_interval: Duration::from_secs(2),
        expiry_interval: Duration::from_secs(6),
        subscriber_batch_interval: Duration::from_secs(2),
        ..Default::default()
    }
}

/// Lets every ready task run without moving the paused clock meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Router that accepts and records every command.
#[derive(Debug, Default)]
pub struct RecordingRouter {
    commands: Mutex<Vec<ManagerCommand>>,
}

impl RecordingRouter {
    pub fn commands(&self) -> Vec<ManagerCommand> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl ManagerRouter for RecordingRouter {
    async fn route(&self, command: ManagerCommand) -> Result<(), AggregationError> {
        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PubSubEvent {
    Subscribe(String),
    Unsubscribe(String),
    Publish(String),
}

/// Local pub/sub that also records the order of calls.
#[derive(Debug, Default)]
pub struct RecordingPubSub {
    inner: LocalPubSub,
    events: Mutex<Vec<PubSubEvent>>,
}

impl RecordingPubSub {
    pub fn events(&self) -> Vec<PubSubEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn topic_count(&self) -> usize {
        self.inner.topic_count()
    }
}

impl PubSub for RecordingPubSub {
    fn publish(&self, topic: &str, message: TopicMessage) {
        self.events.lock().unwrap().push(PubSubEvent::Publish(topic.to_string()));
        self.inner.publish(topic, message);
    }

    fn subscribe(&self, topic: &str, subscriber: SubscriberId, sink: mpsc::Sender<TopicMessage>) {
        self.events.lock().unwrap().push(PubSubEvent::Subscribe(topic.to_string()));
        self.inner.subscribe(topic, subscriber, sink);
    }

    fn unsubscribe(&self, topic: &str, subscriber: SubscriberId) {
        self.events.lock().unwrap().push(PubSubEvent::Unsubscribe(topic.to_string()));
        self.inner.unsubscribe(topic, subscriber);
    }
}

/// A single manager whose outbound batches go to a [`RecordingRouter`].
pub fn isolated_manager(
    settings: &AggregationSettings,
    pubsub: Arc<dyn PubSub>,
) -> (ManagerHandle, Arc<RecordingRouter>) {
    let router = Arc::new(RecordingRouter::default());
    let (handle, mailbox) = manager_channel(NodeId::new("solo"), settings.mailbox_capacity);
    RegionManager::spawn(mailbox, settings.clone(), router.clone(), pubsub);
    (handle, router)
}

/// `nodes` managers sharing one ring router and one pub/sub.
pub fn ring_cluster(
    settings: &AggregationSettings,
    nodes: usize,
    pubsub: Arc<dyn PubSub>,
) -> (Arc<RingRouter>, Vec<ManagerHandle>) {
    let (handles, mailboxes): (Vec<_>, Vec<_>) = (0..nodes)
        .map(|i| manager_channel(NodeId::new(format!("node-{i}")), settings.mailbox_capacity))
        .unzip();
    let router = Arc::new(RingRouter::new(64, handles.clone()));
    for mailbox in mailboxes {
        RegionManager::spawn(mailbox, settings.clone(), router.clone(), pubsub.clone());
    }
    (router, handles)
}
