//! # Position Subscriber
//!
//! One per client connection. Tracks the client's viewport, keeps the set
//! of partition topics covering it subscribed, merges everything those
//! topics publish into a per-id map, and hands the map to its owner in one
//! batch every subscriber tick.
//!
//! Raw positions arrive at update rate from leaf topics and cluster
//! batches at tick rate from summary topics; batching here is what keeps a
//! busy viewport from flooding the connection.

use crate::error::AggregationError;
use crate::geo::GeoFunctions;
use crate::scheduler::{schedule_repeating, TickHandle};
use crate::settings::AggregationSettings;
use crate::transport::{PubSub, TopicMessage};
use crate::types::{BoundingBox, PointOfInterest, RegionKey, SubscriberId, SubscriberUpdate};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
pub enum SubscriberCommand {
    UpdateViewport(BoundingBox),
    Tick,
}

/// Topics gained and lost by a viewport change, each sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewportChange {
    pub subscribed: Vec<RegionKey>,
    pub unsubscribed: Vec<RegionKey>,
}

pub struct PositionSubscriber {
    id: SubscriberId,
    geo: GeoFunctions,
    pubsub: Arc<dyn PubSub>,
    topic_sink: mpsc::Sender<TopicMessage>,
    regions: HashSet<RegionKey>,
    area: Option<BoundingBox>,
    updates: HashMap<String, PointOfInterest>,
}

impl PositionSubscriber {
    /// Builds a subscriber whose topic deliveries go to `topic_sink`.
    pub fn new(
        id: SubscriberId,
        settings: &AggregationSettings,
        pubsub: Arc<dyn PubSub>,
        topic_sink: mpsc::Sender<TopicMessage>,
    ) -> Self {
        Self {
            id,
            geo: GeoFunctions::new(settings),
            pubsub,
            topic_sink,
            regions: HashSet::new(),
            area: None,
            updates: HashMap::new(),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn regions(&self) -> &HashSet<RegionKey> {
        &self.regions
    }

    pub fn area(&self) -> Option<BoundingBox> {
        self.area
    }

    /// Number of ids waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.updates.len()
    }

    /// Moves the viewport, subscribing to newly covering topics before
    /// dropping the ones no longer needed.
    pub fn update_viewport(&mut self, area: BoundingBox) -> ViewportChange {
        let regions = self.geo.regions_for_bounding_box(&area);

        let mut subscribed: Vec<RegionKey> = regions.difference(&self.regions).copied().collect();
        let mut unsubscribed: Vec<RegionKey> = self.regions.difference(&regions).copied().collect();
        subscribed.sort();
        unsubscribed.sort();

        for key in &subscribed {
            self.pubsub.subscribe(&key.name(), self.id, self.topic_sink.clone());
        }
        for key in &unsubscribed {
            self.pubsub.unsubscribe(&key.name(), self.id);
        }

        self.regions = regions;
        self.area = Some(area);
        ViewportChange {
            subscribed,
            unsubscribed,
        }
    }

    /// Merges a topic delivery; the newest value per id wins.
    pub fn accept(&mut self, message: TopicMessage) {
        match message {
            TopicMessage::Position(position) => {
                self.updates.insert(position.id.clone(), PointOfInterest::RawPosition(position));
            }
            TopicMessage::Batch(batch) => {
                for point in &batch.points {
                    self.updates.insert(point.id().to_string(), point.clone());
                }
            }
        }
    }

    /// Takes everything merged since the last flush, ordered by id.
    pub fn flush(&mut self) -> Option<SubscriberUpdate> {
        if self.updates.is_empty() {
            return None;
        }
        let mut points: Vec<PointOfInterest> = self.updates.drain().map(|(_, point)| point).collect();
        points.sort_by(|a, b| a.id().cmp(b.id()));
        Some(SubscriberUpdate {
            area: self.area,
            points,
        })
    }

    pub fn unsubscribe_all(&mut self) {
        for key in self.regions.drain() {
            self.pubsub.unsubscribe(&key.name(), self.id);
        }
    }

    /// Starts a subscriber task delivering batches to `owner`.
    ///
    /// The task ends when every [`SubscriberHandle`] is dropped or `owner`
    /// closes, and leaves all of its topics on the way out.
    pub fn spawn(
        settings: &AggregationSettings,
        pubsub: Arc<dyn PubSub>,
        owner: mpsc::Sender<SubscriberUpdate>,
    ) -> SubscriberHandle {
        let id = SubscriberId::new();
        let (commands_tx, commands_rx) = mpsc::channel(settings.mailbox_capacity);
        let (topic_tx, topic_rx) = mpsc::channel(settings.mailbox_capacity);
        let ticks = schedule_repeating(
            settings.subscriber_batch_interval,
            settings.subscriber_batch_interval,
            &commands_tx,
            SubscriberCommand::Tick,
        );
        let subscriber = Self::new(id, settings, pubsub, topic_tx);
        let task = tokio::spawn(subscriber.run(commands_rx, topic_rx, ticks, owner));
        SubscriberHandle {
            id,
            commands: commands_tx,
            task: Arc::new(task),
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SubscriberCommand>,
        mut topics: mpsc::Receiver<TopicMessage>,
        mut ticks: TickHandle,
        owner: mpsc::Sender<SubscriberUpdate>,
    ) {
        debug!(subscriber = %self.id, "Subscriber started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SubscriberCommand::UpdateViewport(area)) => {
                        let change = self.update_viewport(area);
                        debug!(
                            subscriber = %self.id,
                            subscribed = change.subscribed.len(),
                            unsubscribed = change.unsubscribed.len(),
                            "Viewport updated"
                        );
                    }
                    Some(SubscriberCommand::Tick) => {
                        let Some(update) = self.flush() else {
                            continue;
                        };
                        trace!(subscriber = %self.id, points = update.points.len(), "Flushing");
                        match owner.try_send(update) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                warn!(subscriber = %self.id, "Owner not keeping up, batch dropped");
                            }
                            Err(TrySendError::Closed(_)) => break,
                        }
                    }
                    None => break,
                },
                Some(message) = topics.recv() => self.accept(message),
            }
        }

        ticks.cancel();
        self.unsubscribe_all();
        debug!(subscriber = %self.id, "Subscriber stopped");
    }
}

/// Address of a running [`PositionSubscriber`].
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    id: SubscriberId,
    commands: mpsc::Sender<SubscriberCommand>,
    task: Arc<JoinHandle<()>>,
}

impl SubscriberHandle {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub async fn update_viewport(&self, area: BoundingBox) -> Result<(), AggregationError> {
        self.commands
            .send(SubscriberCommand::UpdateViewport(area))
            .await
            .map_err(|_| AggregationError::MailboxClosed {
                target: format!("subscriber {}", self.id),
            })
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
