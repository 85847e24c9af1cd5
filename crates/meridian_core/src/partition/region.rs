use super::{ExpiringEntries, Partition, PartitionKind, PartitionMessage, TickOutcome};
use crate::error::AggregationError;
use crate::geo::{partition_for_point, GeoFunctions};
use crate::settings::AggregationSettings;
use crate::transport::{PubSub, TopicMessage};
use crate::types::{BoundingBox, PointOfInterest, RawPosition, RegionBatch, RegionKey};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Leaf partition: the live raw positions inside one max-zoom cell.
///
/// Each accepted update is published on the partition topic straight away,
/// so viewers zoomed in this far see movement at update rate rather than
/// tick rate. The batch reported upward on each tick is clustered over the
/// cell's bounds, so a crowded cell never reports more than the grid allows.
pub struct Region {
    key: RegionKey,
    topic: String,
    bounds: BoundingBox,
    geo: GeoFunctions,
    expiry: Duration,
    active: ExpiringEntries<String, RawPosition>,
    pubsub: Arc<dyn PubSub>,
}

impl Region {
    pub fn new(key: RegionKey, settings: &AggregationSettings, pubsub: Arc<dyn PubSub>) -> Self {
        let geo = GeoFunctions::new(settings);
        Self {
            key,
            topic: key.name(),
            bounds: geo.bounding_box_for_region(&key),
            geo,
            expiry: settings.expiry_interval,
            active: ExpiringEntries::new(),
            pubsub,
        }
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    fn update_position(&mut self, position: RawPosition, now: Instant) -> Result<(), AggregationError> {
        if !position.position.is_valid() {
            return Err(AggregationError::InvalidInput(format!(
                "position {} for {} is out of range",
                position.position, position.id
            )));
        }
        let owner = partition_for_point(position.position, self.key.zoom_level);
        if owner != self.key {
            return Err(AggregationError::UnexpectedMessage {
                key: self.key,
                reason: format!("position {} belongs to {}", position.id, owner),
            });
        }

        trace!(partition = %self.key, id = %position.id, "Position update");
        self.pubsub.publish(&self.topic, TopicMessage::Position(position.clone()));
        self.active.upsert(position.id.clone(), position, now + self.expiry);
        Ok(())
    }
}

impl Partition for Region {
    fn key(&self) -> &RegionKey {
        &self.key
    }

    fn kind(&self) -> PartitionKind {
        PartitionKind::Leaf
    }

    fn accept(&mut self, message: PartitionMessage, now: Instant) -> Result<(), AggregationError> {
        match message {
            PartitionMessage::Position(position) => self.update_position(position, now),
            other => Err(AggregationError::UnexpectedMessage {
                key: self.key,
                reason: format!("leaf partition does not take a {}", other.describe()),
            }),
        }
    }

    fn tick(&mut self, now: Instant) -> TickOutcome {
        let expired = self.active.sweep(now);
        let points: Vec<PointOfInterest> = self.active.values().cloned().map(PointOfInterest::from).collect();
        TickOutcome {
            batch: RegionBatch::new(self.key, self.geo.cluster(&self.topic, &self.bounds, points)),
            expired,
            exhausted: self.active.is_empty(),
        }
    }
}
