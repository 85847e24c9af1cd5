use super::{ExpiringEntries, Partition, PartitionKind, PartitionMessage, TickOutcome};
use crate::error::AggregationError;
use crate::geo::GeoFunctions;
use crate::settings::AggregationSettings;
use crate::transport::{PubSub, TopicMessage};
use crate::types::{BoundingBox, PointOfInterest, RegionBatch, RegionKey};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Non-leaf partition: the clustered union of its children's latest batches.
///
/// Holds at most four entries, one per child quadrant. Every batch replaces
/// the child's entry and pushes its deadline out, empty batches included;
/// entries only leave through expiry.
pub struct SummaryRegion {
    key: RegionKey,
    topic: String,
    bounds: BoundingBox,
    geo: GeoFunctions,
    expiry: Duration,
    children: ExpiringEntries<RegionKey, RegionBatch>,
    pubsub: Arc<dyn PubSub>,
}

impl SummaryRegion {
    pub fn new(key: RegionKey, settings: &AggregationSettings, pubsub: Arc<dyn PubSub>) -> Self {
        let geo = GeoFunctions::new(settings);
        Self {
            key,
            topic: key.name(),
            bounds: geo.bounding_box_for_region(&key),
            geo,
            expiry: settings.expiry_interval,
            children: ExpiringEntries::new(),
            pubsub,
        }
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    fn update_child(&mut self, batch: RegionBatch, now: Instant) -> Result<(), AggregationError> {
        if batch.key.parent() != Some(self.key) {
            return Err(AggregationError::UnexpectedMessage {
                key: self.key,
                reason: format!("{} is not a child partition", batch.key),
            });
        }
        trace!(partition = %self.key, child = %batch.key, points = batch.points.len(), "Child batch");
        self.children.upsert(batch.key, batch, now + self.expiry);
        Ok(())
    }
}

impl Partition for SummaryRegion {
    fn key(&self) -> &RegionKey {
        &self.key
    }

    fn kind(&self) -> PartitionKind {
        PartitionKind::Summary
    }

    fn accept(&mut self, message: PartitionMessage, now: Instant) -> Result<(), AggregationError> {
        match message {
            PartitionMessage::ChildBatch(batch) => self.update_child(batch, now),
            other => Err(AggregationError::UnexpectedMessage {
                key: self.key,
                reason: format!("summary partition does not take a {}", other.describe()),
            }),
        }
    }

    fn tick(&mut self, now: Instant) -> TickOutcome {
        let expired = self.children.sweep(now);
        let points: Vec<PointOfInterest> = self
            .children
            .values()
            .flat_map(|batch| batch.points.iter().cloned())
            .collect();
        let batch = RegionBatch::new(self.key, self.geo.cluster(&self.topic, &self.bounds, points));
        if !batch.points.is_empty() {
            self.pubsub.publish(&self.topic, TopicMessage::Batch(Arc::new(batch.clone())));
        }
        TickOutcome {
            batch,
            expired,
            exhausted: self.children.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalPubSub;
    use crate::types::{GeoPoint, RawPosition, SubscriberId};
    use tokio::sync::mpsc;

    fn settings() -> AggregationSettings {
        AggregationSettings {
            max_zoom_depth: 4,
            expiry_interval: Duration::from_secs(30),
            ..Default::default()
        }
    }

    fn raw_batch(key: RegionKey, ids: std::ops::Range<usize>) -> RegionBatch {
        let bounds = crate::geo::bounding_box_for_partition(&key);
        let points = ids
            .map(|i| {
                let f = (i % 10) as f64 / 10.0 + 0.05;
                let lat = bounds.south_west.lat + (bounds.north_east.lat - bounds.south_west.lat) * f;
                let lng = bounds.south_west.lng + (bounds.north_east.lng - bounds.south_west.lng) * f;
                PointOfInterest::from(RawPosition::new(format!("p{i}"), 1, GeoPoint::new(lat, lng)))
            })
            .collect();
        RegionBatch::new(key, points)
    }

    #[test]
    fn stops_on_first_tick_without_children() {
        let mut summary = SummaryRegion::new(RegionKey::new(2, 1, 1), &settings(), Arc::new(LocalPubSub::new()));
        let outcome = summary.tick(Instant::now());
        assert!(outcome.exhausted);
        assert!(outcome.batch.points.is_empty());
    }

    #[tokio::test]
    async fn clusters_children_and_publishes_batch() {
        let pubsub = Arc::new(LocalPubSub::new());
        let key = RegionKey::new(2, 1, 1);
        let mut summary = SummaryRegion::new(key, &settings(), pubsub.clone());
        let (tx, mut rx) = mpsc::channel(8);
        pubsub.subscribe(&key.name(), SubscriberId::new(), tx);

        let now = Instant::now();
        for (n, child) in key.children().into_iter().enumerate() {
            let batch = raw_batch(child, n * 50..(n + 1) * 50);
            summary.accept(PartitionMessage::ChildBatch(batch), now).unwrap();
        }
        assert_eq!(summary.child_count(), 4);

        let outcome = summary.tick(now);
        assert!(!outcome.exhausted);
        assert!(outcome.batch.points.len() <= 16);
        assert_eq!(outcome.batch.total_weight(), 200);

        match rx.try_recv() {
            Ok(TopicMessage::Batch(published)) => assert_eq!(*published, outcome.batch),
            other => panic!("expected published batch, got {other:?}"),
        }
    }

    #[test]
    fn empty_child_batch_replaces_points_until_it_expires() {
        let key = RegionKey::new(1, 0, 0);
        let mut summary = SummaryRegion::new(key, &settings(), Arc::new(LocalPubSub::new()));
        let child = key.children()[0];
        let start = Instant::now();

        summary.accept(PartitionMessage::ChildBatch(raw_batch(child, 0..3)), start).unwrap();
        let emptied = start + Duration::from_secs(10);
        summary
            .accept(PartitionMessage::ChildBatch(RegionBatch::new(child, Vec::new())), emptied)
            .unwrap();
        assert_eq!(summary.child_count(), 1);

        let outcome = summary.tick(emptied);
        assert!(outcome.batch.points.is_empty());
        assert!(!outcome.exhausted);

        // The deadline runs from the empty batch, not the first one.
        assert!(!summary.tick(start + Duration::from_secs(30)).exhausted);
        let outcome = summary.tick(emptied + Duration::from_secs(30));
        assert_eq!(outcome.expired, 1);
        assert!(outcome.exhausted);
    }

    #[test]
    fn stale_children_expire() {
        let key = RegionKey::new(1, 1, 0);
        let mut summary = SummaryRegion::new(key, &settings(), Arc::new(LocalPubSub::new()));
        let start = Instant::now();
        summary
            .accept(PartitionMessage::ChildBatch(raw_batch(key.children()[2], 0..5)), start)
            .unwrap();

        assert_eq!(summary.tick(start + Duration::from_secs(10)).batch.total_weight(), 5);
        let outcome = summary.tick(start + Duration::from_secs(30));
        assert_eq!(outcome.expired, 1);
        assert!(outcome.exhausted);
    }

    #[test]
    fn rejects_batches_from_non_children() {
        let key = RegionKey::new(1, 0, 0);
        let mut summary = SummaryRegion::new(key, &settings(), Arc::new(LocalPubSub::new()));
        let now = Instant::now();

        let grandchild = key.children()[0].children()[0];
        assert!(summary
            .accept(PartitionMessage::ChildBatch(raw_batch(grandchild, 0..2)), now)
            .is_err());

        let position = RawPosition::new("u1", 1, GeoPoint::new(-45.0, -90.0));
        assert!(summary.accept(PartitionMessage::Position(position), now).is_err());
        assert_eq!(summary.child_count(), 0);
    }
}
