//! Tunables shared by every partition, manager and subscriber on a node.

use crate::error::AggregationError;
use std::time::Duration;

/// Deepest zoom level a [`crate::RegionKey`] can address without overflowing `u32` axes.
pub const MAX_SUPPORTED_ZOOM: u8 = 30;

/// Aggregation settings.
///
/// Leaf partitions sit at `max_zoom_depth`; summary partitions fill every
/// level above it up to the root.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationSettings {
    /// Zoom level of the leaf partitions
    pub max_zoom_depth: u8,
    /// Upper bound on the partitions a single viewport subscribes to
    pub max_subscription_regions: usize,
    /// Point count above which a partition clusters its output
    pub cluster_threshold: usize,
    /// A clustering partition splits its box into `cluster_dimension²` cells
    pub cluster_dimension: usize,
    /// How often partitions expire, cluster and propagate
    pub summary_interval: Duration,
    /// How long a position or child batch stays alive without a refresh
    pub expiry_interval: Duration,
    /// How often subscribers flush batched updates to their owner
    pub subscriber_batch_interval: Duration,
    /// Capacity of every bounded actor mailbox
    pub mailbox_capacity: usize,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            max_zoom_depth: 16,
            max_subscription_regions: 20,
            cluster_threshold: 16,
            cluster_dimension: 4,
            summary_interval: Duration::from_secs(2),
            expiry_interval: Duration::from_secs(30),
            subscriber_batch_interval: Duration::from_secs(2),
            mailbox_capacity: 1024,
        }
    }
}

impl AggregationSettings {
    /// Checks the settings for values the partition math cannot handle.
    pub fn validate(&self) -> Result<(), AggregationError> {
        if self.max_zoom_depth > MAX_SUPPORTED_ZOOM {
            return Err(AggregationError::InvalidSettings(format!(
                "max_zoom_depth must be at most {MAX_SUPPORTED_ZOOM}, got {}",
                self.max_zoom_depth
            )));
        }
        if self.cluster_dimension == 0 {
            return Err(AggregationError::InvalidSettings(
                "cluster_dimension must be greater than 0".to_string(),
            ));
        }
        if self.summary_interval.is_zero() {
            return Err(AggregationError::InvalidSettings(
                "summary_interval must be greater than 0".to_string(),
            ));
        }
        if self.expiry_interval.is_zero() {
            return Err(AggregationError::InvalidSettings(
                "expiry_interval must be greater than 0".to_string(),
            ));
        }
        if self.subscriber_batch_interval.is_zero() {
            return Err(AggregationError::InvalidSettings(
                "subscriber_batch_interval must be greater than 0".to_string(),
            ));
        }
        if self.mailbox_capacity == 0 {
            return Err(AggregationError::InvalidSettings(
                "mailbox_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
