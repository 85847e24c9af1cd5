//! Node-level configuration.

use crate::error::NodeError;
use meridian_core::{AggregationSettings, BoundingBox, GeoPoint};
use std::time::Duration;

/// Shape of an in-process cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    /// Number of nodes, each running one region manager
    pub nodes: usize,
    /// Virtual nodes per node on the hash ring
    pub virtual_nodes: usize,
    pub aggregation: AggregationSettings,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nodes: 1,
            virtual_nodes: 150,
            aggregation: AggregationSettings::default(),
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.nodes == 0 {
            return Err(NodeError::InvalidConfig("cluster needs at least one node".to_string()));
        }
        if self.virtual_nodes == 0 {
            return Err(NodeError::InvalidConfig("virtual_nodes must be greater than 0".to_string()));
        }
        self.aggregation.validate()?;
        Ok(())
    }
}

/// Simulated users walking around an area.
#[derive(Debug, Clone, PartialEq)]
pub struct BotConfig {
    pub total: usize,
    pub step_interval: Duration,
    /// Distance covered per step, in degrees
    pub speed_degrees: f64,
    /// Bots stay inside this box; it must not cross the antimeridian
    pub area: BoundingBox,
    /// Every this many steps a bot moves its own viewport; 0 disables viewing
    pub viewport_every: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            total: 50,
            step_interval: Duration::from_secs(1),
            speed_degrees: 0.01,
            area: BoundingBox::new(GeoPoint::new(35.0, -10.0), GeoPoint::new(60.0, 30.0)),
            viewport_every: 30,
        }
    }
}

impl BotConfig {
    pub fn validate(&self) -> Result<(), NodeError> {
        let area = &self.area;
        if !area.south_west.is_valid() || !area.north_east.is_valid() {
            return Err(NodeError::InvalidConfig("bot area corners must be valid coordinates".to_string()));
        }
        if area.south_west.lat >= area.north_east.lat || area.south_west.lng >= area.north_east.lng {
            return Err(NodeError::InvalidConfig(
                "bot area south-west corner must be below and west of north-east".to_string(),
            ));
        }
        if self.step_interval.is_zero() {
            return Err(NodeError::InvalidConfig("bot step interval must be greater than 0".to_string()));
        }
        if !self.speed_degrees.is_finite() || self.speed_degrees < 0.0 {
            return Err(NodeError::InvalidConfig("bot speed must be a non-negative number".to_string()));
        }
        Ok(())
    }
}
