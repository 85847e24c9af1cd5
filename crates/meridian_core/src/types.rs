//! # Core Type Definitions
//!
//! The data model shared by every partition, manager and subscriber.
//!
//! ## Key Types
//!
//! - [`GeoPoint`] - latitude/longitude pair in degrees
//! - [`BoundingBox`] - south-west/north-east rectangle, may straddle the antimeridian
//! - [`RegionKey`] - `(zoom_level, x, y)` address of one cell of the spatial hierarchy
//! - [`PointOfInterest`] - either a raw tracked position or a synthesized cluster
//! - [`RegionBatch`] - the unit of propagation between partitions and to subscribers

use crate::settings::MAX_SUPPORTED_ZOOM;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A latitude/longitude pair in degrees.
///
/// No normalization happens on construction; longitude wrapping is applied
/// only where the geo functions need it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Returns true when both coordinates are finite and the latitude is on the globe.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite() && (-90.0..=90.0).contains(&self.lat)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// A rectangle given by its south-western and north-eastern corners.
///
/// A box whose western longitude is greater than its eastern longitude
/// straddles the ±180° meridian; all arithmetic on the east/west span is
/// done modulo 360.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south_west: GeoPoint,
    pub north_east: GeoPoint,
}

impl BoundingBox {
    pub fn new(south_west: GeoPoint, north_east: GeoPoint) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Builds a box from `[west, south, east, north]`, the order GeoJSON uses.
    pub fn from_bbox(bbox: [f64; 4]) -> Self {
        Self::new(GeoPoint::new(bbox[1], bbox[0]), GeoPoint::new(bbox[3], bbox[2]))
    }

    /// Returns the box as `[west, south, east, north]`.
    pub fn to_bbox(&self) -> [f64; 4] {
        [
            self.south_west.lng,
            self.south_west.lat,
            self.north_east.lng,
            self.north_east.lat,
        ]
    }

    /// Checks whether a point lies inside the box, edges included.
    ///
    /// The longitude test wraps, so boxes across the antimeridian behave.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        if point.lat < self.south_west.lat || point.lat > self.north_east.lat {
            return false;
        }
        let width = self.north_east.lng - self.south_west.lng;
        if width >= 360.0 {
            return true;
        }
        let span = (self.north_east.lng - self.south_west.lng).rem_euclid(360.0);
        let offset = (point.lng - self.south_west.lng).rem_euclid(360.0);
        offset <= span
    }
}

/// Address of one partition in the spatial hierarchy.
///
/// The zoom level says how deep the partition sits: level `L` has `2^L`
/// steps on each axis. `x` counts eastwards from -180°, `y` counts
/// northwards from -90°. Level 0 is the single root partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionKey {
    pub zoom_level: u8,
    pub x: u32,
    pub y: u32,
}

impl RegionKey {
    pub fn new(zoom_level: u8, x: u32, y: u32) -> Self {
        Self { zoom_level, x, y }
    }

    /// The root partition covering the whole globe.
    pub fn root() -> Self {
        Self::new(0, 0, 0)
    }

    /// Deterministic string form, used as actor address and pub/sub topic.
    pub fn name(&self) -> String {
        format!("region-{}-{}-{}", self.zoom_level, self.x, self.y)
    }

    /// The partition one level up that contains this one, `None` at the root.
    pub fn parent(&self) -> Option<RegionKey> {
        if self.zoom_level == 0 {
            None
        } else {
            Some(RegionKey::new(self.zoom_level - 1, self.x >> 1, self.y >> 1))
        }
    }

    /// The four partitions one level down.
    pub fn children(&self) -> [RegionKey; 4] {
        let zoom = self.zoom_level + 1;
        let (x, y) = (self.x << 1, self.y << 1);
        [
            RegionKey::new(zoom, x, y),
            RegionKey::new(zoom, x + 1, y),
            RegionKey::new(zoom, x, y + 1),
            RegionKey::new(zoom, x + 1, y + 1),
        ]
    }

    /// Number of steps on each axis at this key's zoom level, saturating
    /// past what a `u64` holds.
    pub fn axis_steps(&self) -> u64 {
        1u64.checked_shl(u32::from(self.zoom_level)).unwrap_or(u64::MAX)
    }

    /// Checks the zoom is supported and `0 <= x, y < 2^zoom_level`.
    pub fn is_valid(&self) -> bool {
        self.zoom_level <= MAX_SUPPORTED_ZOOM
            && (self.x as u64) < self.axis_steps()
            && (self.y as u64) < self.axis_steps()
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Error returned when a string is not a `region-<zoom>-<x>-<y>` name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid region name: {0}")]
pub struct ParseRegionKeyError(pub String);

impl FromStr for RegionKey {
    type Err = ParseRegionKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseRegionKeyError(s.to_string());
        let mut parts = s.strip_prefix("region-").ok_or_else(invalid)?.split('-');
        let zoom_level = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let x = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let y = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        let key = RegionKey::new(zoom_level, x, y);
        if !key.is_valid() {
            return Err(invalid());
        }
        Ok(key)
    }
}

/// A tracked client or bot position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPosition {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub position: GeoPoint,
}

impl RawPosition {
    pub fn new(id: impl Into<String>, timestamp: i64, position: GeoPoint) -> Self {
        Self {
            id: id.into(),
            timestamp,
            position,
        }
    }
}

/// Weighted centroid of two or more source points.
///
/// Cluster ids are synthesized per tick (`<partition>-<cell>`) and are not
/// stable, so consumers replace, never diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub timestamp: i64,
    pub position: GeoPoint,
    pub count: u32,
}

/// Anything that can be shown on the map: a raw position or a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointOfInterest {
    RawPosition(RawPosition),
    Cluster(Cluster),
}

impl PointOfInterest {
    pub fn id(&self) -> &str {
        match self {
            PointOfInterest::RawPosition(p) => &p.id,
            PointOfInterest::Cluster(c) => &c.id,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            PointOfInterest::RawPosition(p) => p.timestamp,
            PointOfInterest::Cluster(c) => c.timestamp,
        }
    }

    pub fn position(&self) -> GeoPoint {
        match self {
            PointOfInterest::RawPosition(p) => p.position,
            PointOfInterest::Cluster(c) => c.position,
        }
    }

    /// How many raw sources this point stands for.
    pub fn weight(&self) -> u32 {
        match self {
            PointOfInterest::RawPosition(_) => 1,
            PointOfInterest::Cluster(c) => c.count,
        }
    }
}

impl From<RawPosition> for PointOfInterest {
    fn from(position: RawPosition) -> Self {
        PointOfInterest::RawPosition(position)
    }
}

/// The points of one partition after a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionBatch {
    pub key: RegionKey,
    pub points: Vec<PointOfInterest>,
}

impl RegionBatch {
    pub fn new(key: RegionKey, points: Vec<PointOfInterest>) -> Self {
        Self { key, points }
    }

    /// Total number of raw sources represented by the batch.
    pub fn total_weight(&self) -> u64 {
        self.points.iter().map(|p| p.weight() as u64).sum()
    }
}

/// Unique identifier for one position subscriber (one client connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one cluster node (one RegionManager owner).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Batched snapshot handed to the owner of a position subscriber.
///
/// `points` are full current values; each update replaces what the client
/// showed for those ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberUpdate {
    pub area: Option<BoundingBox>,
    pub points: Vec<PointOfInterest>,
}
