//! # Geo Functions
//!
//! Stateless spatial math behind the partition hierarchy: which partition a
//! point falls in, which partitions cover a viewport, what box a partition
//! covers, and grid clustering of points inside a box.
//!
//! The globe is divided into `2^zoom` equal steps on each axis, so a
//! partition at zoom `z` is `360 / 2^z` degrees wide and `180 / 2^z` high.

use crate::settings::AggregationSettings;
use crate::types::{BoundingBox, Cluster, GeoPoint, PointOfInterest, RegionKey};
use crate::utils::current_timestamp_millis;
use std::collections::HashSet;

/// Modulo that lands in `(0, y]` rather than `[0, y)`.
///
/// Used for spans, where a full turn must stay 360 instead of collapsing to 0.
pub fn mod_positive(x: f64, y: f64) -> f64 {
    let m = x % y;
    if m > 0.0 {
        m
    } else {
        m + y
    }
}

/// The partition containing `point` at `zoom_level`.
///
/// Longitude wraps into `[-180, 180)`, except that exactly 180 stays in the
/// easternmost column; latitude is clamped to the grid, so the returned key
/// always satisfies `0 <= x, y < 2^zoom_level`.
pub fn partition_for_point(point: GeoPoint, zoom_level: u8) -> RegionKey {
    let steps = 1u64 << zoom_level;
    let lng_step = 360.0 / steps as f64;
    let lat_step = 180.0 / steps as f64;

    let x = if point.lng == 180.0 {
        steps - 1
    } else {
        let wrapped = (point.lng + 180.0).rem_euclid(360.0);
        ((wrapped / lng_step).floor() as u64).min(steps - 1)
    };
    let y = ((point.lat + 90.0) / lat_step).floor().max(0.0) as u64;
    let y = y.min(steps - 1);

    RegionKey::new(zoom_level, x as u32, y as u32)
}

/// The exact rectangle a partition covers.
pub fn bounding_box_for_partition(key: &RegionKey) -> BoundingBox {
    let steps = key.axis_steps() as f64;
    let lat_step = 180.0 / steps;
    let lng_step = 360.0 / steps;
    let south = key.y as f64 * lat_step - 90.0;
    let west = key.x as f64 * lng_step - 180.0;

    BoundingBox::new(
        GeoPoint::new(south, west),
        GeoPoint::new(south + lat_step, west + lng_step),
    )
}

/// The partitions a viewport should subscribe to.
///
/// Starts at `max_zoom` and walks towards the root until the rectangle of
/// covering keys fits in `max_subscription_regions`. Level 0 always ends the
/// walk with the single root key, so the result both covers the box and is
/// bounded in size.
pub fn partitions_for_bounding_box(
    bbox: &BoundingBox,
    max_subscription_regions: usize,
    max_zoom: u8,
) -> HashSet<RegionKey> {
    for zoom_level in (1..=max_zoom).rev() {
        if let Some(keys) = partitions_at_zoom_level(bbox, max_subscription_regions, zoom_level) {
            return keys;
        }
    }
    HashSet::from([RegionKey::root()])
}

fn partitions_at_zoom_level(
    bbox: &BoundingBox,
    max_subscription_regions: usize,
    zoom_level: u8,
) -> Option<HashSet<RegionKey>> {
    let steps = 1u64 << zoom_level;
    let lng_step = 360.0 / steps as f64;
    let south_west = partition_for_point(bbox.south_west, zoom_level);
    let north_east = partition_for_point(bbox.north_east, zoom_level);

    let y_length = north_east.y as i64 - south_west.y as i64 + 1;
    if y_length <= 0 {
        // Inverted latitude range; nothing finer than the root covers it.
        return Some(HashSet::from([RegionKey::root()]));
    }

    let raw_width = bbox.north_east.lng - bbox.south_west.lng;
    let east_span = if raw_width >= 360.0 {
        360.0
    } else {
        raw_width.rem_euclid(360.0)
    };
    let x_length = if east_span >= 360.0 || (south_west.x == north_east.x && east_span > lng_step) {
        steps
    } else {
        (north_east.x as i64 - south_west.x as i64).rem_euclid(steps as i64) as u64 + 1
    };

    let count = x_length.saturating_mul(y_length as u64);
    if count > max_subscription_regions as u64 {
        return None;
    }

    let mut keys = HashSet::with_capacity(count as usize);
    for dy in 0..y_length as u64 {
        for dx in 0..x_length {
            keys.insert(RegionKey::new(
                zoom_level,
                ((south_west.x as u64 + dx) % steps) as u32,
                (south_west.y as u64 + dy) as u32,
            ));
        }
    }
    Some(keys)
}

/// Bucket of `point` among `n` equal latitude segments between `south` and `north`.
///
/// Points outside the range fall into bucket 0.
pub fn latitude_segment(n: usize, south: f64, north: f64, point: f64) -> usize {
    let range = north - south;
    if range <= 0.0 {
        return 0;
    }
    let segment = ((point - south) * (n as f64 / range)).floor();
    if segment < 0.0 || segment >= n as f64 {
        0
    } else {
        segment as usize
    }
}

/// Bucket of `point` among `n` equal longitude segments from `west` eastwards to `east`.
///
/// Both the span and the point are measured eastwards from `west` modulo 360,
/// so ranges across the antimeridian work. Points outside fall into bucket 0.
pub fn longitude_segment(n: usize, west: f64, east: f64, point: f64) -> usize {
    let range = match mod_positive(east - west, 360.0) {
        // A full-width box wraps to zero.
        span if span == 0.0 => 360.0,
        span => span,
    };
    let normalized = (point - west).rem_euclid(360.0);
    let segment = (normalized * (n as f64 / range)).floor();
    if segment < 0.0 || segment >= n as f64 {
        0
    } else {
        segment as usize
    }
}

/// Clusters `points` into at most `dimension²` points.
///
/// At or below `threshold` the input comes back untouched. Above it, the box
/// is cut into a `dimension × dimension` grid; a cell holding one point
/// passes it through and a cell holding several becomes one [`Cluster`]
/// at the count-weighted centroid, with id `<id>-<cell>`. Existing clusters
/// contribute their own count, so clustering clustered output keeps the
/// total weight equal to the number of raw sources.
pub fn cluster(
    id: &str,
    bbox: &BoundingBox,
    points: Vec<PointOfInterest>,
    threshold: usize,
    dimension: usize,
) -> Vec<PointOfInterest> {
    if points.len() <= threshold || dimension == 0 {
        return points;
    }

    let south = bbox.south_west.lat;
    let north = bbox.north_east.lat;
    let west = bbox.south_west.lng;
    let east = bbox.north_east.lng;

    let mut cells: Vec<Vec<PointOfInterest>> = vec![Vec::new(); dimension * dimension];
    for point in points {
        let position = point.position();
        let cell = latitude_segment(dimension, south, north, position.lat) * dimension
            + longitude_segment(dimension, west, east, position.lng);
        cells[cell].push(point);
    }

    let timestamp = current_timestamp_millis();
    let mut clustered = Vec::new();
    for (index, mut cell) in cells.into_iter().enumerate() {
        match cell.len() {
            0 => {}
            1 => clustered.extend(cell.pop()),
            _ => {
                let (mut lat_sum, mut lng_sum, mut count) = (0.0, 0.0, 0u32);
                for point in &cell {
                    let weight = point.weight();
                    let position = point.position();
                    lat_sum += position.lat * weight as f64;
                    lng_sum += (position.lng - west).rem_euclid(360.0) * weight as f64;
                    count += weight;
                }
                let mut lng = west + lng_sum / count as f64;
                if lng > 180.0 {
                    lng -= 360.0;
                } else if lng < -180.0 {
                    lng += 360.0;
                }
                clustered.push(PointOfInterest::Cluster(Cluster {
                    id: format!("{id}-{index}"),
                    timestamp,
                    position: GeoPoint::new(lat_sum / count as f64, lng),
                    count,
                }));
            }
        }
    }
    clustered
}

/// The geo functions bound to one node's settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoFunctions {
    max_zoom_depth: u8,
    max_subscription_regions: usize,
    cluster_threshold: usize,
    cluster_dimension: usize,
}

impl GeoFunctions {
    pub fn new(settings: &AggregationSettings) -> Self {
        Self {
            max_zoom_depth: settings.max_zoom_depth,
            max_subscription_regions: settings.max_subscription_regions,
            cluster_threshold: settings.cluster_threshold,
            cluster_dimension: settings.cluster_dimension,
        }
    }

    pub fn max_zoom_depth(&self) -> u8 {
        self.max_zoom_depth
    }

    /// The leaf partition for a point.
    pub fn region_for_point(&self, point: GeoPoint) -> RegionKey {
        partition_for_point(point, self.max_zoom_depth)
    }

    /// The bounded set of partitions covering a viewport.
    pub fn regions_for_bounding_box(&self, bbox: &BoundingBox) -> HashSet<RegionKey> {
        partitions_for_bounding_box(bbox, self.max_subscription_regions, self.max_zoom_depth)
    }

    pub fn bounding_box_for_region(&self, key: &RegionKey) -> BoundingBox {
        bounding_box_for_partition(key)
    }

    pub fn cluster(&self, id: &str, bbox: &BoundingBox, points: Vec<PointOfInterest>) -> Vec<PointOfInterest> {
        cluster(id, bbox, points, self.cluster_threshold, self.cluster_dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawPosition;

    fn sample_points() -> Vec<GeoPoint> {
        let mut points = vec![
            GeoPoint::new(90.0, 180.0),
            GeoPoint::new(-90.0, -180.0),
            GeoPoint::new(90.0, -180.0),
            GeoPoint::new(-90.0, 180.0),
            GeoPoint::new(0.0, 0.0),
        ];
        let mut lat = -89.7;
        while lat < 90.0 {
            let mut lng = -179.9;
            while lng < 180.0 {
                points.push(GeoPoint::new(lat, lng));
                lng += 13.37;
            }
            lat += 7.31;
        }
        points
    }

    fn raw(id: &str, lat: f64, lng: f64) -> PointOfInterest {
        PointOfInterest::RawPosition(RawPosition::new(id, 0, GeoPoint::new(lat, lng)))
    }

    #[test]
    fn partition_for_point_is_stable_and_in_range() {
        for zoom in 0..=16u8 {
            for point in sample_points() {
                let key = partition_for_point(point, zoom);
                assert_eq!(key, partition_for_point(point, zoom));
                assert!(key.is_valid(), "{key} out of range for {point}");
                assert_eq!(key.zoom_level, zoom);
            }
        }
    }

    #[test]
    fn partition_box_contains_its_points() {
        for zoom in 0..=16u8 {
            for point in sample_points() {
                let key = partition_for_point(point, zoom);
                let bbox = bounding_box_for_partition(&key);
                assert!(bbox.contains(&point), "{point} not inside {key} {bbox:?}");
            }
        }
    }

    #[test]
    fn root_partition_covers_the_globe() {
        let bbox = bounding_box_for_partition(&RegionKey::root());
        assert_eq!(bbox.south_west, GeoPoint::new(-90.0, -180.0));
        assert_eq!(bbox.north_east, GeoPoint::new(90.0, 180.0));
    }

    #[test]
    fn partition_math_matches_known_cells() {
        // zoom 3: 45° columns, 22.5° rows
        assert_eq!(partition_for_point(GeoPoint::new(10.0, 10.0), 3), RegionKey::new(3, 4, 4));
        assert_eq!(partition_for_point(GeoPoint::new(-89.0, -179.0), 3), RegionKey::new(3, 0, 0));
        assert_eq!(partition_for_point(GeoPoint::new(0.0, 180.0), 3), RegionKey::new(3, 7, 4));
        // longitudes past the antimeridian wrap
        assert_eq!(partition_for_point(GeoPoint::new(0.0, 190.0), 3), RegionKey::new(3, 0, 4));
    }

    #[test]
    fn viewport_inside_grid_returns_exact_rectangle() {
        let bbox = BoundingBox::new(GeoPoint::new(-89.0, -179.0), GeoPoint::new(-23.5, -1.0));
        let keys = partitions_for_bounding_box(&bbox, 20, 3);
        assert_eq!(keys.len(), 12);
        for x in 0..4 {
            for y in 0..3 {
                assert!(keys.contains(&RegionKey::new(3, x, y)));
            }
        }
    }

    #[test]
    fn viewport_across_antimeridian_wraps_columns() {
        let bbox = BoundingBox::new(GeoPoint::new(1.0, 170.0), GeoPoint::new(2.0, -170.0));
        let keys = partitions_for_bounding_box(&bbox, 20, 3);
        assert_eq!(
            keys,
            HashSet::from([RegionKey::new(3, 7, 4), RegionKey::new(3, 0, 4)])
        );
    }

    #[test]
    fn oversized_viewport_falls_back_to_shallower_levels() {
        let bbox = BoundingBox::new(GeoPoint::new(-80.0, -170.0), GeoPoint::new(80.0, 170.0));
        let keys = partitions_for_bounding_box(&bbox, 4, 10);
        assert!(keys.len() <= 4);
        assert!(keys.iter().all(|k| k.zoom_level <= 1));

        let none_allowed = partitions_for_bounding_box(&bbox, 0, 10);
        assert_eq!(none_allowed, HashSet::from([RegionKey::root()]));
    }

    #[test]
    fn inverted_latitude_falls_back_to_root() {
        let bbox = BoundingBox::new(GeoPoint::new(40.0, 0.0), GeoPoint::new(10.0, 5.0));
        assert_eq!(partitions_for_bounding_box(&bbox, 20, 8), HashSet::from([RegionKey::root()]));
    }

    #[test]
    fn viewport_cover_is_bounded_and_complete() {
        let boxes = [
            BoundingBox::new(GeoPoint::new(51.3, -0.5), GeoPoint::new(51.7, 0.3)),
            BoundingBox::new(GeoPoint::new(-45.0, 160.0), GeoPoint::new(-30.0, -150.0)),
            BoundingBox::new(GeoPoint::new(-10.0, 179.5), GeoPoint::new(10.0, -179.5)),
            BoundingBox::new(GeoPoint::new(-90.0, -180.0), GeoPoint::new(90.0, 180.0)),
            BoundingBox::new(GeoPoint::new(0.0, 10.0), GeoPoint::new(5.0, 5.0)),
            BoundingBox::new(GeoPoint::new(30.0, 100.0), GeoPoint::new(30.5, 100.5)),
        ];
        for bbox in &boxes {
            for max_regions in [1usize, 4, 20, 64] {
                let keys = partitions_for_bounding_box(bbox, max_regions, 12);
                assert!(keys.len() <= max_regions.max(1));
                let zoom = keys.iter().next().map(|k| k.zoom_level).unwrap_or(0);
                assert!(keys.iter().all(|k| k.zoom_level == zoom));

                let span = mod_positive(bbox.north_east.lng - bbox.south_west.lng, 360.0);
                for i in 0..=20 {
                    for j in 0..=20 {
                        let lat = bbox.south_west.lat
                            + (bbox.north_east.lat - bbox.south_west.lat) * i as f64 / 20.0;
                        let lng = bbox.south_west.lng + span * j as f64 / 20.0;
                        let sample = GeoPoint::new(lat, lng);
                        let owner = partition_for_point(sample, zoom);
                        assert!(
                            keys.contains(&owner),
                            "{sample} ({owner}) not covered for {bbox:?} at max {max_regions}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn cluster_is_identity_below_threshold() {
        let bbox = bounding_box_for_partition(&RegionKey::new(2, 1, 1));
        let points = vec![raw("a", -40.0, -80.0), raw("b", -30.0, -70.0)];
        assert_eq!(cluster("region-2-1-1", &bbox, points.clone(), 2, 4), points);
    }

    #[test]
    fn two_hundred_points_cluster_into_at_most_sixteen() {
        let key = RegionKey::new(4, 8, 8);
        let bbox = bounding_box_for_partition(&key);
        let lat_span = bbox.north_east.lat - bbox.south_west.lat;
        let lng_span = bbox.north_east.lng - bbox.south_west.lng;
        let points: Vec<PointOfInterest> = (0..200)
            .map(|i| {
                let lat = bbox.south_west.lat + lat_span * ((i % 20) as f64 + 0.5) / 20.0;
                let lng = bbox.south_west.lng + lng_span * ((i / 20) as f64 + 0.5) / 10.0;
                raw(&format!("u{i}"), lat, lng)
            })
            .collect();

        let clustered = cluster(&key.name(), &bbox, points, 100, 4);
        assert!(clustered.len() <= 16);
        let total: u32 = clustered.iter().map(|p| p.weight()).sum();
        assert_eq!(total, 200);
        assert!(clustered.iter().all(|p| bbox.contains(&p.position())));

        // Re-clustering already clustered output keeps the weight
        let again = cluster(&key.name(), &bbox, clustered, 1, 2);
        assert!(again.len() <= 4);
        assert_eq!(again.iter().map(|p| p.weight()).sum::<u32>(), 200);
    }

    #[test]
    fn cluster_centroid_is_count_weighted() {
        let bbox = bounding_box_for_partition(&RegionKey::root());
        let heavy = PointOfInterest::Cluster(Cluster {
            id: "c".to_string(),
            timestamp: 0,
            position: GeoPoint::new(10.0, 10.0),
            count: 3,
        });
        let light = raw("r", 20.0, 30.0);
        let clustered = cluster("root", &bbox, vec![heavy, light], 1, 1);
        assert_eq!(clustered.len(), 1);
        match &clustered[0] {
            PointOfInterest::Cluster(c) => {
                assert_eq!(c.id, "root-0");
                assert_eq!(c.count, 4);
                assert!((c.position.lat - 12.5).abs() < 1e-9);
                assert!((c.position.lng - 15.0).abs() < 1e-9);
            }
            other => panic!("expected a cluster, got {other:?}"),
        }
    }

    #[test]
    fn cluster_cells_hold_single_points_unchanged() {
        let key = RegionKey::new(1, 0, 0);
        let bbox = bounding_box_for_partition(&key);
        // Two far apart points, threshold 1 forces clustering
        let a = raw("a", -80.0, -170.0);
        let b = raw("b", -5.0, -5.0);
        let clustered = cluster(&key.name(), &bbox, vec![a.clone(), b.clone()], 1, 4);
        assert_eq!(clustered, vec![a, b]);
    }

    #[test]
    fn segments_wrap_and_default_to_zero() {
        assert_eq!(longitude_segment(4, 170.0, -170.0, 175.0), 1);
        assert_eq!(longitude_segment(4, 170.0, -170.0, -175.0), 3);
        assert_eq!(longitude_segment(4, -180.0, 180.0, -180.0), 0);
        assert_eq!(longitude_segment(4, -180.0, 180.0, 90.0), 3);
        assert_eq!(longitude_segment(4, 0.0, 10.0, 50.0), 0);
        assert_eq!(latitude_segment(4, 0.0, 40.0, 35.0), 3);
        assert_eq!(latitude_segment(4, 0.0, 40.0, 40.0), 0);
        assert_eq!(latitude_segment(4, 0.0, 40.0, -1.0), 0);
    }

    #[test]
    fn centroid_near_the_antimeridian_stays_in_partition() {
        let key = RegionKey::new(3, 7, 4);
        let bbox = bounding_box_for_partition(&key);
        let clustered = cluster(
            &key.name(),
            &bbox,
            vec![raw("a", 1.0, 179.0), raw("b", 1.0, 180.0), raw("c", 1.0, 179.5)],
            1,
            1,
        );
        assert_eq!(clustered.len(), 1);
        assert!((clustered[0].position().lng - 179.5).abs() < 1e-9);
    }

    #[test]
    fn geo_functions_use_settings() {
        let settings = AggregationSettings {
            max_zoom_depth: 5,
            ..AggregationSettings::default()
        };
        let geo = GeoFunctions::new(&settings);
        assert_eq!(geo.region_for_point(GeoPoint::new(10.0, 10.0)).zoom_level, 5);
        assert_eq!(geo.max_zoom_depth(), 5);
    }
}
