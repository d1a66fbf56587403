// 📍 Spatial Clusterer - Density grouping of geolocated records
// R-tree pre-filter in degree space, haversine confirmation in meters,
// union-find over the within-radius graph. min_samples = 1: a point with
// no neighbor inside the radius becomes its own valid singleton cluster,
// never "noise" to discard.

use anyhow::{bail, Result};
use rstar::{RTree, RTreeObject, AABB};

use crate::cluster::{Cluster, ClusterMethod};
use crate::geo::haversine_distance;
use crate::record::RawRecord;
use crate::union_find::UnionFind;

/// Meters per degree of latitude (and of longitude at the equator)
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Envelope padding factor: the degree-space box is a rectangle around a
/// great-circle disc, so pad it slightly and let haversine decide
const ENVELOPE_SLACK: f64 = 1.1;

/// One geolocated record inside the R-tree, keyed by subset position
#[derive(Debug, Clone)]
struct IndexedPoint {
    pos: usize,
    lat: f64,
    lon: f64,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lon, self.lat])
    }
}

// ============================================================================
// SPATIAL CLUSTERER
// ============================================================================

pub struct SpatialClusterer {
    /// Neighborhood radius in meters
    pub radius_m: f64,
}

impl SpatialClusterer {
    pub fn new(radius_m: f64) -> Self {
        SpatialClusterer { radius_m }
    }

    /// Cluster the geolocated subset by great-circle proximity.
    ///
    /// `indices` are positions into the full batch; every referenced
    /// record must carry a coordinate pair. Errors (bad radius, broken
    /// coordinates) are reported, not panicked, so the engine can fall
    /// back to exact-key grouping.
    pub fn cluster(&self, records: &[RawRecord], indices: &[usize]) -> Result<Vec<Cluster>> {
        if !self.radius_m.is_finite() || self.radius_m <= 0.0 {
            bail!("Spatial radius must be a positive number of meters, got {}", self.radius_m);
        }

        if indices.is_empty() {
            return Ok(Vec::new());
        }

        let mut points = Vec::with_capacity(indices.len());
        for (pos, &index) in indices.iter().enumerate() {
            let Some((lat, lon)) = records[index].coordinates() else {
                bail!("Record {} reached the spatial clusterer without coordinates", index);
            };
            if !lat.is_finite() || !lon.is_finite() {
                bail!("Record {} has a non-finite coordinate pair", index);
            }
            points.push(IndexedPoint { pos, lat, lon });
        }

        let tree = RTree::bulk_load(points.clone());
        let mut uf = UnionFind::new(indices.len());

        for point in &points {
            let envelope = self.search_envelope(point);
            for neighbor in tree.locate_in_envelope_intersecting(&envelope) {
                // Each unordered pair is checked once
                if neighbor.pos <= point.pos {
                    continue;
                }
                let distance =
                    haversine_distance((point.lat, point.lon), (neighbor.lat, neighbor.lon));
                if distance <= self.radius_m {
                    uf.union(point.pos, neighbor.pos);
                }
            }
        }

        let clusters = uf
            .groups()
            .into_iter()
            .map(|positions| {
                let members: Vec<usize> = positions.iter().map(|&pos| indices[pos]).collect();
                let centroid = mean_centroid(positions.iter().map(|&pos| {
                    let p = &points[pos];
                    (p.lat, p.lon)
                }));
                Cluster::new(members, ClusterMethod::Spatial, centroid)
            })
            .collect();

        Ok(clusters)
    }

    /// Degree-space box guaranteed to contain the metric radius disc
    fn search_envelope(&self, point: &IndexedPoint) -> AABB<[f64; 2]> {
        let lat_pad = self.radius_m / METERS_PER_DEGREE * ENVELOPE_SLACK;
        // Longitude degrees shrink with latitude
        let lon_scale = point.lat.to_radians().cos().max(0.01);
        let lon_pad = self.radius_m / (METERS_PER_DEGREE * lon_scale) * ENVELOPE_SLACK;

        AABB::from_corners(
            [point.lon - lon_pad, point.lat - lat_pad],
            [point.lon + lon_pad, point.lat + lat_pad],
        )
    }
}

/// Arithmetic mean of (lat, lon) pairs; None for an empty iterator
pub fn mean_centroid(pairs: impl Iterator<Item = (f64, f64)>) -> Option<(f64, f64)> {
    let mut count = 0usize;
    let mut sum = (0.0, 0.0);
    for (lat, lon) in pairs {
        sum.0 += lat;
        sum.1 += lon;
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some((sum.0 / count as f64, sum.1 / count as f64))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::create_test_record;

    /// Degrees of latitude spanning the given meters
    fn lat_offset(meters: f64) -> f64 {
        meters / METERS_PER_DEGREE
    }

    #[test]
    fn test_nearby_points_cluster_together() {
        let records = vec![
            create_test_record("Colegio A", Some(3.45), Some(-76.53)),
            create_test_record("Colegio A", Some(3.45 + lat_offset(10.0)), Some(-76.53)),
        ];

        let clusters = SpatialClusterer::new(20.0)
            .cluster(&records, &[0, 1])
            .unwrap();

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_indices, vec![0, 1]);
        assert_eq!(clusters[0].method, ClusterMethod::Spatial);
    }

    #[test]
    fn test_distant_points_stay_apart() {
        // Two facilities across the street: 50 m > 20 m radius
        let records = vec![
            create_test_record("Colegio A", Some(3.45), Some(-76.53)),
            create_test_record("Colegio B", Some(3.45 + lat_offset(50.0)), Some(-76.53)),
        ];

        let clusters = SpatialClusterer::new(20.0)
            .cluster(&records, &[0, 1])
            .unwrap();

        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_density_chain_merges() {
        // A-B and B-C are 15 m apart; A-C is 30 m. Density clustering
        // still yields a single cluster through the chain.
        let records = vec![
            create_test_record("P", Some(3.45), Some(-76.53)),
            create_test_record("P", Some(3.45 + lat_offset(15.0)), Some(-76.53)),
            create_test_record("P", Some(3.45 + lat_offset(30.0)), Some(-76.53)),
        ];

        let clusters = SpatialClusterer::new(20.0)
            .cluster(&records, &[0, 1, 2])
            .unwrap();

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_isolated_point_is_a_singleton_cluster() {
        let records = vec![
            create_test_record("A", Some(3.40), Some(-76.50)),
            create_test_record("B", Some(3.60), Some(-76.70)),
        ];

        let clusters = SpatialClusterer::new(20.0)
            .cluster(&records, &[0, 1])
            .unwrap();

        // Noise is never discarded
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.len() == 1));
    }

    #[test]
    fn test_centroid_is_member_mean() {
        let records = vec![
            create_test_record("A", Some(3.4500), Some(-76.5300)),
            create_test_record("A", Some(3.4501), Some(-76.5301)),
        ];

        let clusters = SpatialClusterer::new(20.0)
            .cluster(&records, &[0, 1])
            .unwrap();

        let (lat, lon) = clusters[0].centroid.unwrap();
        assert!((lat - 3.45005).abs() < 1e-9);
        assert!((lon - (-76.53005)).abs() < 1e-9);
    }

    #[test]
    fn test_bad_radius_is_an_error() {
        let records = vec![create_test_record("A", Some(3.45), Some(-76.53))];

        assert!(SpatialClusterer::new(0.0).cluster(&records, &[0]).is_err());
        assert!(SpatialClusterer::new(-5.0).cluster(&records, &[0]).is_err());
        assert!(SpatialClusterer::new(f64::NAN).cluster(&records, &[0]).is_err());
    }

    #[test]
    fn test_record_without_coordinates_is_an_error() {
        let records = vec![create_test_record("A", None, None)];
        assert!(SpatialClusterer::new(20.0).cluster(&records, &[0]).is_err());
    }

    #[test]
    fn test_empty_subset_is_fine() {
        let clusters = SpatialClusterer::new(20.0).cluster(&[], &[]).unwrap();
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_mean_centroid_empty() {
        assert_eq!(mean_centroid(std::iter::empty()), None);
    }
}
