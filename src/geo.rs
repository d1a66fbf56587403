// 🌐 Coordinate Normalizer - Validate and repair dirty coordinates
// Ordered repair heuristics: accept → sign-flip → decimal-shift,
// then pair-level cross-validation (axis swap) against the bounding region.
//
// Problem solved:
// - "lat=-3.45" in a northern-hemisphere region → hemisphere sign error
// - "lat=345.1" → decimal point dropped during data entry
// - "lat=-76.53, lon=3.45" → latitude and longitude transposed
// - Values no heuristic can place in range are nulled, never kept

use log::debug;
use serde::{Deserialize, Serialize};

/// Earth radius in meters (mean)
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Maximum number of divide-by-10 steps the decimal-shift heuristic tries
const MAX_DECIMAL_SHIFTS: u32 = 3;

// ============================================================================
// BOUNDING REGION
// ============================================================================

/// Rectangular lat/lon region every accepted coordinate must fall inside
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingRegion {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingRegion {
    pub fn contains_lat(&self, lat: f64) -> bool {
        lat.is_finite() && lat >= self.lat_min && lat <= self.lat_max
    }

    pub fn contains_lon(&self, lon: f64) -> bool {
        lon.is_finite() && lon >= self.lon_min && lon <= self.lon_max
    }

    pub fn contains_pair(&self, lat: f64, lon: f64) -> bool {
        self.contains_lat(lat) && self.contains_lon(lon)
    }

    /// Range check for a single axis
    pub fn contains_axis(&self, axis: Axis, value: f64) -> bool {
        match axis {
            Axis::Lat => self.contains_lat(value),
            Axis::Lon => self.contains_lon(value),
        }
    }

    /// Sanity check: min < max on both axes, all bounds finite
    pub fn is_valid(&self) -> bool {
        self.lat_min.is_finite()
            && self.lat_max.is_finite()
            && self.lon_min.is_finite()
            && self.lon_max.is_finite()
            && self.lat_min < self.lat_max
            && self.lon_min < self.lon_max
    }
}

/// Which axis a raw scalar is intended to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Lat,
    Lon,
}

// ============================================================================
// CORRECTION STATS
// ============================================================================

/// Counters for corrected/rejected values.
///
/// Explicit accumulator: created per run, threaded through the normalizer
/// and merged into the run report. Never a module-level global.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectionStats {
    /// Scalars accepted into the output (corrected or unchanged)
    pub accepted: usize,

    /// Scalars fixed by negation (hemisphere sign errors)
    pub sign_flips: usize,

    /// Scalars fixed by dividing by a power of ten
    pub decimal_shifts: usize,

    /// Pairs fixed by swapping latitude and longitude
    pub axis_swaps: usize,

    /// Scalars nulled because no heuristic landed in range
    pub rejected: usize,

    /// Geometry vertices dropped during validation
    pub dropped_vertices: usize,

    /// Whole geometries dropped (too few surviving vertices)
    pub dropped_geometries: usize,

    /// Records that received coordinates from a geometry centroid
    pub centroid_backfills: usize,
}

impl CorrectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total scalars that went through some correction heuristic
    pub fn corrected(&self) -> usize {
        self.sign_flips + self.decimal_shifts
    }

    /// Fold another accumulator into this one
    pub fn merge(&mut self, other: &CorrectionStats) {
        self.accepted += other.accepted;
        self.sign_flips += other.sign_flips;
        self.decimal_shifts += other.decimal_shifts;
        self.axis_swaps += other.axis_swaps;
        self.rejected += other.rejected;
        self.dropped_vertices += other.dropped_vertices;
        self.dropped_geometries += other.dropped_geometries;
        self.centroid_backfills += other.centroid_backfills;
    }

    pub fn summary(&self) -> String {
        format!(
            "accepted: {}, corrected: {} ({} sign, {} shift, {} swap), rejected: {}, vertices dropped: {}, geometries dropped: {}",
            self.accepted,
            self.corrected() + self.axis_swaps,
            self.sign_flips,
            self.decimal_shifts,
            self.axis_swaps,
            self.rejected,
            self.dropped_vertices,
            self.dropped_geometries,
        )
    }
}

// ============================================================================
// SCALAR REPAIR CHAIN
// ============================================================================

/// Which heuristic produced an accepted value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    /// Value was already in range
    None,

    /// Value accepted after negation
    SignFlip,

    /// Value accepted after dividing by 10^k
    DecimalShift,
}

fn keep(value: f64) -> Vec<f64> {
    vec![value]
}

fn sign_flip(value: f64) -> Vec<f64> {
    vec![-value]
}

fn decimal_shifts(value: f64) -> Vec<f64> {
    let mut shifted = value;
    let mut candidates = Vec::with_capacity(MAX_DECIMAL_SHIFTS as usize);
    for _ in 0..MAX_DECIMAL_SHIFTS {
        shifted /= 10.0;
        candidates.push(shifted);
    }
    candidates
}

/// Ordered repair chain. Each step proposes candidate values derived from
/// the raw scalar; the first candidate inside the axis range wins. New
/// heuristics are appended here without touching the acceptance loop.
const REPAIR_CHAIN: &[(Correction, fn(f64) -> Vec<f64>)] = &[
    (Correction::None, keep),
    (Correction::SignFlip, sign_flip),
    (Correction::DecimalShift, decimal_shifts),
];

/// Normalize one raw scalar against its axis range.
///
/// Returns the accepted value and the heuristic that produced it, or None
/// when no heuristic lands in range. Non-finite inputs never match.
pub fn normalize_scalar(value: f64, axis: Axis, region: &BoundingRegion) -> Option<(f64, Correction)> {
    if !value.is_finite() {
        return None;
    }

    for (correction, step) in REPAIR_CHAIN {
        for candidate in step(value) {
            if region.contains_axis(axis, candidate) {
                return Some((candidate, *correction));
            }
        }
    }

    None
}

// ============================================================================
// PAIR CROSS-VALIDATION
// ============================================================================

/// Normalize a raw (lat, lon) pair.
///
/// Each axis is repaired independently, then the pair is checked against
/// the 2D bounding box. If that fails, the raw values are swapped and
/// repaired again - this catches axis-transposition errors. A pair that
/// survives neither path is nulled; the record is NOT discarded.
pub fn normalize_pair(
    raw_lat: Option<f64>,
    raw_lon: Option<f64>,
    region: &BoundingRegion,
    stats: &mut CorrectionStats,
) -> (Option<f64>, Option<f64>) {
    let (raw_lat, raw_lon) = match (raw_lat, raw_lon) {
        (Some(lat), Some(lon)) => (lat, lon),
        (None, None) => return (None, None),
        // A lone axis cannot form a valid pair
        (lat, lon) => {
            stats.rejected += lat.is_some() as usize + lon.is_some() as usize;
            return (None, None);
        }
    };

    // Pass 1: axes as given
    if let Some((lat, lon)) = accept_pair(raw_lat, raw_lon, region, stats) {
        return (Some(lat), Some(lon));
    }

    // Pass 2: axes transposed
    if let Some((lat, lon)) = accept_pair(raw_lon, raw_lat, region, stats) {
        debug!("repaired transposed pair ({}, {}) -> ({}, {})", raw_lat, raw_lon, lat, lon);
        stats.axis_swaps += 1;
        return (Some(lat), Some(lon));
    }

    stats.rejected += 2;
    (None, None)
}

/// Repair both axes and check the combined pair; counters are only bumped
/// when the pair as a whole is accepted.
fn accept_pair(
    raw_lat: f64,
    raw_lon: f64,
    region: &BoundingRegion,
    stats: &mut CorrectionStats,
) -> Option<(f64, f64)> {
    let (lat, lat_fix) = normalize_scalar(raw_lat, Axis::Lat, region)?;
    let (lon, lon_fix) = normalize_scalar(raw_lon, Axis::Lon, region)?;

    if !region.contains_pair(lat, lon) {
        return None;
    }

    stats.accepted += 2;
    for fix in [lat_fix, lon_fix] {
        match fix {
            Correction::None => {}
            Correction::SignFlip => stats.sign_flips += 1,
            Correction::DecimalShift => stats.decimal_shifts += 1,
        }
    }

    Some((lat, lon))
}

// ============================================================================
// GEOMETRY VALIDATION
// ============================================================================

/// Validated line/polygon geometry, vertices as (lat, lon)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    /// Open polyline, >= 2 vertices
    Line(Vec<(f64, f64)>),

    /// Closed ring, first vertex == last vertex, >= 4 vertices
    Ring(Vec<(f64, f64)>),
}

impl Geometry {
    /// Mean of the vertices; the closing vertex of a ring is not counted twice
    pub fn centroid(&self) -> (f64, f64) {
        let vertices = match self {
            Geometry::Line(v) => &v[..],
            Geometry::Ring(v) => &v[..v.len() - 1],
        };
        let n = vertices.len() as f64;
        let (sum_lat, sum_lon) = vertices
            .iter()
            .fold((0.0, 0.0), |(sa, so), (lat, lon)| (sa + lat, so + lon));
        (sum_lat / n, sum_lon / n)
    }

    pub fn vertex_count(&self) -> usize {
        match self {
            Geometry::Line(v) | Geometry::Ring(v) => v.len(),
        }
    }
}

/// Parse a raw JSON vertex list (`[[lon, lat], ...]`, GeoJSON axis order)
pub fn parse_vertices(raw: &str) -> Option<Vec<(f64, f64)>> {
    let parsed: Vec<[f64; 2]> = serde_json::from_str(raw).ok()?;
    if parsed.is_empty() {
        return None;
    }
    // Store internally as (lat, lon)
    Some(parsed.into_iter().map(|[lon, lat]| (lat, lon)).collect())
}

/// Validate every vertex of a geometry, dropping the invalid ones.
///
/// A closed input (first == last raw vertex) must keep >= 4 vertices, an
/// open one >= 2; otherwise the whole geometry is dropped and the record
/// keeps its other attributes.
pub fn validate_geometry(
    raw_vertices: &[(f64, f64)],
    region: &BoundingRegion,
    stats: &mut CorrectionStats,
) -> Option<Geometry> {
    let was_closed = raw_vertices.len() >= 2 && raw_vertices.first() == raw_vertices.last();

    // For a closed ring the duplicated closing vertex is validated once
    let open_vertices = if was_closed {
        &raw_vertices[..raw_vertices.len() - 1]
    } else {
        raw_vertices
    };

    let mut surviving = Vec::with_capacity(open_vertices.len());
    for &(raw_lat, raw_lon) in open_vertices {
        match accept_pair(raw_lat, raw_lon, region, stats) {
            Some(pair) => surviving.push(pair),
            None => stats.dropped_vertices += 1,
        }
    }

    if was_closed {
        // Ring minimum of 4 counts the closing vertex: 3 distinct + closure
        if surviving.len() >= 3 {
            let first = surviving[0];
            surviving.push(first);
            return Some(Geometry::Ring(surviving));
        }
    } else if surviving.len() >= 2 {
        return Some(Geometry::Line(surviving));
    }

    stats.dropped_geometries += 1;
    None
}

// ============================================================================
// GREAT-CIRCLE DISTANCE
// ============================================================================

/// Haversine distance in meters between two (lat, lon) points in degrees
pub fn haversine_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

// ============================================================================
// TESTS
// ============================================================================
