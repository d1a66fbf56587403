// 📋 Raw Records - Input rows from the extraction collaborator
// One RawRecord per source row; many rows may describe the same physical
// project (one row per contract, budget line, or reporting period).
//
// Grouping decisions only ever read the identity fields (name, detail
// name, address, category, coordinates). Everything else rides along in
// the metadata map and is never consulted.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::config::EngineConfig;
use crate::geo::{parse_vertices, validate_geometry, CorrectionStats, Geometry};

/// One input row with extensible pass-through metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    // ========================================================================
    // IDENTITY FIELDS (used for grouping)
    // ========================================================================
    #[serde(rename = "Name")]
    pub name: String,

    /// Distinguishes co-located sub-sites sharing a name ("Main" vs "Annex")
    #[serde(rename = "Detail_Name", default)]
    #[serde(deserialize_with = "empty_as_none")]
    pub detail_name: Option<String>,

    #[serde(rename = "Address", default)]
    pub address: String,

    #[serde(rename = "Neighborhood", default)]
    pub neighborhood: String,

    #[serde(rename = "Administrative_Zone", default)]
    pub administrative_zone: String,

    #[serde(rename = "Category_Class", default)]
    pub category_class: String,

    #[serde(rename = "Equipment_Type", default)]
    pub equipment_type: String,

    #[serde(rename = "Intervention_Type", default)]
    pub intervention_type: String,

    // ========================================================================
    // LOCATION FIELDS (normalized in place by the coordinate normalizer)
    // ========================================================================
    #[serde(rename = "Lat", default)]
    pub lat: Option<f64>,

    #[serde(rename = "Lon", default)]
    pub lon: Option<f64>,

    /// Optional JSON vertex list (`[[lon, lat], ...]`) for line/polygon rows
    #[serde(rename = "Geometry", default)]
    #[serde(deserialize_with = "empty_as_none")]
    pub geometry_raw: Option<String>,

    // ========================================================================
    // DERIVED FIELDS (set during normalization, never read from input)
    // ========================================================================
    /// True for categories that must never merge (e.g. individual subsidies).
    /// Derived from the configured exclusion-category list.
    #[serde(skip)]
    pub exclusion_flag: bool,

    /// Validated geometry, if the row carried one that survived validation
    #[serde(skip)]
    pub geometry: Option<Geometry>,

    // ========================================================================
    // PASS-THROUGH METADATA (budget, dates, status, contract refs...)
    // ========================================================================
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Deserialize empty strings as None
fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

impl RawRecord {
    /// Both coordinates present after normalization
    pub fn is_geolocated(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }

    /// Coordinate pair, if complete
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

// ============================================================================
// CSV LOADING
// ============================================================================

/// Load raw records from a CSV export of the extraction collaborator
pub fn load_csv(csv_path: &Path) -> Result<Vec<RawRecord>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open records CSV: {:?}", csv_path))?;

    let mut records = Vec::new();

    for result in rdr.deserialize() {
        let record: RawRecord = result.context("Failed to deserialize record")?;
        records.push(record);
    }

    Ok(records)
}

// ============================================================================
// BATCH NORMALIZATION
// ============================================================================

/// Normalize a whole batch in place.
///
/// Per record: flag excluded categories, repair/validate the coordinate
/// pair, validate any geometry, and backfill missing coordinates from the
/// geometry centroid. Pure with respect to the batch: same input and
/// config always produce the same output and the same counters.
pub fn normalize_batch(records: &mut [RawRecord], config: &EngineConfig) -> CorrectionStats {
    let mut stats = CorrectionStats::new();
    let region = &config.bounding_region;

    for record in records.iter_mut() {
        record.exclusion_flag = config.is_excluded_category(&record.category_class);

        let (lat, lon) = crate::geo::normalize_pair(record.lat, record.lon, region, &mut stats);
        record.lat = lat;
        record.lon = lon;

        record.geometry = record
            .geometry_raw
            .as_deref()
            .and_then(parse_vertices)
            .and_then(|vertices| validate_geometry(&vertices, region, &mut stats));

        // A feature geometry locates the record when the point pair is gone
        if !record.is_geolocated() {
            if let Some(geometry) = &record.geometry {
                let (lat, lon) = geometry.centroid();
                if region.contains_pair(lat, lon) {
                    record.lat = Some(lat);
                    record.lon = Some(lon);
                    stats.centroid_backfills += 1;
                }
            }
        }
    }

    stats
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::config::tests::create_test_config;

    pub fn create_test_record(name: &str, lat: Option<f64>, lon: Option<f64>) -> RawRecord {
        RawRecord {
            name: name.to_string(),
            detail_name: None,
            address: "Calle 5 # 10-20".to_string(),
            neighborhood: "San Antonio".to_string(),
            administrative_zone: "Comuna 3".to_string(),
            category_class: "Educación".to_string(),
            equipment_type: "Colegio".to_string(),
            intervention_type: "Mantenimiento".to_string(),
            lat,
            lon,
            geometry_raw: None,
            exclusion_flag: false,
            geometry: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_normalize_batch_repairs_and_flags() {
        let config = create_test_config();
        let mut records = vec![
            create_test_record("Colegio San José", Some(-3.45), Some(76.53)),
            create_test_record("Subsidio Individual", Some(3.50), Some(-76.50)),
            create_test_record("Parque del Río", Some(55.0), Some(120.0)),
        ];
        records[1].category_class = "Subsidio".to_string();

        let stats = normalize_batch(&mut records, &config);

        // Sign errors repaired
        assert_eq!(records[0].coordinates(), Some((3.45, -76.53)));
        // Exclusion category flagged
        assert!(records[1].exclusion_flag);
        assert!(!records[0].exclusion_flag);
        // Unrepairable pair nulled, record kept
        assert_eq!(records[2].coordinates(), None);
        assert_eq!(records[2].name, "Parque del Río");

        assert_eq!(stats.sign_flips, 2);
        assert_eq!(stats.rejected, 2);
    }

    #[test]
    fn test_normalize_batch_backfills_from_geometry() {
        let config = create_test_config();
        let mut record = create_test_record("Vía Pance", None, None);
        record.geometry_raw = Some("[[-76.50, 3.40], [-76.52, 3.42]]".to_string());

        let stats = normalize_batch(std::slice::from_mut(&mut record), &config);

        assert!(record.geometry.is_some());
        let (lat, lon) = record.coordinates().unwrap();
        assert!((lat - 3.41).abs() < 1e-9);
        assert!((lon - (-76.51)).abs() < 1e-9);
        assert_eq!(stats.centroid_backfills, 1);
    }

    #[test]
    fn test_normalize_batch_drops_degenerate_geometry() {
        let config = create_test_config();
        let mut record = create_test_record("Vía Rota", None, None);
        // Only one valid vertex survives - not a line
        record.geometry_raw = Some("[[-76.50, 3.40], [120.0, 55.0]]".to_string());

        let stats = normalize_batch(std::slice::from_mut(&mut record), &config);

        assert!(record.geometry.is_none());
        assert_eq!(record.coordinates(), None);
        assert_eq!(stats.dropped_geometries, 1);
        // Record itself survives with its attributes
        assert_eq!(record.name, "Vía Rota");
    }

    #[test]
    fn test_point_pair_wins_over_geometry() {
        let config = create_test_config();
        let mut record = create_test_record("Polideportivo", Some(3.45), Some(-76.53));
        record.geometry_raw = Some("[[-76.60, 3.30], [-76.61, 3.31]]".to_string());

        normalize_batch(std::slice::from_mut(&mut record), &config);

        // Existing valid pair is kept, not overwritten by the centroid
        assert_eq!(record.coordinates(), Some((3.45, -76.53)));
    }
}
