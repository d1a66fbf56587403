// 🏛️ Consolidation Engine - Raw records in, Project Units out
// Orchestrates the full pass: normalize coordinates → partition →
// spatial + textual clustering → detail-name refinement → assembly.
//
// No error in here is fatal to the batch. A failing clusterer degrades
// to deterministic exact-key grouping for its subset only; the worst
// outcome is more, smaller units - never a crash, never a lost record.

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::assemble::{assemble_units, flatten_units, FlatRow, ProjectUnit};
use crate::cluster::{refine_clusters, Cluster, ClusterMethod};
use crate::config::EngineConfig;
use crate::geo::CorrectionStats;
use crate::partition::partition_records;
use crate::record::{normalize_batch, RawRecord};
use crate::spatial::SpatialClusterer;
use crate::textual::{NameNormalizer, TextualClusterer};

// ============================================================================
// RUN REPORT
// ============================================================================

/// Observability summary for one engine run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Fresh id per run (units keep run-local sequential ids)
    pub run_id: String,

    pub completed_at: DateTime<Utc>,

    pub input_count: usize,
    pub unit_count: usize,
    pub intervention_count: usize,

    // Partition sizes
    pub excluded_count: usize,
    pub geolocated_count: usize,
    pub non_geolocated_count: usize,

    // Cluster counts before refinement
    pub spatial_cluster_count: usize,
    pub textual_cluster_count: usize,

    /// True when the spatial/textual clusterer failed and its subset was
    /// grouped by the exact-key fallback instead
    pub fallback_spatial: bool,
    pub fallback_textual: bool,

    pub coordinate_stats: CorrectionStats,
}

impl RunReport {
    pub fn summary(&self) -> String {
        format!(
            "Run {}: {} records -> {} units / {} interventions ({} excluded, {} geolocated, {} textual){}",
            self.run_id,
            self.input_count,
            self.unit_count,
            self.intervention_count,
            self.excluded_count,
            self.geolocated_count,
            self.non_geolocated_count,
            if self.fallback_spatial || self.fallback_textual {
                " [fallback grouping active]"
            } else {
                ""
            }
        )
    }
}

/// Everything a run produces
#[derive(Debug, Clone)]
pub struct ConsolidationOutput {
    /// unit_id -> ProjectUnit, ascending
    pub units: BTreeMap<u32, ProjectUnit>,

    /// Row-per-Intervention projection for the loading collaborator
    pub flat_rows: Vec<FlatRow>,

    pub report: RunReport,
}

// ============================================================================
// CONSOLIDATION ENGINE
// ============================================================================

pub struct ConsolidationEngine {
    config: EngineConfig,
}

impl ConsolidationEngine {
    /// Build an engine from a validated configuration.
    ///
    /// Only structural config problems fail here; pathological radius or
    /// threshold values surface later as per-subset fallbacks.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(ConsolidationEngine { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the whole pipeline over one batch.
    ///
    /// Pure with respect to input and configuration: the same batch and
    /// config always yield the same cluster membership (unit numbering
    /// included).
    pub fn run(&self, mut records: Vec<RawRecord>) -> ConsolidationOutput {
        let normalizer = NameNormalizer::new(&self.config.name_stopwords);

        // 1. Coordinate normalization
        let coordinate_stats = normalize_batch(&mut records, &self.config);
        info!("Coordinates: {}", coordinate_stats.summary());

        // 2. Partition
        let partition = partition_records(&records);
        info!(
            "Partition: {} excluded, {} geolocated, {} non-geolocated",
            partition.excluded.len(),
            partition.geolocated.len(),
            partition.non_geolocated.len(),
        );

        let mut clusters: Vec<Cluster> = Vec::new();

        // Excluded records bypass clustering entirely
        for &index in &partition.excluded {
            clusters.push(Cluster::excluded_singleton(index, &records[index]));
        }

        // 3. Spatial clustering (geolocated subset)
        let spatial = SpatialClusterer::new(self.config.spatial_radius_m);
        let mut fallback_spatial = false;
        let spatial_clusters = match spatial.cluster(&records, &partition.geolocated) {
            Ok(found) => found,
            Err(err) => {
                warn!("Spatial clustering failed ({}), using exact-key fallback", err);
                fallback_spatial = true;
                exact_key_fallback(&records, &partition.geolocated, &normalizer)
            }
        };
        let spatial_cluster_count = spatial_clusters.len();
        clusters.extend(spatial_clusters);

        // 4. Textual clustering (non-geolocated subset)
        let textual = TextualClusterer::new(
            self.config.textual_similarity_threshold,
            &self.config.name_stopwords,
        );
        let mut fallback_textual = false;
        let textual_clusters = match textual.cluster(&records, &partition.non_geolocated) {
            Ok(found) => found,
            Err(err) => {
                warn!("Textual clustering failed ({}), using exact-key fallback", err);
                fallback_textual = true;
                exact_key_fallback(&records, &partition.non_geolocated, &normalizer)
            }
        };
        let textual_cluster_count = textual_clusters.len();
        clusters.extend(textual_clusters);

        // 5. Detail-name refinement
        let refined = refine_clusters(clusters, &records, &normalizer);

        // 6. Assembly
        let units = assemble_units(refined, &records);
        let flat_rows = flatten_units(&units);

        let report = RunReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            completed_at: Utc::now(),
            input_count: records.len(),
            unit_count: units.len(),
            intervention_count: units.values().map(|u| u.intervention_count).sum(),
            excluded_count: partition.excluded.len(),
            geolocated_count: partition.geolocated.len(),
            non_geolocated_count: partition.non_geolocated.len(),
            spatial_cluster_count,
            textual_cluster_count,
            fallback_spatial,
            fallback_textual,
            coordinate_stats,
        };
        info!("{}", report.summary());

        ConsolidationOutput {
            units,
            flat_rows,
            report,
        }
    }
}

// ============================================================================
// EXACT-KEY FALLBACK
// ============================================================================

/// Deterministic grouping by exact `(normalized name, address)` key.
///
/// Used when a clusterer fails for its subset; degraded grouping quality
/// (more, smaller units) is acceptable, aborting the batch is not.
fn exact_key_fallback(
    records: &[RawRecord],
    indices: &[usize],
    normalizer: &NameNormalizer,
) -> Vec<Cluster> {
    let mut groups: HashMap<(String, String), Vec<usize>> = HashMap::new();
    let mut key_order: Vec<(String, String)> = Vec::new();

    for &index in indices {
        let record = &records[index];
        let key = (
            normalizer.normalize(&record.name),
            record.address.trim().to_lowercase(),
        );
        if !groups.contains_key(&key) {
            key_order.push(key.clone());
        }
        groups.entry(key).or_default().push(index);
    }

    key_order
        .into_iter()
        .map(|key| {
            let members = groups.remove(&key).unwrap_or_default();
            Cluster::new(members, ClusterMethod::Fallback, None)
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
