// 🏗️ Entity Assembler - Consolidate clusters into Project Units
// Each final cluster becomes one ProjectUnit owning one Intervention per
// member record. Categorical fields take the most frequent value (ties
// broken by the longest string), coordinates take the member mean.
//
// unit_id is sequential and stable within a run: clusters are assigned
// ids in ascending order of their smallest member index, so the same
// partition always numbers the same way.

use log::warn;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

use crate::cluster::Cluster;
use crate::record::RawRecord;
use crate::spatial::mean_centroid;

// ============================================================================
// INTERVENTION
// ============================================================================

/// One original record, retained as a child of its resolved ProjectUnit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intervention {
    /// `{unit_id}-{NN}`, NN = 1-based position within the unit
    pub intervention_id: String,

    /// Position of the source record in the input batch
    pub source_index: usize,

    /// The record's own (un-consolidated) name
    pub name: String,

    pub intervention_type: String,

    /// The record's own normalized coordinates
    pub lat: Option<f64>,
    pub lon: Option<f64>,

    /// Pass-through attributes, unmodified (budget, dates, contracts...)
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

// ============================================================================
// PROJECT UNIT
// ============================================================================

/// The canonical deduplicated entity for one physical location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectUnit {
    /// Sequential within a run, 1-based
    pub unit_id: u32,

    // Consolidated identity fields
    pub name: String,
    pub detail_name: Option<String>,
    pub address: String,
    pub neighborhood: String,
    pub administrative_zone: String,
    pub equipment_type: String,
    pub category_class: String,

    /// Mean of member coordinates, or null when no member has any
    pub lat: Option<f64>,
    pub lon: Option<f64>,

    /// How the members were grouped (spatial / textual / ...)
    pub grouping_method: String,

    pub intervention_count: usize,
    pub interventions: Vec<Intervention>,
}

impl ProjectUnit {
    /// Content-addressed key over the consolidated identity.
    ///
    /// unit_id itself is run-local; downstream diffing against a prior
    /// run should key on this instead.
    pub fn content_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update(b"|");
        hasher.update(self.detail_name.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"|");
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => {
                hasher.update(format!("{:.6}|{:.6}", lat, lon).as_bytes());
            }
            _ => hasher.update(b"no-coordinates"),
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn summary(&self) -> String {
        format!(
            "Unit {}: {} ({} interventions, {})",
            self.unit_id, self.name, self.intervention_count, self.grouping_method
        )
    }
}

// ============================================================================
// CONSOLIDATION RULES
// ============================================================================

/// Most frequent value; ties broken by the longest string, then
/// lexicographically so the result never depends on member order.
fn consolidate_text<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            *counts.entry(trimmed).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|(va, ca), (vb, cb)| {
        cb.cmp(ca)
            .then(vb.chars().count().cmp(&va.chars().count()))
            .then(va.cmp(vb))
    });

    ranked.first().map(|(v, _)| v.to_string()).unwrap_or_default()
}

/// Consolidate an optional field over the non-null member values
fn consolidate_optional<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Option<String> {
    let consolidated = consolidate_text(values.flatten());
    if consolidated.is_empty() {
        None
    } else {
        Some(consolidated)
    }
}

// ============================================================================
// ASSEMBLY
// ============================================================================

/// Consolidate the final clusters into the unit map.
///
/// Clusters are numbered in ascending order of their smallest member
/// index. A malformed (empty) cluster is skipped with a warning, never a
/// panic.
pub fn assemble_units(clusters: Vec<Cluster>, records: &[RawRecord]) -> BTreeMap<u32, ProjectUnit> {
    let mut ordered: Vec<Cluster> = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        if cluster.is_empty() {
            warn!("Skipping empty {} cluster during assembly", cluster.method.as_str());
            continue;
        }
        ordered.push(cluster);
    }
    ordered.sort_by_key(|c| c.min_member_index());

    let mut units = BTreeMap::new();

    for (position, cluster) in ordered.into_iter().enumerate() {
        let unit_id = (position + 1) as u32;

        let mut member_indices = cluster.member_indices;
        member_indices.sort_unstable();

        let members: Vec<&RawRecord> = member_indices.iter().map(|&i| &records[i]).collect();

        let interventions: Vec<Intervention> = member_indices
            .iter()
            .zip(&members)
            .enumerate()
            .map(|(n, (&source_index, record))| Intervention {
                intervention_id: format!("{}-{:02}", unit_id, n + 1),
                source_index,
                name: record.name.clone(),
                intervention_type: record.intervention_type.clone(),
                lat: record.lat,
                lon: record.lon,
                metadata: record.metadata.clone(),
            })
            .collect();

        let (lat, lon) = match mean_centroid(members.iter().filter_map(|r| r.coordinates())) {
            Some((lat, lon)) => (Some(lat), Some(lon)),
            None => (None, None),
        };

        let unit = ProjectUnit {
            unit_id,
            name: consolidate_text(members.iter().map(|r| r.name.as_str())),
            detail_name: consolidate_optional(members.iter().map(|r| r.detail_name.as_deref())),
            address: consolidate_text(members.iter().map(|r| r.address.as_str())),
            neighborhood: consolidate_text(members.iter().map(|r| r.neighborhood.as_str())),
            administrative_zone: consolidate_text(
                members.iter().map(|r| r.administrative_zone.as_str()),
            ),
            equipment_type: consolidate_text(members.iter().map(|r| r.equipment_type.as_str())),
            category_class: consolidate_text(members.iter().map(|r| r.category_class.as_str())),
            lat,
            lon,
            grouping_method: cluster.method.as_str().to_string(),
            intervention_count: interventions.len(),
            interventions,
        };

        units.insert(unit_id, unit);
    }

    units
}

// ============================================================================
// FLATTENED PROJECTION
// ============================================================================

/// Row-per-Intervention projection for the loading collaborator.
///
/// Each row carries its parent unit's consolidated fields alongside the
/// intervention's own; pass-through metadata travels as one JSON column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatRow {
    pub unit_id: u32,
    pub unit_name: String,
    pub unit_detail_name: Option<String>,
    pub unit_address: String,
    pub neighborhood: String,
    pub administrative_zone: String,
    pub equipment_type: String,
    pub category_class: String,
    pub unit_lat: Option<f64>,
    pub unit_lon: Option<f64>,
    pub grouping_method: String,
    pub intervention_id: String,
    pub intervention_name: String,
    pub intervention_type: String,
    pub source_index: usize,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub metadata_json: String,
}

/// Project the unit map into one row per intervention
pub fn flatten_units(units: &BTreeMap<u32, ProjectUnit>) -> Vec<FlatRow> {
    let mut rows = Vec::new();

    for unit in units.values() {
        for intervention in &unit.interventions {
            let metadata_json = if intervention.metadata.is_empty() {
                String::new()
            } else {
                serde_json::to_string(&intervention.metadata).unwrap_or_default()
            };

            rows.push(FlatRow {
                unit_id: unit.unit_id,
                unit_name: unit.name.clone(),
                unit_detail_name: unit.detail_name.clone(),
                unit_address: unit.address.clone(),
                neighborhood: unit.neighborhood.clone(),
                administrative_zone: unit.administrative_zone.clone(),
                equipment_type: unit.equipment_type.clone(),
                category_class: unit.category_class.clone(),
                unit_lat: unit.lat,
                unit_lon: unit.lon,
                grouping_method: unit.grouping_method.clone(),
                intervention_id: intervention.intervention_id.clone(),
                intervention_name: intervention.name.clone(),
                intervention_type: intervention.intervention_type.clone(),
                source_index: intervention.source_index,
                lat: intervention.lat,
                lon: intervention.lon,
                metadata_json,
            });
        }
    }

    rows
}

// ============================================================================
// TESTS
// ============================================================================
