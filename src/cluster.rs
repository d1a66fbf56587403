// 🧩 Clusters - Working structure between clustering and assembly
// A Cluster is a transient set of record indices plus how they were
// grouped. The refiner splits any cluster mixing distinct sub-site
// identities before the assembler consolidates it into a ProjectUnit.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::record::RawRecord;
use crate::textual::NameNormalizer;

// ============================================================================
// CLUSTER
// ============================================================================

/// Which signal grouped the members together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterMethod {
    /// Great-circle proximity of coordinate pairs
    Spatial,

    /// Normalized-name similarity
    Textual,

    /// Exclusion category: always a one-member cluster
    ExcludedSingleton,

    /// Exact-key grouping after a clusterer failure
    Fallback,
}

impl ClusterMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterMethod::Spatial => "spatial",
            ClusterMethod::Textual => "textual",
            ClusterMethod::ExcludedSingleton => "excluded-singleton",
            ClusterMethod::Fallback => "fallback",
        }
    }
}

/// Transient grouping of records, destroyed during assembly
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Indices into the input batch, ascending
    pub member_indices: Vec<usize>,

    pub method: ClusterMethod,

    /// Mean (lat, lon) of the members, when spatially grouped
    pub centroid: Option<(f64, f64)>,
}

impl Cluster {
    pub fn new(member_indices: Vec<usize>, method: ClusterMethod, centroid: Option<(f64, f64)>) -> Self {
        Cluster {
            member_indices,
            method,
            centroid,
        }
    }

    /// One-member cluster for an excluded record
    pub fn excluded_singleton(index: usize, record: &RawRecord) -> Self {
        Cluster {
            member_indices: vec![index],
            method: ClusterMethod::ExcludedSingleton,
            centroid: record.coordinates(),
        }
    }

    pub fn len(&self) -> usize {
        self.member_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_indices.is_empty()
    }

    /// Smallest member index; drives deterministic unit ordering
    pub fn min_member_index(&self) -> Option<usize> {
        self.member_indices.iter().copied().min()
    }
}

// ============================================================================
// CLUSTER REFINER
// ============================================================================

/// Split clusters that mix distinct `(normalized_name, detail_name)` pairs.
///
/// Two sites of the same institution 10 m apart with detail names "Main"
/// and "Annex" would pass the spatial check as one cluster; this pass
/// guarantees they end up in different units. Excluded singletons pass
/// through untouched.
pub fn refine_clusters(
    clusters: Vec<Cluster>,
    records: &[RawRecord],
    normalizer: &NameNormalizer,
) -> Vec<Cluster> {
    let mut refined = Vec::with_capacity(clusters.len());

    for cluster in clusters {
        if cluster.method == ClusterMethod::ExcludedSingleton || cluster.len() <= 1 {
            refined.push(cluster);
            continue;
        }

        let parts = split_by_identity(&cluster, records, normalizer);
        if parts.len() > 1 {
            debug!(
                "refined {} cluster of {} members into {} identity groups",
                cluster.method.as_str(),
                cluster.len(),
                parts.len(),
            );
        }
        refined.extend(parts);
    }

    refined
}

/// Partition one cluster by sub-site identity, preserving member order.
/// Sub-clusters inherit the parent's method and centroid.
fn split_by_identity(
    cluster: &Cluster,
    records: &[RawRecord],
    normalizer: &NameNormalizer,
) -> Vec<Cluster> {
    let mut groups: HashMap<(String, Option<String>), Vec<usize>> = HashMap::new();
    let mut key_order: Vec<(String, Option<String>)> = Vec::new();

    for &index in &cluster.member_indices {
        let record = &records[index];
        let key = (
            normalizer.normalize(&record.name),
            record
                .detail_name
                .as_deref()
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty()),
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
            Cluster::new(members, cluster.method, cluster.centroid)
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
