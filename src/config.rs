// ⚙️ Engine Configuration - Config as Data
// Every knob is explicit and required: the bounding region, the spatial
// radius, the textual threshold, the exclusion categories and the name
// stopwords all come from the caller or a JSON file. No hidden defaults.

use anyhow::{bail, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::geo::BoundingRegion;

// ============================================================================
// ENGINE CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Region every accepted coordinate must fall inside
    pub bounding_region: BoundingRegion,

    /// Neighborhood radius for spatial clustering, in meters
    pub spatial_radius_m: f64,

    /// Minimum name similarity (0-100) for textual clustering
    pub textual_similarity_threshold: f64,

    /// Category classes that must never merge (e.g. individual subsidies)
    pub exclusion_categories: Vec<String>,

    /// Generic institutional prefixes stripped during name normalization
    /// Example: ["institucion educativa", "i e", "sede", "centro educativo"]
    pub name_stopwords: Vec<String>,
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: EngineConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run against at all.
    ///
    /// Only structural problems are hard errors here. Pathological radius
    /// or threshold values are caught by the clusterers at run time and
    /// degrade to the exact-key fallback instead of aborting the batch.
    pub fn validate(&self) -> Result<()> {
        if !self.bounding_region.is_valid() {
            bail!(
                "Invalid bounding region: lat [{}, {}], lon [{}, {}]",
                self.bounding_region.lat_min,
                self.bounding_region.lat_max,
                self.bounding_region.lon_min,
                self.bounding_region.lon_max,
            );
        }

        if self.exclusion_categories.iter().any(|c| c.trim().is_empty()) {
            bail!("Exclusion category list contains an empty entry");
        }

        if self.name_stopwords.iter().any(|w| w.trim().is_empty()) {
            bail!("Name stopword list contains an empty entry");
        }

        Ok(())
    }

    /// Case-insensitive membership test against the exclusion list
    pub fn is_excluded_category(&self, category_class: &str) -> bool {
        let needle = category_class.trim();
        self.exclusion_categories
            .iter()
            .any(|c| c.trim().eq_ignore_ascii_case(needle))
    }
}

// ============================================================================
// TESTS
// ============================================================================
