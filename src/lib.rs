// Project Unit Consolidation - Core Library
// Deduplicates raw intervention records into canonical Project Units
// using coordinate repair, spatial + textual clustering and detail-name
// refinement. Exposes all modules for the CLI and tests.

pub mod assemble;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod geo;
pub mod partition;
pub mod record;
pub mod spatial;
pub mod textual;
pub mod union_find;

// Re-export commonly used types
pub use assemble::{assemble_units, flatten_units, FlatRow, Intervention, ProjectUnit};
pub use cluster::{refine_clusters, Cluster, ClusterMethod};
pub use config::EngineConfig;
pub use engine::{ConsolidationEngine, ConsolidationOutput, RunReport};
pub use geo::{
    haversine_distance, normalize_pair, normalize_scalar, BoundingRegion, Correction,
    CorrectionStats, Geometry,
};
pub use partition::{partition_records, RecordPartition};
pub use record::{load_csv, normalize_batch, RawRecord};
pub use spatial::SpatialClusterer;
pub use textual::{NameNormalizer, TextualClusterer};
pub use union_find::UnionFind;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
