//! Shelfwise retail layout optimizer
//!
//! Recommends product-to-shelf placements from recorded customer paths:
//!
//! 1. movement events become a weighted section transition graph
//! 2. the graph is partitioned into section communities by modularity
//! 3. products are clustered by co-occurrence in synthesized baskets
//! 4. an exact assignment places products so that affine products sit close
//!
//! Every stage reads its inputs from a RocksDB-backed [`LayoutStorage`] and
//! replaces its own output table, so stages can be re-run independently.
//!
//! ## Example Usage
//!
//! ```no_run
//! use shelfwise::{LayoutStorage, Pipeline, PipelineConfig};
//! use shelfwise::simulate::{simulate, SimulationConfig};
//!
//! let storage = LayoutStorage::open("./shelfwise_data")?;
//! let data = simulate(&SimulationConfig::default())?;
//! storage.put_sections(&data.sections)?;
//! storage.put_products(&data.products)?;
//! storage.put_movements(&data.movements)?;
//!
//! let report = Pipeline::new(&storage, PipelineConfig::default())?.run()?;
//! println!("{} recommendations", report.layout.recommendations.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod model;
pub mod persistence;
pub mod pipeline;
pub mod simulate;

// Re-export main types for convenience
pub use config::{
    ClusteringConfig, CommunityConfig, CommunityStrategy, ConfigError, IsolatedSectionPolicy,
    LayoutConfig, PipelineConfig,
};

pub use model::{
    ClusterId, CommunityAssignment, CommunityId, MovementEvent, Product, ProductCluster,
    ProductId, Recommendation, RunRecord, Section, SectionId, TransitionEdge,
};

pub use persistence::{LayoutStorage, StorageError, StorageResult, StoreSummary};

pub use pipeline::{
    Pipeline, PipelineError, PipelineReport, PipelineState, Stage, StageError, StageTiming,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
        assert_eq!(ver, "0.3.0");
    }
}
