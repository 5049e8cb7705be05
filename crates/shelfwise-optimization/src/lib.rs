//! Solvers behind the layout optimizer: exact minimum-cost assignment and
//! k-means clustering with silhouette-based model selection.

pub mod algorithms;
pub mod common;

/// Re-export common types
pub use common::*;

pub use algorithms::{select_cluster_count, silhouette_score, HungarianSolver, KMeans};
