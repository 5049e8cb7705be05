use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the assignment solver
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssignmentError {
    /// Nothing to assign
    #[error("Empty cost matrix ({rows}x{cols})")]
    EmptyMatrix { rows: usize, cols: usize },

    /// NaN or infinite entry
    #[error("Non-finite cost at ({row}, {col})")]
    NonFiniteCost { row: usize, col: usize },
}

/// Errors raised by clustering and cluster scoring
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusteringError {
    /// Empty feature matrix
    #[error("No samples to cluster")]
    NoSamples,

    /// k outside 1..=n_samples
    #[error("Cannot partition {samples} samples into {k} clusters")]
    InvalidClusterCount { k: usize, samples: usize },

    /// Label vector does not match the sample count
    #[error("Expected {expected} labels, got {actual}")]
    LabelMismatch { expected: usize, actual: usize },

    /// Silhouette needs 2..=n-1 distinct labels
    #[error("Silhouette needs between 2 and {max} distinct labels, got {labels}")]
    InvalidLabelCount { labels: usize, max: usize },
}

/// A one-to-one matching between rows and columns of a cost matrix.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Assignment {
    /// `(row, column)` pairs sorted by row
    pub pairs: Vec<(usize, usize)>,
    /// Sum of the matched costs
    pub total_cost: f64,
}

impl Assignment {
    /// Column matched to `row`, if any
    pub fn column_for_row(&self, row: usize) -> Option<usize> {
        self.pairs
            .binary_search_by_key(&row, |&(r, _)| r)
            .ok()
            .map(|i| self.pairs[i].1)
    }
}

/// Configuration for the k-means solver.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KMeansConfig {
    pub k: usize,
    /// Independent k-means++ restarts; the lowest inertia wins
    pub n_init: usize,
    pub max_iterations: usize,
    /// Stop when total squared centroid shift falls to this value
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: 8,
            n_init: 10,
            max_iterations: 300,
            tolerance: 1e-4,
            seed: 42,
        }
    }
}

/// The result of a k-means run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KMeansResult {
    /// Cluster index per sample (0..k, possibly with unused indices)
    pub labels: Vec<usize>,
    pub centroids: Array2<f64>,
    /// Sum of squared distances to the assigned centroid
    pub inertia: f64,
    pub iterations: usize,
}

/// Outcome of choosing k by silhouette score.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelSelection {
    pub best_k: usize,
    /// None when no candidate could be scored
    pub best_score: Option<f64>,
    /// `(k, silhouette)` for every scored candidate
    pub scores: Vec<(usize, f64)>,
}

/// Squared Euclidean distance between two rows.
pub fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
