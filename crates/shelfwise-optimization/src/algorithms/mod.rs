pub mod hungarian;
pub mod kmeans;
pub mod selection;
pub mod silhouette;

pub use hungarian::HungarianSolver;
pub use kmeans::KMeans;
pub use selection::select_cluster_count;
pub use silhouette::silhouette_score;
