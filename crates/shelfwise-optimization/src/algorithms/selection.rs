use super::kmeans::KMeans;
use super::silhouette::silhouette_score;
use crate::common::{ClusteringError, KMeansConfig, ModelSelection};
use ndarray::Array2;
use tracing::{debug, info};

/// Pick the cluster count in `min_k..=max_k` with the best silhouette score.
///
/// Candidates with `k < 2` or `k >= n_samples` cannot be scored and are
/// skipped, as are candidates whose labelling collapses to one cluster.
/// The first candidate wins ties. When nothing can be scored the result is a
/// single cluster (`best_k = 1`, `best_score = None`).
pub fn select_cluster_count(
    data: &Array2<f64>,
    min_k: usize,
    max_k: usize,
    base: &KMeansConfig,
) -> Result<ModelSelection, ClusteringError> {
    let samples = data.nrows();
    if samples == 0 {
        return Err(ClusteringError::NoSamples);
    }

    info!("Finding optimal k in range {}-{}...", min_k, max_k);

    let mut scores = Vec::new();
    let mut best: Option<(usize, f64)> = None;

    for k in min_k..=max_k {
        if k < 2 || k >= samples {
            debug!("k={} skipped for {} samples", k, samples);
            continue;
        }

        let config = KMeansConfig { k, ..base.clone() };
        let result = KMeans::new(config).fit(data)?;

        let score = match silhouette_score(data, &result.labels) {
            Ok(score) => score,
            Err(ClusteringError::InvalidLabelCount { labels, .. }) => {
                debug!("k={} skipped: only {} non-empty clusters", k, labels);
                continue;
            }
            Err(e) => return Err(e),
        };

        info!("  k={}: silhouette score = {:.4}", k, score);
        scores.push((k, score));
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((k, score));
        }
    }

    let selection = match best {
        Some((best_k, score)) => ModelSelection {
            best_k,
            best_score: Some(score),
            scores,
        },
        None => ModelSelection {
            best_k: 1,
            best_score: None,
            scores,
        },
    };

    info!(
        "Optimal k = {} (score: {})",
        selection.best_k,
        selection.best_score.map_or("n/a".to_string(), |s| format!("{:.4}", s))
    );
    Ok(selection)
}
