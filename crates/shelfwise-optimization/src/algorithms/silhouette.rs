use crate::common::{squared_distance, ClusteringError};
use ndarray::Array2;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Mean silhouette coefficient over all samples (Euclidean distance).
///
/// For sample `i` with mean intra-cluster distance `a` and smallest mean
/// distance to another cluster `b`, `s(i) = (b - a) / max(a, b)`. Samples in
/// singleton clusters, and samples where `a = b = 0`, score 0.
pub fn silhouette_score(data: &Array2<f64>, labels: &[usize]) -> Result<f64, ClusteringError> {
    let samples = data.nrows();
    if samples == 0 {
        return Err(ClusteringError::NoSamples);
    }
    if labels.len() != samples {
        return Err(ClusteringError::LabelMismatch {
            expected: samples,
            actual: labels.len(),
        });
    }

    // Labels may be sparse; map them onto 0..c
    let mut sizes: BTreeMap<usize, usize> = BTreeMap::new();
    for &label in labels {
        *sizes.entry(label).or_insert(0) += 1;
    }
    let distinct = sizes.len();
    if distinct < 2 || distinct > samples - 1 {
        return Err(ClusteringError::InvalidLabelCount {
            labels: distinct,
            max: samples.saturating_sub(1),
        });
    }
    let slot: BTreeMap<usize, usize> = sizes.keys().enumerate().map(|(i, &l)| (l, i)).collect();
    let counts: Vec<usize> = sizes.values().copied().collect();
    let dense: Vec<usize> = labels.iter().map(|l| slot[l]).collect();

    // Collect before summing so the float reduction order is fixed
    let per_sample: Vec<f64> = (0..samples)
        .into_par_iter()
        .map(|i| {
            let own = dense[i];
            if counts[own] < 2 {
                return 0.0;
            }

            let mut sums = vec![0.0; distinct];
            for j in 0..samples {
                if j != i {
                    sums[dense[j]] += squared_distance(data.row(i), data.row(j)).sqrt();
                }
            }

            let a = sums[own] / (counts[own] - 1) as f64;
            let b = (0..distinct)
                .filter(|&c| c != own)
                .map(|c| sums[c] / counts[c] as f64)
                .fold(f64::INFINITY, f64::min);

            let denom = a.max(b);
            if denom <= 0.0 {
                0.0
            } else {
                (b - a) / denom
            }
        })
        .collect();

    Ok(per_sample.iter().sum::<f64>() / samples as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_well_separated_is_near_one() {
        let data = array![[0.0], [0.1], [10.0], [10.1]];
        let score = silhouette_score(&data, &[0, 0, 1, 1]).unwrap();
        assert!(score > 0.95, "score {}", score);
    }

    #[test]
    fn test_bad_labelling_is_negative() {
        let data = array![[0.0], [0.1], [10.0], [10.1]];
        let score = silhouette_score(&data, &[0, 1, 0, 1]).unwrap();
        assert!(score < 0.0, "score {}", score);
    }

    #[test]
    fn test_sparse_labels_accepted() {
        let data = array![[0.0], [0.1], [10.0], [10.1]];
        let dense = silhouette_score(&data, &[0, 0, 1, 1]).unwrap();
        let sparse = silhouette_score(&data, &[4, 4, 9, 9]).unwrap();
        assert_eq!(dense, sparse);
    }

    #[test]
    fn test_zero_distance_pairs_score_zero() {
        let data = Array2::<f64>::zeros((4, 3));
        let score = silhouette_score(&data, &[0, 0, 1, 1]).unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_single_label_rejected() {
        let data = array![[0.0], [1.0], [2.0]];
        let err = silhouette_score(&data, &[0, 0, 0]).unwrap_err();
        assert_eq!(err, ClusteringError::InvalidLabelCount { labels: 1, max: 2 });
    }
}
