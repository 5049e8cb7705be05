use crate::common::{squared_distance, ClusteringError, KMeansConfig, KMeansResult};
use ndarray::{Array2, ArrayView1};
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;

/// Lloyd's k-means with k-means++ seeding and seeded restarts.
///
/// Identical or all-zero rows are valid input: seeding falls back to uniform
/// draws when every remaining point coincides with a chosen centroid, and an
/// empty cluster keeps its previous centroid.
pub struct KMeans {
    pub config: KMeansConfig,
}

impl KMeans {
    pub fn new(config: KMeansConfig) -> Self {
        Self { config }
    }

    pub fn fit(&self, data: &Array2<f64>) -> Result<KMeansResult, ClusteringError> {
        let samples = data.nrows();
        let k = self.config.k;
        if samples == 0 {
            return Err(ClusteringError::NoSamples);
        }
        if k == 0 || k > samples {
            return Err(ClusteringError::InvalidClusterCount { k, samples });
        }

        // Each restart owns a deterministic stream, so parallel runs stay reproducible
        let runs: Vec<KMeansResult> = (0..self.config.n_init.max(1))
            .into_par_iter()
            .map(|run| {
                let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(run as u64));
                self.fit_once(data, &mut rng)
            })
            .collect();

        let mut best: Option<KMeansResult> = None;
        for run in runs {
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }
        best.ok_or(ClusteringError::NoSamples)
    }

    fn fit_once(&self, data: &Array2<f64>, rng: &mut StdRng) -> KMeansResult {
        let (samples, dim) = data.dim();
        let k = self.config.k;
        let mut centroids = self.seed_centroids(data, rng);
        let mut labels = vec![0usize; samples];
        let mut iterations = 0;

        for _ in 0..self.config.max_iterations {
            iterations += 1;

            for (i, label) in labels.iter_mut().enumerate() {
                *label = nearest_centroid(data.row(i), &centroids).0;
            }

            let mut sums = Array2::<f64>::zeros((k, dim));
            let mut counts = vec![0usize; k];
            for (i, &label) in labels.iter().enumerate() {
                let mut row = sums.row_mut(label);
                row += &data.row(i);
                counts[label] += 1;
            }

            let mut shift = 0.0;
            for c in 0..k {
                if counts[c] == 0 {
                    continue;
                }
                let mut mean = sums.row(c).to_owned();
                mean /= counts[c] as f64;
                shift += squared_distance(mean.view(), centroids.row(c));
                centroids.row_mut(c).assign(&mean);
            }

            if shift <= self.config.tolerance {
                break;
            }
        }

        let mut inertia = 0.0;
        for (i, label) in labels.iter_mut().enumerate() {
            let (nearest, distance) = nearest_centroid(data.row(i), &centroids);
            *label = nearest;
            inertia += distance;
        }

        KMeansResult {
            labels,
            centroids,
            inertia,
            iterations,
        }
    }

    /// k-means++ seeding
    fn seed_centroids(&self, data: &Array2<f64>, rng: &mut StdRng) -> Array2<f64> {
        let (samples, dim) = data.dim();
        let k = self.config.k;
        let mut centroids = Array2::<f64>::zeros((k, dim));

        let first = rng.gen_range(0..samples);
        centroids.row_mut(0).assign(&data.row(first));

        let mut closest: Vec<f64> = (0..samples)
            .map(|i| squared_distance(data.row(i), centroids.row(0)))
            .collect();

        for c in 1..k {
            let total: f64 = closest.iter().sum();
            let pick = if total <= 0.0 {
                rng.gen_range(0..samples)
            } else {
                let target = rng.gen::<f64>() * total;
                let mut cumulative = 0.0;
                let mut chosen = samples - 1;
                for (i, &d) in closest.iter().enumerate() {
                    cumulative += d;
                    if cumulative > target {
                        chosen = i;
                        break;
                    }
                }
                chosen
            };

            centroids.row_mut(c).assign(&data.row(pick));
            for (i, d) in closest.iter_mut().enumerate() {
                let candidate = squared_distance(data.row(i), centroids.row(c));
                if candidate < *d {
                    *d = candidate;
                }
            }
        }

        centroids
    }
}

/// Index of and squared distance to the nearest centroid (lowest index wins ties)
fn nearest_centroid(point: ArrayView1<f64>, centroids: &Array2<f64>) -> (usize, f64) {
    let mut best = (0usize, f64::INFINITY);
    for (c, centroid) in centroids.rows().into_iter().enumerate() {
        let d = squared_distance(point, centroid);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_blobs() -> Array2<f64> {
        array![
            [0.0, 0.1],
            [0.2, 0.0],
            [0.1, 0.2],
            [10.0, 10.1],
            [10.2, 9.9],
            [9.9, 10.0],
        ]
    }

    #[test]
    fn test_separates_blobs() {
        let config = KMeansConfig { k: 2, ..Default::default() };
        let result = KMeans::new(config).fit(&two_blobs()).unwrap();

        let l = &result.labels;
        assert_eq!(l[0], l[1]);
        assert_eq!(l[1], l[2]);
        assert_eq!(l[3], l[4]);
        assert_eq!(l[4], l[5]);
        assert_ne!(l[0], l[3]);
        assert!(result.inertia < 1.0);
    }

    #[test]
    fn test_all_zero_rows() {
        let data = Array2::<f64>::zeros((5, 5));
        let config = KMeansConfig { k: 3, ..Default::default() };
        let result = KMeans::new(config).fit(&data).unwrap();

        assert_eq!(result.labels, vec![0; 5]);
        assert_eq!(result.inertia, 0.0);
        assert!(result.centroids.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_invalid_cluster_count() {
        let config = KMeansConfig { k: 7, ..Default::default() };
        let err = KMeans::new(config).fit(&two_blobs()).unwrap_err();
        assert_eq!(err, ClusteringError::InvalidClusterCount { k: 7, samples: 6 });

        let empty = Array2::<f64>::zeros((0, 3));
        let config = KMeansConfig { k: 1, ..Default::default() };
        assert_eq!(KMeans::new(config).fit(&empty).unwrap_err(), ClusteringError::NoSamples);
    }

    #[test]
    fn test_seeded_runs_match() {
        let config = KMeansConfig { k: 3, seed: 9, ..Default::default() };
        let a = KMeans::new(config.clone()).fit(&two_blobs()).unwrap();
        let b = KMeans::new(config).fit(&two_blobs()).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.inertia, b.inertia);
    }
}
