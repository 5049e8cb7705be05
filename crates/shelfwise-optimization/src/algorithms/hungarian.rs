use crate::common::{Assignment, AssignmentError};
use ndarray::{Array2, ArrayView2};
use tracing::debug;

/// Minimum-cost bipartite matching (Hungarian method with row/column potentials).
///
/// Rectangular matrices are supported: the smaller side is matched completely
/// and the surplus rows or columns stay unmatched.
pub struct HungarianSolver;

impl HungarianSolver {
    pub fn new() -> Self {
        Self
    }

    pub fn solve(&self, cost: &Array2<f64>) -> Result<Assignment, AssignmentError> {
        let (rows, cols) = cost.dim();
        if rows == 0 || cols == 0 {
            return Err(AssignmentError::EmptyMatrix { rows, cols });
        }
        if let Some(((row, col), _)) = cost.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(AssignmentError::NonFiniteCost { row, col });
        }

        let mut pairs = if rows <= cols {
            shortest_augmenting_paths(cost.view())
        } else {
            shortest_augmenting_paths(cost.t())
                .into_iter()
                .map(|(c, r)| (r, c))
                .collect()
        };
        pairs.sort_unstable();

        let total_cost = pairs.iter().map(|&(r, c)| cost[[r, c]]).sum();
        debug!("Solved {}x{} assignment, total cost {:.4}", rows, cols, total_cost);

        Ok(Assignment { pairs, total_cost })
    }
}

impl Default for HungarianSolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Core O(n²m) solver; requires `rows <= cols`. Indices are 1-based internally,
/// column 0 is the virtual source of each augmenting path.
fn shortest_augmenting_paths(cost: ArrayView2<f64>) -> Vec<(usize, usize)> {
    let (n, m) = cost.dim();
    let mut u = vec![0.0; n + 1];
    let mut v = vec![0.0; m + 1];
    // row matched to each column (0 = free)
    let mut matched = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        matched[0] = i;
        let mut j0 = 0usize;
        let mut min_slack = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[j0] = true;
            let i0 = matched[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;

            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let reduced = cost[[i0 - 1, j - 1]] - u[i0] - v[j];
                if reduced < min_slack[j] {
                    min_slack[j] = reduced;
                    way[j] = j0;
                }
                if min_slack[j] < delta {
                    delta = min_slack[j];
                    j1 = j;
                }
            }

            for j in 0..=m {
                if used[j] {
                    u[matched[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_slack[j] -= delta;
                }
            }

            j0 = j1;
            if matched[j0] == 0 {
                break;
            }
        }

        // Flip the augmenting path
        loop {
            let j1 = way[j0];
            matched[j0] = matched[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    (1..=m)
        .filter(|&j| matched[j] != 0)
        .map(|j| (matched[j] - 1, j - 1))
        .collect()
}
