//! Community detection algorithms
//!
//! Weighted modularity optimisation over undirected [`GraphView`]s:
//! - [`Louvain`]: local moves plus graph aggregation, seeded visiting order
//! - [`GreedyModularity`]: deterministic Clauset-Newman-Moore agglomeration
//!
//! Both strategies sit behind [`CommunityDetector`] so callers can swap them.

use super::common::{GraphView, NodeId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Smallest modularity gain treated as an improvement
const MIN_GAIN: f64 = 1e-12;

/// Upper bound on local-move sweeps per Louvain level
const MAX_SWEEPS: usize = 1_000;

/// Result of a community detection run
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommunityResult {
    /// Map of Community ID -> sorted list of NodeIds
    pub communities: BTreeMap<usize, Vec<NodeId>>,
    /// Map of NodeId -> Community ID
    pub node_community: HashMap<NodeId, usize>,
    /// Weighted modularity of the partition
    pub modularity: f64,
}

impl CommunityResult {
    /// Number of communities found
    pub fn community_count(&self) -> usize {
        self.communities.len()
    }
}

/// A strategy that partitions an undirected weighted graph into communities
pub trait CommunityDetector {
    /// Short strategy name for logging
    fn name(&self) -> &'static str;

    /// Partition every node of `view` into a community
    fn partition(&self, view: &GraphView) -> CommunityResult;
}

/// Weighted modularity of a labelling (one label per dense node index).
///
/// `Q = Σ_c [ L_c / m - γ (D_c / 2m)² ]` where `L_c` is the intra-community
/// edge weight, `D_c` the summed weighted degree and `m` the total weight.
pub fn modularity(view: &GraphView, labels: &[usize], resolution: f64) -> f64 {
    let m = view.total_weight();
    if m <= 0.0 {
        return 0.0;
    }
    let two_m = 2.0 * m;

    let mut internal: HashMap<usize, f64> = HashMap::new();
    let mut degree: HashMap<usize, f64> = HashMap::new();

    for u in 0..view.node_count {
        let cu = labels[u];
        for (v, w) in view.weighted_successors(u) {
            *degree.entry(cu).or_insert(0.0) += w;
            if labels[v] == cu {
                // Each undirected edge is visited from both endpoints
                *internal.entry(cu).or_insert(0.0) += w;
            }
        }
    }

    degree
        .iter()
        .map(|(c, &d)| {
            let l = internal.get(c).copied().unwrap_or(0.0);
            l / two_m - resolution * (d / two_m).powi(2)
        })
        .sum()
}

/// Renumber raw labels densely (largest community first, ties by lowest member)
/// and compute the final modularity.
fn finalize(view: &GraphView, raw_labels: &[usize], resolution: f64) -> CommunityResult {
    let mut groups: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
    for (idx, &label) in raw_labels.iter().enumerate() {
        groups.entry(label).or_default().push(view.index_to_node[idx]);
    }

    let mut ordered: Vec<Vec<NodeId>> = groups
        .into_values()
        .map(|mut members| {
            members.sort_unstable();
            members
        })
        .collect();
    ordered.sort_by(|a, b| b.len().cmp(&a.len()).then(a[0].cmp(&b[0])));

    let mut communities = BTreeMap::new();
    let mut node_community = HashMap::with_capacity(view.node_count);
    for (community_id, members) in ordered.into_iter().enumerate() {
        for &node in &members {
            node_community.insert(node, community_id);
        }
        communities.insert(community_id, members);
    }

    let dense_labels: Vec<usize> = view
        .index_to_node
        .iter()
        .map(|node| node_community[node])
        .collect();

    CommunityResult {
        communities,
        node_community,
        modularity: modularity(view, &dense_labels, resolution),
    }
}

/// Louvain configuration
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LouvainConfig {
    /// Resolution parameter (1.0 = classic modularity)
    pub resolution: f64,
    /// Seed for the node visiting order
    pub seed: u64,
    /// Maximum number of aggregation levels
    pub max_levels: usize,
}

impl Default for LouvainConfig {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            seed: 42,
            max_levels: 32,
        }
    }
}

/// Louvain modularity optimisation
pub struct Louvain {
    pub config: LouvainConfig,
}

/// One aggregation level: symmetric adjacency without self-loops plus
/// weighted degrees (which still account for collapsed internal weight).
struct Level {
    adjacency: Vec<Vec<(usize, f64)>>,
    degrees: Vec<f64>,
}

impl Level {
    fn from_view(view: &GraphView) -> Self {
        let adjacency = (0..view.node_count)
            .map(|u| view.weighted_successors(u).collect())
            .collect();
        let degrees = (0..view.node_count).map(|u| view.weighted_degree(u)).collect();
        Level { adjacency, degrees }
    }

    fn len(&self) -> usize {
        self.degrees.len()
    }

    /// Collapse each community into a single node
    fn aggregate(&self, labels: &[usize], community_count: usize) -> Level {
        let mut degrees = vec![0.0; community_count];
        let mut edges: BTreeMap<(usize, usize), f64> = BTreeMap::new();

        for u in 0..self.len() {
            degrees[labels[u]] += self.degrees[u];
            for &(v, w) in &self.adjacency[u] {
                let (cu, cv) = (labels[u], labels[v]);
                if u < v && cu != cv {
                    let key = if cu < cv { (cu, cv) } else { (cv, cu) };
                    *edges.entry(key).or_insert(0.0) += w;
                }
            }
        }

        let mut adjacency = vec![Vec::new(); community_count];
        for ((a, b), w) in edges {
            adjacency[a].push((b, w));
            adjacency[b].push((a, w));
        }

        Level { adjacency, degrees }
    }
}

impl Louvain {
    pub fn new(config: LouvainConfig) -> Self {
        Self { config }
    }

    /// Local-move phase. Returns dense labels and whether any node moved.
    fn one_level(&self, level: &Level, two_m: f64, rng: &mut StdRng) -> (Vec<usize>, bool) {
        let n = level.len();
        let resolution = self.config.resolution;
        let mut community: Vec<usize> = (0..n).collect();
        let mut totals = level.degrees.clone();

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        let mut moved_any = false;
        for _ in 0..MAX_SWEEPS {
            let mut moves = 0usize;

            for &i in &order {
                let current = community[i];
                let k_i = level.degrees[i];

                let mut links: BTreeMap<usize, f64> = BTreeMap::new();
                for &(j, w) in &level.adjacency[i] {
                    *links.entry(community[j]).or_insert(0.0) += w;
                }

                totals[current] -= k_i;

                let own_links = links.get(&current).copied().unwrap_or(0.0);
                let mut best = current;
                let mut best_gain = own_links - resolution * totals[current] * k_i / two_m;

                for (&candidate, &w) in &links {
                    let gain = w - resolution * totals[candidate] * k_i / two_m;
                    if gain > best_gain + MIN_GAIN {
                        best_gain = gain;
                        best = candidate;
                    }
                }

                totals[best] += k_i;
                if best != current {
                    community[i] = best;
                    moves += 1;
                }
            }

            if moves == 0 {
                break;
            }
            moved_any = true;
        }

        // Dense renumbering in order of first appearance
        let mut remap: HashMap<usize, usize> = HashMap::new();
        let labels = community
            .iter()
            .map(|c| {
                let next = remap.len();
                *remap.entry(*c).or_insert(next)
            })
            .collect();

        (labels, moved_any)
    }
}

impl CommunityDetector for Louvain {
    fn name(&self) -> &'static str {
        "louvain"
    }

    fn partition(&self, view: &GraphView) -> CommunityResult {
        let n = view.node_count;
        let m = view.total_weight();
        if n == 0 || m <= 0.0 {
            let singletons: Vec<usize> = (0..n).collect();
            return finalize(view, &singletons, self.config.resolution);
        }

        let two_m = 2.0 * m;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut membership: Vec<usize> = (0..n).collect();
        let mut level = Level::from_view(view);

        for depth in 0..self.config.max_levels {
            let (labels, moved) = self.one_level(&level, two_m, &mut rng);
            if !moved {
                break;
            }

            for node_label in membership.iter_mut() {
                *node_label = labels[*node_label];
            }

            let community_count = labels.iter().max().map_or(0, |max| max + 1);
            debug!(
                "Louvain level {}: {} nodes -> {} communities",
                depth,
                level.len(),
                community_count
            );
            level = level.aggregate(&labels, community_count);
        }

        finalize(view, &membership, self.config.resolution)
    }
}

/// Deterministic greedy modularity agglomeration (Clauset-Newman-Moore).
///
/// Repeatedly merges the connected pair of communities whose merge increases
/// modularity the most; ties go to the lowest `(i, j)` index pair. Stops when
/// no merge has a positive gain.
pub struct GreedyModularity {
    pub resolution: f64,
}

impl Default for GreedyModularity {
    fn default() -> Self {
        Self { resolution: 1.0 }
    }
}

impl CommunityDetector for GreedyModularity {
    fn name(&self) -> &'static str {
        "greedy-modularity"
    }

    fn partition(&self, view: &GraphView) -> CommunityResult {
        let n = view.node_count;
        let m = view.total_weight();
        if n == 0 || m <= 0.0 {
            let singletons: Vec<usize> = (0..n).collect();
            return finalize(view, &singletons, self.resolution);
        }
        let two_m = 2.0 * m;

        // e[i][j]: fraction of edge ends joining community i to j; a[i]: degree fraction
        let mut e: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); n];
        let mut a: Vec<f64> = vec![0.0; n];
        for u in 0..n {
            for (v, w) in view.weighted_successors(u) {
                *e[u].entry(v).or_insert(0.0) += w / two_m;
                a[u] += w / two_m;
            }
        }

        let mut alive = vec![true; n];
        let mut label: Vec<usize> = (0..n).collect();
        let mut merges = 0usize;

        loop {
            let mut best: Option<(f64, usize, usize)> = None;
            for i in 0..n {
                if !alive[i] {
                    continue;
                }
                for (&j, &e_ij) in &e[i] {
                    if j <= i {
                        continue;
                    }
                    let dq = 2.0 * (e_ij - self.resolution * a[i] * a[j]);
                    if best.map_or(true, |(best_dq, _, _)| dq > best_dq) {
                        best = Some((dq, i, j));
                    }
                }
            }

            let (i, j) = match best {
                Some((dq, i, j)) if dq > MIN_GAIN => (i, j),
                _ => break,
            };

            let row_j = std::mem::take(&mut e[j]);
            for (k, w) in row_j {
                if k == i {
                    continue;
                }
                *e[i].entry(k).or_insert(0.0) += w;
                e[k].remove(&j);
                *e[k].entry(i).or_insert(0.0) += w;
            }
            e[i].remove(&j);

            a[i] += a[j];
            a[j] = 0.0;
            alive[j] = false;
            for l in label.iter_mut() {
                if *l == j {
                    *l = i;
                }
            }
            merges += 1;
        }

        debug!("Greedy modularity performed {} merges over {} nodes", merges, n);
        finalize(view, &label, self.resolution)
    }
}
