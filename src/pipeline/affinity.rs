//! Stage 3: product affinity clusters
//!
//! Customer paths carry no purchase data, so baskets are synthesized from the
//! tail of each path: the products shelved in the last few visited sections.
//! Products that land in the same basket co-occur, and the rows of the
//! co-occurrence matrix are clustered with k-means.

use super::StageError;
use crate::config::ClusteringConfig;
use crate::model::{ClusterId, MovementEvent, Product, ProductCluster, ProductId, Section, SectionId};
use crate::persistence::LayoutStorage;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use shelfwise_optimization::{select_cluster_count, KMeans, KMeansConfig};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// Symmetric product co-occurrence counts with a zero diagonal
#[derive(Debug, Clone)]
pub struct CooccurrenceMatrix {
    products: Vec<ProductId>,
    index: HashMap<ProductId, usize>,
    counts: Array2<f64>,
    appearances: Vec<u64>,
}

impl CooccurrenceMatrix {
    pub fn new(products: Vec<ProductId>) -> Self {
        let n = products.len();
        let index = products
            .iter()
            .enumerate()
            .map(|(i, &p)| (p, i))
            .collect();
        Self {
            products,
            index,
            counts: Array2::zeros((n, n)),
            appearances: vec![0; n],
        }
    }

    /// Count every unordered pair of distinct known products once
    pub fn record_basket(&mut self, basket: &[ProductId]) {
        let rows: BTreeSet<usize> = basket
            .iter()
            .filter_map(|p| self.index.get(p).copied())
            .collect();
        let rows: Vec<usize> = rows.into_iter().collect();
        for (pos, &i) in rows.iter().enumerate() {
            self.appearances[i] += 1;
            for &j in &rows[pos + 1..] {
                self.counts[[i, j]] += 1.0;
                self.counts[[j, i]] += 1.0;
            }
        }
    }

    pub fn count(&self, a: ProductId, b: ProductId) -> u64 {
        match (self.index.get(&a), self.index.get(&b)) {
            (Some(&i), Some(&j)) => self.counts[[i, j]] as u64,
            _ => 0,
        }
    }

    /// Row order of the matrix
    pub fn products(&self) -> &[ProductId] {
        &self.products
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.counts
    }

    /// Baskets containing `product`
    pub fn appearances(&self, product: ProductId) -> u64 {
        self.index
            .get(&product)
            .map_or(0, |&i| self.appearances[i])
    }

    /// Clustering features: the count rows with each product's own basket
    /// appearances on the diagonal, so products that always share a basket
    /// get identical rows.
    pub fn features(&self) -> Array2<f64> {
        let mut features = self.counts.clone();
        for (i, &n) in self.appearances.iter().enumerate() {
            features[[i, i]] = n as f64;
        }
        features
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Draw one basket per session from the trailing window of its path.
///
/// Sessions are visited in id order and `products_by_section` must list
/// products in a stable order, so a seeded `rng` reproduces the same baskets.
pub fn synthesize_baskets(
    events: &[MovementEvent],
    products_by_section: &BTreeMap<SectionId, Vec<ProductId>>,
    config: &ClusteringConfig,
    rng: &mut StdRng,
) -> Vec<Vec<ProductId>> {
    let mut sessions: BTreeMap<&str, Vec<&SectionId>> = BTreeMap::new();
    for event in events {
        sessions
            .entry(event.session_id.as_str())
            .or_default()
            .push(&event.section);
    }

    let mut baskets = Vec::new();
    for path in sessions.values() {
        let window = rng
            .gen_range(config.basket_min_sections..=config.basket_max_sections)
            .min(path.len());
        let mut basket: BTreeSet<ProductId> = BTreeSet::new();

        for section in &path[path.len() - window..] {
            let Some(shelf) = products_by_section.get(*section) else {
                continue;
            };
            if shelf.is_empty() {
                continue;
            }
            let items = rng
                .gen_range(config.min_items_per_section..=config.max_items_per_section)
                .min(shelf.len());
            basket.extend(shelf.choose_multiple(rng, items).copied());
        }

        if !basket.is_empty() {
            baskets.push(basket.into_iter().collect());
        }
    }
    baskets
}

/// Cluster labels for the matrix rows, renumbered densely by first appearance.
///
/// Returns the labels together with the silhouette score of the chosen k when
/// one was computed.
pub fn label_products(
    matrix: &CooccurrenceMatrix,
    config: &ClusteringConfig,
    seed: u64,
) -> Result<(Vec<ClusterId>, Option<f64>), StageError> {
    let n = matrix.len();
    if n == 0 {
        return Err(StageError::DegenerateInput("no products to cluster".to_string()));
    }
    let features = matrix.features();

    let base = KMeansConfig {
        k: 1,
        n_init: config.n_init,
        max_iterations: config.max_iterations,
        tolerance: config.tolerance,
        seed,
    };

    let (k, score) = match config.fixed_clusters {
        Some(k) => (k.min(n), None),
        None => {
            let selection = select_cluster_count(
                &features,
                config.min_clusters,
                config.max_clusters,
                &base,
            )?;
            (selection.best_k, selection.best_score)
        }
    };

    if k <= 1 {
        return Ok((vec![ClusterId(0); n], score));
    }

    let fit = KMeans::new(KMeansConfig { k, ..base }).fit(&features)?;
    Ok((renumber(&fit.labels), score))
}

fn renumber(labels: &[usize]) -> Vec<ClusterId> {
    let mut dense: HashMap<usize, u32> = HashMap::new();
    labels
        .iter()
        .map(|label| {
            let next = dense.len() as u32;
            ClusterId(*dense.entry(*label).or_insert(next))
        })
        .collect()
}

/// Outcome of stage 3
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringSummary {
    pub assignments: Vec<ProductCluster>,
    pub baskets: usize,
    /// Products whose current section exists in the catalog
    pub eligible_products: usize,
    pub unclustered_products: usize,
    pub cluster_count: usize,
    pub silhouette: Option<f64>,
    pub sizes: BTreeMap<ClusterId, usize>,
    pub average_size: f64,
    pub largest: usize,
    pub smallest: usize,
}

/// Cluster the catalog from in-memory rows
pub fn cluster_catalog(
    events: &[MovementEvent],
    sections: &[Section],
    products: &[Product],
    config: &ClusteringConfig,
    seed: u64,
) -> Result<ClusteringSummary, StageError> {
    let known: HashSet<&SectionId> = sections.iter().map(|s| &s.id).collect();

    let mut eligible: Vec<ProductId> = Vec::new();
    let mut products_by_section: BTreeMap<SectionId, Vec<ProductId>> = BTreeMap::new();
    for product in products {
        if let Some(section) = product.current_section.as_ref().filter(|s| known.contains(s)) {
            eligible.push(product.id);
            products_by_section
                .entry(section.clone())
                .or_default()
                .push(product.id);
        }
    }
    if eligible.is_empty() {
        return Err(StageError::DegenerateInput(
            "no products are shelved in a known section".to_string(),
        ));
    }
    for shelf in products_by_section.values_mut() {
        shelf.sort_unstable();
    }
    eligible.sort_unstable();

    info!(
        "Processing {} movements for {} eligible products...",
        events.len(),
        eligible.len()
    );

    let mut rng = StdRng::seed_from_u64(seed);
    let baskets = synthesize_baskets(events, &products_by_section, config, &mut rng);
    info!("Generated {} simulated baskets", baskets.len());

    let mut matrix = CooccurrenceMatrix::new(eligible);
    for basket in &baskets {
        matrix.record_basket(basket);
    }
    debug!("Co-occurrence matrix built: {}x{}", matrix.len(), matrix.len());

    let (labels, silhouette) = label_products(&matrix, config, seed)?;

    let assignments: Vec<ProductCluster> = matrix
        .products()
        .iter()
        .zip(&labels)
        .map(|(&product, &cluster)| ProductCluster { product, cluster })
        .collect();

    let mut sizes: BTreeMap<ClusterId, usize> = BTreeMap::new();
    for a in &assignments {
        *sizes.entry(a.cluster).or_insert(0) += 1;
    }
    let cluster_count = sizes.len();

    Ok(ClusteringSummary {
        baskets: baskets.len(),
        eligible_products: assignments.len(),
        unclustered_products: products.len() - assignments.len(),
        cluster_count,
        silhouette,
        average_size: assignments.len() as f64 / cluster_count.max(1) as f64,
        largest: sizes.values().copied().max().unwrap_or(0),
        smallest: sizes.values().copied().min().unwrap_or(0),
        sizes,
        assignments,
    })
}

/// Replace the stored product clusters
pub fn cluster_products(
    storage: &LayoutStorage,
    config: &ClusteringConfig,
    seed: u64,
) -> Result<ClusteringSummary, StageError> {
    info!("Starting product clustering...");

    let events = storage.scan_movements()?;
    let sections = storage.scan_sections()?;
    let products = storage.scan_products()?;

    let summary = cluster_catalog(&events, &sections, &products, config, seed)?;
    storage.replace_clusters(&summary.assignments)?;

    info!(
        "Clustered {} products into {} clusters",
        summary.eligible_products, summary.cluster_count
    );
    info!(
        "Cluster sizes: average {:.1}, largest {}, smallest {}",
        summary.average_size, summary.largest, summary.smallest
    );
    if summary.unclustered_products > 0 {
        debug!("{} products left unclustered", summary.unclustered_products);
    }

    Ok(summary)
}
