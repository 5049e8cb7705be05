//! Stage 4: product-to-section assignment
//!
//! Placing products so that affine products sit close together is a quadratic
//! assignment problem. It is linearised by holding every other product at its
//! current section: the cost of putting product `i` in section `s` is
//! `Σ_{k≠i} flow[i,k] × distance[s, section(k)]`, which the Hungarian solver
//! then minimises exactly.

use super::StageError;
use crate::config::LayoutConfig;
use crate::model::{ClusterId, Product, ProductCluster, ProductId, Recommendation, Section};
use crate::persistence::LayoutStorage;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use shelfwise_optimization::HungarianSolver;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Build a matrix whose rows are computed in parallel
fn par_matrix<F>(rows: usize, cols: usize, cell: F) -> Array2<f64>
where
    F: Fn(usize, usize) -> f64 + Sync,
{
    let computed: Vec<Vec<f64>> = (0..rows)
        .into_par_iter()
        .map(|i| (0..cols).map(|j| cell(i, j)).collect())
        .collect();
    Array2::from_shape_fn((rows, cols), |(i, j)| computed[i][j])
}

/// Pairwise product affinity. Symmetric with a zero diagonal.
pub fn flow_matrix(
    products: &[Product],
    clusters: &HashMap<ProductId, ClusterId>,
    config: &LayoutConfig,
) -> Array2<f64> {
    let labels: Vec<Option<ClusterId>> = products.iter().map(|p| clusters.get(&p.id).copied()).collect();
    par_matrix(products.len(), products.len(), |i, j| {
        if i == j {
            return 0.0;
        }
        match (labels[i], labels[j]) {
            (Some(a), Some(b)) if a == b => config.same_cluster_affinity,
            (Some(_), Some(_)) => config.cross_cluster_affinity,
            _ => 0.0,
        }
    })
}

/// Manhattan distance between every pair of sections
pub fn distance_matrix(sections: &[Section]) -> Array2<f64> {
    par_matrix(sections.len(), sections.len(), |i, j| {
        sections[i].manhattan_distance(&sections[j]) as f64
    })
}

/// Products × sections placement cost.
///
/// `locations[k]` is the catalog index of product `k`'s current section;
/// products without one contribute nothing.
pub fn cost_matrix(
    flow: &Array2<f64>,
    distance: &Array2<f64>,
    locations: &[Option<usize>],
) -> Array2<f64> {
    let products = flow.nrows();
    let sections = distance.nrows();
    par_matrix(products, sections, |i, s| {
        let mut total = 0.0;
        for (k, location) in locations.iter().enumerate() {
            if k == i {
                continue;
            }
            if let Some(loc) = *location {
                total += flow[[i, k]] * distance[[s, loc]];
            }
        }
        total
    })
}

/// Product and section counts, assignment cost and the generated recommendations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutSummary {
    /// Sorted by descending score
    pub recommendations: Vec<Recommendation>,
    pub total_cost: f64,
    pub products: usize,
    pub sections: usize,
    pub slots: usize,
    /// Products left without a slot when products outnumber slots
    pub unassigned_products: usize,
}

fn rationale(
    product: &Product,
    section: &Section,
    peers: &[&Product],
    max_peers: usize,
) -> String {
    let mut parts = vec![format!(
        "Product '{}' (Category: {})",
        product.name, product.category
    )];

    if !peers.is_empty() {
        let names: Vec<&str> = peers.iter().take(max_peers).map(|p| p.name.as_str()).collect();
        let mut clause = format!("clustered with {}", names.join(", "));
        if peers.len() > max_peers {
            clause.push_str(&format!(" (+{} others)", peers.len() - max_peers));
        }
        parts.push(clause);
    }

    parts.push(format!(
        "should be placed in section '{}' ({})",
        section.name, section.id
    ));
    parts.push("to minimize customer walking distance".to_string());

    format!("{}.", parts.join("; "))
}

/// Assign products to sections and explain each placement
pub fn plan_layout(
    sections: &[Section],
    products: &[Product],
    clusters: &[ProductCluster],
    config: &LayoutConfig,
) -> Result<LayoutSummary, StageError> {
    if products.is_empty() {
        return Err(StageError::DegenerateInput("product catalog is empty".to_string()));
    }
    if sections.is_empty() {
        return Err(StageError::DegenerateInput("section catalog is empty".to_string()));
    }

    let cluster_of: HashMap<ProductId, ClusterId> =
        clusters.iter().map(|c| (c.product, c.cluster)).collect();
    let section_index: HashMap<_, usize> = sections
        .iter()
        .enumerate()
        .map(|(idx, s)| (&s.id, idx))
        .collect();
    let locations: Vec<Option<usize>> = products
        .iter()
        .map(|p| p.current_section.as_ref().and_then(|s| section_index.get(s).copied()))
        .collect();

    let flow = flow_matrix(products, &cluster_of, config);
    let distance = distance_matrix(sections);
    let section_cost = cost_matrix(&flow, &distance, &locations);
    debug!(
        "Cost matrix built: {}x{}",
        section_cost.nrows(),
        section_cost.ncols()
    );

    // Every section offers `section_capacity` interchangeable slots
    let capacity = config.section_capacity.max(1);
    let slots = sections.len() * capacity;
    let cost = Array2::from_shape_fn((products.len(), slots), |(i, slot)| {
        section_cost[[i, slot / capacity]]
    });

    let assignment = HungarianSolver::new().solve(&cost)?;
    info!("Assignment solved with total cost: {:.2}", assignment.total_cost);

    let unassigned = products.len() - assignment.pairs.len();
    if unassigned > 0 {
        warn!(
            "{} products outnumber the {} available slots; {} get no recommendation",
            products.len(),
            slots,
            unassigned
        );
    }

    let mut recommendations: Vec<Recommendation> = assignment
        .pairs
        .iter()
        .map(|&(i, slot)| {
            let product = &products[i];
            let section = &sections[slot / capacity];
            let peers: Vec<&Product> = match cluster_of.get(&product.id) {
                Some(cluster) => products
                    .iter()
                    .filter(|p| p.id != product.id && cluster_of.get(&p.id) == Some(cluster))
                    .collect(),
                None => Vec::new(),
            };
            Recommendation {
                product: product.id,
                section: section.id.clone(),
                rationale: rationale(product, section, &peers, config.rationale_peers),
                score: -cost[[i, slot]],
            }
        })
        .collect();
    recommendations.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.product.cmp(&b.product))
    });

    Ok(LayoutSummary {
        recommendations,
        total_cost: assignment.total_cost,
        products: products.len(),
        sections: sections.len(),
        slots,
        unassigned_products: unassigned,
    })
}

/// Replace the stored recommendations with a fresh assignment
pub fn optimize_layout(
    storage: &LayoutStorage,
    config: &LayoutConfig,
) -> Result<LayoutSummary, StageError> {
    info!("Optimizing store layout...");

    let sections = storage.scan_sections()?;
    let products = storage.scan_products()?;
    let clusters = storage.scan_clusters()?;
    info!(
        "Loaded {} sections and {} products",
        sections.len(),
        products.len()
    );

    let summary = plan_layout(&sections, &products, &clusters, config)?;
    storage.replace_recommendations(&summary.recommendations)?;

    info!("Generated {} recommendations", summary.recommendations.len());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SectionId;

    fn cluster(product: u64, cluster: u32) -> ProductCluster {
        ProductCluster {
            product: ProductId(product),
            cluster: ClusterId(cluster),
        }
    }

    fn grid() -> Vec<Section> {
        vec![
            Section::new("A", "Entrance", 0, 0),
            Section::new("B", "Produce", 1, 0),
            Section::new("C", "Far Wall", 5, 5),
        ]
    }

    #[test]
    fn test_flow_matrix() {
        let products = vec![
            Product::new(1, "a", "x", None),
            Product::new(2, "b", "x", None),
            Product::new(3, "c", "y", None),
            Product::new(4, "d", "z", None),
        ];
        let clusters: HashMap<_, _> = [cluster(1, 0), cluster(2, 0), cluster(3, 1)]
            .into_iter()
            .map(|c| (c.product, c.cluster))
            .collect();
        let flow = flow_matrix(&products, &clusters, &LayoutConfig::default());

        assert_eq!(flow[[0, 0]], 0.0);
        assert_eq!(flow[[0, 1]], 10.0);
        assert_eq!(flow[[1, 0]], 10.0);
        assert_eq!(flow[[0, 2]], 0.1);
        assert_eq!(flow[[0, 3]], 0.0);
        assert_eq!(flow[[3, 2]], 0.0);
    }

    #[test]
    fn test_distance_matrix() {
        let distance = distance_matrix(&grid());
        assert_eq!(distance[[0, 1]], 1.0);
        assert_eq!(distance[[2, 0]], 10.0);
        assert_eq!(distance[[1, 1]], 0.0);
        assert_eq!(distance, distance.t());
    }

    #[test]
    fn test_cost_skips_unknown_locations() {
        let flow = ndarray::array![[0.0, 10.0, 10.0], [10.0, 0.0, 10.0], [10.0, 10.0, 0.0]];
        let distance = distance_matrix(&grid());
        let cost = cost_matrix(&flow, &distance, &[Some(0), None, Some(2)]);

        // Product 0 only feels product 2, which sits in C
        assert_eq!(cost[[0, 2]], 0.0);
        assert_eq!(cost[[0, 0]], 100.0);
        // Product 1 feels both 0 (in A) and 2 (in C)
        assert_eq!(cost[[1, 1]], 10.0 * 1.0 + 10.0 * 9.0);
    }

    #[test]
    fn test_single_product_single_section() {
        let sections = vec![Section::new("A", "Entrance", 0, 0)];
        let products = vec![Product::new(1, "Milk", "Dairy", Some("A".into()))];

        let summary = plan_layout(&sections, &products, &[], &LayoutConfig::default()).unwrap();
        assert_eq!(summary.recommendations.len(), 1);
        assert_eq!(summary.total_cost, 0.0);
        assert_eq!(summary.recommendations[0].score, 0.0);
        assert_eq!(summary.recommendations[0].section, SectionId::new("A"));
    }

    #[test]
    fn test_cluster_pulls_product_toward_peers() {
        let products = vec![
            Product::new(1, "Chips", "Snacks", Some("A".into())),
            Product::new(2, "Salsa", "Snacks", Some("A".into())),
            Product::new(3, "Bleach", "Cleaning", Some("C".into())),
        ];
        let clusters = vec![cluster(1, 0), cluster(2, 0), cluster(3, 1)];
        let summary = plan_layout(&grid(), &products, &clusters, &LayoutConfig::default()).unwrap();

        let placed: HashMap<ProductId, SectionId> = summary
            .recommendations
            .iter()
            .map(|r| (r.product, r.section.clone()))
            .collect();
        assert_eq!(placed.len(), 3);
        // Chips and Salsa take the two adjacent sections, Bleach the far wall
        assert_eq!(placed[&ProductId(3)], SectionId::new("C"));
        assert_ne!(placed[&ProductId(1)], SectionId::new("C"));
        assert_ne!(placed[&ProductId(2)], SectionId::new("C"));

        for pair in summary.recommendations.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_more_products_than_sections() {
        let sections = vec![Section::new("A", "Entrance", 0, 0)];
        let products = vec![
            Product::new(1, "a", "x", Some("A".into())),
            Product::new(2, "b", "x", Some("A".into())),
        ];

        let summary = plan_layout(&sections, &products, &[], &LayoutConfig::default()).unwrap();
        assert_eq!(summary.recommendations.len(), 1);
        assert_eq!(summary.unassigned_products, 1);

        let config = LayoutConfig {
            section_capacity: 2,
            ..LayoutConfig::default()
        };
        let summary = plan_layout(&sections, &products, &[], &config).unwrap();
        assert_eq!(summary.recommendations.len(), 2);
        assert_eq!(summary.slots, 2);
    }

    #[test]
    fn test_rationale() {
        let product = Product::new(1, "Chips", "Snacks", None);
        let peers: Vec<Product> = ["Salsa", "Dip", "Soda", "Nuts", "Pretzels"]
            .iter()
            .enumerate()
            .map(|(i, n)| Product::new(10 + i as u64, *n, "Snacks", None))
            .collect();
        let peer_refs: Vec<&Product> = peers.iter().collect();
        let section = Section::new("I", "Snacks", 2, 1);

        assert_eq!(
            rationale(&product, &section, &peer_refs, 3),
            "Product 'Chips' (Category: Snacks); clustered with Salsa, Dip, Soda (+2 others); \
             should be placed in section 'Snacks' (I); to minimize customer walking distance."
        );
        assert_eq!(
            rationale(&product, &section, &[], 3),
            "Product 'Chips' (Category: Snacks); should be placed in section 'Snacks' (I); \
             to minimize customer walking distance."
        );
    }

    #[test]
    fn test_empty_catalogs() {
        let err = plan_layout(&grid(), &[], &[], &LayoutConfig::default()).unwrap_err();
        assert!(matches!(err, StageError::DegenerateInput(_)));

        let products = vec![Product::new(1, "a", "x", None)];
        let err = plan_layout(&[], &products, &[], &LayoutConfig::default()).unwrap_err();
        assert!(matches!(err, StageError::DegenerateInput(_)));
    }
}
