use shelfwise::pipeline::affinity::label_products;
use shelfwise::pipeline::layout::plan_layout;
use shelfwise::pipeline::{build_transition_graph, detect_section_communities, CooccurrenceMatrix};
use shelfwise::simulate::{simulate, SimulationConfig};
use shelfwise::{
    ClusterId, ClusteringConfig, CommunityStrategy, LayoutConfig, LayoutStorage, MovementEvent,
    Pipeline, PipelineConfig, Product, ProductCluster, ProductId, Section, SectionId,
};
use std::collections::{HashMap, HashSet};
use tempfile::TempDir;

fn open_store() -> (TempDir, LayoutStorage) {
    let temp_dir = TempDir::new().unwrap();
    let storage = LayoutStorage::open(temp_dir.path()).unwrap();
    (temp_dir, storage)
}

/// `(session, "A B C")` pairs to movement events
fn paths(sessions: &[(&str, &str)]) -> Vec<MovementEvent> {
    let mut events = Vec::new();
    for (session, path) in sessions {
        for (step, section) in path.split_whitespace().enumerate() {
            events.push(MovementEvent::new(
                *session,
                step as u32,
                section,
                1_704_099_600_000 + step as i64 * 60_000,
            ));
        }
    }
    events
}

fn small_store(storage: &LayoutStorage) {
    let data = simulate(&SimulationConfig {
        sessions: 300,
        products: 40,
        seed: 11,
    })
    .unwrap();
    storage.put_sections(&data.sections).unwrap();
    storage.put_products(&data.products).unwrap();
    storage.put_movements(&data.movements).unwrap();
}

fn small_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.layout.section_capacity = 2;
    config.clustering.n_init = 3;
    config
}

#[test]
fn test_three_sessions_yield_expected_edges() {
    let (_dir, storage) = open_store();
    storage
        .put_movements(&paths(&[
            ("s1", "A B C"),
            ("s2", "A B"),
            ("s3", "B C A"),
        ]))
        .unwrap();

    let summary = build_transition_graph(&storage).unwrap();
    assert_eq!(summary.sessions, 3);
    assert_eq!(summary.total_transitions, 5);

    let edges: HashMap<(String, String), u64> = storage
        .scan_edges()
        .unwrap()
        .into_iter()
        .map(|e| ((e.source.to_string(), e.target.to_string()), e.weight))
        .collect();

    let expected: HashMap<(String, String), u64> = [
        (("A", "B"), 2),
        (("B", "C"), 2),
        (("C", "A"), 1),
    ]
    .into_iter()
    .map(|((s, t), w)| ((s.to_string(), t.to_string()), w))
    .collect();
    assert_eq!(edges, expected);
}

#[test]
fn test_self_transitions_dropped() {
    let (_dir, storage) = open_store();
    storage
        .put_movements(&paths(&[("s1", "A A B B A")]))
        .unwrap();

    build_transition_graph(&storage).unwrap();
    let edges = storage.scan_edges().unwrap();

    assert_eq!(edges.len(), 2);
    assert!(edges.iter().all(|e| e.source != e.target));
}

#[test]
fn test_cooccurring_pair_shares_cluster() {
    let products: Vec<ProductId> = (1..=8).map(ProductId).collect();
    let mut matrix = CooccurrenceMatrix::new(products);
    for _ in 0..30 {
        matrix.record_basket(&[ProductId(1), ProductId(2)]);
    }
    for _ in 0..10 {
        matrix.record_basket(&[ProductId(3), ProductId(4), ProductId(5)]);
        matrix.record_basket(&[ProductId(6), ProductId(7)]);
    }

    for k in [2, 3] {
        let config = ClusteringConfig {
            fixed_clusters: Some(k),
            ..ClusteringConfig::default()
        };
        let (labels, _) = label_products(&matrix, &config, 42).unwrap();
        assert_eq!(labels.len(), 8);
        assert_eq!(labels[0], labels[1], "k = {}", k);
        for other in 2..8 {
            assert_ne!(labels[0], labels[other], "k = {}", k);
        }
    }
}

#[test]
fn test_single_product_single_section_costs_nothing() {
    let sections = vec![Section::new("A", "Entrance", 0, 0)];
    let products = vec![Product::new(1, "Milk", "Dairy", Some("A".into()))];
    let clusters = vec![ProductCluster {
        product: ProductId(1),
        cluster: ClusterId(0),
    }];

    let summary = plan_layout(&sections, &products, &clusters, &LayoutConfig::default()).unwrap();

    assert_eq!(summary.recommendations.len(), 1);
    assert_eq!(summary.total_cost, 0.0);
    let rec = &summary.recommendations[0];
    assert_eq!(rec.section, SectionId::new("A"));
    assert_eq!(rec.score, 0.0);
}

#[test]
fn test_empty_store_fails_at_aggregation() {
    let (_dir, storage) = open_store();

    let err = Pipeline::new(&storage, PipelineConfig::default())
        .unwrap()
        .run()
        .unwrap_err();

    assert!(err.to_string().starts_with("stage 1/5 (aggregate) failed"));
    assert!(storage.scan_runs().unwrap().is_empty());
}

#[test]
fn test_full_run_on_simulated_store() {
    let (_dir, storage) = open_store();
    small_store(&storage);

    let report = Pipeline::new(&storage, small_config()).unwrap().run().unwrap();

    assert_eq!(report.run.run_id, 1);
    assert_eq!(report.timings.len(), 5);
    assert!(report.transitions.edges > 0);
    assert!(report.communities.community_count >= 1);
    assert_eq!(report.clusters.eligible_products, 40);
    assert!((1..=10).contains(&report.clusters.cluster_count));

    // One recommendation per product, no section over capacity
    let recommendations = storage.scan_recommendations().unwrap();
    assert_eq!(recommendations.len(), 40);
    let products: HashSet<ProductId> = recommendations.iter().map(|r| r.product).collect();
    assert_eq!(products.len(), 40);
    let mut load: HashMap<&SectionId, usize> = HashMap::new();
    for r in &recommendations {
        *load.entry(&r.section).or_insert(0) += 1;
    }
    assert!(load.values().all(|&n| n <= 2));
    assert!(recommendations.iter().all(|r| r.score <= 0.0));
    assert!(recommendations.iter().all(|r| !r.rationale.is_empty()));

    let store = storage.summary().unwrap();
    assert_eq!(store.recommendations, 40);
    assert_eq!(store.clusters, 40);
    assert_eq!(store.runs, 1);
}

#[test]
fn test_rerun_is_deterministic() {
    let (_dir, storage) = open_store();
    small_store(&storage);

    Pipeline::new(&storage, small_config()).unwrap().run().unwrap();
    let edges = storage.scan_edges().unwrap();
    let communities = storage.scan_communities().unwrap();
    let clusters = storage.scan_clusters().unwrap();
    let recommendations = storage.scan_recommendations().unwrap();

    let report = Pipeline::new(&storage, small_config()).unwrap().run().unwrap();
    assert_eq!(report.run.run_id, 2);

    assert_eq!(storage.scan_edges().unwrap(), edges);
    assert_eq!(storage.scan_communities().unwrap(), communities);
    assert_eq!(storage.scan_clusters().unwrap(), clusters);
    assert_eq!(storage.scan_recommendations().unwrap(), recommendations);
    assert_eq!(storage.scan_runs().unwrap().len(), 2);
}

#[test]
fn test_stage_output_is_replaced() {
    let (_dir, storage) = open_store();
    storage
        .put_movements(&paths(&[("s1", "A B C")]))
        .unwrap();
    build_transition_graph(&storage).unwrap();
    assert_eq!(storage.scan_edges().unwrap().len(), 2);

    storage.clear_inputs().unwrap();
    assert!(storage.scan_edges().unwrap().is_empty());

    storage
        .put_movements(&paths(&[("s9", "X Y")]))
        .unwrap();
    build_transition_graph(&storage).unwrap();

    let edges = storage.scan_edges().unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].source, SectionId::new("X"));
    assert_eq!(edges[0].target, SectionId::new("Y"));
}

#[test]
fn test_greedy_strategy_is_repeatable() {
    let (_dir, storage) = open_store();
    storage
        .put_sections(&[
            Section::new("A", "Entrance", 0, 0),
            Section::new("B", "Produce", 1, 0),
            Section::new("C", "Bakery", 2, 0),
            Section::new("D", "Dairy", 0, 1),
            Section::new("E", "Frozen", 1, 1),
            Section::new("F", "Meat", 2, 1),
        ])
        .unwrap();
    let mut sessions: Vec<(String, &str)> = Vec::new();
    for i in 0..10 {
        sessions.push((format!("a{:02}", i), "A B C A"));
        sessions.push((format!("d{:02}", i), "D E F D"));
    }
    sessions.push(("bridge".to_string(), "C D"));
    let borrowed: Vec<(&str, &str)> = sessions.iter().map(|(s, p)| (s.as_str(), *p)).collect();
    storage.put_movements(&paths(&borrowed)).unwrap();
    build_transition_graph(&storage).unwrap();

    let mut config = PipelineConfig::default().communities;
    config.strategy = CommunityStrategy::Greedy;

    let first = detect_section_communities(&storage, &config, 0).unwrap();
    let second = detect_section_communities(&storage, &config, 99).unwrap();
    assert_eq!(first.assignments, second.assignments);
    assert_eq!(first.community_count, 2);

    let groups = storage.communities_by_id().unwrap();
    let sets: HashSet<Vec<&str>> = groups
        .values()
        .map(|members| members.iter().map(|s| s.as_str()).collect())
        .collect();
    assert!(sets.contains(&vec!["A", "B", "C"]));
    assert!(sets.contains(&vec!["D", "E", "F"]));
}

#[test]
fn test_apply_recommendations_moves_products() {
    let (_dir, storage) = open_store();
    small_store(&storage);
    Pipeline::new(&storage, small_config()).unwrap().run().unwrap();

    storage.apply_recommendations().unwrap();

    let placed: HashMap<ProductId, SectionId> = storage
        .scan_recommendations()
        .unwrap()
        .into_iter()
        .map(|r| (r.product, r.section))
        .collect();
    for product in storage.scan_products().unwrap() {
        assert_eq!(product.current_section.as_ref(), placed.get(&product.id));
    }
    assert_eq!(storage.apply_recommendations().unwrap(), 0);
}
