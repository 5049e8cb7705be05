use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use shelfwise::pipeline::layout::plan_layout;
use shelfwise::pipeline::{aggregate_transitions, CooccurrenceMatrix};
use shelfwise::simulate::{simulate, SimulationConfig};
use shelfwise::{ClusterId, LayoutConfig, ProductCluster};
use shelfwise_graph_algorithms::{CommunityDetector, GraphView, GreedyModularity, Louvain, LouvainConfig};
use std::collections::BTreeMap;

fn dataset(sessions: usize, products: usize) -> shelfwise::simulate::Simulation {
    simulate(&SimulationConfig {
        sessions,
        products,
        seed: 42,
    })
    .expect("simulation")
}

/// Benchmark transition counting over simulated paths
fn bench_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_transitions");

    for sessions in [1_000, 10_000, 50_000].iter() {
        let data = dataset(*sessions, 20);
        group.bench_with_input(BenchmarkId::from_parameter(sessions), sessions, |b, _| {
            b.iter(|| {
                let counts = aggregate_transitions(&data.movements);
                criterion::black_box(counts.len());
            });
        });
    }
    group.finish();
}

/// Benchmark Louvain against greedy agglomeration on the same section graph
fn bench_communities(c: &mut Criterion) {
    let data = dataset(10_000, 20);
    let edges = aggregate_transitions(&data.movements).into_edges();

    let mut ids: BTreeMap<&str, u64> = BTreeMap::new();
    for section in &data.sections {
        let next = ids.len() as u64;
        ids.insert(section.id.as_str(), next);
    }
    let triples: Vec<(u64, u64, f64)> = edges
        .iter()
        .map(|e| (ids[e.source.as_str()], ids[e.target.as_str()], e.weight as f64))
        .collect();
    let view = GraphView::from_undirected_edges(&triples);

    let mut group = c.benchmark_group("communities");
    let louvain = Louvain::new(LouvainConfig::default());
    group.bench_function("louvain", |b| {
        b.iter(|| criterion::black_box(louvain.partition(&view).community_count()));
    });
    let greedy = GreedyModularity::default();
    group.bench_function("greedy", |b| {
        b.iter(|| criterion::black_box(greedy.partition(&view).community_count()));
    });
    group.finish();
}

/// Benchmark co-occurrence accumulation for a fixed basket stream
fn bench_cooccurrence(c: &mut Criterion) {
    let data = dataset(1_000, 200);
    let products: Vec<_> = data.products.iter().map(|p| p.id).collect();
    let baskets: Vec<Vec<_>> = products.chunks(4).map(|chunk| chunk.to_vec()).cycle().take(5_000).collect();

    c.bench_function("cooccurrence_200_products", |b| {
        b.iter(|| {
            let mut matrix = CooccurrenceMatrix::new(products.clone());
            for basket in &baskets {
                matrix.record_basket(basket);
            }
            criterion::black_box(matrix.len());
        });
    });
}

/// Benchmark cost matrix construction plus exact assignment
fn bench_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_layout");
    group.sample_size(10);

    for products in [26, 52, 100].iter() {
        let data = dataset(100, *products);
        let clusters: Vec<ProductCluster> = data
            .products
            .iter()
            .enumerate()
            .map(|(i, p)| ProductCluster {
                product: p.id,
                cluster: ClusterId((i % 5) as u32),
            })
            .collect();
        let config = LayoutConfig {
            section_capacity: products.div_ceil(data.sections.len()),
            ..LayoutConfig::default()
        };

        group.bench_with_input(BenchmarkId::from_parameter(products), products, |b, _| {
            b.iter(|| {
                let summary = plan_layout(&data.sections, &data.products, &clusters, &config)
                    .expect("layout");
                criterion::black_box(summary.total_cost);
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_aggregation,
    bench_communities,
    bench_cooccurrence,
    bench_layout
);
criterion_main!(benches);
