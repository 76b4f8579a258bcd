//! Benchmarks for dependency resolution over wide and deep stage sets.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mlpipeline::resolver::{group_stages, topological_order, DependencyNode};

fn layered_nodes(layers: usize, width: usize) -> Vec<DependencyNode> {
    let mut nodes = Vec::new();
    for layer in 0..layers {
        for slot in 0..width {
            let deps = if layer == 0 {
                Vec::new()
            } else {
                (0..width)
                    .map(|prev| format!("s{}_{prev}", layer - 1))
                    .collect()
            };
            nodes.push((format!("s{layer}_{slot}"), deps));
        }
    }
    nodes
}

fn resolver_benchmark(c: &mut Criterion) {
    let nodes = layered_nodes(10, 10);

    c.bench_function("group_stages_10x10", |b| {
        b.iter(|| group_stages(black_box(&nodes)))
    });

    c.bench_function("topological_order_10x10", |b| {
        b.iter(|| topological_order(black_box(&nodes)))
    });
}

criterion_group!(benches, resolver_benchmark);
criterion_main!(benches);
