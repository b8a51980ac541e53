use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use puente::config::LoadBalancingStrategy;
use puente::host::handler::HostHandler;
use puente::host::{HostDescription, HostRegistry};

fn handler(strategy: LoadBalancingStrategy) -> HostHandler {
    let descriptions = (0..8)
        .map(|i| HostDescription::new("127.0.0.1", 8500 + i as u16))
        .collect();
    let registry = Arc::new(HostRegistry::new(descriptions).unwrap());
    HostHandler::new(registry, strategy)
}

fn criterion_benchmark(c: &mut Criterion) {
    let round_robin = handler(LoadBalancingStrategy::RoundRobin);
    c.bench_function("round_robin_select", |b| {
        b.iter(|| {
            black_box(round_robin.select(None).unwrap());
        })
    });

    let fallback = handler(LoadBalancingStrategy::None);
    c.bench_function("fallback_select", |b| {
        b.iter(|| {
            black_box(fallback.select(None).unwrap());
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
