use feature_cluster::core::features::{Feature, Point};
use feature_cluster::processors::clustering::{cluster_features, IdIssuer};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::prelude::*;

fn bench_greedy(c: &mut Criterion) {
    let mut group = c.benchmark_group("greedy");

    // Generate synthetic survey points over a 10 km square
    let mut rng = StdRng::seed_from_u64(42);
    let n = 5000;

    let flat: Vec<Feature> = (0..n)
        .map(|_| Feature::new(Point::new(rng.random::<f64>() * 10_000.0, rng.random::<f64>() * 10_000.0)))
        .collect();

    let elevated: Vec<Feature> = (0..n)
        .map(|_| {
            Feature::new(Point::with_z(
                rng.random::<f64>() * 10_000.0,
                rng.random::<f64>() * 10_000.0,
                rng.random::<f64>() * 500.0,
            ))
        })
        .collect();

    group.bench_function("flat_n5000_tol250", |b| {
        b.iter(|| {
            let mut ids = IdIssuer::new();
            cluster_features(black_box(flat.clone()), 250.0, &mut ids)
        })
    });

    group.bench_function("elevated_n5000_tol250", |b| {
        b.iter(|| {
            let mut ids = IdIssuer::new();
            cluster_features(black_box(elevated.clone()), 250.0, &mut ids)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_greedy);
criterion_main!(benches);
