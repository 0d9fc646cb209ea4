use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lsh_buckets::{Coefficients, HybridTable, LinkedTable, Probe};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

fn build_table(
    n_points: usize,
    dims: usize,
    rng: &mut ChaCha8Rng,
) -> (LinkedTable, Vec<Vec<u32>>) {
    let coeffs = Arc::new(Coefficients::generate(dims, rng));
    let mut table = LinkedTable::new(65_537, coeffs);
    let fingerprints: Vec<Vec<u32>> = (0..n_points)
        .map(|_| (0..dims).map(|_| rng.random()).collect())
        .collect();
    for (id, fp) in fingerprints.iter().enumerate() {
        table.insert(Probe::single(fp), id as u32).unwrap();
    }
    (table, fingerprints)
}

fn hashing_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("hashing");
    let mut rng = ChaCha8Rng::seed_from_u64(100);

    for dims in [8, 32, 128].iter() {
        let coeffs = Coefficients::generate(*dims, &mut rng);
        let u_vector: Vec<u32> = (0..*dims).map(|_| rng.random()).collect();

        group.bench_with_input(BenchmarkId::new("precompute", dims), dims, |b, _| {
            b.iter(|| black_box(coeffs.precompute(black_box(&u_vector)).unwrap()))
        });
    }

    group.finish();
}

fn insert_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("linked_insert");
    let mut rng = ChaCha8Rng::seed_from_u64(101);

    let coeffs = Arc::new(Coefficients::generate(16, &mut rng));
    let fingerprints: Vec<Vec<u32>> = (0..10_000)
        .map(|_| (0..16).map(|_| rng.random()).collect())
        .collect();

    group.bench_function("10k_points_16_lanes", |b| {
        b.iter(|| {
            let mut table = LinkedTable::new(65_537, Arc::clone(&coeffs));
            for (id, fp) in fingerprints.iter().enumerate() {
                table.insert(Probe::single(fp), id as u32).unwrap();
            }
            black_box(table.n_points())
        })
    });

    group.finish();
}

fn lookup_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");
    let mut rng = ChaCha8Rng::seed_from_u64(102);

    for size in [1_000, 10_000, 100_000].iter() {
        let (linked, fingerprints) = build_table(*size, 16, &mut rng);
        let hybrid = HybridTable::compile(&linked).unwrap();

        group.bench_with_input(BenchmarkId::new("linked", size), size, |b, _| {
            let mut i = 0;
            b.iter(|| {
                let fp = &fingerprints[i % fingerprints.len()];
                i = i.wrapping_add(1);
                black_box(linked.lookup(black_box(Probe::single(fp))).unwrap().count())
            })
        });

        group.bench_with_input(BenchmarkId::new("hybrid", size), size, |b, _| {
            let mut i = 0;
            b.iter(|| {
                let fp = &fingerprints[i % fingerprints.len()];
                i = i.wrapping_add(1);
                black_box(hybrid.lookup(black_box(Probe::single(fp))).unwrap().count())
            })
        });
    }

    group.finish();
}

fn compile_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let mut rng = ChaCha8Rng::seed_from_u64(103);

    for size in [10_000, 100_000].iter() {
        let (linked, _) = build_table(*size, 16, &mut rng);

        group.bench_with_input(BenchmarkId::new("hybrid", size), size, |b, _| {
            b.iter(|| black_box(HybridTable::compile(black_box(&linked)).unwrap().n_points()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    hashing_benchmark,
    insert_benchmark,
    lookup_benchmark,
    compile_benchmark
);
criterion_main!(benches);
