use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use densefactor::{
    generalized_inverse, invert, CholeskyDecomposition, LuDecomposition, QrDecomposition,
    SvdDecomposition,
};
use ndarray::Array2;
use rand::distributions::Uniform;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Square matrix with entries drawn uniformly from [-1, 1), seeded for
/// reproducibility across runs.
fn random_square(n: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let dist = Uniform::new(-1.0, 1.0);
    Array2::from_shape_fn((n, n), |_| rng.sample(dist))
}

/// Symmetric positive-definite matrix built as A·Aᵗ + n·I.
fn random_spd(n: usize, seed: u64) -> Array2<f64> {
    let a = random_square(n, seed);
    let mut spd = a.dot(&a.t());
    for i in 0..n {
        spd[[i, i]] += n as f64;
    }
    spd
}

fn bench_factorizations(c: &mut Criterion) {
    let mut group = c.benchmark_group("factorize");
    for &n in &[25usize, 50, 100] {
        let a = random_square(n, 42);
        group.bench_with_input(BenchmarkId::new("lu", n), &a, |b, a| {
            b.iter(|| LuDecomposition::new(a))
        });
        group.bench_with_input(BenchmarkId::new("qr", n), &a, |b, a| {
            b.iter(|| QrDecomposition::new(a).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("svd", n), &a, |b, a| {
            b.iter(|| SvdDecomposition::new(a))
        });
        let spd = random_spd(n, 42);
        group.bench_with_input(BenchmarkId::new("cholesky", n), &spd, |b, a| {
            b.iter(|| CholeskyDecomposition::new(a).unwrap())
        });
    }
    group.finish();
}

fn bench_inverses(c: &mut Criterion) {
    let mut group = c.benchmark_group("invert");
    for &n in &[25usize, 50, 100] {
        let a = random_square(n, 7);
        group.bench_with_input(BenchmarkId::new("lu_dispatch", n), &a, |b, a| {
            b.iter(|| invert(a).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("generalized", n), &a, |b, a| {
            b.iter(|| -> Array2<f64> { generalized_inverse(a) })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_factorizations, bench_inverses);
criterion_main!(benches);
