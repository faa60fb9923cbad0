use criterion::{black_box, criterion_group, criterion_main, Criterion};
use num_complex::Complex64;

use wavefront_core::fft::{fft_1d, fft_2d};

fn sample_signal(n: usize) -> Vec<Complex64> {
    (0..n)
        .map(|i| Complex64::new((i as f64 * 0.37).sin(), (i as f64 * 0.11).cos()))
        .collect()
}

fn fft_1d_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("fft_1d");
    for &n in &[256usize, 1024, 4096] {
        let data = sample_signal(n);
        group.bench_function(format!("n={n}"), |b| {
            b.iter(|| {
                let mut buf = data.clone();
                fft_1d(black_box(&mut buf), false);
                buf
            })
        });
    }
    group.finish();
}

fn fft_2d_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("fft_2d");
    for &n in &[64usize, 256, 512] {
        let data = sample_signal(n * n);
        group.bench_function(format!("n={n}"), |b| {
            b.iter(|| {
                let mut buf = data.clone();
                fft_2d(black_box(&mut buf), n, false);
                buf
            })
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = fft_1d_benchmark, fft_2d_benchmark
}
criterion_main!(benches);
