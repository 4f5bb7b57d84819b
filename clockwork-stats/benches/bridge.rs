use criterion::{black_box, criterion_group, criterion_main, Criterion};
use clockwork_stats::bridge::{mean_z, var_z, DEFAULT_TAYLOR_ORDER};

fn random_f64(n: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            (state >> 11) as f64 / (1u64 << 53) as f64
        })
        .collect()
}

fn bench_mean_z(c: &mut Criterion) {
    let mut group = c.benchmark_group("mean_z");

    let u = random_f64(3_000, 42);
    let args: Vec<(f64, f64, f64)> = u
        .chunks(3)
        .map(|w| (0.2 + 2.0 * w[0], 0.2 + 2.0 * w[1], 0.05 + w[2]))
        .collect();

    group.bench_function("1k_branches_order10", |b| {
        b.iter(|| {
            args.iter()
                .map(|&(r0, rt, t)| mean_z(r0, rt, t, black_box(0.3), DEFAULT_TAYLOR_ORDER).unwrap_or(0.0))
                .sum::<f64>()
        })
    });

    group.bench_function("1k_branches_order30", |b| {
        b.iter(|| {
            args.iter()
                .map(|&(r0, rt, t)| mean_z(r0, rt, t, black_box(0.3), 30).unwrap_or(0.0))
                .sum::<f64>()
        })
    });

    group.finish();
}

fn bench_var_z(c: &mut Criterion) {
    let mut group = c.benchmark_group("var_z");

    group.bench_function("steps_40", |b| {
        b.iter(|| var_z(black_box(2.0), black_box(3.5), 1.0, 0.2, 40))
    });

    group.finish();
}

criterion_group!(benches, bench_mean_z, bench_var_z);
criterion_main!(benches);
