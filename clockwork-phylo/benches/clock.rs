use clockwork_core::Checkpoint;
use clockwork_phylo::operators::SingleRateScale;
use clockwork_phylo::{
    BranchRateModel, ClockConfig, ClockModel, RateDensityModel, SamplerState, SvsConfig,
    SvsPrior, TimeTree,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn random_f64(n: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            (state >> 11) as f64 / (1u64 << 53) as f64
        })
        .collect()
}

/// Caterpillar tree with `leaves` tips and unit spacing between speciations.
fn caterpillar(leaves: usize) -> String {
    let mut newick = "(t0:1,t1:1)".to_string();
    for i in 2..leaves {
        newick = format!("({}:1,t{}:{})", newick, i, i);
    }
    newick.push(';');
    newick
}

fn state(leaves: usize, log_rates: bool) -> SamplerState {
    let tree = TimeTree::from_newick(&caterpillar(leaves)).unwrap();
    let n = tree.node_count() - 1;
    let u = random_f64(n, 42);
    let rates: Vec<f64> = if log_rates {
        u.iter().map(|x| 0.05 + 0.5 * x).collect()
    } else {
        u.iter().map(|x| 0.5 + x).collect()
    };
    SamplerState::new(tree, rates, 0, 0.3, 0.2)
        .unwrap()
        .with_root_log_rate(clockwork_core::RealParameter::scalar("rootLogRate", 0.0))
        .unwrap()
}

fn bench_clock_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("clock_refresh");

    for leaves in [50, 500] {
        let mut s = state(leaves, true);
        let mut clock = ClockModel::auto_correlated(&s, &ClockConfig::default()).unwrap();
        let op = SingleRateScale::default();
        group.bench_with_input(BenchmarkId::new("bridged", leaves), &leaves, |b, _| {
            b.iter(|| {
                clock.store();
                op.apply(&mut s, 0, black_box(0.01));
                clock.refresh(&s).unwrap();
                clock.restore();
            })
        });

        let mut s = state(leaves, false);
        let mut clock = ClockModel::shared_rates(&s, true).unwrap();
        group.bench_with_input(BenchmarkId::new("shared_normalized", leaves), &leaves, |b, _| {
            b.iter(|| {
                clock.store();
                op.apply(&mut s, 0, black_box(0.01));
                clock.refresh(&s).unwrap();
                clock.restore();
            })
        });
    }

    group.finish();
}

fn bench_svs_density(c: &mut Criterion) {
    let mut group = c.benchmark_group("svs_density");

    for leaves in [50, 500] {
        let s = state(leaves, false);
        let prior = SvsPrior::new(&s, SvsConfig::default()).unwrap();
        group.bench_with_input(BenchmarkId::new("uc", leaves), &leaves, |b, _| {
            b.iter(|| prior.log_density_uc(black_box(&s)))
        });
        group.bench_with_input(BenchmarkId::new("ac", leaves), &leaves, |b, _| {
            b.iter(|| prior.log_density_ac(black_box(&s)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_clock_refresh, bench_svs_density);
criterion_main!(benches);
