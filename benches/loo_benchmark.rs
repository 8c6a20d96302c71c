// ========================================================================================
//
//                 PSEUDOSTATE LEAVE-ONE-OUT BENCHMARK
//
// ========================================================================================
//
// Measures how the full jackknife over Aalen-Johansen estimates scales with the
// number of individuals. Every pass rebuilds the risk-set table, so the total
// cost grows roughly quadratically in the sample size.
//
// ========================================================================================

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use pseudostate::{Sample, aalen_johansen_engine};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// --- Benchmark Tuning Parameters ---

/// Sample sizes to test.
const SAMPLE_SIZES: [usize; 4] = [100, 250, 500, 1_000];
/// Number of absorbing states drawn for uncensored individuals.
const NUM_STATES: u32 = 3;
/// Share of individuals that are censored.
const CENSORED_FRACTION: f64 = 0.3;

fn simulate(n: usize, rng: &mut StdRng) -> Sample {
    let times = (0..n).map(|_| rng.gen_range(0.0..365.0_f64).round()).collect();
    let states = (0..n)
        .map(|_| {
            if rng.gen_bool(CENSORED_FRACTION) {
                0
            } else {
                rng.gen_range(1..=NUM_STATES)
            }
        })
        .collect();
    Sample::new(times, states).expect("simulated sample is valid")
}

fn bench_leave_one_out(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut group = c.benchmark_group("aalen_johansen_pseudo_observations");

    for &n in &SAMPLE_SIZES {
        let sample = simulate(n, &mut rng);
        let horizon = sample.max_time().unwrap_or(0.0) / 2.0;
        let engine = aalen_johansen_engine(&sample, 0);

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &sample, |b, sample| {
            b.iter(|| {
                engine
                    .compute(black_box(sample), black_box(horizon))
                    .expect("pseudo-observations")
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_leave_one_out);
criterion_main!(benches);
