use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode};
use prims_cuda::policy::{ProblemSize, ReduceTuning};
use prims_cuda::{scan, CudaArch, Device, ReduceEnactor, ReducePolicyBuilder, ReduceProblem, Sum};
use rand::{Rng, SeedableRng};
use rand_hc::Hc128Rng;
use rayon::prelude::*;

const SEED: &[u8; 32] = b"LVXn6sWNasjDReRS2OZ9a0eY1aprVNYX";

/// Creates digit-major counts for `num_tasks` blocks.
fn create_random_counts(num_bits: u32, num_tasks: usize, rng: &mut impl Rng) -> Vec<u32> {
    (0..num_tasks << num_bits)
        .map(|_| rng.gen_range(0..1024))
        .collect()
}

pub fn sort_hist_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("Sort histogram");
    group.sample_size(10);
    group.sampling_mode(SamplingMode::Flat);

    for num_bits in [2u32, 4, 5, 7] {
        let mut rng = Hc128Rng::from_seed(*SEED);
        let num_tasks = 256;
        let counts = create_random_counts(num_bits, num_tasks, &mut rng);

        group.bench_with_input(BenchmarkId::new("SortHist", num_bits), &num_bits, |b, _| {
            b.iter(|| {
                let mut counts = counts.clone();
                scan::sort_hist(num_bits, &mut counts, num_tasks).unwrap()
            })
        });

        group.bench_with_input(BenchmarkId::new("Sequential", num_bits), &num_bits, |b, _| {
            b.iter(|| scan::sort_hist_reference(&counts))
        });
    }

    group.finish();
}

pub fn reduce_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("Reduction");
    group.sample_size(10);
    group.sampling_mode(SamplingMode::Flat);

    let arch = CudaArch::Sm80;
    let enactor = ReduceEnactor::new(Device::new(arch, 4));

    for len in [10_000usize, 100_000, 1_000_000] {
        let mut rng = Hc128Rng::from_seed(*SEED);
        let xs: Vec<u32> = (0..len).map(|_| rng.gen_range(0..16)).collect();
        let policy = ReducePolicyBuilder::new(ReduceProblem::<u32, u32, Sum>::new(Sum), arch)
            .tuning(ReduceTuning::tuned(arch, ProblemSize::of(len), 4))
            .build()
            .unwrap();

        group.bench_with_input(BenchmarkId::new("Enactor", len), &len, |b, _| {
            b.iter(|| enactor.reduce(&policy, &xs).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("Rayon", len), &len, |b, _| {
            b.iter(|| xs.par_iter().sum::<u32>())
        });
    }

    group.finish();
}

criterion_group!(benches, sort_hist_comparison, reduce_comparison);
criterion_main!(benches);
