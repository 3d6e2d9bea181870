use std::time::Instant;

use prims_cuda::policy::{ProblemSize, ReduceTuning};
use prims_cuda::{
    scan, CudaArch, Device, ReduceEnactor, ReducePolicyBuilder, ReduceProblem, Sum,
};
use rand::{Rng, SeedableRng};
use rand_hc::Hc128Rng;

const SEED: &[u8; 32] = b"Kq2vT8mZs1XeB7rYw4NcLd0hUjP5aFgO";

pub fn main() -> prims_cuda::Result<()> {
    env_logger::init();
    let mut rng = Hc128Rng::from_seed(*SEED);

    let num_bits = 4;
    let num_tasks = 100;
    let mut counts = (0..num_tasks << num_bits)
        .map(|_| rng.gen_range(0..64u32))
        .collect::<Vec<_>>();
    let expected = scan::sort_hist_reference(&counts);
    let digit_totals = scan::sort_hist(num_bits, &mut counts, num_tasks)?;
    println!("digit totals: {:?}", digit_totals);
    println!("offsets: {:?}", &counts[..16]);
    println!("matches reference: {}", counts == expected);

    let arch = CudaArch::Sm80;
    let xs = (0..1 << 20).map(|_| rng.gen_range(0..16u32)).collect::<Vec<_>>();
    let policy = ReducePolicyBuilder::new(ReduceProblem::<u32, u32, Sum>::new(Sum), arch)
        .tuning(ReduceTuning::tuned(arch, ProblemSize::of(xs.len()), 4))
        .build()?;
    policy.print();

    let enactor = ReduceEnactor::new(Device::new(arch, 8));
    println!("plan: {:?}", enactor.plan(&policy, xs.len()));
    let now = Instant::now();
    let sum = enactor.reduce(&policy, &xs)?;
    println!("sum: {} ({:?})", sum, now.elapsed());
    println!("expected: {}", xs.iter().sum::<u32>());
    Ok(())
}
