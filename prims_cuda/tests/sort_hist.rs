//! Histogram scan kernels checked against the sequential reference.

use prims_cuda::scan::{
    digit_totals_reference, multi_scan, multi_scan_reference, sort_hist, sort_hist_into,
    sort_hist_reference,
};
use prims_cuda::PrimsError;
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_hc::Hc128Rng;

const SEED: &[u8; 32] = b"hR3nQ8cVx0LmZt5WkJ2yBe7sUaP9dGfN";

fn random_counts(num_bits: u32, num_tasks: usize, max: u32, rng: &mut impl Rng) -> Vec<u32> {
    (0..num_tasks << num_bits)
        .map(|_| rng.gen_range(0..max))
        .collect()
}

#[test]
fn two_digits_four_tasks() {
    let mut counts = vec![3, 1, 4, 1, 1, 5, 9, 2];
    let totals = sort_hist(1, &mut counts, 4).unwrap();
    assert_eq!(counts, vec![0, 12, 16, 32, 36, 40, 60, 96]);
    assert_eq!(totals, vec![9, 17]);
}

#[test]
fn every_digit_width_matches_reference() {
    let mut rng = Hc128Rng::from_seed(*SEED);
    for num_bits in 1..=7 {
        for num_tasks in [1, 7, 100, 1000] {
            let mut counts = random_counts(num_bits, num_tasks, 256, &mut rng);
            let expected = sort_hist_reference(&counts);
            let expected_totals = digit_totals_reference(num_bits, &counts, num_tasks);

            let totals = sort_hist(num_bits, &mut counts, num_tasks).unwrap();
            assert_eq!(counts, expected, "{num_bits} bits, {num_tasks} tasks");
            assert_eq!(totals, expected_totals, "{num_bits} bits, {num_tasks} tasks");
        }
    }
}

#[test]
fn offsets_partition_the_output() {
    let mut rng = Hc128Rng::from_seed(*SEED);
    let num_bits = 3;
    let num_tasks = 50;
    let before = random_counts(num_bits, num_tasks, 40, &mut rng);
    let mut counts = before.clone();
    sort_hist(num_bits, &mut counts, num_tasks).unwrap();

    // Every block's range of each digit ends where the next one starts.
    for i in 0..counts.len() - 1 {
        assert_eq!(counts[i] + 4 * before[i], counts[i + 1]);
    }
    let total = before.iter().sum::<u32>();
    assert_eq!(counts[counts.len() - 1] + 4 * before[before.len() - 1], 4 * total);
    assert_eq!(counts[0], 0);
}

#[test]
fn fewer_tasks_than_threads_per_digit() {
    // 128 threads share each of the 8 digits but there are only 3 tasks.
    let mut counts = (1..=24).collect::<Vec<u32>>();
    let expected = sort_hist_reference(&counts);
    sort_hist(3, &mut counts, 3).unwrap();
    assert_eq!(counts, expected);
}

#[test]
fn zero_tasks() {
    let mut counts = Vec::new();
    let totals = sort_hist(4, &mut counts, 0).unwrap();
    assert_eq!(totals, vec![0; 16]);
}

#[test]
fn digit_totals_are_optional() {
    let mut counts = vec![2, 2, 2, 2];
    sort_hist_into(2, &mut counts, 1, None).unwrap();
    assert_eq!(counts, vec![0, 8, 16, 24]);

    let mut counts = vec![2, 2, 2, 2];
    let mut totals = [0u32; 2];
    assert!(matches!(
        sort_hist_into(2, &mut counts, 1, Some(&mut totals)),
        Err(PrimsError::OutputLength {
            expected: 4,
            actual: 2
        })
    ));
}

#[test]
fn offsets_wrap_on_overflow() {
    let mut counts = vec![u32::MAX / 4 + 1, 1];
    sort_hist(1, &mut counts, 1).unwrap();
    assert_eq!(counts, vec![0, (u32::MAX / 4 + 1).wrapping_mul(4)]);
}

#[test]
fn multi_scan_regimes_agree_with_reference() {
    let mut rng = Hc128Rng::from_seed(*SEED);
    let values = (0..1024).map(|_| rng.gen_range(0..100)).collect::<Vec<u32>>();

    macro_rules! check {
        ($($bits:literal),*) => {
            $(
                let (offsets, totals) = multi_scan::<$bits>(&values).unwrap();
                assert_eq!(offsets, multi_scan_reference($bits, &values), "{} bits", $bits);
                let columns = 1024 >> $bits;
                let expected_totals = (0..1usize << $bits)
                    .map(|d| (0..columns).map(|c| values[c * (1 << $bits) + d]).sum::<u32>())
                    .collect::<Vec<_>>();
                assert_eq!(totals, expected_totals, "{} bits", $bits);
            )*
        };
    }
    check!(1, 2, 3, 4, 5, 6, 7);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn scaled_by_four(num_bits in 1u32..=7, num_tasks in 0usize..300, seed in any::<u64>()) {
        let mut rng = Hc128Rng::seed_from_u64(seed);
        let before = random_counts(num_bits, num_tasks, 1 << 16, &mut rng);
        let mut counts = before.clone();
        sort_hist(num_bits, &mut counts, num_tasks).unwrap();

        let unscaled = prims_cuda::scan::sequential_exclusive_scan(&before);
        for (offset, expected) in counts.iter().zip(unscaled) {
            prop_assert_eq!(*offset, expected.wrapping_mul(4));
        }
    }
}
