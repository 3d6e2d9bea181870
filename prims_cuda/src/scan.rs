//! Host entry points for the radix sort histogram scan.

use kernel_tools::block::{Block, DevPtr};
use kernel_tools::multi_scan::{strided_multi_scan, NUM_THREADS, SCRATCH_LEN, TOTALS_LEN};
use kernel_tools::sort_hist::{sort_hist as sort_hist_kernel, OFFSET_SCALE};

use crate::error::{PrimsError, Result};
use crate::sim::{self, LaunchConfig, SharedArray};

/// The widest digit a histogram scan kernel is instantiated for.
pub const MAX_DIGIT_BITS: u32 = 7;

/// Shared memory of a histogram scan block.
struct ScanShared {
    scratch: SharedArray<u32>,
    totals: SharedArray<u32>,
}

impl ScanShared {
    fn new() -> Self {
        Self {
            scratch: SharedArray::new(SCRATCH_LEN),
            totals: SharedArray::new(TOTALS_LEN),
        }
    }
}

/// Checks that `counts` holds one count per task and digit.
pub fn check_counts(num_bits: u32, counts: &[u32], num_tasks: usize) -> Result<()> {
    if !(1..=MAX_DIGIT_BITS).contains(&num_bits) {
        return Err(PrimsError::UnsupportedDigitBits(num_bits));
    }
    let num_digits = 1usize << num_bits;
    let expected = num_tasks.checked_mul(num_digits);
    if expected != Some(counts.len()) {
        return Err(PrimsError::CountsLength {
            expected: expected.unwrap_or(usize::MAX),
            actual: counts.len(),
            num_tasks,
            num_digits,
        });
    }
    Ok(())
}

/// Rewrites the digit-major per-block digit counts in `counts` with their
/// global scatter offsets (scaled by 4) and returns the total of every digit.
pub fn sort_hist(num_bits: u32, counts: &mut [u32], num_tasks: usize) -> Result<Vec<u32>> {
    let mut digit_totals = vec![0u32; 1usize << num_bits.min(MAX_DIGIT_BITS)];
    sort_hist_into(num_bits, counts, num_tasks, Some(&mut digit_totals))?;
    Ok(digit_totals)
}

/// Like [`sort_hist`], writing the digit totals only when `digit_totals` is
/// given.
pub fn sort_hist_into(
    num_bits: u32,
    counts: &mut [u32],
    num_tasks: usize,
    digit_totals: Option<&mut [u32]>,
) -> Result<()> {
    check_counts(num_bits, counts, num_tasks)?;
    let num_digits = 1usize << num_bits;
    if let Some(totals) = &digit_totals {
        if totals.len() < num_digits {
            return Err(PrimsError::OutputLength {
                expected: num_digits,
                actual: totals.len(),
            });
        }
    }

    let block_totals = DevPtr::new(counts.as_mut_ptr());
    let totals_out = digit_totals.map_or(DevPtr::null(), |t| DevPtr::new(t.as_mut_ptr()));

    match num_bits {
        1 => launch_sort_hist::<1>(block_totals, num_tasks, totals_out),
        2 => launch_sort_hist::<2>(block_totals, num_tasks, totals_out),
        3 => launch_sort_hist::<3>(block_totals, num_tasks, totals_out),
        4 => launch_sort_hist::<4>(block_totals, num_tasks, totals_out),
        5 => launch_sort_hist::<5>(block_totals, num_tasks, totals_out),
        6 => launch_sort_hist::<6>(block_totals, num_tasks, totals_out),
        7 => launch_sort_hist::<7>(block_totals, num_tasks, totals_out),
        _ => Err(PrimsError::UnsupportedDigitBits(num_bits)),
    }
}

fn launch_sort_hist<const NUM_BITS: u32>(
    block_totals: DevPtr<u32>,
    num_tasks: usize,
    digit_totals: DevPtr<u32>,
) -> Result<()> {
    sim::launch(
        LaunchConfig::new(1, NUM_THREADS),
        ScanShared::new,
        |block, shared| unsafe {
            sort_hist_kernel::<_, NUM_BITS>(
                block,
                block_totals.as_mut_ptr(),
                num_tasks,
                digit_totals.as_mut_ptr(),
                shared.scratch.as_mut_ptr(),
                shared.totals.as_mut_ptr(),
            )
        },
    )?;
    Ok(())
}

/// Runs one strided multi-scan block over `values` (one per thread) and returns
/// every thread's exclusive offset together with the digit totals.
pub fn multi_scan<const NUM_BITS: u32>(values: &[u32]) -> Result<(Vec<u32>, Vec<u32>)> {
    if values.len() != NUM_THREADS {
        return Err(PrimsError::CountsLength {
            expected: NUM_THREADS,
            actual: values.len(),
            num_tasks: NUM_THREADS >> NUM_BITS,
            num_digits: 1 << NUM_BITS,
        });
    }

    let mut offsets = vec![0u32; NUM_THREADS];
    let mut totals = vec![0u32; 1 << NUM_BITS];
    let dev_values = DevPtr::new(values.as_ptr() as *mut u32);
    let dev_offsets = DevPtr::new(offsets.as_mut_ptr());
    let dev_totals = DevPtr::new(totals.as_mut_ptr());

    sim::launch(
        LaunchConfig::new(1, NUM_THREADS),
        ScanShared::new,
        |block, shared| unsafe {
            let t_idx = block.thread_idx();
            let x = *dev_values.as_ptr().add(t_idx);
            let offset = strided_multi_scan::<_, NUM_BITS>(
                block,
                x,
                shared.scratch.as_mut_ptr(),
                shared.totals.as_mut_ptr(),
            );
            *dev_offsets.as_mut_ptr().add(t_idx) = offset;
            if t_idx < 1 << NUM_BITS {
                *dev_totals.as_mut_ptr().add(t_idx) = *shared.totals.as_mut_ptr().add(t_idx);
            }
        },
    )?;
    Ok((offsets, totals))
}

/// Exclusive scan.
pub fn sequential_exclusive_scan(xs: &[u32]) -> Vec<u32> {
    let mut accumulator = 0u32;
    xs.iter()
        .map(|&x| {
            let offset = accumulator;
            accumulator = accumulator.wrapping_add(x);
            offset
        })
        .collect()
}

/// The offsets [`sort_hist`] must produce, computed sequentially.
pub fn sort_hist_reference(counts: &[u32]) -> Vec<u32> {
    sequential_exclusive_scan(counts)
        .into_iter()
        .map(|offset| offset.wrapping_mul(OFFSET_SCALE))
        .collect()
}

/// The per-digit totals of digit-major counts.
pub fn digit_totals_reference(num_bits: u32, counts: &[u32], num_tasks: usize) -> Vec<u32> {
    (0..1usize << num_bits)
        .map(|digit| {
            counts[digit * num_tasks..(digit + 1) * num_tasks]
                .iter()
                .sum::<u32>()
        })
        .collect()
}

/// The offsets [`multi_scan`] must produce: thread `t` belongs to digit
/// `t % digits` and column `t / digits`.
pub fn multi_scan_reference(num_bits: u32, values: &[u32]) -> Vec<u32> {
    let num_digits = 1usize << num_bits;
    let columns = values.len() / num_digits;
    let digit_major = (0..num_digits)
        .flat_map(|digit| (0..columns).map(move |column| values[column * num_digits + digit]))
        .collect::<Vec<_>>();
    let scanned = sequential_exclusive_scan(&digit_major);

    let mut offsets = vec![0u32; values.len()];
    for digit in 0..num_digits {
        for column in 0..columns {
            offsets[column * num_digits + digit] = scanned[digit * columns + column];
        }
    }
    offsets
}
