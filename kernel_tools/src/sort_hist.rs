//! The histogram scan of a radix sort pass: per-block digit counts in, global
//! scatter offsets out.

use crate::block::Block;
use crate::multi_scan::{strided_multi_scan, MultiScanShape};
use crate::work::task_range;

#[cfg(target_os = "cuda")]
use crate::{
    block::CudaBlock,
    multi_scan::{SCRATCH_LEN, TOTALS_LEN},
};

/// Scatter offsets are written pre-multiplied by the byte width of a 32-bit
/// key.
pub const OFFSET_SCALE: u32 = 4;

/// Turns the per-block digit counts of a radix sort pass into global scatter
/// offsets.
///
/// `block_totals` holds `1 << NUM_BITS` rows of `num_tasks` counts, one row per
/// digit. Each count is replaced by `OFFSET_SCALE` times the number of items
/// that precede it in digit-major, task-major order. When `digit_totals` is not
/// null, the count of every digit is written to it.
///
/// Runs as a single block of `NUM_THREADS` threads. The tasks of each digit are
/// split evenly over the `NUM_THREADS >> NUM_BITS` threads that share the
/// digit.
pub unsafe fn sort_hist<B: Block, const NUM_BITS: u32>(
    block: &B,
    block_totals: *mut u32,
    num_tasks: usize,
    digit_totals: *mut u32,
    scratch: *mut u32,
    totals: *mut u32,
) {
    let num_digits = MultiScanShape::<NUM_BITS>::NUM_DIGITS;
    let columns = MultiScanShape::<NUM_BITS>::COLUMNS;

    let tid = block.thread_idx();
    let digit = tid & (num_digits - 1);
    let tasks = task_range(num_tasks, columns, tid >> NUM_BITS);
    let counts = block_totals.add(digit * num_tasks);

    // Upsweep: the count of this thread's digit over its tasks.
    let mut sum = 0u32;
    for task in tasks.clone() {
        sum = sum.wrapping_add(*counts.add(task));
    }

    let mut offset = strided_multi_scan::<B, NUM_BITS>(block, sum, scratch, totals);

    // Downsweep: rewrite each count with its scaled exclusive offset.
    for task in tasks {
        let slot = counts.add(task);
        let count = *slot;
        *slot = offset.wrapping_mul(OFFSET_SCALE);
        offset = offset.wrapping_add(count);
    }

    if !digit_totals.is_null() && tid < num_digits {
        *digit_totals.add(tid) = *totals.add(tid);
    }
}

#[cfg(target_os = "cuda")]
macro_rules! sort_hist_kernels {
    ($($name:ident => $bits:literal),* $(,)?) => {
        $(
            #[cuda_std::kernel]
            #[allow(improper_ctypes_definitions, clippy::missing_safety_doc)]
            pub unsafe fn $name(block_totals: *mut u32, num_tasks: usize, digit_totals: *mut u32) {
                let scratch = cuda_std::shared_array![u32; SCRATCH_LEN];
                let totals = cuda_std::shared_array![u32; TOTALS_LEN];
                sort_hist::<_, $bits>(&CudaBlock, block_totals, num_tasks, digit_totals, scratch, totals)
            }
        )*
    };
}

#[cfg(target_os = "cuda")]
sort_hist_kernels!(
    sort_hist_1 => 1,
    sort_hist_2 => 2,
    sort_hist_3 => 3,
    sort_hist_4 => 4,
    sort_hist_5 => 5,
    sort_hist_6 => 6,
    sort_hist_7 => 7,
);
