//! Block-wide exclusive scan of per-digit counts.
//!
//! Thread `t` of the block holds the count of digit `t % NUM_DIGITS` for column
//! `t / NUM_DIGITS`. The scan orders entries digit-major, then column-major, so
//! each thread receives the offset of its first item within the block's
//! digit-sorted output.

use crate::block::{Block, WARP_SIZE};
use crate::warp_scan::{
    exclusive_warp_scan_padded, inclusive_warp_scan, padded, WarpScanWidth, WARP_BUF_LEN,
};

/// The block size every multi-scan kernel is launched with.
pub const NUM_THREADS: usize = 1024;

pub const NUM_WARPS: usize = NUM_THREADS / WARP_SIZE;

/// Words of the `scratch` buffer.
pub const SCRATCH_LEN: usize = 2 * NUM_THREADS;

/// Words of the `totals` buffer.
pub const TOTALS_LEN: usize = NUM_THREADS;

// A row of per-warp totals for one digit, padded by one word.
const ROW_LEN: usize = WARP_SIZE + 1;

// Start of the warp ping-pong buffers used after the first phase.
const WARP_BUFS: usize = NUM_THREADS;

// Start of the scanned digit offsets within `totals`.
const DIGIT_OFFSETS: usize = 256;

/// The algorithm used for a digit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanRegime {
    /// Fewer digits than warp lanes: every warp scans runs of repeated digits.
    Fine,
    /// 32, 64 or 128 digits: each digit's duplicates are folded sequentially
    /// and the digit totals are scanned by one warp.
    Coarse(WarpScanWidth),
}

impl ScanRegime {
    pub const fn select(num_bits: u32) -> Self {
        match 1usize << num_bits {
            d if d < WARP_SIZE => ScanRegime::Fine,
            32 => ScanRegime::Coarse(WarpScanWidth::W32),
            64 => ScanRegime::Coarse(WarpScanWidth::W64),
            _ => ScanRegime::Coarse(WarpScanWidth::W128),
        }
    }
}

/// Compile-time shape of a multi-scan over `1 << NUM_BITS` digits.
pub struct MultiScanShape<const NUM_BITS: u32>;

impl<const NUM_BITS: u32> MultiScanShape<NUM_BITS> {
    pub const SUPPORTED: () = assert!(
        NUM_BITS >= 1 && NUM_BITS <= 7,
        "multi-scan digit width must be between 1 and 7 bits"
    );

    pub const NUM_DIGITS: usize = 1 << NUM_BITS;

    /// The number of threads sharing a digit.
    pub const COLUMNS: usize = NUM_THREADS >> NUM_BITS;

    pub const REGIME: ScanRegime = ScanRegime::select(NUM_BITS);
}

/// Exclusive scan of `x` across the block in digit-major, column-major order.
///
/// `scratch` must hold [`SCRATCH_LEN`] words and `totals` [`TOTALS_LEN`] words
/// of block shared memory. When this returns, `totals[d]` holds the grand total
/// of digit `d`. Must be called by all [`NUM_THREADS`] threads of the block.
pub unsafe fn strided_multi_scan<B: Block, const NUM_BITS: u32>(
    block: &B,
    x: u32,
    scratch: *mut u32,
    totals: *mut u32,
) -> u32 {
    #[allow(clippy::let_unit_value)]
    let () = MultiScanShape::<NUM_BITS>::SUPPORTED;
    debug_assert_eq!(block.block_dim(), NUM_THREADS);

    match MultiScanShape::<NUM_BITS>::REGIME {
        ScanRegime::Fine => fine_multi_scan::<B, NUM_BITS>(block, x, scratch, totals),
        ScanRegime::Coarse(width) => {
            coarse_multi_scan::<B, NUM_BITS>(block, x, width, scratch, totals)
        }
    }
}

unsafe fn fine_multi_scan<B: Block, const NUM_BITS: u32>(
    block: &B,
    x: u32,
    scratch: *mut u32,
    totals: *mut u32,
) -> u32 {
    let num_digits = MultiScanShape::<NUM_BITS>::NUM_DIGITS;
    let lane = block.lane();
    let warp = block.warp();
    let digit = block.thread_idx() & (num_digits - 1);

    // Lanes of one digit sit `num_digits` apart within the warp.
    let inclusive = inclusive_warp_scan(
        block,
        x,
        num_digits,
        WARP_SIZE,
        scratch.add(warp * WARP_BUF_LEN),
    );
    block.sync_threads();

    // The last run of the warp holds the warp's total of every digit.
    if lane >= WARP_SIZE - num_digits {
        *scratch.add(digit * ROW_LEN + warp) = inclusive;
    }
    block.sync_threads();

    // Warp `d` scans the per-warp totals of digit `d`.
    if warp < num_digits {
        let row = scratch.add(warp * ROW_LEN);
        let warp_total = *row.add(lane);
        let warp_inclusive = inclusive_warp_scan(
            block,
            warp_total,
            1,
            WARP_SIZE,
            scratch.add(WARP_BUFS + warp * WARP_BUF_LEN),
        );
        *row.add(lane) = warp_inclusive.wrapping_sub(warp_total);
        if lane == WARP_SIZE - 1 {
            *totals.add(warp) = warp_inclusive;
        }
    }
    block.sync_threads();

    if warp == 0 {
        let total = if lane < num_digits { *totals.add(lane) } else { 0 };
        let digit_inclusive =
            inclusive_warp_scan(block, total, 1, num_digits, scratch.add(WARP_BUFS));
        if lane < num_digits {
            *totals.add(DIGIT_OFFSETS + lane) = digit_inclusive.wrapping_sub(total);
        }
    }
    block.sync_threads();

    let digit_offset = *totals.add(DIGIT_OFFSETS + digit);
    let warp_offset = *scratch.add(digit * ROW_LEN + warp);
    digit_offset
        .wrapping_add(warp_offset)
        .wrapping_add(inclusive.wrapping_sub(x))
}

unsafe fn coarse_multi_scan<B: Block, const NUM_BITS: u32>(
    block: &B,
    x: u32,
    width: WarpScanWidth,
    scratch: *mut u32,
    totals: *mut u32,
) -> u32 {
    let num_digits = MultiScanShape::<NUM_BITS>::NUM_DIGITS;
    let columns = MultiScanShape::<NUM_BITS>::COLUMNS;
    let tid = block.thread_idx();
    let digit = tid & (num_digits - 1);

    *scratch.add(tid) = x;
    block.sync_threads();

    // Few duplicates per digit, so each digit is folded by one thread.
    if tid < num_digits {
        let mut running = 0u32;
        for column in 0..columns {
            let slot = scratch.add(column * num_digits + tid);
            let count = *slot;
            *slot = running;
            running = running.wrapping_add(count);
        }
        *totals.add(tid) = running;
        *totals.add(DIGIT_OFFSETS + padded(tid)) = running;
    }
    block.sync_threads();

    if block.warp() == 0 {
        exclusive_warp_scan_padded(block, totals.add(DIGIT_OFFSETS), width, scratch.add(WARP_BUFS));
    }
    block.sync_threads();

    (*totals.add(DIGIT_OFFSETS + padded(digit))).wrapping_add(*scratch.add(tid))
}

#[cfg(test)]
mod tests {
    use super::{MultiScanShape, ScanRegime};
    use crate::warp_scan::WarpScanWidth;

    #[test]
    fn regime_selection() {
        assert_eq!(MultiScanShape::<1>::REGIME, ScanRegime::Fine);
        assert_eq!(MultiScanShape::<4>::REGIME, ScanRegime::Fine);
        assert_eq!(
            MultiScanShape::<5>::REGIME,
            ScanRegime::Coarse(WarpScanWidth::W32)
        );
        assert_eq!(
            MultiScanShape::<6>::REGIME,
            ScanRegime::Coarse(WarpScanWidth::W64)
        );
        assert_eq!(
            MultiScanShape::<7>::REGIME,
            ScanRegime::Coarse(WarpScanWidth::W128)
        );
    }

    #[test]
    fn columns_per_digit() {
        assert_eq!(MultiScanShape::<1>::COLUMNS, 512);
        assert_eq!(MultiScanShape::<5>::COLUMNS, 32);
        assert_eq!(MultiScanShape::<7>::COLUMNS, 8);
    }
}
