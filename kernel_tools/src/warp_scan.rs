//! Scans across the lanes of a single warp.
//!
//! Every routine takes a per-warp ping-pong buffer of `2 * WARP_SIZE` words.
//! Each doubling step reads the half written by the previous step and writes
//! the other half, so a single `sync_warp` separates consecutive steps. On the
//! device the warp barrier is nearly free; on the host simulator it is what
//! stands in for lockstep execution.

use crate::block::{Block, WARP_SIZE};
use crate::step::doubling;

/// Words of the ping-pong buffer used by one warp.
pub const WARP_BUF_LEN: usize = 2 * WARP_SIZE;

/// The number of logical values scanned by one warp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarpScanWidth {
    W32,
    W64,
    W128,
}

impl WarpScanWidth {
    pub const fn values_per_lane(self) -> usize {
        match self {
            WarpScanWidth::W32 => 1,
            WarpScanWidth::W64 => 2,
            WarpScanWidth::W128 => 4,
        }
    }

    pub const fn len(self) -> usize {
        WARP_SIZE * self.values_per_lane()
    }

    /// The length of the values once one pad word follows every 32.
    pub const fn padded_len(self) -> usize {
        padded(self.len())
    }
}

/// Index of logical value `i` in a layout with one pad word per 32 values.
#[inline(always)]
pub const fn padded(i: usize) -> usize {
    i + i / WARP_SIZE
}

/// Runs the doubling steps and returns this lane's result together with the
/// half of `buf` holding every lane's result.
#[inline(always)]
unsafe fn scan_steps<B: Block>(
    block: &B,
    x: u32,
    stride: usize,
    width: usize,
    buf: *mut u32,
) -> (u32, *mut u32) {
    let lane = block.lane();
    let mut src = buf;
    let mut dst = buf.add(WARP_SIZE);

    let mut sum = x;
    *src.add(lane) = sum;
    block.sync_warp();

    for offset in doubling(stride, width) {
        if lane >= offset {
            sum = sum.wrapping_add(*src.add(lane - offset));
        }
        *dst.add(lane) = sum;
        block.sync_warp();
        core::mem::swap(&mut src, &mut dst);
    }

    (sum, src)
}

/// Inclusive scan of `x` over the lanes of the calling warp that are congruent
/// modulo `stride`, using offsets `stride, 2 * stride, ...` below `width`.
///
/// With `stride == 1` and `width == WARP_SIZE` this is a plain 32-wide scan.
/// Every lane of the warp must call this, including lanes whose result is
/// ignored.
pub unsafe fn inclusive_warp_scan<B: Block>(
    block: &B,
    x: u32,
    stride: usize,
    width: usize,
    buf: *mut u32,
) -> u32 {
    scan_steps(block, x, stride, width, buf).0
}

/// Exclusive counterpart of [`inclusive_warp_scan`].
pub unsafe fn exclusive_warp_scan<B: Block>(
    block: &B,
    x: u32,
    stride: usize,
    width: usize,
    buf: *mut u32,
) -> u32 {
    inclusive_warp_scan(block, x, stride, width, buf).wrapping_sub(x)
}

/// Exclusive scan in place of the `width.len()` values at `data`, stored with
/// one pad word per 32 values. Each lane owns `width.values_per_lane()`
/// consecutive values, folds them, takes part in a 32-wide scan of the folds and
/// then chains the carry back across its own values.
///
/// Returns the grand total to every lane.
pub unsafe fn exclusive_warp_scan_padded<B: Block>(
    block: &B,
    data: *mut u32,
    width: WarpScanWidth,
    buf: *mut u32,
) -> u32 {
    let per_lane = width.values_per_lane();
    let first = block.lane() * per_lane;

    let mut local = 0u32;
    for j in 0..per_lane {
        local = local.wrapping_add(*data.add(padded(first + j)));
    }

    let (inclusive, sums) = scan_steps(block, local, 1, WARP_SIZE, buf);
    let total = *sums.add(WARP_SIZE - 1);

    let mut running = inclusive.wrapping_sub(local);
    for j in 0..per_lane {
        let slot = data.add(padded(first + j));
        let value = *slot;
        *slot = running;
        running = running.wrapping_add(value);
    }

    total
}
