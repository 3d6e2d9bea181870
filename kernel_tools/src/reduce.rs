//! Tile-based reduction kernels shared by the upsweep, spine and single
//! passes.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::block::Block;
use crate::step::halving;
use crate::work::WorkDecomposition;

/// The largest CTA any reduction pass is launched with.
pub const MAX_REDUCE_THREADS: usize = 1024;

/// An associative and commutative binary operator with an identity.
///
/// Threads load strided elements, so partial results are combined out of input
/// order.
pub trait ReduceOp<T>: Copy + Send + Sync {
    fn identity(&self) -> T;

    fn reduce(&self, a: T, b: T) -> T;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sum;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Max;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Min;

// Integer sums wrap modulo 2^bits, as on the device.
macro_rules! impl_sum {
    ($($t:ty),* $(,)?) => {
        $(
            impl ReduceOp<$t> for Sum {
                #[inline(always)]
                fn identity(&self) -> $t {
                    0
                }

                #[inline(always)]
                fn reduce(&self, a: $t, b: $t) -> $t {
                    a.wrapping_add(b)
                }
            }
        )*
    };
}

impl_sum!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

macro_rules! impl_float_sum {
    ($($t:ty),* $(,)?) => {
        $(
            impl ReduceOp<$t> for Sum {
                #[inline(always)]
                fn identity(&self) -> $t {
                    0.0
                }

                #[inline(always)]
                fn reduce(&self, a: $t, b: $t) -> $t {
                    a + b
                }
            }
        )*
    };
}

impl_float_sum!(f32, f64);

macro_rules! impl_extrema {
    ($($t:ty => $lowest:expr, $highest:expr);* $(;)?) => {
        $(
            impl ReduceOp<$t> for Max {
                #[inline(always)]
                fn identity(&self) -> $t {
                    $lowest
                }

                #[inline(always)]
                fn reduce(&self, a: $t, b: $t) -> $t {
                    if b > a { b } else { a }
                }
            }

            impl ReduceOp<$t> for Min {
                #[inline(always)]
                fn identity(&self) -> $t {
                    $highest
                }

                #[inline(always)]
                fn reduce(&self, a: $t, b: $t) -> $t {
                    if b < a { b } else { a }
                }
            }
        )*
    };
}

impl_extrema!(
    u32 => u32::MIN, u32::MAX;
    u64 => u64::MIN, u64::MAX;
    i32 => i32::MIN, i32::MAX;
    i64 => i64::MIN, i64::MAX;
    f32 => f32::NEG_INFINITY, f32::INFINITY;
    f64 => f64::NEG_INFINITY, f64::INFINITY;
);

/// The shape of the tile one CTA consumes per iteration: every thread issues
/// `loads_per_tile` vector loads of `load_vec_size` consecutive elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileShape {
    pub log_threads: u32,
    pub log_load_vec_size: u32,
    pub log_loads_per_tile: u32,
}

impl TileShape {
    pub const fn threads(&self) -> usize {
        1 << self.log_threads
    }

    pub const fn load_vec_size(&self) -> usize {
        1 << self.log_load_vec_size
    }

    pub const fn loads_per_tile(&self) -> usize {
        1 << self.log_loads_per_tile
    }

    pub const fn log_tile_elements(&self) -> u32 {
        self.log_threads
            .saturating_add(self.log_load_vec_size)
            .saturating_add(self.log_loads_per_tile)
    }

    pub const fn tile_elements(&self) -> usize {
        1 << self.log_tile_elements()
    }
}

/// Folds the elements `start..end` of one tile into `acc`.
#[inline(always)]
unsafe fn reduce_tile<B, T, Op>(
    block: &B,
    shape: TileShape,
    d_in: *const T,
    start: usize,
    end: usize,
    mut acc: T,
    op: Op,
) -> T
where
    B: Block,
    T: Copy,
    Op: ReduceOp<T>,
{
    let threads = shape.threads();
    let vec_size = shape.load_vec_size();
    let t_idx = block.thread_idx();

    for load in 0..shape.loads_per_tile() {
        let base = start + (load * threads + t_idx) * vec_size;
        for v in 0..vec_size {
            let i = base + v;
            if i < end {
                acc = op.reduce(acc, *d_in.add(i));
            }
        }
    }
    acc
}

/// Tree reduction of one value per thread. `partials` holds one slot per
/// thread; the block size must be a power of two.
pub unsafe fn block_reduce<B, T, Op>(block: &B, x: T, partials: *mut T, op: Op) -> T
where
    B: Block,
    T: Copy,
    Op: ReduceOp<T>,
{
    let t_idx = block.thread_idx();

    *partials.add(t_idx) = x;
    block.sync_threads();

    for stride in halving(block.block_dim() / 2) {
        if t_idx < stride {
            let v = op.reduce(*partials.add(t_idx), *partials.add(t_idx + stride));
            *partials.add(t_idx) = v;
        }
        block.sync_threads();
    }

    *partials
}

/// Reduces this CTA's share of `d_in` and writes it to `d_out[block_idx]`.
///
/// Without work stealing the CTA consumes the contiguous range the
/// decomposition assigns it. With work stealing every CTA claims whole tiles
/// from the launch-wide `progress` counter, which must start at zero, until the
/// input is exhausted.
///
/// `partials` is block shared memory with one slot per thread and `tile_slot`
/// one shared word.
#[allow(clippy::too_many_arguments)]
pub unsafe fn reduce_tiles<B, T, Op>(
    block: &B,
    shape: TileShape,
    work: &WorkDecomposition,
    work_stealing: bool,
    d_in: *const T,
    d_out: *mut T,
    progress: *mut u32,
    partials: *mut T,
    tile_slot: *mut u32,
    op: Op,
) where
    B: Block,
    T: Copy,
    Op: ReduceOp<T>,
{
    let tile_elements = shape.tile_elements();
    let mut acc = op.identity();

    if work_stealing {
        let num_tiles = (work.num_elements + tile_elements - 1) / tile_elements;
        loop {
            if block.thread_idx() == 0 {
                *tile_slot = AtomicU32::from_ptr(progress).fetch_add(1, Ordering::Relaxed);
            }
            block.sync_threads();
            let tile = *tile_slot as usize;
            block.sync_threads();

            if tile >= num_tiles {
                break;
            }
            let start = tile * tile_elements;
            let end = (start + tile_elements).min(work.num_elements);
            acc = reduce_tile(block, shape, d_in, start, end, acc, op);
        }
    } else {
        let range = work.cta_range(block.block_idx());
        let mut start = range.start;
        while start < range.end {
            let end = (start + tile_elements).min(range.end);
            acc = reduce_tile(block, shape, d_in, start, end, acc, op);
            start += tile_elements;
        }
    }

    let total = block_reduce(block, acc, partials, op);
    if block.thread_idx() == 0 {
        *d_out.add(block.block_idx()) = total;
    }
}

#[cfg(target_os = "cuda")]
macro_rules! reduce_sum_kernels {
    ($($name:ident),* $(,)?) => {
        $(
            #[cuda_std::kernel]
            #[allow(improper_ctypes_definitions, clippy::missing_safety_doc, clippy::too_many_arguments)]
            pub unsafe fn $name(
                log_threads: u32,
                log_load_vec_size: u32,
                log_loads_per_tile: u32,
                log_schedule_granularity: u32,
                work_stealing: u32,
                num_elements: usize,
                d_in: *const u32,
                d_out: *mut u32,
                progress: *mut u32,
            ) {
                let partials = cuda_std::shared_array![u32; MAX_REDUCE_THREADS];
                let tile_slot = cuda_std::shared_array![u32; 1];
                let block = crate::block::CudaBlock;
                let shape = TileShape {
                    log_threads,
                    log_load_vec_size,
                    log_loads_per_tile,
                };
                let work = WorkDecomposition::new(
                    num_elements,
                    block.grid_dim(),
                    log_schedule_granularity,
                );
                reduce_tiles(
                    &block,
                    shape,
                    &work,
                    work_stealing != 0,
                    d_in,
                    d_out,
                    progress,
                    partials,
                    tile_slot,
                    Sum,
                )
            }
        )*
    };
}

#[cfg(target_os = "cuda")]
reduce_sum_kernels!(
    reduce_upsweep_u32_sum,
    reduce_spine_u32_sum,
    reduce_single_u32_sum
);

#[cfg(test)]
mod tests {
    use super::{Max, Min, ReduceOp, Sum, TileShape};

    #[test]
    fn operators() {
        assert_eq!(ReduceOp::<u32>::identity(&Sum), 0);
        assert_eq!(Sum.reduce(3u64, 4), 7);
        assert_eq!(Sum.reduce(2.5f64, 0.5), 3.0);
        assert_eq!(Max.reduce(3i32, -4), 3);
        assert_eq!(ReduceOp::<i32>::identity(&Max), i32::MIN);
        assert_eq!(Min.reduce(2.5f32, 1.0), 1.0);
    }

    #[test]
    fn integer_sums_wrap() {
        assert_eq!(Sum.reduce(u32::MAX, 1), 0);
        assert_eq!(Sum.reduce(i64::MAX, 1), i64::MIN);
    }

    #[test]
    fn tile_shape() {
        let shape = TileShape {
            log_threads: 7,
            log_load_vec_size: 2,
            log_loads_per_tile: 1,
        };
        assert_eq!(shape.threads(), 128);
        assert_eq!(shape.tile_elements(), 1024);
    }
}
