use core::ops::Range;

/// Splits `len` units across `parts` parts so that the part lengths differ by
/// at most one; the first `len % parts` parts take the extra unit.
#[inline(always)]
pub fn task_range(len: usize, parts: usize, part: usize) -> Range<usize> {
    let quot = len / parts;
    let rem = len % parts;
    let start = part * quot + part.min(rem);
    let end = start + quot + (part < rem) as usize;
    start..end
}

/// How the elements of a reduction are shared out over the CTAs of a grid.
///
/// The input is cut into grains of `1 << log_schedule_granularity` elements;
/// each CTA receives a contiguous run of whole grains and the last grain is
/// clipped to the input length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkDecomposition {
    pub num_elements: usize,
    pub grid_size: usize,
    pub log_schedule_granularity: u32,
    pub total_grains: usize,
    pub grains_per_cta: usize,
    pub extra_grains: usize,
}

impl WorkDecomposition {
    pub fn new(num_elements: usize, grid_size: usize, log_schedule_granularity: u32) -> Self {
        let granularity = 1usize << log_schedule_granularity;
        let total_grains = (num_elements + granularity - 1) / granularity;
        let grid_size = grid_size.max(1);
        Self {
            num_elements,
            grid_size,
            log_schedule_granularity,
            total_grains,
            grains_per_cta: total_grains / grid_size,
            extra_grains: total_grains % grid_size,
        }
    }

    pub fn schedule_granularity(&self) -> usize {
        1 << self.log_schedule_granularity
    }

    /// The element range owned by the given CTA.
    pub fn cta_range(&self, block_idx: usize) -> Range<usize> {
        let grains = task_range(self.total_grains, self.grid_size, block_idx);
        let start = (grains.start << self.log_schedule_granularity).min(self.num_elements);
        let end = (grains.end << self.log_schedule_granularity).min(self.num_elements);
        start..end
    }
}
