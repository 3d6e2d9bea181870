use super::{LoadModifier, StoreModifier};
use crate::arch::CudaArch;

/// Coarse size class a tuning preset is chosen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProblemSize {
    Small,
    Large,
}

impl ProblemSize {
    /// Inputs of at least this many elements use the large presets.
    pub const LARGE_THRESHOLD: usize = 1 << 20;

    pub fn of(num_elements: usize) -> Self {
        if num_elements >= Self::LARGE_THRESHOLD {
            ProblemSize::Large
        } else {
            ProblemSize::Small
        }
    }
}

/// The flat list of reduction tunables, with tile dimensions given as log2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReduceTuning {
    pub read_modifier: LoadModifier,
    pub write_modifier: StoreModifier,
    pub work_stealing: bool,
    /// Launch every pass with the same dynamic shared memory footprint.
    pub uniform_smem_allocation: bool,
    /// Always launch the full occupancy-derived upsweep grid.
    pub uniform_grid_size: bool,
    /// Launch four times as many upsweep CTAs as fit on the device at once.
    pub oversubscribed_grid_size: bool,

    pub upsweep_min_cta_occupancy: usize,
    pub upsweep_log_threads: u32,
    pub upsweep_log_load_vec_size: u32,
    pub upsweep_log_loads_per_tile: u32,
    pub upsweep_log_schedule_granularity: u32,

    pub spine_log_threads: u32,
    pub spine_log_load_vec_size: u32,
    pub spine_log_loads_per_tile: u32,
}

impl ReduceTuning {
    /// The preset for a generation, problem size class and element width.
    pub fn tuned(arch: CudaArch, size: ProblemSize, element_bytes: usize) -> Self {
        let read_modifier = if arch.has_ldg() {
            LoadModifier::Ldg
        } else {
            LoadModifier::Cg
        };
        // Wide elements get narrower vector loads.
        let log_vec = if element_bytes <= 4 { 2 } else { 1 };

        match size {
            ProblemSize::Large => {
                // Fermi and Kepler GK104 balance better by stealing tiles.
                let work_stealing = arch < CudaArch::Sm35;
                let upsweep_log_threads = if arch >= CudaArch::Sm70 { 8 } else { 7 };
                let upsweep_log_loads_per_tile = 1;
                Self {
                    read_modifier,
                    write_modifier: StoreModifier::None,
                    work_stealing,
                    uniform_smem_allocation: false,
                    uniform_grid_size: false,
                    oversubscribed_grid_size: !work_stealing,
                    upsweep_min_cta_occupancy: 1,
                    upsweep_log_threads,
                    upsweep_log_load_vec_size: log_vec,
                    upsweep_log_loads_per_tile,
                    upsweep_log_schedule_granularity: upsweep_log_threads
                        + log_vec
                        + upsweep_log_loads_per_tile
                        + 2,
                    spine_log_threads: 8,
                    spine_log_load_vec_size: log_vec,
                    spine_log_loads_per_tile: 0,
                }
            }
            ProblemSize::Small => Self {
                read_modifier,
                write_modifier: StoreModifier::None,
                work_stealing: false,
                uniform_smem_allocation: false,
                uniform_grid_size: false,
                oversubscribed_grid_size: false,
                upsweep_min_cta_occupancy: 1,
                upsweep_log_threads: 7,
                upsweep_log_load_vec_size: 1,
                upsweep_log_loads_per_tile: 1,
                upsweep_log_schedule_granularity: 9,
                spine_log_threads: 7,
                spine_log_load_vec_size: 1,
                spine_log_loads_per_tile: 1,
            },
        }
    }
}

impl Default for ReduceTuning {
    fn default() -> Self {
        Self::tuned(CudaArch::Sm80, ProblemSize::Large, 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_classes() {
        assert_eq!(ProblemSize::of(1000), ProblemSize::Small);
        assert_eq!(ProblemSize::of(1 << 20), ProblemSize::Large);
    }

    #[test]
    fn old_generations_avoid_ldg() {
        let tuning = ReduceTuning::tuned(CudaArch::Sm30, ProblemSize::Large, 4);
        assert_eq!(tuning.read_modifier, LoadModifier::Cg);
        assert!(tuning.work_stealing);
        let tuning = ReduceTuning::tuned(CudaArch::Sm86, ProblemSize::Large, 8);
        assert_eq!(tuning.read_modifier, LoadModifier::Ldg);
        assert_eq!(tuning.upsweep_log_load_vec_size, 1);
    }
}
