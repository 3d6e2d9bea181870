use std::fmt;
use std::mem::size_of;

use kernel_tools::reduce::{TileShape, MAX_REDUCE_THREADS};
use kernel_tools::work::WorkDecomposition;

use super::{KernelVariant, LoadModifier, StoreModifier};
use crate::arch::CudaArch;
use crate::error::{PrimsError, Result};

// Registers every reduction thread needs regardless of its tile shape.
const BASE_REGISTERS: usize = 16;

// Largest number of elements one thread may hold from a tile, as log2.
const MAX_LOG_THREAD_ELEMENTS: u32 = 8;

// Grains are addressed with 32-bit element offsets.
const MAX_LOG_SCHEDULE_GRANULARITY: u32 = 31;

/// The resolved configuration of one reduction kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelPolicy {
    pub variant: KernelVariant,
    pub arch: CudaArch,
    pub tile: TileShape,
    pub log_schedule_granularity: u32,
    pub work_stealing: bool,
    pub read_modifier: LoadModifier,
    pub write_modifier: StoreModifier,
    pub min_cta_occupancy: usize,
    pub element_bytes: usize,
}

impl KernelPolicy {
    pub fn threads(&self) -> usize {
        self.tile.threads()
    }

    pub fn tile_elements(&self) -> usize {
        self.tile.tile_elements()
    }

    pub fn schedule_granularity(&self) -> usize {
        1 << self.log_schedule_granularity
    }

    /// Shared memory of one CTA: a partial per thread and the work-stealing
    /// tile slot.
    pub fn smem_bytes(&self) -> usize {
        self.threads() * self.element_bytes + size_of::<u32>()
    }

    /// Estimated registers per thread: a fixed base plus one per word of every
    /// element a thread holds from a tile.
    pub fn registers_per_thread(&self) -> usize {
        let words = (self.element_bytes + 3) / 4;
        BASE_REGISTERS + self.tile.load_vec_size() * self.tile.loads_per_tile() * words
    }

    /// The number of CTAs that fit on one SM at once.
    pub fn max_cta_occupancy(&self) -> usize {
        let props = self.arch.props();
        let threads = self.threads();
        let by_threads = props.max_threads_per_sm / threads;
        let by_smem = props.smem_bytes_per_sm / self.smem_bytes();
        let by_regs = props.regs_per_sm / (self.registers_per_thread() * threads);
        props.max_ctas_per_sm.min(by_threads).min(by_smem).min(by_regs)
    }

    /// Rejects log2 tunables too large for the derived sizes to be computed.
    fn check_shape(&self) -> std::result::Result<(), String> {
        let max_log_threads = MAX_REDUCE_THREADS.trailing_zeros();
        if self.tile.log_threads > max_log_threads {
            return Err(format!(
                "log threads of {} exceed {max_log_threads}",
                self.tile.log_threads
            ));
        }
        let log_thread_elements = self
            .tile
            .log_load_vec_size
            .saturating_add(self.tile.log_loads_per_tile);
        if log_thread_elements > MAX_LOG_THREAD_ELEMENTS {
            return Err(format!(
                "log elements per thread of {log_thread_elements} exceed {MAX_LOG_THREAD_ELEMENTS}"
            ));
        }
        if self.log_schedule_granularity > MAX_LOG_SCHEDULE_GRANULARITY {
            return Err(format!(
                "log schedule granularity of {} exceeds {MAX_LOG_SCHEDULE_GRANULARITY}",
                self.log_schedule_granularity
            ));
        }
        Ok(())
    }

    /// Checks the configuration against the architecture's limits.
    pub fn validate(&self) -> Result<()> {
        let props = self.arch.props();
        let invalid = |reason: String| {
            Err(PrimsError::InvalidPolicy {
                variant: self.variant,
                reason,
            })
        };

        if let Err(reason) = self.check_shape() {
            return invalid(reason);
        }

        let threads = self.threads();
        let max_threads = props.max_threads_per_block.min(MAX_REDUCE_THREADS);
        if threads < props.warp_threads || threads > max_threads {
            return invalid(format!(
                "{threads} threads per CTA outside {}..={max_threads}",
                props.warp_threads
            ));
        }
        if self.log_schedule_granularity < self.tile.log_tile_elements() {
            return invalid(format!(
                "schedule granularity {} is smaller than a tile of {} elements",
                self.schedule_granularity(),
                self.tile_elements()
            ));
        }
        if self.smem_bytes() > props.max_smem_bytes_per_block {
            return invalid(format!(
                "{} bytes of shared memory exceed the {} byte limit",
                self.smem_bytes(),
                props.max_smem_bytes_per_block
            ));
        }
        if self.registers_per_thread() > props.max_regs_per_thread {
            return invalid(format!(
                "about {} registers per thread exceed the {} register limit",
                self.registers_per_thread(),
                props.max_regs_per_thread
            ));
        }
        if self.read_modifier == LoadModifier::Ldg && !self.arch.has_ldg() {
            return invalid(format!("{} has no read-only data cache", self.arch));
        }
        let occupancy = self.max_cta_occupancy();
        if occupancy == 0 || occupancy < self.min_cta_occupancy {
            return invalid(format!(
                "occupancy of {occupancy} CTAs per SM is below the required {}",
                self.min_cta_occupancy.max(1)
            ));
        }
        Ok(())
    }

    pub fn valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// How `num_elements` are shared out over `grid_size` CTAs of this kernel.
    pub fn work(&self, num_elements: usize, grid_size: usize) -> WorkDecomposition {
        WorkDecomposition::new(num_elements, grid_size, self.log_schedule_granularity)
    }
}

impl fmt::Display for KernelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}):", self.variant, self.variant.symbol())?;
        writeln!(f, "\tCUDA_ARCH: {}", self.arch.version())?;
        if let Err(reason) = self.check_shape() {
            writeln!(f, "\tLOG_THREADS: {}", self.tile.log_threads)?;
            writeln!(f, "\tLOG_LOAD_VEC_SIZE: {}", self.tile.log_load_vec_size)?;
            writeln!(f, "\tLOG_LOADS_PER_TILE: {}", self.tile.log_loads_per_tile)?;
            writeln!(f, "\tLOG_SCHEDULE_GRANULARITY: {}", self.log_schedule_granularity)?;
            return write!(f, "\tVALID: false ({reason})");
        }
        writeln!(f, "\tLOG_THREADS: {} ({} threads)", self.tile.log_threads, self.threads())?;
        writeln!(
            f,
            "\tLOG_LOAD_VEC_SIZE: {} ({} elements)",
            self.tile.log_load_vec_size,
            self.tile.load_vec_size()
        )?;
        writeln!(
            f,
            "\tLOG_LOADS_PER_TILE: {} ({} loads)",
            self.tile.log_loads_per_tile,
            self.tile.loads_per_tile()
        )?;
        writeln!(f, "\tTILE_ELEMENTS: {}", self.tile_elements())?;
        writeln!(
            f,
            "\tLOG_SCHEDULE_GRANULARITY: {} ({} elements)",
            self.log_schedule_granularity,
            self.schedule_granularity()
        )?;
        writeln!(f, "\tWORK_STEALING: {}", self.work_stealing)?;
        writeln!(f, "\tREAD_MODIFIER: {}", self.read_modifier.ptx())?;
        writeln!(f, "\tWRITE_MODIFIER: {}", self.write_modifier.ptx())?;
        writeln!(f, "\tSMEM_BYTES: {}", self.smem_bytes())?;
        writeln!(f, "\tREGISTERS (est.): {}", self.registers_per_thread())?;
        writeln!(f, "\tMAX_CTA_OCCUPANCY: {}", self.max_cta_occupancy())?;
        write!(f, "\tVALID: {}", self.valid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upsweep(arch: CudaArch, log_threads: u32) -> KernelPolicy {
        KernelPolicy {
            variant: KernelVariant::Upsweep,
            arch,
            tile: TileShape {
                log_threads,
                log_load_vec_size: 2,
                log_loads_per_tile: 1,
            },
            log_schedule_granularity: log_threads + 3,
            work_stealing: false,
            read_modifier: LoadModifier::None,
            write_modifier: StoreModifier::None,
            min_cta_occupancy: 1,
            element_bytes: 4,
        }
    }

    #[test]
    fn occupancy_limited_by_threads() {
        let policy = upsweep(CudaArch::Sm80, 8);
        assert_eq!(policy.smem_bytes(), 256 * 4 + 4);
        assert_eq!(policy.registers_per_thread(), 24);
        assert_eq!(policy.max_cta_occupancy(), 8);
        assert!(policy.valid());
    }

    #[test]
    fn too_many_threads_is_invalid() {
        let policy = upsweep(CudaArch::Sm80, 11);
        assert!(matches!(
            policy.validate(),
            Err(PrimsError::InvalidPolicy {
                variant: KernelVariant::Upsweep,
                ..
            })
        ));
    }

    #[test]
    fn granularity_below_tile_is_invalid() {
        let mut policy = upsweep(CudaArch::Sm80, 7);
        policy.log_schedule_granularity = 9;
        assert!(!policy.valid());
    }

    #[test]
    fn ldg_needs_sm35() {
        let mut policy = upsweep(CudaArch::Sm30, 7);
        policy.read_modifier = LoadModifier::Ldg;
        assert!(!policy.valid());
        policy.arch = CudaArch::Sm35;
        assert!(policy.valid());
    }

    #[test]
    fn oversized_logs_are_rejected_without_overflow() {
        let mut policy = upsweep(CudaArch::Sm80, 8);
        policy.tile.log_load_vec_size = 40;
        policy.tile.log_loads_per_tile = 40;
        policy.log_schedule_granularity = 90;
        assert!(matches!(
            policy.validate(),
            Err(PrimsError::InvalidPolicy { ref reason, .. }) if reason.contains("per thread")
        ));
        assert!(policy.to_string().contains("VALID: false"));

        let mut policy = upsweep(CudaArch::Sm80, 70);
        policy.log_schedule_granularity = 73;
        assert!(!policy.valid());

        let mut policy = upsweep(CudaArch::Sm80, 7);
        policy.log_schedule_granularity = 64;
        assert!(!policy.valid());
    }

    #[test]
    fn register_pressure_is_invalid() {
        let mut policy = upsweep(CudaArch::Sm20, 7);
        policy.tile.log_load_vec_size = 3;
        policy.tile.log_loads_per_tile = 3;
        policy.log_schedule_granularity = 13;
        assert_eq!(policy.registers_per_thread(), 16 + 64);
        assert!(!policy.valid());
    }
}
