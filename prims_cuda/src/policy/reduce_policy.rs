use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::AtomicU32;

use kernel_tools::block::DevPtr;
use kernel_tools::reduce::{reduce_tiles, ReduceOp, TileShape};
use log::warn;

use super::{Element, KernelPolicy, KernelVariant, ReduceProblem, ReduceTuning, SizeT};
use crate::arch::CudaArch;
use crate::error::{PrimsError, Result};
use crate::sim::{self, LaunchConfig, SharedArray};

/// Composes the upsweep, spine and single kernel policies of a reduction.
#[derive(Debug, Clone, Copy)]
pub struct ReducePolicyBuilder<T, S, Op> {
    problem: ReduceProblem<T, S, Op>,
    arch: CudaArch,
    tuning: ReduceTuning,
}

impl<T, S, Op> ReducePolicyBuilder<T, S, Op>
where
    T: Element,
    S: SizeT,
    Op: ReduceOp<T>,
{
    /// Starts from the large-problem preset of `arch`.
    pub fn new(problem: ReduceProblem<T, S, Op>, arch: CudaArch) -> Self {
        let tuning = ReduceTuning::tuned(arch, super::ProblemSize::Large, problem.element_bytes());
        Self {
            problem,
            arch,
            tuning,
        }
    }

    pub fn tuning(mut self, tuning: ReduceTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn work_stealing(mut self, work_stealing: bool) -> Self {
        self.tuning.work_stealing = work_stealing;
        self
    }

    pub fn modifiers(mut self, read: super::LoadModifier, write: super::StoreModifier) -> Self {
        self.tuning.read_modifier = read;
        self.tuning.write_modifier = write;
        self
    }

    pub fn grid_flags(mut self, uniform_smem: bool, uniform_grid: bool, oversubscribed: bool) -> Self {
        self.tuning.uniform_smem_allocation = uniform_smem;
        self.tuning.uniform_grid_size = uniform_grid;
        self.tuning.oversubscribed_grid_size = oversubscribed;
        self
    }

    pub fn upsweep(
        mut self,
        log_threads: u32,
        log_load_vec_size: u32,
        log_loads_per_tile: u32,
        log_schedule_granularity: u32,
    ) -> Self {
        self.tuning.upsweep_log_threads = log_threads;
        self.tuning.upsweep_log_load_vec_size = log_load_vec_size;
        self.tuning.upsweep_log_loads_per_tile = log_loads_per_tile;
        self.tuning.upsweep_log_schedule_granularity = log_schedule_granularity;
        self
    }

    pub fn spine(mut self, log_threads: u32, log_load_vec_size: u32, log_loads_per_tile: u32) -> Self {
        self.tuning.spine_log_threads = log_threads;
        self.tuning.spine_log_load_vec_size = log_load_vec_size;
        self.tuning.spine_log_loads_per_tile = log_loads_per_tile;
        self
    }

    /// Resolves the three kernel policies without checking them.
    pub fn compose(&self) -> ReducePolicy<T, S, Op> {
        let t = &self.tuning;
        let element_bytes = self.problem.element_bytes();

        let upsweep = KernelPolicy {
            variant: KernelVariant::Upsweep,
            arch: self.arch,
            tile: TileShape {
                log_threads: t.upsweep_log_threads,
                log_load_vec_size: t.upsweep_log_load_vec_size,
                log_loads_per_tile: t.upsweep_log_loads_per_tile,
            },
            log_schedule_granularity: t.upsweep_log_schedule_granularity,
            work_stealing: t.work_stealing,
            read_modifier: t.read_modifier,
            write_modifier: t.write_modifier,
            min_cta_occupancy: t.upsweep_min_cta_occupancy,
            element_bytes,
        };

        // One CTA: nothing to steal from, and a grain is exactly one tile.
        let spine_tile = TileShape {
            log_threads: t.spine_log_threads,
            log_load_vec_size: t.spine_log_load_vec_size,
            log_loads_per_tile: t.spine_log_loads_per_tile,
        };
        let spine = KernelPolicy {
            variant: KernelVariant::Spine,
            arch: self.arch,
            tile: spine_tile,
            log_schedule_granularity: spine_tile.log_tile_elements(),
            work_stealing: false,
            read_modifier: t.read_modifier,
            write_modifier: t.write_modifier,
            min_cta_occupancy: 1,
            element_bytes,
        };
        let single = KernelPolicy {
            variant: KernelVariant::Single,
            ..spine
        };

        ReducePolicy {
            problem: self.problem,
            tuning: self.tuning,
            upsweep,
            spine,
            single,
        }
    }

    /// Composes and validates the policy.
    pub fn build(&self) -> Result<ValidReducePolicy<T, S, Op>> {
        self.compose().validate()
    }
}

/// A composed reduction policy. Kernels can only be obtained once it has been
/// validated.
#[derive(Debug, Clone, Copy)]
pub struct ReducePolicy<T, S, Op> {
    problem: ReduceProblem<T, S, Op>,
    tuning: ReduceTuning,
    upsweep: KernelPolicy,
    spine: KernelPolicy,
    single: KernelPolicy,
}

impl<T, S, Op> ReducePolicy<T, S, Op>
where
    T: Element,
    S: SizeT,
    Op: ReduceOp<T>,
{
    pub fn problem(&self) -> &ReduceProblem<T, S, Op> {
        &self.problem
    }

    pub fn tuning(&self) -> &ReduceTuning {
        &self.tuning
    }

    pub fn upsweep(&self) -> &KernelPolicy {
        &self.upsweep
    }

    pub fn spine(&self) -> &KernelPolicy {
        &self.spine
    }

    pub fn single(&self) -> &KernelPolicy {
        &self.single
    }

    pub fn arch(&self) -> CudaArch {
        self.upsweep.arch
    }

    pub fn valid(&self) -> bool {
        self.upsweep.valid() && self.spine.valid() && self.single.valid()
    }

    pub fn validate(self) -> Result<ValidReducePolicy<T, S, Op>> {
        for policy in [&self.upsweep, &self.spine, &self.single] {
            if let Err(e) = policy.validate() {
                warn!("rejecting reduction policy for {}: {e}", self.arch());
                return Err(e);
            }
        }
        Ok(ValidReducePolicy(self))
    }

    /// Dumps the resolved constants to stdout.
    pub fn print(&self) {
        println!("{self}");
    }
}

impl<T, S, Op> fmt::Display for ReducePolicy<T, S, Op>
where
    T: Element,
    S: SizeT,
    Op: ReduceOp<T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Reduction policy <{}, {}, {}> for {}:",
            self.problem.element_type(),
            self.problem.size_type(),
            self.problem.op_type(),
            self.arch()
        )?;
        writeln!(f, "UNIFORM_SMEM_ALLOCATION: {}", self.tuning.uniform_smem_allocation)?;
        writeln!(f, "UNIFORM_GRID_SIZE: {}", self.tuning.uniform_grid_size)?;
        writeln!(f, "OVERSUBSCRIBED_GRID_SIZE: {}", self.tuning.oversubscribed_grid_size)?;
        writeln!(f, "VALID: {}", self.valid())?;
        writeln!(f, "{}", self.upsweep)?;
        writeln!(f, "{}", self.spine)?;
        write!(f, "{}", self.single)
    }
}

/// A reduction policy whose kernels all fit the target architecture.
#[derive(Debug, Clone, Copy)]
pub struct ValidReducePolicy<T, S, Op>(ReducePolicy<T, S, Op>);

impl<T, S, Op> Deref for ValidReducePolicy<T, S, Op> {
    type Target = ReducePolicy<T, S, Op>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T, S, Op> ValidReducePolicy<T, S, Op>
where
    T: Element,
    S: SizeT,
    Op: ReduceOp<T>,
{
    pub fn upsweep_kernel(&self) -> ReduceKernel<'_, T, Op> {
        self.kernel(&self.0.upsweep)
    }

    pub fn spine_kernel(&self) -> ReduceKernel<'_, T, Op> {
        self.kernel(&self.0.spine)
    }

    pub fn single_kernel(&self) -> ReduceKernel<'_, T, Op> {
        self.kernel(&self.0.single)
    }

    fn kernel<'p>(&'p self, policy: &'p KernelPolicy) -> ReduceKernel<'p, T, Op> {
        ReduceKernel {
            policy,
            op: self.0.problem.op,
            elements: PhantomData,
        }
    }
}

impl<T, S, Op> fmt::Display for ValidReducePolicy<T, S, Op>
where
    T: Element,
    S: SizeT,
    Op: ReduceOp<T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Shared memory of a reduction CTA.
struct ReduceShared<T> {
    partials: SharedArray<T>,
    tile_slot: SharedArray<u32>,
    // Dynamic allocation padding the CTA to a uniform footprint.
    _dynamic: SharedArray<u8>,
}

/// A launchable reduction kernel bound to its resolved policy.
#[derive(Debug, Clone, Copy)]
pub struct ReduceKernel<'p, T, Op> {
    policy: &'p KernelPolicy,
    op: Op,
    elements: PhantomData<fn() -> T>,
}

impl<T, Op> ReduceKernel<'_, T, Op>
where
    T: Element,
    Op: ReduceOp<T>,
{
    pub fn variant(&self) -> KernelVariant {
        self.policy.variant
    }

    pub fn symbol(&self) -> &'static str {
        self.policy.variant.symbol()
    }

    pub fn policy(&self) -> &KernelPolicy {
        self.policy
    }

    /// Shared memory of one CTA launched with `dynamic_smem_bytes` extra bytes.
    pub fn smem_bytes(&self, dynamic_smem_bytes: usize) -> usize {
        self.policy.smem_bytes().saturating_add(dynamic_smem_bytes)
    }

    /// Reduces `input` with `grid_size` CTAs, writing one partial per CTA to
    /// the front of `output`.
    pub fn launch(&self, grid_size: usize, input: &[T], output: &mut [T]) -> Result<()> {
        self.launch_with_dynamic_smem(grid_size, 0, input, output)
    }

    /// Like [`launch`](Self::launch), allocating `dynamic_smem_bytes` of shared
    /// memory per CTA on top of the static footprint.
    pub fn launch_with_dynamic_smem(
        &self,
        grid_size: usize,
        dynamic_smem_bytes: usize,
        input: &[T],
        output: &mut [T],
    ) -> Result<()> {
        if output.len() < grid_size {
            return Err(PrimsError::OutputLength {
                expected: grid_size,
                actual: output.len(),
            });
        }
        let requested = self.smem_bytes(dynamic_smem_bytes);
        let max = self.policy.arch.props().max_smem_bytes_per_block;
        if requested > max {
            return Err(PrimsError::SharedMemory { requested, max });
        }

        let policy = *self.policy;
        let op = self.op;
        let threads = policy.threads();
        let work = policy.work(input.len(), grid_size);
        let progress = AtomicU32::new(0);

        let d_in = DevPtr::new(input.as_ptr() as *mut T);
        let d_out = DevPtr::new(output.as_mut_ptr());
        let d_progress = DevPtr::new(progress.as_ptr());

        sim::launch(
            LaunchConfig::new(grid_size, threads),
            || ReduceShared {
                partials: SharedArray::<T>::new(threads),
                tile_slot: SharedArray::<u32>::new(1),
                _dynamic: SharedArray::<u8>::new(dynamic_smem_bytes),
            },
            |block, shared| unsafe {
                reduce_tiles(
                    block,
                    policy.tile,
                    &work,
                    policy.work_stealing,
                    d_in.as_ptr(),
                    d_out.as_mut_ptr(),
                    d_progress.as_mut_ptr(),
                    shared.partials.as_mut_ptr(),
                    shared.tile_slot.as_mut_ptr(),
                    op,
                )
            },
        )?;
        Ok(())
    }
}
