//! Dispatch of a logical reduction onto the upsweep, spine and single kernels.

use kernel_tools::reduce::ReduceOp;
use log::debug;

use crate::arch::CudaArch;
use crate::error::{PrimsError, Result};
use crate::policy::{
    Element, ProblemSize, ReducePolicyBuilder, ReduceProblem, ReduceTuning, SizeT,
    ValidReducePolicy,
};

// Upsweep CTAs launched per resident CTA when the grid is oversubscribed.
const OVERSUBSCRIPTION: usize = 4;

/// The device a reduction is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Device {
    pub arch: CudaArch,
    pub sm_count: usize,
}

impl Device {
    pub fn new(arch: CudaArch, sm_count: usize) -> Self {
        Self {
            arch,
            sm_count: sm_count.max(1),
        }
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::new(CudaArch::Sm80, 108)
    }
}

/// How a reduction of a given size is launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchPlan {
    /// One CTA reduces everything.
    Single { dynamic_smem_bytes: usize },
    /// `grid_size` upsweep CTAs each produce a partial, then one spine CTA
    /// reduces the partials.
    TwoPass {
        grid_size: usize,
        upsweep_dynamic_smem_bytes: usize,
        spine_dynamic_smem_bytes: usize,
    },
}

/// Drives reductions on one device.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReduceEnactor {
    device: Device,
    max_grid_size: Option<usize>,
}

impl ReduceEnactor {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            max_grid_size: None,
        }
    }

    /// Caps the upsweep grid.
    pub fn with_max_grid_size(mut self, max_grid_size: usize) -> Self {
        self.max_grid_size = Some(max_grid_size.max(1));
        self
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// The number of upsweep CTAs for `num_elements`.
    pub fn sweep_grid_size<T, S, Op>(
        &self,
        policy: &ValidReducePolicy<T, S, Op>,
        num_elements: usize,
    ) -> usize
    where
        T: Element,
        S: SizeT,
        Op: ReduceOp<T>,
    {
        let upsweep = policy.upsweep();
        let tuning = policy.tuning();

        let mut grid_size = upsweep.max_cta_occupancy() * self.device.sm_count;
        if tuning.oversubscribed_grid_size {
            grid_size *= OVERSUBSCRIPTION;
        }
        if !tuning.uniform_grid_size {
            let grains = (num_elements + upsweep.schedule_granularity() - 1)
                / upsweep.schedule_granularity();
            grid_size = grid_size.min(grains);
        }
        if let Some(max) = self.max_grid_size {
            grid_size = grid_size.min(max);
        }
        grid_size.max(1)
    }

    pub fn plan<T, S, Op>(
        &self,
        policy: &ValidReducePolicy<T, S, Op>,
        num_elements: usize,
    ) -> LaunchPlan
    where
        T: Element,
        S: SizeT,
        Op: ReduceOp<T>,
    {
        if num_elements <= policy.spine().tile_elements() {
            return LaunchPlan::Single {
                dynamic_smem_bytes: 0,
            };
        }

        let grid_size = self.sweep_grid_size(policy, num_elements);
        let upsweep_smem = policy.upsweep().smem_bytes();
        let spine_smem = policy.spine().smem_bytes();
        let (upsweep_pad, spine_pad) = if policy.tuning().uniform_smem_allocation {
            let max = upsweep_smem.max(spine_smem);
            (max - upsweep_smem, max - spine_smem)
        } else {
            (0, 0)
        };
        LaunchPlan::TwoPass {
            grid_size,
            upsweep_dynamic_smem_bytes: upsweep_pad,
            spine_dynamic_smem_bytes: spine_pad,
        }
    }

    /// Reduces `input` under `policy`. An empty input reduces to the
    /// operator's identity.
    pub fn reduce<T, S, Op>(&self, policy: &ValidReducePolicy<T, S, Op>, input: &[T]) -> Result<T>
    where
        T: Element,
        S: SizeT,
        Op: ReduceOp<T>,
    {
        let problem = policy.problem();
        if input.is_empty() {
            return Ok(problem.op.identity());
        }
        if problem.size_of_input(input.len()).is_none() {
            return Err(PrimsError::SizeOverflow {
                num_elements: input.len(),
                size_type: problem.size_type(),
            });
        }

        let mut result = [problem.op.identity()];
        match self.plan(policy, input.len()) {
            LaunchPlan::Single { dynamic_smem_bytes } => {
                debug!("reducing {} elements in a single CTA", input.len());
                policy.single_kernel().launch_with_dynamic_smem(
                    1,
                    dynamic_smem_bytes,
                    input,
                    &mut result,
                )?;
            }
            LaunchPlan::TwoPass {
                grid_size,
                upsweep_dynamic_smem_bytes,
                spine_dynamic_smem_bytes,
            } => {
                debug!(
                    "reducing {} elements with {grid_size} upsweep CTAs",
                    input.len()
                );
                let mut partials = vec![problem.op.identity(); grid_size];
                policy.upsweep_kernel().launch_with_dynamic_smem(
                    grid_size,
                    upsweep_dynamic_smem_bytes,
                    input,
                    &mut partials,
                )?;
                policy.spine_kernel().launch_with_dynamic_smem(
                    1,
                    spine_dynamic_smem_bytes,
                    &partials,
                    &mut result,
                )?;
            }
        }
        Ok(result[0])
    }

    /// Builds the preset policy for this device and the size of `input`, then
    /// reduces.
    pub fn reduce_tuned<T, S, Op>(&self, problem: ReduceProblem<T, S, Op>, input: &[T]) -> Result<T>
    where
        T: Element,
        S: SizeT,
        Op: ReduceOp<T>,
    {
        let size = ProblemSize::of(input.len());
        let tuning = ReduceTuning::tuned(self.device.arch, size, problem.element_bytes());
        let policy = ReducePolicyBuilder::new(problem, self.device.arch)
            .tuning(tuning)
            .build()?;
        self.reduce(&policy, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_tools::reduce::Sum;

    fn policy(arch: CudaArch) -> ValidReducePolicy<u32, u32, Sum> {
        ReducePolicyBuilder::new(ReduceProblem::new(Sum), arch)
            .tuning(ReduceTuning::tuned(arch, ProblemSize::Small, 4))
            .build()
            .unwrap()
    }

    #[test]
    fn small_inputs_use_single_kernel() {
        let enactor = ReduceEnactor::new(Device::new(CudaArch::Sm80, 4));
        let policy = policy(CudaArch::Sm80);
        let spine_tile = policy.spine().tile_elements();
        assert!(matches!(
            enactor.plan(&policy, spine_tile),
            LaunchPlan::Single { .. }
        ));
        assert!(matches!(
            enactor.plan(&policy, spine_tile + 1),
            LaunchPlan::TwoPass { .. }
        ));
    }

    #[test]
    fn grid_is_clipped_to_grains() {
        let enactor = ReduceEnactor::new(Device::new(CudaArch::Sm80, 80));
        let policy = policy(CudaArch::Sm80);
        let grain = policy.upsweep().schedule_granularity();
        assert_eq!(enactor.sweep_grid_size(&policy, 3 * grain - 1), 3);
        assert_eq!(
            enactor.with_max_grid_size(2).sweep_grid_size(&policy, 100 * grain),
            2
        );
    }

    #[test]
    fn uniform_smem_pads_to_largest_footprint() {
        let enactor = ReduceEnactor::new(Device::new(CudaArch::Sm80, 2));
        let policy = ReducePolicyBuilder::new(ReduceProblem::<u32, u32, Sum>::new(Sum), CudaArch::Sm80)
            .tuning(ReduceTuning::tuned(CudaArch::Sm80, ProblemSize::Small, 4))
            .grid_flags(true, false, false)
            .spine(8, 1, 0)
            .build()
            .unwrap();
        match enactor.plan(&policy, 1 << 16) {
            LaunchPlan::TwoPass {
                upsweep_dynamic_smem_bytes,
                spine_dynamic_smem_bytes,
                ..
            } => {
                assert_eq!(upsweep_dynamic_smem_bytes, 128 * 4);
                assert_eq!(spine_dynamic_smem_bytes, 0);
            }
            plan => panic!("unexpected plan {plan:?}"),
        }
        let xs = vec![3u32; 1 << 16];
        assert_eq!(enactor.reduce(&policy, &xs).unwrap(), 3 << 16);
    }

    #[test]
    fn empty_input_is_identity() {
        let enactor = ReduceEnactor::default();
        assert_eq!(enactor.reduce(&policy(CudaArch::Sm80), &[]).unwrap(), 0);
    }
}
