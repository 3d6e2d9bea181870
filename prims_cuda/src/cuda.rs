//! Launches of the PTX-compiled kernels on a real device.

use std::error::Error;

use cust::prelude::*;
use kernel_tools::multi_scan::NUM_THREADS;

use kernel_tools::reduce::Sum;

use crate::error::PrimsError;
use crate::policy::{KernelPolicy, SizeT, ValidReducePolicy};
use crate::scan::check_counts;

static PTX: &str = include_str!("../../resources/kernel_tools.ptx");

/// Rewrites digit-major `counts` with their scaled global offsets on the
/// device and returns the digit totals.
pub fn sort_hist(
    stream: &Stream,
    num_bits: u32,
    counts: &mut [u32],
    num_tasks: usize,
) -> Result<Vec<u32>, Box<dyn Error>> {
    check_counts(num_bits, counts, num_tasks)?;
    let mut digit_totals = vec![0u32; 1 << num_bits];

    let dev_counts = counts.as_dbuf()?;
    let dev_totals = digit_totals.as_slice().as_dbuf()?;

    let module = Module::from_ptx(PTX, &[])?;
    let kernel = module.get_function(&format!("sort_hist_{num_bits}"))?;

    unsafe {
        launch!(
            kernel<<<1, NUM_THREADS as u32, 0, stream>>>(
                dev_counts.as_device_ptr(),
                num_tasks,
                dev_totals.as_device_ptr()
            )
        )?;
    }
    stream.synchronize()?;

    dev_counts.copy_to(counts)?;
    dev_totals.copy_to(&mut digit_totals)?;
    Ok(digit_totals)
}

/// Sums `xs` on the device with the kernels of `policy`.
pub fn reduce_sum_u32<S: SizeT>(
    stream: &Stream,
    policy: &ValidReducePolicy<u32, S, Sum>,
    grid_size: u32,
    xs: &[u32],
) -> Result<u32, Box<dyn Error>> {
    if xs.is_empty() {
        return Ok(0);
    }
    if policy.problem().size_of_input(xs.len()).is_none() {
        return Err(PrimsError::SizeOverflow {
            num_elements: xs.len(),
            size_type: policy.problem().size_type(),
        }
        .into());
    }

    let module = Module::from_ptx(PTX, &[])?;
    let dev_xs = xs.as_dbuf()?;
    let grid_size = grid_size.max(1);
    let dev_partials = vec![0u32; grid_size as usize].as_slice().as_dbuf()?;
    let mut result = [0u32];
    let dev_result = result.as_slice().as_dbuf()?;

    let launch_pass = |name: &str,
                       kernel_policy: &KernelPolicy,
                       grid: u32,
                       input: &DeviceBuffer<u32>,
                       output: &DeviceBuffer<u32>|
     -> Result<(), Box<dyn Error>> {
        let kernel = module.get_function(name)?;
        let progress = [0u32].as_slice().as_dbuf()?;
        let tile = kernel_policy.tile;
        unsafe {
            launch!(
                kernel<<<grid, kernel_policy.threads() as u32, 0, stream>>>(
                    tile.log_threads,
                    tile.log_load_vec_size,
                    tile.log_loads_per_tile,
                    kernel_policy.log_schedule_granularity,
                    kernel_policy.work_stealing as u32,
                    input.len(),
                    input.as_device_ptr(),
                    output.as_device_ptr(),
                    progress.as_device_ptr()
                )
            )?;
        }
        stream.synchronize()?;
        Ok(())
    };

    if xs.len() <= policy.spine().tile_elements() {
        launch_pass("reduce_single_u32_sum", policy.single(), 1, &dev_xs, &dev_result)?;
    } else {
        launch_pass("reduce_upsweep_u32_sum", policy.upsweep(), grid_size, &dev_xs, &dev_partials)?;
        launch_pass("reduce_spine_u32_sum", policy.spine(), 1, &dev_partials, &dev_result)?;
    }

    dev_result.copy_to(&mut result)?;
    Ok(result[0])
}
