//! Executable GPU reductions.
//!
//! This module provides execution wrappers around the CubeCL kernels.

use crate::device::GroupSizing;
use crate::error::{ReduceError, Result};
use crate::kernels::reduction::{min_final_kernel, min_partial_kernel};
use crate::minimum::synthetic_value;
use crate::runtime::{allocate, to_cpu, to_device, GpuBuffer, RuntimeContext};
use cubecl::prelude::*;

/// Execute a two-phase minimum reduction on the GPU.
///
/// Sizes the launch from the runtime's [`DeviceInfo`](crate::DeviceInfo)
/// exactly like the host engine, reduces each cube's share into one partial
/// minimum, then folds the partials with a single unit.
///
/// # Example
///
/// ```ignore
/// let data_gpu = to_device(&[4.0f32, 1.0, 3.0], &runtime)?;
/// let min: f32 = min_execute(&data_gpu, &runtime)?; // Returns 1.0
/// ```
pub fn min_execute<R: Runtime, F: Float + CubeElement + bytemuck::Pod>(
    input: &GpuBuffer<R>,
    runtime: &RuntimeContext<R>,
) -> Result<F> {
    let len = input.len();
    if len == 0 {
        return Err(ReduceError::InvalidRange { from: 0, to: 0 });
    }

    let sizing = GroupSizing::for_device(runtime.device_info(), len);
    let (num_groups, group_size) = launch_dims(&sizing)?;

    let partials = allocate::<_, F>(sizing.num_groups, runtime)?;
    let client = runtime.client();

    unsafe {
        min_partial_kernel::launch_unchecked::<F, R>(
            client,
            CubeCount::Static(num_groups, 1, 1),
            CubeDim::new(group_size, 1, 1),
            ArrayArg::from_raw_parts(input.handle(), input.len(), 1),
            ArrayArg::from_raw_parts(partials.handle(), partials.len(), 1),
            group_size,
        );

        min_final_kernel::launch_unchecked::<F, R>(
            client,
            CubeCount::Static(1, 1, 1),
            CubeDim::new(1, 1, 1),
            ArrayArg::from_raw_parts(partials.handle(), partials.len(), 1),
            ScalarArg::new(num_groups),
        );
    }

    let partial_mins: Vec<F> = to_cpu(&partials, runtime)?;
    partial_mins
        .first()
        .copied()
        .ok_or_else(|| ReduceError::Other("reduction produced no output".into()))
}

/// Cube count and cube size for `sizing`, rejecting sizes a launch cannot
/// express.
fn launch_dims(sizing: &GroupSizing) -> Result<(u32, u32)> {
    let invalid = || ReduceError::InvalidNdRange {
        global: sizing.global_size(),
        local: sizing.group_size,
    };
    let num_groups = u32::try_from(sizing.num_groups).map_err(|_| invalid())?;
    let group_size = u32::try_from(sizing.group_size).map_err(|_| invalid())?;
    if num_groups == 0 || group_size == 0 {
        return Err(invalid());
    }
    Ok((num_groups, group_size))
}

/// Minimum of the `n * n` synthetic dataset, reduced on the GPU.
pub fn reduce_min_gpu<R: Runtime>(runtime: &RuntimeContext<R>, n: usize) -> Result<f32> {
    let size = n
        .checked_mul(n)
        .ok_or_else(|| ReduceError::Other(format!("dataset of {n}x{n} elements overflows")))?;
    let data: Vec<f32> = (0..size).map(|i| synthetic_value(i) as f32).collect();
    let data_gpu = to_device(&data, runtime)?;
    min_execute::<R, f32>(&data_gpu, runtime)
}
