//! Minimum reduction kernels.
//!
//! The two kernels mirror the host engine: a grouped pass that leaves one
//! partial minimum per cube, then a single-unit pass over the partials.

#![allow(missing_docs)]

use cubecl::prelude::*;

/// First phase: each cube reduces its grid-stride share of `input` into
/// shared memory and writes one partial minimum to `partials[CUBE_POS]`.
///
/// # Thread Model
///
/// - Launched with `num_groups` cubes of `group_size` units
/// - `group_size` must equal `CUBE_DIM_X`; it sizes the shared memory
/// - Halving rounds are separated by `sync_units()`; when the live part of
///   shared memory has odd length, unit 0 also folds the leftover slot
#[cube(launch_unchecked)]
pub fn min_partial_kernel<F: Float>(
    input: &Array<F>,
    partials: &mut Array<F>,
    #[comptime] group_size: u32,
) {
    let mut local = SharedMemory::<F>::new(group_size);

    let local_id = UNIT_POS;
    let global_size = CUBE_COUNT_X * CUBE_DIM_X;
    let mut global_id = ABSOLUTE_POS;

    local[local_id] = F::max_value();
    while global_id < input.len() {
        let value = input[global_id];
        if value < local[local_id] {
            local[local_id] = value;
        }
        global_id += global_size;
    }

    let mut live = CUBE_DIM_X;
    let mut offset = live / 2;
    while offset > 0 {
        sync_units();

        if local_id < offset {
            let other = local[local_id + offset];
            if other < local[local_id] {
                local[local_id] = other;
            }
        }
        if local_id == 0 && live % 2 == 1 {
            let straggler = local[offset * 2];
            if straggler < local[0] {
                local[0] = straggler;
            }
        }

        live = offset;
        offset /= 2;
    }

    if local_id == 0 {
        partials[CUBE_POS] = local[0];
    }
}

/// Second phase: a single unit folds `partials[0..num_groups]` into
/// `partials[0]`.
#[cube(launch_unchecked)]
pub fn min_final_kernel<F: Float>(partials: &mut Array<F>, num_groups: u32) {
    let mut acc = F::max_value();
    for i in 0..num_groups {
        let value = partials[i];
        if value < acc {
            acc = value;
        }
    }
    partials[0] = acc;
}
