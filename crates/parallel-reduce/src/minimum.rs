//! Minimum reduction over a synthetic dataset.
//!
//! The dataset of `size` doubles holds `i + 1` at every index `i` except
//! index 1, which holds `0.0`; the minimum is therefore `0.0` whenever the
//! dataset has at least two elements.

use crate::context::LocalReducer;
use crate::device::GroupSizing;
use crate::error::{ReduceError, Result};
use crate::memory::{Accessor, Buffer};
use crate::queue::{NdRange, Queue};
use crate::range::Range1D;
use crate::reduce::parallel_reduce_1d;

/// Identity of the minimum over doubles.
pub const DOUBLE_MAX: f64 = f64::MAX;

/// Value of the synthetic dataset at `idx`.
pub fn synthetic_value(idx: usize) -> f64 {
    if idx == 1 {
        0.0
    } else {
        (idx + 1) as f64
    }
}

fn dataset_size(n: usize) -> Result<usize> {
    n.checked_mul(n)
        .ok_or_else(|| ReduceError::Other(format!("dataset of {n}x{n} elements overflows")))
}

/// Allocate and fill the synthetic dataset on `queue`.
pub fn prepare_buffer<Q: Queue>(queue: &Q, size: usize) -> Result<Buffer<f64>> {
    let result = Buffer::<f64>::new(size);
    let xs = result.read_write();
    queue.parallel_for("fill", size, |idx| xs.set(idx, synthetic_value(idx)))?;
    Ok(result)
}

/// Minimum of the `n * n` synthetic dataset, computed with
/// [`parallel_reduce_1d`].
///
/// # Errors
///
/// Returns [`ReduceError::InvalidRange`] for `n == 0` and propagates launch
/// and kernel failures.
///
/// # Examples
///
/// ```
/// use parallel_reduce::{reduce_min, HostQueue};
///
/// let queue = HostQueue::host();
/// assert_eq!(reduce_min(&queue, 32)?, 0.0);
/// # Ok::<(), parallel_reduce::ReduceError>(())
/// ```
pub fn reduce_min<Q: Queue>(queue: &Q, n: usize) -> Result<f64> {
    let size = dataset_size(n)?;
    let range = Range1D::new(0, size)?;
    let data = prepare_buffer(queue, size)?;

    let sizing = GroupSizing::for_device(queue.device(), range.size());
    let result = Buffer::filled(sizing.partial_len(), DOUBLE_MAX);

    parallel_reduce_1d(
        queue,
        &range,
        |h, size| LocalReducer::<f64, f64, _>::new(h, size, data.read(), &result),
        |r, lidx| r.local.set(lidx, DOUBLE_MAX),
        |r, lidx, idx| r.local.set(lidx, r.local.get(lidx).min(r.actual.get(idx))),
        |r, idx, idy| r.local.set(idx, r.local.get(idx).min(r.local.get(idy))),
        |r, group, idx| r.result.set(group, r.local.get(idx)),
    )?;

    queue.wait_and_throw()?;
    result
        .get(0)
        .ok_or_else(|| ReduceError::Other("reduction produced no output".into()))
}

/// Minimum of the `n * n` synthetic dataset, with both phases written out by
/// hand against the queue.
///
/// Computes exactly what [`reduce_min`] computes. Partial results go to
/// contiguous slots `0..num_groups` of a separate buffer.
///
/// # Errors
///
/// Same as [`reduce_min`].
pub fn reduce_min_non_generic<Q: Queue>(queue: &Q, n: usize) -> Result<f64> {
    let size = dataset_size(n)?;
    Range1D::new(0, size)?;
    let data = prepare_buffer(queue, size)?;

    let device = queue.device();
    let (mut num_groups, wg_size) = if device.is_cpu() {
        (
            device.max_compute_units(),
            device.native_vector_width_double() * 2,
        )
    } else {
        (device.max_compute_units() * 4, device.max_work_group_size())
    };
    num_groups = num_groups.min(size);

    let xs = data.read();
    let partials = Buffer::filled(num_groups, DOUBLE_MAX);
    let drain = partials.read_write();

    // reduce to one value per group first
    queue.nd_parallel_for(
        "reduce",
        NdRange::new(num_groups * wg_size, wg_size)?,
        |h| h.local_accessor::<f64>(wg_size),
        |local, item| {
            let local_id = item.local_id();
            let global_size = item.global_range();

            local.set(local_id, DOUBLE_MAX);
            let mut global_id = item.global_id();
            while global_id < size {
                local.set(local_id, local.get(local_id).min(xs.get(global_id)));
                global_id += global_size;
            }

            let mut live = item.local_range();
            let mut offset = live / 2;
            while offset > 0 {
                item.barrier();
                if local_id < offset {
                    local.set(local_id, local.get(local_id).min(local.get(local_id + offset)));
                }
                if local_id == 0 && live % 2 == 1 {
                    local.set(0, local.get(0).min(local.get(2 * offset)));
                }
                live = offset;
                offset /= 2;
            }
            if local_id == 0 {
                drain.set(item.group(), local.get(0));
            }
        },
    )?;

    // then reduce the groups to the first element
    queue.nd_parallel_for(
        "final_reduction",
        NdRange::new(1, 1)?,
        |h| h.local_accessor::<f64>(num_groups),
        |local, _| {
            local.set(0, DOUBLE_MAX);
            for i in 0..num_groups {
                local.set(i, drain.get(i));
            }
            for i in 1..num_groups {
                local.set(0, local.get(0).min(local.get(i)));
            }
            drain.set(0, local.get(0));
        },
    )?;

    queue.wait_and_throw()?;
    partials
        .get(0)
        .ok_or_else(|| ReduceError::Other("reduction produced no output".into()))
}

/// Sequential minimum of the `n * n` synthetic dataset, `None` when empty.
pub fn reduce_min_reference(n: usize) -> Option<f64> {
    let size = n.checked_mul(n)?;
    let xs: Vec<f64> = (0..size).map(synthetic_value).collect();
    xs.into_iter().reduce(f64::min)
}
