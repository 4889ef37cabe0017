//! Generic two-phase parallel reduction.
//!
//! The first launch splits the range across `num_groups` groups of
//! `group_size` workers. Each worker folds a grid-stride share of the range
//! into its scratch slot, the group tree-combines its scratch with
//! barrier-separated halving rounds, and worker 0 publishes slot 0 to the
//! output buffer at `group * group_size`. The second launch is a single
//! worker that drains those slots back into scratch, combines them and writes
//! the answer to output slot 0.
//!
//! The engine knows nothing about element types or the operator. The caller
//! supplies five callbacks:
//!
//! | callback    | called as                       | role                         |
//! |-------------|---------------------------------|------------------------------|
//! | `allocator` | `(handler, scratch_len) -> ctx` | build the per-group context  |
//! | `empty`     | `(ctx, local)`                  | seed a scratch slot          |
//! | `fold`      | `(ctx, local, global)`          | fold input `global` into it  |
//! | `combine`   | `(ctx, a, b)`                   | `scratch[a] <- a op b`       |
//! | `finalize`  | `(ctx, output_slot, local)`     | publish a scratch slot       |

use crate::context::Drain;
use crate::device::GroupSizing;
use crate::error::Result;
use crate::queue::{Handler, NdRange, Queue};
use crate::range::Range1D;

/// Reduce `range` in two launches on `queue`.
///
/// Both launches are submitted in order; call [`Queue::wait_and_throw`]
/// before reading output slot 0. Returns the sizing that was used so the
/// caller can check it allocated enough output slots
/// ([`GroupSizing::partial_len`]).
///
/// Each halving round halves the offset with integer division, exactly as
/// sized by [`GroupSizing::for_device`]. When the live part of the scratch
/// has odd length, worker 0 also combines the one slot the round's pairing
/// leaves out, so non-power-of-two group sizes still combine every slot
/// exactly once.
///
/// # Errors
///
/// Returns an error if a launch cannot be submitted, for example because the
/// device reports zero compute units or a zero group size, or the scratch
/// memory does not fit in the device's local memory.
pub fn parallel_reduce_1d<Q, Ctx, A, E, F, B, Z>(
    queue: &Q,
    range: &Range1D,
    allocator: A,
    empty: E,
    fold: F,
    combine: B,
    finalize: Z,
) -> Result<GroupSizing>
where
    Q: Queue,
    Ctx: Drain + Sync,
    A: Fn(&mut Handler, usize) -> Ctx + Sync,
    E: Fn(&Ctx, usize) + Sync,
    F: Fn(&Ctx, usize, usize) + Sync,
    B: Fn(&Ctx, usize, usize) + Sync,
    Z: Fn(&Ctx, usize, usize) + Sync,
{
    let sizing = GroupSizing::for_device(queue.device(), range.size());
    let GroupSizing {
        num_groups,
        group_size,
    } = sizing;
    let n = range.size();
    let from = range.from();
    tracing::debug!(%range, num_groups, group_size, "parallel_reduce_1d");

    queue.nd_parallel_for(
        "parallel_reduce_1d",
        NdRange::new(sizing.global_size(), group_size)?,
        |h| allocator(h, group_size),
        |ctx, item| {
            let local_id = item.local_id();
            let global_size = item.global_range();

            empty(ctx, local_id);
            let mut global_id = item.global_id();
            while global_id < n {
                fold(ctx, local_id, from + global_id);
                global_id += global_size;
            }

            let mut live = item.local_range();
            let mut offset = live / 2;
            while offset > 0 {
                item.barrier();
                if local_id < offset {
                    combine(ctx, local_id, local_id + offset);
                }
                if local_id == 0 && live % 2 == 1 {
                    combine(ctx, 0, 2 * offset);
                }
                live = offset;
                offset /= 2;
            }

            if local_id == 0 {
                finalize(ctx, item.group() * group_size, 0);
            }
        },
    )?;

    queue.nd_parallel_for(
        "final_reduction",
        NdRange::new(1, 1)?,
        |h| allocator(h, num_groups),
        |ctx, _| {
            empty(ctx, 0);
            for i in 0..num_groups {
                ctx.drain(i, i * group_size);
            }
            for i in 1..num_groups {
                combine(ctx, 0, i);
            }
            finalize(ctx, 0, 0);
        },
    )?;

    Ok(sizing)
}
