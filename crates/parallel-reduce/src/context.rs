//! Per-launch state handed to reduction callbacks.

use crate::allocator::LocalAccessor;
use crate::memory::{Accessor, Buffer, ReadWriteAccessor};
use crate::queue::Handler;

/// Pulls a prior phase's output slot into scratch memory.
pub trait Drain {
    /// Copy output slot `global_index` into scratch slot `local_index`.
    fn drain(&self, local_index: usize, global_index: usize);
}

/// Everything a reduction kernel body touches: group scratch, the input and
/// the output buffer.
///
/// `T` is the scratch (accumulator) type, `U` the output element type and
/// `C` the input view.
pub struct LocalReducer<'a, T, U, C> {
    /// Group-private scratch memory.
    pub local: LocalAccessor<T>,
    /// The data being reduced.
    pub actual: C,
    /// Partial and final results.
    pub result: ReadWriteAccessor<'a, U>,
}

impl<'a, T, U, C> LocalReducer<'a, T, U, C>
where
    T: Copy + Default,
    U: Copy,
    C: Accessor,
{
    /// Allocate `size` scratch slots on `handler` and bind the input view and
    /// output buffer.
    pub fn new(handler: &mut Handler, size: usize, actual: C, result: &'a Buffer<U>) -> Self {
        Self {
            local: handler.local_accessor(size),
            actual,
            result: result.read_write(),
        }
    }
}

impl<T, U, C> Drain for LocalReducer<'_, T, U, C>
where
    T: Copy,
    U: Copy + Into<T>,
{
    fn drain(&self, local_index: usize, global_index: usize) {
        self.local.set(local_index, self.result.get(global_index).into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceInfo;
    use crate::queue::{HostQueue, NdRange, Queue};

    #[test]
    fn test_drain_copies_output_into_scratch() {
        let queue = HostQueue::new(DeviceInfo::host());
        let input = Buffer::<f32>::new(1);
        let output = Buffer::from_slice(&[3.0f32, -1.0, 8.0]);
        let seen = Buffer::<f64>::new(3);
        let seen_rw = seen.read_write();

        queue
            .nd_parallel_for(
                "drain",
                NdRange::new(1, 1).unwrap(),
                |h| LocalReducer::<f64, f32, _>::new(h, 3, input.read(), &output),
                |ctx, _| {
                    for i in 0..3 {
                        ctx.drain(i, 2 - i);
                    }
                    for i in 0..3 {
                        seen_rw.set(i, ctx.local.get(i));
                    }
                },
            )
            .unwrap();
        queue.wait_and_throw().unwrap();
        assert_eq!(seen.to_vec(), vec![8.0, -1.0, 3.0]);
    }
}
