//! Reduction operators and the engine instantiated for them.
//!
//! A [`ReduceOp`] is an associative, commutative binary operator with an
//! identity. Any such operator gives the four element callbacks the engine
//! needs: seed with the identity, fold and combine with the operator, and
//! publish a slot unchanged.

use std::fmt::Debug;
use std::marker::PhantomData;

use num_traits::{Bounded, Zero};

use crate::context::LocalReducer;
use crate::device::GroupSizing;
use crate::error::{ReduceError, Result};
use crate::memory::{Accessor, Buffer};
use crate::queue::Queue;
use crate::range::Range1D;
use crate::reduce::parallel_reduce_1d;

/// Associative, commutative operator with an identity element.
pub trait ReduceOp {
    /// Element and accumulator type.
    type Item: Copy + Default + Send + Sync + Debug;

    /// Short name used in logs.
    const NAME: &'static str;

    /// Value `x` such that `combine(x, y) == y` for every `y`.
    fn identity() -> Self::Item;

    /// Combine two partial results.
    fn combine(a: Self::Item, b: Self::Item) -> Self::Item;
}

/// Minimum. For floats a NaN operand is ignored, like `fmin`.
pub struct Min<T>(PhantomData<T>);

/// Maximum. For floats a NaN operand is ignored, like `fmax`.
pub struct Max<T>(PhantomData<T>);

/// Sum.
pub struct Sum<T>(PhantomData<T>);

impl<T> ReduceOp for Min<T>
where
    T: Copy + Default + Send + Sync + Debug + PartialOrd + Bounded,
{
    type Item = T;
    const NAME: &'static str = "min";

    fn identity() -> T {
        T::max_value()
    }

    fn combine(a: T, b: T) -> T {
        // Only NaN is unordered with itself.
        if a.partial_cmp(&a).is_none() || b < a {
            b
        } else {
            a
        }
    }
}

impl<T> ReduceOp for Max<T>
where
    T: Copy + Default + Send + Sync + Debug + PartialOrd + Bounded,
{
    type Item = T;
    const NAME: &'static str = "max";

    fn identity() -> T {
        T::min_value()
    }

    fn combine(a: T, b: T) -> T {
        if a.partial_cmp(&a).is_none() || b > a {
            b
        } else {
            a
        }
    }
}

impl<T> ReduceOp for Sum<T>
where
    T: Copy + Default + Send + Sync + Debug + Zero,
{
    type Item = T;
    const NAME: &'static str = "sum";

    fn identity() -> T {
        T::zero()
    }

    fn combine(a: T, b: T) -> T {
        a + b
    }
}

/// Reduce `input[range]` with `O` on `queue` and wait for the result.
///
/// # Errors
///
/// Returns [`ReduceError::InvalidBufferSize`] if `range` reaches past the end
/// of `input`, and propagates launch and kernel failures.
///
/// # Examples
///
/// ```
/// use parallel_reduce::{reduce_buffer, Buffer, HostQueue, Max, Range1D};
///
/// let queue = HostQueue::host();
/// let input = Buffer::from_slice(&[3i64, -7, 12, 5]);
/// let max = reduce_buffer::<Max<i64>, _>(&queue, &input, &Range1D::new(0, 4)?)?;
/// assert_eq!(max, 12);
/// # Ok::<(), parallel_reduce::ReduceError>(())
/// ```
pub fn reduce_buffer<O, Q>(queue: &Q, input: &Buffer<O::Item>, range: &Range1D) -> Result<O::Item>
where
    O: ReduceOp,
    Q: Queue,
{
    if range.to() > input.len() {
        return Err(ReduceError::InvalidBufferSize {
            expected: range.to(),
            actual: input.len(),
        });
    }

    let sizing = GroupSizing::for_device(queue.device(), range.size());
    let output = Buffer::filled(sizing.partial_len(), O::identity());
    tracing::debug!(op = O::NAME, %range, "reduce_buffer");

    parallel_reduce_1d(
        queue,
        range,
        |h, size| LocalReducer::<O::Item, O::Item, _>::new(h, size, input.read(), &output),
        |r, l| r.local.set(l, O::identity()),
        |r, l, g| r.local.set(l, O::combine(r.local.get(l), r.actual.get(g))),
        |r, a, b| r.local.set(a, O::combine(r.local.get(a), r.local.get(b))),
        |r, slot, l| r.result.set(slot, r.local.get(l)),
    )?;
    queue.wait_and_throw()?;

    output
        .get(0)
        .ok_or_else(|| ReduceError::Other("reduction produced no output".into()))
}

/// Sequential fold of `values` with `O`, starting from the identity.
pub fn reduce_slice<O: ReduceOp>(values: &[O::Item]) -> O::Item {
    values.iter().fold(O::identity(), |acc, &v| O::combine(acc, v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceInfo;
    use crate::queue::HostQueue;

    #[test]
    fn test_min_ignores_nan() {
        assert_eq!(Min::<f64>::combine(f64::NAN, 2.0), 2.0);
        assert_eq!(Min::<f64>::combine(2.0, f64::NAN), 2.0);
        assert_eq!(Min::<f64>::combine(2.0, -1.0), -1.0);
        assert_eq!(Min::<f64>::identity(), f64::MAX);
    }

    #[test]
    fn test_max_ignores_nan() {
        assert_eq!(Max::<f32>::combine(f32::NAN, 2.0), 2.0);
        assert_eq!(Max::<f32>::combine(2.0, f32::NAN), 2.0);
        assert_eq!(Max::<i32>::identity(), i32::MIN);
    }

    #[test]
    fn test_reduce_slice() {
        assert_eq!(reduce_slice::<Sum<u32>>(&[1, 2, 3]), 6);
        assert_eq!(reduce_slice::<Min<i8>>(&[]), i8::MAX);
    }

    #[test]
    fn test_reduce_buffer_matches_slice() {
        let queue = HostQueue::new(DeviceInfo::accelerator("sim", 3, 12));
        let data: Vec<i64> = (0..5000).map(|i| (i * 7919) % 1013 - 500).collect();
        let input = Buffer::from_slice(&data);
        let range = Range1D::new(0, data.len()).unwrap();

        assert_eq!(
            reduce_buffer::<Min<i64>, _>(&queue, &input, &range).unwrap(),
            reduce_slice::<Min<i64>>(&data)
        );
        assert_eq!(
            reduce_buffer::<Max<i64>, _>(&queue, &input, &range).unwrap(),
            reduce_slice::<Max<i64>>(&data)
        );
        assert_eq!(
            reduce_buffer::<Sum<i64>, _>(&queue, &input, &range).unwrap(),
            reduce_slice::<Sum<i64>>(&data)
        );
    }

    #[test]
    fn test_reduce_buffer_range_past_end() {
        let queue = HostQueue::host();
        let input = Buffer::from_slice(&[1u8, 2, 3]);
        let err = reduce_buffer::<Sum<u8>, _>(&queue, &input, &Range1D::new(1, 4).unwrap());
        assert_eq!(
            err,
            Err(ReduceError::InvalidBufferSize {
                expected: 4,
                actual: 3
            })
        );
    }
}
