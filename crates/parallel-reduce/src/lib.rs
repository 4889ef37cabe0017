//! Two-phase parallel reductions over an accelerator-style execution model.
//!
//! This crate provides a generic group reduction engine,
//! [`parallel_reduce_1d`], that reduces a one-dimensional range in two
//! launches: every group folds its share of the input into group-local
//! scratch memory and tree-combines it to one partial result, then a single
//! group combines the partial results into the answer. The engine is
//! parameterized by five callbacks (context allocator, seed, fold, combine,
//! finalize) and says nothing about element types or the operator.
//!
//! # Features
//!
//! - **Host execution**: [`HostQueue`] runs groups on host threads with real
//!   group barriers, so the engine runs anywhere
//! - **Device-aware sizing**: group count and size follow the device class
//!   ([`GroupSizing`])
//! - **Operators**: [`Min`], [`Max`] and [`Sum`] via [`reduce_buffer`]
//!
//! # Feature Flags
//!
//! - `gpu`: CubeCL kernels for the minimum reduction
//! - `cuda`: Enable CUDA backend (NVIDIA GPUs)
//! - `wgpu`: Enable WGPU backend (Vulkan/Metal/DirectX12)
//!
//! # Examples
//!
//! ```
//! use parallel_reduce::{reduce_min, reduce_min_reference, HostQueue};
//!
//! let queue = HostQueue::host();
//! let actual = reduce_min(&queue, 128)?;
//! assert_eq!(Some(actual), reduce_min_reference(128));
//! # Ok::<(), parallel_reduce::ReduceError>(())
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod context;
pub mod device;
pub mod error;
pub mod memory;
pub mod minimum;
pub mod operators;
pub mod queue;
pub mod range;
pub mod reduce;

#[cfg(feature = "gpu")]
pub mod runtime;

#[cfg(feature = "gpu")]
pub mod kernels;

#[cfg(feature = "gpu")]
pub mod ops;


// Re-exports
pub use allocator::LocalAccessor;
pub use context::{Drain, LocalReducer};
pub use device::{DeviceClass, DeviceInfo, GroupSizing};
pub use error::{ReduceError, Result};
pub use memory::{Accessor, Buffer, ReadAccessor, ReadWriteAccessor};
pub use minimum::{
    prepare_buffer, reduce_min, reduce_min_non_generic, reduce_min_reference, synthetic_value,
    DOUBLE_MAX,
};
pub use operators::{reduce_buffer, reduce_slice, Max, Min, ReduceOp, Sum};
pub use queue::{GroupBarrier, Handler, HostQueue, NdItem, NdRange, Queue, MAX_HOST_GROUP_SIZE};
pub use range::Range1D;
pub use reduce::parallel_reduce_1d;

#[cfg(feature = "gpu")]
pub use runtime::*;

#[cfg(feature = "gpu")]
pub use kernels::*;

#[cfg(feature = "gpu")]
pub use ops::*;
