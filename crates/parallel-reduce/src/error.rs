//! Error types for reductions and kernel launches.

use thiserror::Error;

/// Result type for reduction operations.
pub type Result<T> = std::result::Result<T, ReduceError>;

/// Error types that can occur while building or running a reduction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReduceError {
    /// A range was empty or inverted.
    #[error("Invalid range: from ({from}) must be strictly less than to ({to})")]
    InvalidRange {
        /// Lower bound
        from: usize,
        /// Upper bound (exclusive)
        to: usize,
    },

    /// An nd-range was empty or the global size is not a multiple of the group size.
    #[error("Invalid nd-range: global size {global} with group size {local}")]
    InvalidNdRange {
        /// Total number of workers
        global: usize,
        /// Workers per group
        local: usize,
    },

    /// A launch asked for more group-local memory than the device provides.
    #[error("Out of local memory: requested {requested} bytes, device has {available}")]
    OutOfLocalMemory {
        /// Bytes requested by one group
        requested: usize,
        /// Bytes available per group
        available: usize,
    },

    /// Invalid buffer size or dimensions.
    #[error("Invalid buffer size: expected {expected}, got {actual}")]
    InvalidBufferSize {
        /// Expected buffer size
        expected: usize,
        /// Actual buffer size
        actual: usize,
    },

    /// A kernel failed while executing on the device.
    #[error("Kernel '{kernel}' failed: {message}")]
    KernelFailed {
        /// Name the kernel was submitted under
        kernel: &'static str,
        /// Failure reported by the first failing worker
        message: String,
    },

    /// Device not available or not found.
    #[error("Device not available: {0}")]
    DeviceNotAvailable(String),

    /// CubeCL runtime error.
    #[cfg(feature = "gpu")]
    #[error("CubeCL error: {0}")]
    CubeCLError(String),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ReduceError::InvalidRange { from: 4, to: 4 };
        assert_eq!(
            err.to_string(),
            "Invalid range: from (4) must be strictly less than to (4)"
        );

        let err = ReduceError::KernelFailed {
            kernel: "final_reduction",
            message: "index out of bounds".into(),
        };
        assert_eq!(
            err.to_string(),
            "Kernel 'final_reduction' failed: index out of bounds"
        );
    }
}
