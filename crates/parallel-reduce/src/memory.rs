//! Buffers shared between the host and the workers of a queue.
//!
//! A [`Buffer`] owns its elements and hands out lightweight accessors that
//! kernels capture by value. Every element is stored in an [`AtomicCell`], so
//! many workers may read and write disjoint (or even the same) slots
//! concurrently without `unsafe`; ordering between writers is the kernel's
//! responsibility, exactly as on a device.

use crossbeam::atomic::AtomicCell;

use crate::error::{ReduceError, Result};

/// Indexed element access used by kernels.
pub trait Accessor {
    /// Element type.
    type Item: Copy;

    /// Read the element at `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds. Inside a kernel this fails the launch.
    fn get(&self, idx: usize) -> Self::Item;

    /// Number of accessible elements.
    fn len(&self) -> usize;

    /// Whether no elements are accessible.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Contiguous array visible to both the host and kernels.
pub struct Buffer<T> {
    data: Box<[AtomicCell<T>]>,
}

impl<T: Copy + Default> Buffer<T> {
    /// Allocate a buffer of `len` default-initialized elements.
    pub fn new(len: usize) -> Self {
        Self::filled(len, T::default())
    }
}

impl<T: Copy> Buffer<T> {
    /// Allocate a buffer of `len` copies of `value`.
    pub fn filled(len: usize, value: T) -> Self {
        Self {
            data: (0..len).map(|_| AtomicCell::new(value)).collect(),
        }
    }

    /// Copy host data into a new buffer.
    pub fn from_slice(data: &[T]) -> Self {
        Self {
            data: data.iter().map(|&v| AtomicCell::new(v)).collect(),
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer has no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Host read of a single element, `None` when out of bounds.
    pub fn get(&self, idx: usize) -> Option<T> {
        self.data.get(idx).map(AtomicCell::load)
    }

    /// Copy the whole buffer back to the host.
    pub fn to_vec(&self) -> Vec<T> {
        self.data.iter().map(AtomicCell::load).collect()
    }

    /// Overwrite the buffer with host data of the same length.
    ///
    /// # Errors
    ///
    /// Returns [`ReduceError::InvalidBufferSize`] if the lengths differ.
    pub fn copy_from_slice(&self, data: &[T]) -> Result<()> {
        if data.len() != self.len() {
            return Err(ReduceError::InvalidBufferSize {
                expected: self.len(),
                actual: data.len(),
            });
        }
        for (cell, &value) in self.data.iter().zip(data) {
            cell.store(value);
        }
        Ok(())
    }

    /// Read-only view for kernels.
    pub fn read(&self) -> ReadAccessor<'_, T> {
        ReadAccessor { data: &self.data }
    }

    /// Read-write view for kernels.
    pub fn read_write(&self) -> ReadWriteAccessor<'_, T> {
        ReadWriteAccessor { data: &self.data }
    }
}

impl<T: Copy + std::fmt::Debug> std::fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer").field("len", &self.len()).finish()
    }
}

/// Read-only kernel view over a [`Buffer`].
pub struct ReadAccessor<'a, T> {
    data: &'a [AtomicCell<T>],
}

impl<T> Clone for ReadAccessor<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ReadAccessor<'_, T> {}

impl<T: Copy> Accessor for ReadAccessor<'_, T> {
    type Item = T;

    fn get(&self, idx: usize) -> T {
        self.data[idx].load()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

/// Read-write kernel view over a [`Buffer`].
pub struct ReadWriteAccessor<'a, T> {
    data: &'a [AtomicCell<T>],
}

impl<T> Clone for ReadWriteAccessor<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ReadWriteAccessor<'_, T> {}

impl<T: Copy> ReadWriteAccessor<'_, T> {
    /// Write `value` at `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds. Inside a kernel this fails the launch.
    pub fn set(&self, idx: usize, value: T) {
        self.data[idx].store(value);
    }
}

impl<T: Copy> Accessor for ReadWriteAccessor<'_, T> {
    type Item = T;

    fn get(&self, idx: usize) -> T {
        self.data[idx].load()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}
