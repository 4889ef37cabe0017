//! Group-local scratch memory.
//!
//! A [`LocalAccessor`] is the arena a single group reduces into. It is
//! created by the command-group [`Handler`](crate::queue::Handler) when a
//! group starts, shared by that group's workers, and dropped when the group
//! finishes. Nothing outside the group can observe it.

use crossbeam::atomic::AtomicCell;

/// Scratch memory private to one group for the duration of one launch.
pub struct LocalAccessor<T> {
    slots: Box<[AtomicCell<T>]>,
}

impl<T: Copy + Default> LocalAccessor<T> {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| AtomicCell::new(T::default())).collect(),
        }
    }
}

impl<T: Copy> LocalAccessor<T> {
    /// Read slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds, failing the launch.
    pub fn get(&self, idx: usize) -> T {
        self.slots[idx].load()
    }

    /// Write slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds, failing the launch.
    pub fn set(&self, idx: usize, value: T) {
        self.slots[idx].store(value);
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Size of the arena in bytes, as charged against the device's local memory.
    pub fn size_in_bytes(&self) -> usize {
        self.slots.len() * std::mem::size_of::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_accessor() {
        let local = LocalAccessor::<f64>::new(6);
        assert_eq!(local.len(), 6);
        assert_eq!(local.size_in_bytes(), 48);
        assert_eq!(local.get(5), 0.0);
        local.set(5, -1.5);
        assert_eq!(local.get(5), -1.5);
    }

    #[test]
    #[should_panic]
    fn test_local_accessor_bounds() {
        let local = LocalAccessor::<u8>::new(2);
        local.get(2);
    }
}
