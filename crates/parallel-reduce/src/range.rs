//! One-dimensional index ranges.

use std::fmt;

use crate::error::{ReduceError, Result};

/// Half-open interval `[from, to)` of indices to reduce over.
///
/// A `Range1D` is never empty: construction fails when `from >= to`, so every
/// reduction that receives one has at least one element to fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range1D {
    from: usize,
    to: usize,
    size: usize,
}

impl Range1D {
    /// Create a range covering `from..to`.
    ///
    /// # Errors
    ///
    /// Returns [`ReduceError::InvalidRange`] if the range is empty or inverted.
    ///
    /// # Examples
    ///
    /// ```
    /// use parallel_reduce::Range1D;
    ///
    /// let range = Range1D::new(0, 16384)?;
    /// assert_eq!(range.size(), 16384);
    /// assert!(Range1D::new(3, 3).is_err());
    /// # Ok::<(), parallel_reduce::ReduceError>(())
    /// ```
    pub fn new(from: usize, to: usize) -> Result<Self> {
        if from >= to {
            return Err(ReduceError::InvalidRange { from, to });
        }
        Ok(Self {
            from,
            to,
            size: to - from,
        })
    }

    /// First index of the range.
    pub fn from(&self) -> usize {
        self.from
    }

    /// One past the last index of the range.
    pub fn to(&self) -> usize {
        self.to
    }

    /// Number of indices in the range, always non-zero.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl TryFrom<std::ops::Range<usize>> for Range1D {
    type Error = ReduceError;

    fn try_from(range: std::ops::Range<usize>) -> Result<Self> {
        Self::new(range.start, range.end)
    }
}

impl fmt::Display for Range1D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Range1d{{ X[{}->{} ({})]}}",
            self.from, self.to, self.size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_size() {
        let range = Range1D::new(10, 42).unwrap();
        assert_eq!(range.from(), 10);
        assert_eq!(range.to(), 42);
        assert_eq!(range.size(), 32);
    }

    #[test]
    fn test_empty_range_rejected() {
        assert_eq!(
            Range1D::new(5, 5),
            Err(ReduceError::InvalidRange { from: 5, to: 5 })
        );
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(matches!(
            Range1D::new(9, 2),
            Err(ReduceError::InvalidRange { from: 9, to: 2 })
        ));
    }

    #[test]
    fn test_try_from_std_range() {
        let range = Range1D::try_from(0..1).unwrap();
        assert_eq!(range.size(), 1);
        assert!(Range1D::try_from(7..7).is_err());
    }

    #[test]
    fn test_display() {
        let range = Range1D::new(0, 8).unwrap();
        assert_eq!(range.to_string(), "Range1d{ X[0->8 (8)]}");
    }
}
