//! Shape and stride utilities for tensors.

use std::fmt;

/// A tensor shape (dimensions).
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(pub Vec<usize>);

impl Shape {
    /// Create a new shape from dimensions.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// Create a scalar shape (0-dimensional).
    pub fn scalar() -> Self {
        Shape(vec![])
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Get dimension at index.
    pub fn dim(&self, idx: usize) -> usize {
        self.0[idx]
    }

    /// Get dimensions as slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Total number of elements, or `None` if the count overflows `usize`.
    ///
    /// A scalar holds one element; any zero-sized axis makes the tensor empty.
    pub fn checked_numel(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Total number of elements, saturating at `usize::MAX`.
    ///
    /// Shapes coming from scripts should go through [`Shape::checked_numel`].
    pub fn numel(&self) -> usize {
        self.checked_numel().unwrap_or(usize::MAX)
    }

    /// Check if this is a scalar (0-dim tensor).
    pub fn is_scalar(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over every multi-index of this shape in row-major order.
    pub fn indices(&self) -> RowMajorIndices<'_> {
        RowMajorIndices::new(self)
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({:?})", self.0)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        if self.0.len() == 1 {
            write!(f, ",")?;
        }
        write!(f, ")")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

/// Iterator over all multi-dimensional indices of a shape, last axis fastest.
pub struct RowMajorIndices<'a> {
    shape: &'a Shape,
    current: Vec<usize>,
    done: bool,
}

impl<'a> RowMajorIndices<'a> {
    fn new(shape: &'a Shape) -> Self {
        RowMajorIndices {
            shape,
            current: vec![0; shape.ndim()],
            // A scalar still yields its single empty index.
            done: shape.checked_numel() == Some(0),
        }
    }
}

impl Iterator for RowMajorIndices<'_> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.current.clone();

        if self.shape.ndim() == 0 {
            self.done = true;
            return Some(result);
        }

        // Increment indices (rightmost first, like odometer)
        let mut i = self.shape.ndim() - 1;
        loop {
            self.current[i] += 1;
            if self.current[i] < self.shape.dim(i) {
                break;
            }
            self.current[i] = 0;
            if i == 0 {
                self.done = true;
                break;
            }
            i -= 1;
        }

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_shape_basics() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.ndim(), 3);
        assert_eq!(s.dim(0), 2);
        assert_eq!(s.dim(1), 3);
        assert_eq!(s.dim(2), 4);
        assert_eq!(s.numel(), 24);
        assert!(!s.is_scalar());
    }

    #[test]
    fn test_scalar_shape() {
        let s = Shape::scalar();
        assert_eq!(s.ndim(), 0);
        assert_eq!(s.numel(), 1);
        assert!(s.is_scalar());
    }

    #[test]
    fn test_empty_axis_has_no_elements() {
        let s = Shape::new(vec![3, 0, 2]);
        assert_eq!(s.numel(), 0);
        assert_eq!(s.indices().count(), 0);
    }

    #[test]
    fn test_checked_numel_overflow() {
        let huge = Shape::new(vec![1 << 32, 1 << 32, 2]);
        assert_eq!(huge.checked_numel(), None);
        assert_eq!(huge.numel(), usize::MAX);
        assert_eq!(Shape::new(vec![1 << 32, 0]).checked_numel(), Some(0));
    }

    #[test]
    fn test_indices_order() {
        let s = Shape::new(vec![2, 2]);
        let all: Vec<_> = s.indices().collect();
        assert_eq!(all, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);

        let scalar: Vec<_> = Shape::scalar().indices().collect();
        assert_eq!(scalar, vec![Vec::<usize>::new()]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::new(vec![2, 3]).to_string(), "(2, 3)");
        assert_eq!(Shape::new(vec![4]).to_string(), "(4,)");
        assert_eq!(Shape::scalar().to_string(), "()");
    }

    proptest! {
        #[test]
        fn prop_indices_are_row_major(dims in prop::collection::vec(1usize..4, 0..4)) {
            let shape = Shape::new(dims);
            let all: Vec<Vec<usize>> = shape.indices().collect();
            prop_assert_eq!(all.len(), shape.numel());
            for index in &all {
                prop_assert_eq!(index.len(), shape.ndim());
                for (&i, &d) in index.iter().zip(shape.dims()) {
                    prop_assert!(i < d);
                }
            }
            // Lexicographic order is row-major order.
            for pair in all.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }
    }
}
