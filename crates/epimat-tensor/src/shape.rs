use std::fmt;

/// A tensor shape, wrapping a vector of dimension sizes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Create a new shape from a vector of dimensions.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    /// Shorthand for a 2-D `[rows, cols]` shape.
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Shape {
            dims: vec![rows, cols],
        }
    }

    /// Total number of elements (product of all dimension sizes).
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Like [`Shape::numel`], but `None` when the product overflows `usize`.
    pub fn checked_numel(&self) -> Option<usize> {
        self.dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Returns a reference to the underlying dimension sizes.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns `(rows, cols)` for a 2-D shape, `None` otherwise.
    pub fn as_matrix(&self) -> Option<(usize, usize)> {
        match self.dims.as_slice() {
            [rows, cols] => Some((*rows, *cols)),
            _ => None,
        }
    }

    /// True for `[len]` and `[len, 1]`, the two accepted spellings of a
    /// per-row vector.
    pub fn is_column_of(&self, len: usize) -> bool {
        matches!(self.dims.as_slice(), [r] | [r, 1] if *r == len)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, ")")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape::new(dims.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_shape() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.numel(), 24);
        assert_eq!(s.dims(), &[2, 3, 4]);
    }

    #[test]
    fn test_checked_numel() {
        assert_eq!(Shape::new(vec![2, 3, 4]).checked_numel(), Some(24));
        assert_eq!(Shape::matrix(usize::MAX / 2, 0).checked_numel(), Some(0));
        assert_eq!(Shape::matrix(usize::MAX, 2).checked_numel(), None);
    }

    #[test]
    fn test_scalar_shape() {
        let s = Shape::new(vec![]);
        assert!(s.dims().is_empty());
        assert_eq!(s.numel(), 1); // product of empty = 1
        assert_eq!(s.as_matrix(), None);
    }

    #[test]
    fn test_as_matrix() {
        assert_eq!(Shape::matrix(64, 128).as_matrix(), Some((64, 128)));
        assert_eq!(Shape::from([64]).as_matrix(), None);
    }

    #[test]
    fn test_is_column_of() {
        assert!(Shape::from([64, 1]).is_column_of(64));
        assert!(Shape::from([64]).is_column_of(64));
        assert!(!Shape::from([1, 64]).is_column_of(64));
        assert!(!Shape::from([32, 1]).is_column_of(64));
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::matrix(64, 128).to_string(), "(64, 128)");
    }
}
