use crate::error::{Result, TensorError};
use std::fmt;

/// A concrete tensor shape, wrapping a vector of dimension sizes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Create a new shape from a vector of dimensions.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    /// The rank-0 shape of a scalar.
    pub fn scalar() -> Self {
        Shape { dims: Vec::new() }
    }

    /// Create a shape from a slice of dimensions.
    pub fn from_slice(dims: &[usize]) -> Self {
        Shape {
            dims: dims.to_vec(),
        }
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements (product of all dimension sizes).
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Returns the size of dimension `i`.
    ///
    /// # Panics
    /// Panics if `i >= ndim()`.
    pub fn dim(&self, i: usize) -> usize {
        self.dims[i]
    }

    /// Returns a reference to the underlying dimension sizes.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Computes row-major contiguous strides for this shape.
    ///
    /// For a shape [d0, d1, d2], the strides are [d1*d2, d2, 1].
    pub fn strides(&self) -> Vec<usize> {
        if self.dims.is_empty() {
            return vec![];
        }
        let mut strides = vec![0usize; self.dims.len()];
        strides[self.dims.len() - 1] = 1;
        for i in (0..self.dims.len() - 1).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// Strides for reading this shape as if it were broadcast to `target`.
    ///
    /// Leading dimensions missing from `self` and dimensions of size 1 that
    /// `target` expands get a stride of 0. The caller must have checked that
    /// `target` is a valid broadcast of `self`.
    pub fn broadcast_strides(&self, target: &Shape) -> Vec<usize> {
        let own = self.strides();
        let offset = target.ndim() - self.ndim();
        (0..target.ndim())
            .map(|i| {
                if i < offset {
                    0
                } else {
                    let d = i - offset;
                    if self.dims[d] == 1 && target.dims[i] != 1 {
                        0
                    } else {
                        own[d]
                    }
                }
            })
            .collect()
    }

    /// Compute the broadcast shape of `a` and `b` using numpy-style broadcasting rules.
    ///
    /// Rules:
    /// 1. If the shapes have different numbers of dimensions, the shorter shape is
    ///    padded with ones on the left.
    /// 2. For each dimension, sizes must either be equal, or one of them must be 1.
    ///    The output dimension is the non-1 size.
    pub fn broadcast_shape(a: &Shape, b: &Shape) -> Result<Shape> {
        let max_ndim = a.ndim().max(b.ndim());
        let mut result = Vec::with_capacity(max_ndim);

        for i in 0..max_ndim {
            // Index from the right: dim at position (ndim - 1 - i) from the right
            let da = if i < a.ndim() {
                a.dims[a.ndim() - 1 - i]
            } else {
                1
            };
            let db = if i < b.ndim() {
                b.dims[b.ndim() - 1 - i]
            } else {
                1
            };

            if da == db {
                result.push(da);
            } else if da == 1 {
                result.push(db);
            } else if db == 1 {
                result.push(da);
            } else {
                return Err(TensorError::IncompatibleShapes {
                    a: a.into(),
                    b: b.into(),
                });
            }
        }

        result.reverse();
        Ok(Shape::new(result))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::from_slice(dims)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape::new(dims.to_vec())
    }
}

/// A single dimension of a [`PartialShape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Static(usize),
    Dynamic,
}

impl Dimension {
    pub fn is_static(&self) -> bool {
        matches!(self, Dimension::Static(_))
    }

    /// Returns true if a concrete size `d` can stand in for this dimension.
    pub fn accepts(&self, d: usize) -> bool {
        match self {
            Dimension::Static(s) => *s == d,
            Dimension::Dynamic => true,
        }
    }

    /// Merge two dimensions that must describe the same size.
    pub fn merge(a: Dimension, b: Dimension) -> Option<Dimension> {
        match (a, b) {
            (Dimension::Dynamic, d) | (d, Dimension::Dynamic) => Some(d),
            (Dimension::Static(x), Dimension::Static(y)) if x == y => Some(a),
            _ => None,
        }
    }

    /// Numpy broadcast of two dimensions.
    ///
    /// A dynamic dimension against 1 stays dynamic; against a static size
    /// greater than 1 it must take that size at run time.
    pub fn broadcast(a: Dimension, b: Dimension) -> Option<Dimension> {
        match (a, b) {
            (Dimension::Static(1), d) | (d, Dimension::Static(1)) => Some(d),
            _ => Dimension::merge(a, b),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Static(d) => write!(f, "{}", d),
            Dimension::Dynamic => write!(f, "?"),
        }
    }
}

impl From<usize> for Dimension {
    fn from(d: usize) -> Self {
        Dimension::Static(d)
    }
}

/// A shape with a known rank whose dimensions may be dynamic.
///
/// Graph parameters are declared with partial shapes; every value produced
/// during an evaluation run has a fully static [`Shape`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PartialShape {
    dims: Vec<Dimension>,
}

impl PartialShape {
    pub fn new(dims: Vec<Dimension>) -> Self {
        PartialShape { dims }
    }

    /// A partial shape of `rank` dynamic dimensions.
    pub fn dynamic(rank: usize) -> Self {
        PartialShape {
            dims: vec![Dimension::Dynamic; rank],
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn is_static(&self) -> bool {
        self.dims.iter().all(Dimension::is_static)
    }

    /// Returns the concrete shape if every dimension is static.
    pub fn to_shape(&self) -> Option<Shape> {
        self.dims
            .iter()
            .map(|d| match d {
                Dimension::Static(s) => Some(*s),
                Dimension::Dynamic => None,
            })
            .collect::<Option<Vec<usize>>>()
            .map(Shape::new)
    }

    /// Returns true if `shape` has the same rank and agrees on every static dimension.
    pub fn is_compatible(&self, shape: &Shape) -> bool {
        self.rank() == shape.ndim()
            && self
                .dims
                .iter()
                .zip(shape.dims())
                .all(|(d, &s)| d.accepts(s))
    }

    /// Numpy-style broadcast of two partial shapes.
    pub fn broadcast(a: &PartialShape, b: &PartialShape) -> Result<PartialShape> {
        let max_rank = a.rank().max(b.rank());
        let one = Dimension::Static(1);
        let mut result = Vec::with_capacity(max_rank);

        for i in 0..max_rank {
            let da = if i < a.rank() { a.dims[a.rank() - 1 - i] } else { one };
            let db = if i < b.rank() { b.dims[b.rank() - 1 - i] } else { one };
            match Dimension::broadcast(da, db) {
                Some(d) => result.push(d),
                None => {
                    return Err(TensorError::IncompatibleShapes {
                        a: a.clone(),
                        b: b.clone(),
                    })
                }
            }
        }

        result.reverse();
        Ok(PartialShape::new(result))
    }

    /// Merge two partial shapes that must be identical (no broadcasting).
    pub fn merge(a: &PartialShape, b: &PartialShape) -> Result<PartialShape> {
        let incompatible = || TensorError::IncompatibleShapes {
            a: a.clone(),
            b: b.clone(),
        };
        if a.rank() != b.rank() {
            return Err(incompatible());
        }
        a.dims
            .iter()
            .zip(&b.dims)
            .map(|(&x, &y)| Dimension::merge(x, y).ok_or_else(incompatible))
            .collect::<Result<Vec<_>>>()
            .map(PartialShape::new)
    }
}

impl fmt::Display for PartialShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

impl From<&Shape> for PartialShape {
    fn from(shape: &Shape) -> Self {
        PartialShape::new(shape.dims.iter().map(|&d| Dimension::Static(d)).collect())
    }
}

impl From<Shape> for PartialShape {
    fn from(shape: Shape) -> Self {
        PartialShape::from(&shape)
    }
}

impl From<Vec<Dimension>> for PartialShape {
    fn from(dims: Vec<Dimension>) -> Self {
        PartialShape::new(dims)
    }
}

impl<const N: usize> From<[usize; N]> for PartialShape {
    fn from(dims: [usize; N]) -> Self {
        PartialShape::from(Shape::from(dims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_shape() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.ndim(), 3);
        assert_eq!(s.numel(), 24);
        assert_eq!(s.dim(0), 2);
        assert_eq!(s.dim(2), 4);
    }

    #[test]
    fn test_strides() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.strides(), vec![12, 4, 1]);
    }

    #[test]
    fn test_scalar_shape() {
        let s = Shape::scalar();
        assert_eq!(s.ndim(), 0);
        assert_eq!(s.numel(), 1); // product of empty = 1
        assert_eq!(s.strides(), vec![]);
    }

    #[test]
    fn test_broadcast_expand() {
        let a = Shape::new(vec![2, 1]);
        let b = Shape::new(vec![1, 3]);
        let c = Shape::broadcast_shape(&a, &b).unwrap();
        assert_eq!(c.dims(), &[2, 3]);
    }

    #[test]
    fn test_broadcast_different_ndim() {
        let a = Shape::new(vec![3]);
        let b = Shape::new(vec![2, 3]);
        let c = Shape::broadcast_shape(&a, &b).unwrap();
        assert_eq!(c.dims(), &[2, 3]);
    }

    #[test]
    fn test_broadcast_error() {
        let a = Shape::new(vec![4]);
        let b = Shape::new(vec![3]);
        let err = Shape::broadcast_shape(&a, &b).unwrap_err();
        assert!(matches!(err, TensorError::IncompatibleShapes { .. }));
    }

    #[test]
    fn test_broadcast_strides() {
        let a = Shape::new(vec![3, 1]);
        let target = Shape::new(vec![2, 3, 4]);
        assert_eq!(a.broadcast_strides(&target), vec![0, 1, 0]);

        let same = Shape::new(vec![2, 3, 4]);
        assert_eq!(same.broadcast_strides(&target), vec![12, 4, 1]);
    }

    #[test]
    fn test_partial_broadcast_dynamic() {
        let a = PartialShape::new(vec![Dimension::Dynamic, Dimension::Static(3)]);
        let b = PartialShape::from([4, 1]);
        let c = PartialShape::broadcast(&a, &b).unwrap();
        assert_eq!(c.dims(), &[Dimension::Static(4), Dimension::Static(3)]);

        let ones = PartialShape::from([1, 1]);
        let d = PartialShape::broadcast(&a, &ones).unwrap();
        assert_eq!(d.dims(), &[Dimension::Dynamic, Dimension::Static(3)]);
    }

    #[test]
    fn test_partial_broadcast_error() {
        let a = PartialShape::from([4]);
        let b = PartialShape::from([3]);
        assert!(PartialShape::broadcast(&a, &b).is_err());
    }

    #[test]
    fn test_partial_merge() {
        let a = PartialShape::new(vec![Dimension::Dynamic, Dimension::Static(2)]);
        let b = PartialShape::from([5, 2]);
        assert_eq!(PartialShape::merge(&a, &b).unwrap(), b);

        let c = PartialShape::from([2]);
        assert!(PartialShape::merge(&a, &c).is_err());
        assert!(PartialShape::merge(&PartialShape::from([2, 1]), &b).is_err());
    }

    #[test]
    fn test_compatible() {
        let p = PartialShape::new(vec![Dimension::Dynamic, Dimension::Static(3)]);
        assert!(p.is_compatible(&Shape::new(vec![7, 3])));
        assert!(!p.is_compatible(&Shape::new(vec![7, 4])));
        assert!(!p.is_compatible(&Shape::new(vec![3])));
        assert!(p.to_shape().is_none());
        assert_eq!(
            PartialShape::from([2, 3]).to_shape(),
            Some(Shape::new(vec![2, 3]))
        );
    }

    #[test]
    fn test_display() {
        let p = PartialShape::new(vec![Dimension::Dynamic, Dimension::Static(3)]);
        assert_eq!(p.to_string(), "[?, 3]");
        assert_eq!(Shape::new(vec![2, 3]).to_string(), "[2, 3]");
    }
}
