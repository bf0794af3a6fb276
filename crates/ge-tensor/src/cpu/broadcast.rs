use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TensorError};
use crate::shape::{PartialShape, Shape};

/// How the inputs of an elementwise operator are aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AutoBroadcast {
    /// Shapes must be identical.
    None,
    /// Numpy rules: trailing alignment, size-1 dimensions stretch.
    #[default]
    Numpy,
}

impl AutoBroadcast {
    /// Output partial shape for inputs `a` and `b`.
    pub fn infer(&self, a: &PartialShape, b: &PartialShape) -> Result<PartialShape> {
        match self {
            AutoBroadcast::None => PartialShape::merge(a, b),
            AutoBroadcast::Numpy => PartialShape::broadcast(a, b),
        }
    }

    /// Output shape for concrete inputs `a` and `b`.
    pub fn resolve(&self, a: &Shape, b: &Shape) -> Result<Shape> {
        match self {
            AutoBroadcast::None if a == b => Ok(a.clone()),
            AutoBroadcast::None => Err(TensorError::IncompatibleShapes {
                a: a.into(),
                b: b.into(),
            }),
            AutoBroadcast::Numpy => Shape::broadcast_shape(a, b),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AutoBroadcast::None => "none",
            AutoBroadcast::Numpy => "numpy",
        }
    }
}

impl fmt::Display for AutoBroadcast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AutoBroadcast {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(AutoBroadcast::None),
            "numpy" => Ok(AutoBroadcast::Numpy),
            other => Err(format!("unknown broadcast mode '{}'", other)),
        }
    }
}

/// Apply `f` to every pair of elements of `a` and `b` broadcast to `out_shape`.
///
/// `f` receives the flat output index, so kernels can report which element
/// failed. `out_shape` must be a valid broadcast of both input shapes and the
/// slices must hold exactly `numel()` elements of their shapes.
pub fn broadcast_binary<A, B, R, F>(
    a: &[A],
    a_shape: &Shape,
    b: &[B],
    b_shape: &Shape,
    out_shape: &Shape,
    mut f: F,
) -> Result<Vec<R>>
where
    A: Copy,
    B: Copy,
    F: FnMut(usize, A, B) -> Result<R>,
{
    let n = out_shape.numel();
    let mut out = Vec::with_capacity(n);

    // Fast path: no broadcasting needed.
    if a_shape == out_shape && b_shape == out_shape {
        for (i, (&x, &y)) in a.iter().zip(b).enumerate() {
            out.push(f(i, x, y)?);
        }
        return Ok(out);
    }

    let dims = out_shape.dims();
    let a_strides = a_shape.broadcast_strides(out_shape);
    let b_strides = b_shape.broadcast_strides(out_shape);
    let mut index = vec![0usize; dims.len()];
    let (mut ia, mut ib) = (0usize, 0usize);

    for i in 0..n {
        out.push(f(i, a[ia], b[ib])?);

        // Advance the multi-dimensional index, innermost dimension first.
        for d in (0..dims.len()).rev() {
            index[d] += 1;
            ia += a_strides[d];
            ib += b_strides[d];
            if index[d] < dims[d] {
                break;
            }
            ia -= a_strides[d] * dims[d];
            ib -= b_strides[d] * dims[d];
            index[d] = 0;
        }
    }

    Ok(out)
}
