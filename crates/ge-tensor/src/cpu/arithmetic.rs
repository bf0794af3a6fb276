use half::{bf16, f16};

use crate::cpu::broadcast::{broadcast_binary, AutoBroadcast};
use crate::cpu::{DivisionPolicy, KernelContext};
use crate::error::{Result, TensorError};
use crate::storage::Element;
use crate::tensor::Tensor;

/// Scalar arithmetic shared by the elementwise binary kernels.
///
/// Integer operations wrap on overflow. Division-like operations assume a
/// non-zero integer divisor; the kernels check that before calling them.
pub trait Arithmetic: Element {
    /// True for floating point types, whose division by zero follows [`DivisionPolicy`].
    const IS_REAL: bool;

    fn is_zero(self) -> bool;
    fn add(self, rhs: Self) -> Self;
    fn sub(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    /// Quotient; integers round toward negative infinity when `floor` is set,
    /// toward zero otherwise.
    fn div(self, rhs: Self, floor: bool) -> Self;
    /// Floored modulo: the result takes the sign of the divisor.
    fn floor_mod(self, rhs: Self) -> Self;
    /// Truncated remainder: the result takes the sign of the dividend.
    fn trunc_mod(self, rhs: Self) -> Self;
    fn maximum(self, rhs: Self) -> Self;
    fn minimum(self, rhs: Self) -> Self;
}

macro_rules! impl_signed {
    ($($t:ty),*) => {
        $(
            impl Arithmetic for $t {
                const IS_REAL: bool = false;

                fn is_zero(self) -> bool {
                    self == 0
                }

                fn add(self, rhs: Self) -> Self {
                    self.wrapping_add(rhs)
                }

                fn sub(self, rhs: Self) -> Self {
                    self.wrapping_sub(rhs)
                }

                fn mul(self, rhs: Self) -> Self {
                    self.wrapping_mul(rhs)
                }

                fn div(self, rhs: Self, floor: bool) -> Self {
                    let q = self.wrapping_div(rhs);
                    if floor && self.wrapping_rem(rhs) != 0 && ((self < 0) != (rhs < 0)) {
                        q.wrapping_sub(1)
                    } else {
                        q
                    }
                }

                fn floor_mod(self, rhs: Self) -> Self {
                    let r = self.wrapping_rem(rhs);
                    if r != 0 && ((r < 0) != (rhs < 0)) {
                        r.wrapping_add(rhs)
                    } else {
                        r
                    }
                }

                fn trunc_mod(self, rhs: Self) -> Self {
                    self.wrapping_rem(rhs)
                }

                fn maximum(self, rhs: Self) -> Self {
                    Ord::max(self, rhs)
                }

                fn minimum(self, rhs: Self) -> Self {
                    Ord::min(self, rhs)
                }
            }
        )*
    };
}

macro_rules! impl_unsigned {
    ($($t:ty),*) => {
        $(
            impl Arithmetic for $t {
                const IS_REAL: bool = false;

                fn is_zero(self) -> bool {
                    self == 0
                }

                fn add(self, rhs: Self) -> Self {
                    self.wrapping_add(rhs)
                }

                fn sub(self, rhs: Self) -> Self {
                    self.wrapping_sub(rhs)
                }

                fn mul(self, rhs: Self) -> Self {
                    self.wrapping_mul(rhs)
                }

                fn div(self, rhs: Self, _floor: bool) -> Self {
                    self / rhs
                }

                fn floor_mod(self, rhs: Self) -> Self {
                    self % rhs
                }

                fn trunc_mod(self, rhs: Self) -> Self {
                    self % rhs
                }

                fn maximum(self, rhs: Self) -> Self {
                    Ord::max(self, rhs)
                }

                fn minimum(self, rhs: Self) -> Self {
                    Ord::min(self, rhs)
                }
            }
        )*
    };
}

macro_rules! impl_float {
    ($($t:ty),*) => {
        $(
            impl Arithmetic for $t {
                const IS_REAL: bool = true;

                fn is_zero(self) -> bool {
                    self == 0.0
                }

                fn add(self, rhs: Self) -> Self {
                    self + rhs
                }

                fn sub(self, rhs: Self) -> Self {
                    self - rhs
                }

                fn mul(self, rhs: Self) -> Self {
                    self * rhs
                }

                fn div(self, rhs: Self, _floor: bool) -> Self {
                    self / rhs
                }

                fn floor_mod(self, rhs: Self) -> Self {
                    self - rhs * (self / rhs).floor()
                }

                fn trunc_mod(self, rhs: Self) -> Self {
                    self % rhs
                }

                fn maximum(self, rhs: Self) -> Self {
                    self.max(rhs)
                }

                fn minimum(self, rhs: Self) -> Self {
                    self.min(rhs)
                }
            }
        )*
    };
}

/// Half types compute in f32 and round back.
macro_rules! impl_half {
    ($($t:ty),*) => {
        $(
            impl Arithmetic for $t {
                const IS_REAL: bool = true;

                fn is_zero(self) -> bool {
                    self.to_f32() == 0.0
                }

                fn add(self, rhs: Self) -> Self {
                    <$t>::from_f32(self.to_f32() + rhs.to_f32())
                }

                fn sub(self, rhs: Self) -> Self {
                    <$t>::from_f32(self.to_f32() - rhs.to_f32())
                }

                fn mul(self, rhs: Self) -> Self {
                    <$t>::from_f32(self.to_f32() * rhs.to_f32())
                }

                fn div(self, rhs: Self, _floor: bool) -> Self {
                    <$t>::from_f32(self.to_f32() / rhs.to_f32())
                }

                fn floor_mod(self, rhs: Self) -> Self {
                    <$t>::from_f32(Arithmetic::floor_mod(self.to_f32(), rhs.to_f32()))
                }

                fn trunc_mod(self, rhs: Self) -> Self {
                    <$t>::from_f32(self.to_f32() % rhs.to_f32())
                }

                fn maximum(self, rhs: Self) -> Self {
                    <$t>::from_f32(self.to_f32().max(rhs.to_f32()))
                }

                fn minimum(self, rhs: Self) -> Self {
                    <$t>::from_f32(self.to_f32().min(rhs.to_f32()))
                }
            }
        )*
    };
}

impl_signed!(i8, i16, i32, i64);
impl_unsigned!(u8, u16, u32, u64);
impl_float!(f32, f64);
impl_half!(f16, bf16);

/// The elementwise binary arithmetic operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    /// `floor` selects floored integer division.
    Divide { floor: bool },
    FloorMod,
    Mod,
    Maximum,
    Minimum,
}

impl BinaryOp {
    /// Returns true if a zero right-hand operand is a division by zero.
    pub fn divides(&self) -> bool {
        matches!(self, BinaryOp::Divide { .. } | BinaryOp::FloorMod | BinaryOp::Mod)
    }

    fn scalar_fn<T: Arithmetic>(&self) -> fn(T, T) -> T {
        match self {
            BinaryOp::Add => T::add,
            BinaryOp::Subtract => T::sub,
            BinaryOp::Multiply => T::mul,
            BinaryOp::Divide { floor: true } => |a, b| T::div(a, b, true),
            BinaryOp::Divide { floor: false } => |a, b| T::div(a, b, false),
            BinaryOp::FloorMod => T::floor_mod,
            BinaryOp::Mod => T::trunc_mod,
            BinaryOp::Maximum => T::maximum,
            BinaryOp::Minimum => T::minimum,
        }
    }
}

/// Evaluate `op` over two tensors of element type `T`.
///
/// The output has the broadcast shape of the inputs. Integer division by zero
/// always fails; floating point division by zero fails only under
/// [`DivisionPolicy::Strict`].
pub fn binary<T: Arithmetic>(
    op: BinaryOp,
    a: &Tensor<'_>,
    b: &Tensor<'_>,
    broadcast: AutoBroadcast,
    ctx: &KernelContext,
) -> Result<Tensor<'static>> {
    if a.element_type() != b.element_type() {
        return Err(TensorError::TypeMismatch {
            expected: a.element_type(),
            got: b.element_type(),
        });
    }
    let x = a.as_slice::<T>()?;
    let y = b.as_slice::<T>()?;
    let out_shape = broadcast.resolve(a.shape(), b.shape())?;

    let f = op.scalar_fn::<T>();
    let check_zero = op.divides() && (!T::IS_REAL || ctx.division == DivisionPolicy::Strict);

    let data = broadcast_binary(x, a.shape(), y, b.shape(), &out_shape, |i, p, q| {
        if check_zero && q.is_zero() {
            return Err(TensorError::DivisionByZero { index: i });
        }
        Ok(f(p, q))
    })?;

    Tensor::from_vec(data, out_shape)
}
