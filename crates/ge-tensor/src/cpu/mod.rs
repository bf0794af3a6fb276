//! Pure-Rust reference kernels.
//!
//! Kernels are written with straightforward loops, optimized for correctness
//! rather than peak performance. Every kernel allocates a fresh output tensor.

pub mod arithmetic;
pub mod broadcast;

pub use arithmetic::{binary, Arithmetic, BinaryOp};
pub use broadcast::{broadcast_binary, AutoBroadcast};

/// What floating point division by zero does.
///
/// Integer division by zero is always an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DivisionPolicy {
    /// Produce NaN or infinity as IEEE 754 prescribes.
    #[default]
    Ieee,
    /// Fail with `DivisionByZero`.
    Strict,
}

/// Run-wide options a kernel may consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KernelContext {
    pub division: DivisionPolicy,
}
