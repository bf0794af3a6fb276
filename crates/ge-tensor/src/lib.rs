//! `ge-tensor` - Typed host tensors and reference CPU kernels for graph-eval.
//!
//! This crate provides:
//! - `ElementType` and the `Element` trait mapping Rust scalars to it
//! - `Shape` and `PartialShape` with numpy-style broadcasting
//! - A `Tensor` type that owns its data or borrows caller memory
//! - Reference elementwise kernels in `cpu`

pub mod cpu;
pub mod element_type;
pub mod error;
pub mod shape;
pub mod storage;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use cpu::{AutoBroadcast, DivisionPolicy, KernelContext};
pub use element_type::ElementType;
pub use error::{Result, TensorError};
pub use shape::{Dimension, PartialShape, Shape};
pub use storage::{Element, Storage};
pub use tensor::{Tensor, TensorDesc};

pub use half::{bf16, f16};
