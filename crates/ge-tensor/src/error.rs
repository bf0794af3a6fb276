use thiserror::Error;

use crate::element_type::ElementType;
use crate::shape::PartialShape;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
    #[error("element type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        expected: ElementType,
        got: ElementType,
    },
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch {
        expected: PartialShape,
        got: PartialShape,
    },
    #[error("cannot broadcast shapes {a} and {b}")]
    IncompatibleShapes { a: PartialShape, b: PartialShape },
    #[error("division by zero at output element {index}")]
    DivisionByZero { index: usize },
    #[error("unsupported element type {element_type} for {context}")]
    UnsupportedElementType {
        element_type: ElementType,
        context: String,
    },
    #[error("buffer of {got} bytes does not hold {expected} bytes of tensor data")]
    BufferSizeMismatch { expected: usize, got: usize },
    #[error("unknown element type: {0}")]
    UnknownElementType(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;
