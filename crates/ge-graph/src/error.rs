use ge_tensor::{Shape, TensorError};
use thiserror::Error;

use crate::node::NodeId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
    #[error("expected {expected} {what}, got {got}")]
    ArityMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("malformed graph: {0}")]
    MalformedGraph(String),
    #[error("output slot {index} holds shape {got}, result has shape {expected}")]
    OutputShapeMismatch {
        index: usize,
        expected: Shape,
        got: Shape,
    },
    #[error("unknown operator: {0}")]
    UnknownOperator(String),
    #[error("invalid attribute '{name}': {reason}")]
    InvalidAttribute { name: String, reason: String },
    #[error("invalid config option '{key}': {reason}")]
    InvalidConfig { key: String, reason: String },
    #[error("node {node} ({name}) failed: {source}")]
    Node {
        node: NodeId,
        name: String,
        #[source]
        source: Box<GraphError>,
    },
}

impl GraphError {
    /// Wrap this error with the identity of the node it occurred at.
    pub fn at_node(self, node: NodeId, name: &str) -> GraphError {
        GraphError::Node {
            node,
            name: name.to_string(),
            source: Box::new(self),
        }
    }

    /// The category of this error, looking through node context.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::Tensor(e) => match e {
                TensorError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
                TensorError::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
                TensorError::IncompatibleShapes { .. } => ErrorKind::IncompatibleShapes,
                TensorError::DivisionByZero { .. } => ErrorKind::DivisionByZero,
                TensorError::UnsupportedElementType { .. }
                | TensorError::UnknownElementType(_) => ErrorKind::UnsupportedElementType,
                TensorError::BufferSizeMismatch { .. } => ErrorKind::BufferSizeMismatch,
            },
            GraphError::ArityMismatch { .. } => ErrorKind::ArityMismatch,
            GraphError::MalformedGraph(_) => ErrorKind::MalformedGraph,
            GraphError::OutputShapeMismatch { .. } => ErrorKind::OutputShapeMismatch,
            GraphError::UnknownOperator(_) => ErrorKind::UnknownOperator,
            GraphError::InvalidAttribute { .. } => ErrorKind::InvalidAttribute,
            GraphError::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            GraphError::Node { source, .. } => source.kind(),
        }
    }

    /// The node this error is attributed to, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            GraphError::Node { node, .. } => Some(*node),
            _ => None,
        }
    }
}

/// Flat classification of [`GraphError`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TypeMismatch,
    IncompatibleShapes,
    ShapeMismatch,
    DivisionByZero,
    ArityMismatch,
    MalformedGraph,
    OutputShapeMismatch,
    UnsupportedElementType,
    BufferSizeMismatch,
    UnknownOperator,
    InvalidAttribute,
    InvalidConfig,
}

pub type Result<T> = std::result::Result<T, GraphError>;
