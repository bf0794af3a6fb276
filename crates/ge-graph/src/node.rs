use std::fmt;
use std::sync::Arc;

use ge_tensor::{Tensor, TensorDesc};

use crate::attributes::Attributes;
use crate::registry::OpDescriptor;

/// Index of a node within a graph builder or a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A value-producing edge: output `index` of `node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Output {
    pub node: NodeId,
    pub index: usize,
}

impl Output {
    pub fn new(node: NodeId, index: usize) -> Self {
        Output { node, index }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.index)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Parameter,
    Constant(Tensor<'static>),
    Op {
        op: Arc<OpDescriptor>,
        attrs: Attributes,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub inputs: Vec<Output>,
    pub outputs: Vec<TensorDesc>,
}

impl Node {
    /// Operator kind identifier, `"Parameter"` or `"Constant"` for graph roots.
    pub fn kind_name(&self) -> &str {
        match &self.kind {
            NodeKind::Parameter => "Parameter",
            NodeKind::Constant(_) => "Constant",
            NodeKind::Op { op, .. } => op.name(),
        }
    }
}
