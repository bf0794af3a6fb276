use ge_tensor::{Tensor, TensorDesc};

use crate::error::Result;
use crate::evaluator::{Evaluator, ResultSlot};
use crate::node::{Node, NodeId, NodeKind, Output};

/// An immutable, validated computation graph.
///
/// Nodes are stored in topological order, so a node's id is also its position
/// in the evaluation order and every input edge points to a smaller id.
#[derive(Debug, Clone)]
pub struct Function {
    nodes: Vec<Node>,
    parameters: Vec<NodeId>,
    results: Vec<Output>,
    levels: Vec<Vec<NodeId>>,
}

impl Function {
    pub(crate) fn new(nodes: Vec<Node>, parameters: Vec<NodeId>, results: Vec<Output>) -> Self {
        // level(n) = 1 + max level of its producers; roots sit at level 0.
        let mut depth = vec![0usize; nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            depth[i] = node
                .inputs
                .iter()
                .map(|o| depth[o.node.0] + 1)
                .max()
                .unwrap_or(0);
        }
        let mut levels: Vec<Vec<NodeId>> = Vec::new();
        for (i, &d) in depth.iter().enumerate() {
            if levels.len() <= d {
                levels.resize_with(d + 1, Vec::new);
            }
            levels[d].push(NodeId(i));
        }

        Function {
            nodes,
            parameters,
            results,
            levels,
        }
    }

    /// Number of nodes, parameters and constants included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Declared parameters, in binding order.
    pub fn parameters(&self) -> &[NodeId] {
        &self.parameters
    }

    pub fn results(&self) -> &[Output] {
        &self.results
    }

    pub fn parameter_descs(&self) -> Vec<&TensorDesc> {
        self.parameters
            .iter()
            .map(|p| &self.nodes[p.0].outputs[0])
            .collect()
    }

    pub fn result_descs(&self) -> Vec<&TensorDesc> {
        self.results.iter().map(|&r| self.output_desc(r)).collect()
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| self.nodes[p.0].name.as_str())
    }

    /// Friendly names in topological order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    pub fn node_name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.0).map(|n| n.name.as_str())
    }

    /// Operator kind of a node: `"Parameter"`, `"Constant"` or the operator name.
    pub fn node_kind(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.0).map(Node::kind_name)
    }

    pub fn node_inputs(&self, node: NodeId) -> Option<&[Output]> {
        self.nodes.get(node.0).map(|n| n.inputs.as_slice())
    }

    /// The constant value held by `node`, if it is a constant.
    pub fn constant(&self, node: NodeId) -> Option<&Tensor<'static>> {
        match &self.nodes.get(node.0)?.kind {
            NodeKind::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// Dependency levels: every node's inputs live in strictly earlier levels.
    pub fn levels(&self) -> &[Vec<NodeId>] {
        &self.levels
    }

    /// Evaluate with a default (sequential, IEEE division) evaluator.
    pub fn evaluate(&self, outputs: &mut [ResultSlot], inputs: &[Tensor<'_>]) -> Result<()> {
        Evaluator::default().evaluate(self, outputs, inputs)
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn output_desc(&self, output: Output) -> &TensorDesc {
        &self.nodes[output.node.0].outputs[output.index]
    }
}
