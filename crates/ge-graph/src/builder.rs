use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use ge_tensor::{ElementType, PartialShape, Tensor, TensorDesc};

use crate::attributes::Attributes;
use crate::error::{GraphError, Result};
use crate::function::Function;
use crate::node::{Node, NodeId, NodeKind, Output};
use crate::registry::{OpDescriptor, OperatorRegistry};

/// Incrementally builds a computation graph and freezes it into a [`Function`].
///
/// Operator nodes run shape/type inference as they are added, so most
/// errors surface at the call that introduces them.
pub struct GraphBuilder {
    registry: Arc<OperatorRegistry>,
    nodes: Vec<Node>,
}

impl GraphBuilder {
    /// A builder over the shared standard operator set.
    pub fn new() -> Self {
        Self::with_registry(OperatorRegistry::shared())
    }

    pub fn with_registry(registry: Arc<OperatorRegistry>) -> Self {
        GraphBuilder {
            registry,
            nodes: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<OperatorRegistry> {
        &self.registry
    }

    /// Number of nodes added so far.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a graph input with a declared element type and (partial) shape.
    pub fn parameter(
        &mut self,
        element_type: ElementType,
        shape: impl Into<PartialShape>,
    ) -> Output {
        let desc = TensorDesc::new(element_type, shape);
        self.push("Parameter", NodeKind::Parameter, Vec::new(), vec![desc])
    }

    /// Add a constant node holding `value`.
    pub fn constant(&mut self, value: Tensor<'static>) -> Output {
        let desc = value.desc();
        self.push("Constant", NodeKind::Constant(value), Vec::new(), vec![desc])
    }

    /// Add an operator node and return its first output.
    pub fn op(&mut self, kind: &str, inputs: &[Output], attrs: Attributes) -> Result<Output> {
        let outputs = self.op_outputs(kind, inputs, attrs)?;
        outputs.into_iter().next().ok_or_else(|| {
            GraphError::MalformedGraph(format!("operator {} produces no outputs", kind))
        })
    }

    /// Add an operator node and return all of its outputs.
    pub fn op_outputs(
        &mut self,
        kind: &str,
        inputs: &[Output],
        attrs: Attributes,
    ) -> Result<Vec<Output>> {
        let op = self.registry.get(kind)?;
        let input_descs = inputs
            .iter()
            .map(|&input| self.desc(input).cloned())
            .collect::<Result<Vec<_>>>()?;
        let output_descs = infer_checked(&op, &input_descs, &attrs)?;

        let count = output_descs.len();
        let name = op.name().to_string();
        let first = self.push(
            &name,
            NodeKind::Op { op, attrs },
            inputs.to_vec(),
            output_descs,
        );
        Ok((0..count).map(|i| Output::new(first.node, i)).collect())
    }

    pub fn add(&mut self, a: Output, b: Output) -> Result<Output> {
        self.op("Add", &[a, b], Attributes::new())
    }

    pub fn subtract(&mut self, a: Output, b: Output) -> Result<Output> {
        self.op("Subtract", &[a, b], Attributes::new())
    }

    pub fn multiply(&mut self, a: Output, b: Output) -> Result<Output> {
        self.op("Multiply", &[a, b], Attributes::new())
    }

    pub fn divide(&mut self, a: Output, b: Output) -> Result<Output> {
        self.op("Divide", &[a, b], Attributes::new())
    }

    pub fn floor_mod(&mut self, a: Output, b: Output) -> Result<Output> {
        self.op("FloorMod", &[a, b], Attributes::new())
    }

    pub fn modulo(&mut self, a: Output, b: Output) -> Result<Output> {
        self.op("Mod", &[a, b], Attributes::new())
    }

    pub fn maximum(&mut self, a: Output, b: Output) -> Result<Output> {
        self.op("Maximum", &[a, b], Attributes::new())
    }

    pub fn minimum(&mut self, a: Output, b: Output) -> Result<Output> {
        self.op("Minimum", &[a, b], Attributes::new())
    }

    /// Descriptor of an existing output.
    pub fn desc(&self, output: Output) -> Result<&TensorDesc> {
        self.nodes
            .get(output.node.0)
            .and_then(|n| n.outputs.get(output.index))
            .ok_or_else(|| GraphError::MalformedGraph(format!("no such output {}", output)))
    }

    /// Replace the friendly name of a node.
    pub fn set_name(&mut self, node: NodeId, name: &str) -> Result<()> {
        let n = self.node_mut(node)?;
        n.name = name.to_string();
        Ok(())
    }

    /// Rewire input `index` of `node` to `source`.
    ///
    /// Inference is not re-run here; [`GraphBuilder::build`] re-validates the
    /// whole graph and rejects cycles introduced this way.
    pub fn replace_input(&mut self, node: NodeId, index: usize, source: Output) -> Result<()> {
        self.desc(source)?;
        let n = self.node_mut(node)?;
        let slot = n.inputs.get_mut(index).ok_or_else(|| {
            GraphError::MalformedGraph(format!("node {} has no input {}", node, index))
        })?;
        *slot = source;
        Ok(())
    }

    /// Freeze the graph into a [`Function`].
    ///
    /// The function owns the nodes reachable from `results` plus the declared
    /// `parameters`, stored in topological order (ties broken by creation
    /// order). Fails with `MalformedGraph` on cycles, dangling edges, or
    /// parameters that are used but not declared.
    pub fn build(self, results: &[Output], parameters: &[Output]) -> Result<Function> {
        for (i, &result) in results.iter().enumerate() {
            self.desc(result).map_err(|_| {
                GraphError::MalformedGraph(format!(
                    "result {} refers to missing output {}",
                    i, result
                ))
            })?;
        }
        let declared = self.declared_parameters(parameters)?;

        // Backward reachability from the results.
        let mut included = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeId> = results.iter().map(|r| r.node).collect();
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut included[id.0], true) {
                continue;
            }
            for &input in &self.nodes[id.0].inputs {
                self.desc(input).map_err(|_| {
                    GraphError::MalformedGraph(format!(
                        "node {} ({}) reads missing output {}",
                        id, self.nodes[id.0].name, input
                    ))
                })?;
                stack.push(input.node);
            }
        }

        for (i, node) in self.nodes.iter().enumerate() {
            let is_parameter = matches!(node.kind, NodeKind::Parameter);
            if included[i] && is_parameter && !declared.contains(&NodeId(i)) {
                return Err(GraphError::MalformedGraph(format!(
                    "parameter {} ({}) is used but not declared",
                    NodeId(i),
                    node.name
                )));
            }
        }
        for &param in &declared {
            if !included[param.0] {
                log::warn!(
                    "parameter {} ({}) does not contribute to any result",
                    param,
                    self.nodes[param.0].name
                );
                included[param.0] = true;
            }
        }

        let order = self.topological_order(&included)?;

        // Compact the included nodes into topological order.
        let mut remap = vec![None; self.nodes.len()];
        for (new, &old) in order.iter().enumerate() {
            remap[old.0] = Some(NodeId(new));
        }
        let relink = |o: Output| Output::new(remap[o.node.0].unwrap_or(o.node), o.index);

        let mut slots: Vec<Option<Node>> = self.nodes.into_iter().map(Some).collect();
        let mut nodes = Vec::with_capacity(order.len());
        for &old in &order {
            if let Some(mut node) = slots[old.0].take() {
                for input in &mut node.inputs {
                    *input = relink(*input);
                }
                nodes.push(node);
            }
        }

        // Re-validate every operator now that inputs are final.
        for i in 0..nodes.len() {
            let (done, rest) = nodes.split_at_mut(i);
            let node = &mut rest[0];
            if let NodeKind::Op { op, attrs } = &node.kind {
                let input_descs: Vec<TensorDesc> = node
                    .inputs
                    .iter()
                    .map(|o| done[o.node.0].outputs[o.index].clone())
                    .collect();
                let outputs = infer_checked(op, &input_descs, attrs)
                    .map_err(|e| e.at_node(NodeId(i), &node.name))?;
                node.outputs = outputs;
            }
        }

        let parameters = declared
            .iter()
            .map(|&p| remap[p.0].unwrap_or(p))
            .collect();
        let results = results.iter().map(|&r| relink(r)).collect();

        let function = Function::new(nodes, parameters, results);
        log::debug!(
            "built function: {} nodes, {} parameters, {} results, {} levels",
            function.len(),
            function.parameters().len(),
            function.results().len(),
            function.levels().len()
        );
        Ok(function)
    }

    fn push(
        &mut self,
        kind: &str,
        node_kind: NodeKind,
        inputs: Vec<Output>,
        outputs: Vec<TensorDesc>,
    ) -> Output {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: format!("{}_{}", kind, id.0),
            kind: node_kind,
            inputs,
            outputs,
        });
        Output::new(id, 0)
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(node.0)
            .ok_or_else(|| GraphError::MalformedGraph(format!("no such node {}", node)))
    }

    fn declared_parameters(&self, parameters: &[Output]) -> Result<Vec<NodeId>> {
        let mut seen = HashSet::new();
        let mut declared = Vec::with_capacity(parameters.len());
        for (i, &p) in parameters.iter().enumerate() {
            let node = self.nodes.get(p.node.0).ok_or_else(|| {
                GraphError::MalformedGraph(format!(
                    "parameter {} refers to missing node {}",
                    i, p.node
                ))
            })?;
            if !matches!(node.kind, NodeKind::Parameter) || p.index != 0 {
                return Err(GraphError::MalformedGraph(format!(
                    "parameter {} refers to {} ({}), which is not a parameter",
                    i, p, node.name
                )));
            }
            if !seen.insert(p.node) {
                return Err(GraphError::MalformedGraph(format!(
                    "parameter {} ({}) is declared twice",
                    p.node, node.name
                )));
            }
            declared.push(p.node);
        }
        Ok(declared)
    }

    /// Kahn's algorithm over the included nodes; the smallest ready id goes first.
    fn topological_order(&self, included: &[bool]) -> Result<Vec<NodeId>> {
        let n = self.nodes.len();
        let mut pending = vec![0usize; n];
        let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, node) in self.nodes.iter().enumerate() {
            if !included[i] {
                continue;
            }
            for input in &node.inputs {
                pending[i] += 1;
                consumers[input.node.0].push(i);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| included[i] && pending[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::new();
        while let Some(Reverse(i)) = ready.pop() {
            order.push(NodeId(i));
            for &c in &consumers[i] {
                pending[c] -= 1;
                if pending[c] == 0 {
                    ready.push(Reverse(c));
                }
            }
        }

        let total = included.iter().filter(|&&b| b).count();
        if order.len() != total {
            let stuck: Vec<String> = (0..n)
                .filter(|&i| included[i] && pending[i] > 0)
                .map(|i| self.nodes[i].name.clone())
                .collect();
            return Err(GraphError::MalformedGraph(format!(
                "cycle detected among nodes [{}]",
                stuck.join(", ")
            )));
        }
        Ok(order)
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Inference plus a check that a kernel exists for the resulting types.
fn infer_checked(
    op: &OpDescriptor,
    inputs: &[TensorDesc],
    attrs: &Attributes,
) -> Result<Vec<TensorDesc>> {
    let outputs = op.infer(inputs, attrs)?;
    if let Some(key) = inputs.first().or(outputs.first()) {
        op.kernel(key.element_type)?;
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use ge_tensor::{Dimension, Shape};

    #[test]
    fn test_build_orders_topologically() {
        let mut g = GraphBuilder::new();
        let a = g.parameter(ElementType::F32, [4]);
        let b = g.parameter(ElementType::F32, [4]);
        let sum = g.add(a, b).unwrap();
        let m = g.floor_mod(sum, b).unwrap();
        let f = g.build(&[m], &[a, b]).unwrap();

        let names: Vec<&str> = f.node_names().collect();
        assert_eq!(names, vec!["Parameter_0", "Parameter_1", "Add_2", "FloorMod_3"]);
        assert_eq!(f.result_descs()[0], &TensorDesc::new(ElementType::F32, Shape::new(vec![4])));
    }

    #[test]
    fn test_ties_follow_creation_order() {
        let mut g = GraphBuilder::new();
        let x = g.parameter(ElementType::I32, [2]);
        let late = g.parameter(ElementType::I32, [2]);
        let left = g.add(x, x).unwrap();
        let right = g.multiply(late, late).unwrap();
        let out = g.maximum(right, left).unwrap();
        let f = g.build(&[out], &[late, x]).unwrap();

        let names: Vec<&str> = f.node_names().collect();
        assert_eq!(
            names,
            vec!["Parameter_0", "Parameter_1", "Add_2", "Multiply_3", "Maximum_4"]
        );
        // Declared parameter order is kept regardless of node order.
        assert_eq!(f.parameter_names().collect::<Vec<_>>(), vec!["Parameter_1", "Parameter_0"]);
        assert_eq!(f.levels().len(), 3);
    }

    #[test]
    fn test_incompatible_shapes_at_construction() {
        let mut g = GraphBuilder::new();
        let a = g.parameter(ElementType::F32, [4]);
        let b = g.parameter(ElementType::F32, [3]);
        let err = g.floor_mod(a, b).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleShapes);
    }

    #[test]
    fn test_type_mismatch_at_construction() {
        let mut g = GraphBuilder::new();
        let a = g.parameter(ElementType::F32, [4]);
        let b = g.parameter(ElementType::I32, [4]);
        assert_eq!(g.floor_mod(a, b).unwrap_err().kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_dynamic_parameter_shape() {
        let mut g = GraphBuilder::new();
        let a = g.parameter(
            ElementType::F32,
            PartialShape::new(vec![Dimension::Dynamic, Dimension::Static(3)]),
        );
        let b = g.parameter(ElementType::F32, [3]);
        let c = g.floor_mod(a, b).unwrap();
        assert_eq!(g.desc(c).unwrap().shape.dims()[0], Dimension::Dynamic);
    }

    #[test]
    fn test_undeclared_parameter() {
        let mut g = GraphBuilder::new();
        let a = g.parameter(ElementType::F32, [4]);
        let b = g.parameter(ElementType::F32, [4]);
        let c = g.add(a, b).unwrap();
        let err = g.build(&[c], &[a]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedGraph);
    }

    #[test]
    fn test_unused_parameter_is_kept() {
        let mut g = GraphBuilder::new();
        let a = g.parameter(ElementType::F32, [4]);
        let unused = g.parameter(ElementType::I8, [1]);
        let c = g.add(a, a).unwrap();
        let f = g.build(&[c], &[a, unused]).unwrap();
        assert_eq!(f.parameters().len(), 2);
        assert_eq!(f.parameter_descs()[1].element_type, ElementType::I8);
    }

    #[test]
    fn test_duplicate_and_non_parameter_declarations() {
        let mut g = GraphBuilder::new();
        let a = g.parameter(ElementType::F32, [4]);
        let c = g.add(a, a).unwrap();
        assert_eq!(g.build(&[c], &[a, a]).unwrap_err().kind(), ErrorKind::MalformedGraph);

        let mut g = GraphBuilder::new();
        let a = g.parameter(ElementType::F32, [4]);
        let c = g.add(a, a).unwrap();
        assert_eq!(g.build(&[c], &[a, c]).unwrap_err().kind(), ErrorKind::MalformedGraph);
    }

    #[test]
    fn test_cycle_detected() {
        let mut g = GraphBuilder::new();
        let a = g.parameter(ElementType::F32, [4]);
        let x = g.add(a, a).unwrap();
        let y = g.multiply(x, a).unwrap();
        g.replace_input(x.node, 1, y).unwrap();
        let err = g.build(&[y], &[a]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedGraph);
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_missing_result() {
        let mut g = GraphBuilder::new();
        let a = g.parameter(ElementType::F32, [4]);
        let bogus = Output::new(NodeId(17), 0);
        assert_eq!(g.build(&[bogus], &[a]).unwrap_err().kind(), ErrorKind::MalformedGraph);
    }

    #[test]
    fn test_replace_input_revalidates() {
        let mut g = GraphBuilder::new();
        let a = g.parameter(ElementType::F32, [4]);
        let b = g.parameter(ElementType::F32, [3]);
        let c = g.add(a, a).unwrap();
        g.replace_input(c.node, 1, b).unwrap();
        let err = g.build(&[c], &[a, b]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleShapes);
        assert_eq!(err.node(), Some(NodeId(2)));
    }

    #[test]
    fn test_unknown_operator() {
        let mut g = GraphBuilder::new();
        let a = g.parameter(ElementType::F32, [4]);
        let err = g.op("Softmax", &[a], Attributes::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownOperator);
    }

    #[test]
    fn test_constant_and_naming() {
        let mut g = GraphBuilder::new();
        let a = g.parameter(ElementType::I32, [2]);
        let k = g.constant(Tensor::scalar(3i32));
        let m = g.floor_mod(a, k).unwrap();
        g.set_name(m.node, "remainder").unwrap();
        let f = g.build(&[m], &[a]).unwrap();
        assert_eq!(f.node_names().last(), Some("remainder"));
        assert_eq!(f.result_descs()[0].shape, PartialShape::from([2]));
    }
}
