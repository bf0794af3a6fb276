//! Graph evaluation.
//!
//! A run binds one tensor per declared parameter, walks the function's nodes
//! in their cached topological order and commits the result tensors into the
//! caller's [`ResultSlot`]s. Intermediates live in a per-run arena indexed by
//! node id and are dropped when the run ends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ge_tensor::{KernelContext, Tensor, TensorDesc, TensorError};
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::config::{EvaluatorConfig, KEY_THREADS};
use crate::error::{ErrorKind, GraphError, Result};
use crate::function::Function;
use crate::node::{NodeId, NodeKind};

/// Where one result of a run ends up.
#[derive(Debug, Clone, Default)]
pub struct ResultSlot {
    tensor: Option<Tensor<'static>>,
    fixed: bool,
}

impl ResultSlot {
    /// An evaluator-owned slot, replaced by the result on success.
    pub fn new() -> Self {
        Self::default()
    }

    /// A caller-fixed slot: the result must have this tensor's type and shape
    /// and is copied into it in place.
    pub fn fixed(tensor: Tensor<'static>) -> Self {
        ResultSlot {
            tensor: Some(tensor),
            fixed: true,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub fn tensor(&self) -> Option<&Tensor<'static>> {
        self.tensor.as_ref()
    }

    pub fn into_tensor(self) -> Option<Tensor<'static>> {
        self.tensor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    NotStarted,
    Validating,
    Traversing,
    Success,
    Failed {
        node: Option<NodeId>,
        kind: ErrorKind,
    },
}

struct Run {
    state: RunState,
}

impl Run {
    fn new() -> Self {
        Run {
            state: RunState::NotStarted,
        }
    }

    fn transition(&mut self, next: RunState) {
        log::debug!("evaluation: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, err: GraphError) -> GraphError {
        self.transition(RunState::Failed {
            node: err.node(),
            kind: err.kind(),
        });
        err
    }
}

/// Per-node value in the run arena.
enum Value<'r, 'i> {
    /// A caller binding or a constant, never copied.
    Bound(&'r Tensor<'i>),
    Computed(Vec<Tensor<'static>>),
}

impl<'r, 'i> Value<'r, 'i> {
    fn output(&self, index: usize) -> Option<&Tensor<'i>> {
        match self {
            Value::Bound(t) if index == 0 => Some(*t),
            Value::Bound(_) => None,
            Value::Computed(outputs) => outputs.get(index),
        }
    }
}

type Arena<'r, 'i> = Vec<Option<Value<'r, 'i>>>;

/// Evaluates [`Function`]s under an [`EvaluatorConfig`].
///
/// An evaluator holds no per-run state and can be shared between threads.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    config: EvaluatorConfig,
    pool: Option<Arc<ThreadPool>>,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Result<Self> {
        let pool = match config.num_threads {
            Some(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("ge-eval-{}", i))
                    .build()
                    .map_err(|e| GraphError::InvalidConfig {
                        key: KEY_THREADS.to_string(),
                        reason: e.to_string(),
                    })?;
                Some(Arc::new(pool))
            }
            None => None,
        };
        Ok(Evaluator { config, pool })
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Run `function` on `inputs`, writing its results into `outputs`.
    ///
    /// `inputs` holds one tensor per declared parameter and `outputs` one slot
    /// per result, both in declaration order. On error no slot is modified.
    pub fn evaluate(
        &self,
        function: &Function,
        outputs: &mut [ResultSlot],
        inputs: &[Tensor<'_>],
    ) -> Result<()> {
        let mut run = Run::new();

        run.transition(RunState::Validating);
        let mut arena = match self.bind(function, outputs.len(), inputs) {
            Ok(arena) => arena,
            Err(e) => return Err(run.fail(e)),
        };

        run.transition(RunState::Traversing);
        let ctx = KernelContext {
            division: self.config.division,
        };
        let traversed = if self.config.parallel {
            match &self.pool {
                Some(pool) => pool.install(|| traverse_parallel(function, &mut arena, &ctx)),
                None => traverse_parallel(function, &mut arena, &ctx),
            }
        } else {
            traverse(function, &mut arena, &ctx, 0, function.len())
        };
        if let Err(e) = traversed.and_then(|_| commit(function, &arena, outputs)) {
            return Err(run.fail(e));
        }

        run.transition(RunState::Success);
        Ok(())
    }

    /// Check the bindings and seed the arena with parameters and constants.
    fn bind<'r, 'i>(
        &self,
        function: &'r Function,
        num_outputs: usize,
        inputs: &'r [Tensor<'i>],
    ) -> Result<Arena<'r, 'i>> {
        if inputs.len() != function.parameters().len() {
            return Err(GraphError::ArityMismatch {
                what: "input bindings",
                expected: function.parameters().len(),
                got: inputs.len(),
            });
        }
        if num_outputs != function.results().len() {
            return Err(GraphError::ArityMismatch {
                what: "output slots",
                expected: function.results().len(),
                got: num_outputs,
            });
        }

        let nodes = function.nodes();
        let mut arena: Arena<'r, 'i> = Vec::with_capacity(nodes.len());
        for node in nodes {
            arena.push(match &node.kind {
                NodeKind::Constant(value) => Some(Value::Bound(value)),
                _ => None,
            });
        }

        for (&param, tensor) in function.parameters().iter().zip(inputs) {
            let node = &nodes[param.0];
            check_desc(&node.outputs[0], tensor).map_err(|e| e.at_node(param, &node.name))?;
            arena[param.0] = Some(Value::Bound(tensor));
        }
        Ok(arena)
    }
}

fn check_desc(desc: &TensorDesc, tensor: &Tensor<'_>) -> Result<()> {
    if tensor.element_type() != desc.element_type {
        return Err(TensorError::TypeMismatch {
            expected: desc.element_type,
            got: tensor.element_type(),
        }
        .into());
    }
    if !desc.shape.is_compatible(tensor.shape()) {
        return Err(TensorError::ShapeMismatch {
            expected: desc.shape.clone(),
            got: tensor.shape().into(),
        }
        .into());
    }
    Ok(())
}

/// Evaluate one operator node from already computed inputs.
fn run_node<'i>(
    function: &Function,
    id: NodeId,
    arena: &[Option<Value<'_, 'i>>],
    ctx: &KernelContext,
) -> Result<Vec<Tensor<'static>>> {
    let node = &function.nodes()[id.0];
    let NodeKind::Op { op, attrs } = &node.kind else {
        return Err(GraphError::MalformedGraph(format!("{} is not an operator", id)));
    };

    let inputs = node
        .inputs
        .iter()
        .map(|o| {
            arena[o.node.0]
                .as_ref()
                .and_then(|v| v.output(o.index))
                .ok_or_else(|| GraphError::MalformedGraph(format!("input {} not computed", o)))
        })
        .collect::<Result<Vec<&Tensor<'i>>>>()?;
    let descs: Vec<TensorDesc> = inputs.iter().map(|t| t.desc()).collect();
    let expected = op.infer(&descs, attrs)?;

    let key = descs
        .first()
        .or(expected.first())
        .map(|d| d.element_type)
        .ok_or_else(|| {
            GraphError::MalformedGraph(format!("{} has no typed inputs or outputs", id))
        })?;
    let kernel = op.kernel(key)?;

    log::trace!("evaluating {} ({}) {} on {}", id, node.name, attrs, key);
    let outputs = kernel(&inputs, attrs, ctx)?;
    if outputs.len() != expected.len() {
        return Err(GraphError::ArityMismatch {
            what: "kernel outputs",
            expected: expected.len(),
            got: outputs.len(),
        });
    }
    for (desc, out) in expected.iter().zip(&outputs) {
        check_desc(desc, out)?;
    }
    Ok(outputs)
}

/// Sequentially evaluate the not yet computed nodes in `start..end`.
fn traverse(
    function: &Function,
    arena: &mut Arena<'_, '_>,
    ctx: &KernelContext,
    start: usize,
    end: usize,
) -> Result<()> {
    for i in start..end {
        if arena[i].is_some() {
            continue;
        }
        let id = NodeId(i);
        let outputs = run_node(function, id, &arena[..], ctx)
            .map_err(|e| e.at_node(id, &function.nodes()[i].name))?;
        arena[i] = Some(Value::Computed(outputs));
    }
    Ok(())
}

/// Evaluate level by level, nodes within a level concurrently.
///
/// The reported error is the one sequential evaluation would report: after a
/// failure at topological position `t`, the uncomputed nodes before `t` are
/// evaluated in order and the first of their failures wins.
fn traverse_parallel(
    function: &Function,
    arena: &mut Arena<'_, '_>,
    ctx: &KernelContext,
) -> Result<()> {
    let first_failure = AtomicUsize::new(usize::MAX);

    for level in function.levels() {
        let pending: Vec<NodeId> = level
            .iter()
            .copied()
            .filter(|id| arena[id.0].is_none())
            .collect();
        if pending.is_empty() {
            continue;
        }

        let shared: &Arena<'_, '_> = arena;
        let computed: Vec<(NodeId, Option<Result<Vec<Tensor<'static>>>>)> = pending
            .par_iter()
            .map(|&id| {
                if id.0 > first_failure.load(Ordering::Acquire) {
                    return (id, None);
                }
                let result = run_node(function, id, shared, ctx);
                if result.is_err() {
                    first_failure.fetch_min(id.0, Ordering::AcqRel);
                }
                (id, Some(result))
            })
            .collect();

        let mut failure: Option<(NodeId, GraphError)> = None;
        for (id, result) in computed {
            match result {
                Some(Ok(outputs)) => arena[id.0] = Some(Value::Computed(outputs)),
                Some(Err(e)) if failure.as_ref().map_or(true, |(f, _)| id < *f) => {
                    failure = Some((id, e));
                }
                _ => {}
            }
        }

        if let Some((id, err)) = failure {
            traverse(function, arena, ctx, 0, id.0)?;
            return Err(err.at_node(id, &function.nodes()[id.0].name));
        }
    }
    Ok(())
}

/// Copy results into the slots once every fixed slot is known to fit.
fn commit(function: &Function, arena: &Arena<'_, '_>, outputs: &mut [ResultSlot]) -> Result<()> {
    let results = function
        .results()
        .iter()
        .map(|&r| {
            arena[r.node.0]
                .as_ref()
                .and_then(|v| v.output(r.index))
                .ok_or_else(|| GraphError::MalformedGraph(format!("result {} not computed", r)))
        })
        .collect::<Result<Vec<_>>>()?;

    for (index, (slot, result)) in outputs.iter().zip(&results).enumerate() {
        let Some(target) = slot.tensor.as_ref().filter(|_| slot.fixed) else {
            continue;
        };
        if target.element_type() != result.element_type() {
            return Err(TensorError::TypeMismatch {
                expected: result.element_type(),
                got: target.element_type(),
            }
            .into());
        }
        if target.shape() != result.shape() {
            return Err(GraphError::OutputShapeMismatch {
                index,
                expected: result.shape().clone(),
                got: target.shape().clone(),
            });
        }
    }

    for (slot, result) in outputs.iter_mut().zip(results) {
        if !slot.fixed {
            slot.tensor = Some(result.clone().into_owned());
        } else if let Some(target) = slot.tensor.as_mut() {
            target.copy_from(result)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::builder::GraphBuilder;
    use approx::assert_abs_diff_eq;
    use ge_tensor::{Dimension, DivisionPolicy, ElementType, PartialShape, Shape};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn floor_mod_function(element_type: ElementType, len: usize) -> Function {
        let mut g = GraphBuilder::new();
        let a = g.parameter(element_type, [len]);
        let b = g.parameter(element_type, [len]);
        let c = g.floor_mod(a, b).unwrap();
        g.build(&[c], &[a, b]).unwrap()
    }

    fn run(
        function: &Function,
        evaluator: &Evaluator,
        inputs: &[Tensor<'_>],
    ) -> Result<Vec<Tensor<'static>>> {
        let mut slots = vec![ResultSlot::new(); function.results().len()];
        evaluator.evaluate(function, &mut slots, inputs)?;
        Ok(slots.into_iter().filter_map(ResultSlot::into_tensor).collect())
    }

    #[test]
    fn test_floor_mod_f32() {
        let f = floor_mod_function(ElementType::F32, 4);
        let a = Tensor::from_vec(vec![5.1f32, -5.1, 5.1, -5.1], Shape::new(vec![4])).unwrap();
        let b = Tensor::from_vec(vec![3.0f32, 3.0, -3.0, -3.0], Shape::new(vec![4])).unwrap();

        let mut slots = [ResultSlot::new()];
        f.evaluate(&mut slots, &[a, b]).unwrap();
        let out = slots[0].tensor().unwrap();
        assert_eq!(out.shape(), &Shape::new(vec![4]));
        let expected = [2.1f32, 0.9, -0.9, -2.1];
        for (got, want) in out.as_slice::<f32>().unwrap().iter().zip(expected) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_floor_mod_near_multiple_of_divisor() {
        let f = floor_mod_function(ElementType::F64, 2);
        let a = Tensor::from_vec(vec![59.4f64, 203.39999999999998], Shape::new(vec![2])).unwrap();
        let b = Tensor::from_vec(vec![0.1f64, 0.3], Shape::new(vec![2])).unwrap();
        let out = run(&f, &Evaluator::default(), &[a.clone(), b.clone()]).unwrap();

        let (x, y) = (a.as_slice::<f64>().unwrap(), b.as_slice::<f64>().unwrap());
        for (i, &r) in out[0].as_slice::<f64>().unwrap().iter().enumerate() {
            assert_abs_diff_eq!(y[i] * (x[i] / y[i]).floor() + r, x[i], epsilon = 1e-6);
            assert_abs_diff_eq!(r, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_floor_mod_i32() {
        let f = floor_mod_function(ElementType::I32, 6);
        let a = Tensor::from_vec(vec![-4i32, 7, 5, 4, -7, 8], Shape::new(vec![6])).unwrap();
        let b = Tensor::from_vec(vec![2i32, -3, 8, -2, 3, 5], Shape::new(vec![6])).unwrap();
        let out = run(&f, &Evaluator::default(), &[a, b]).unwrap();
        assert_eq!(out[0].as_slice::<i32>().unwrap(), &[0, -2, 5, 0, 2, 3]);
    }

    #[test]
    fn test_integer_division_by_zero() {
        let f = floor_mod_function(ElementType::I32, 3);
        let a = Tensor::from_vec(vec![1i32, 2, 3], Shape::new(vec![3])).unwrap();
        let b = Tensor::from_vec(vec![1i32, 0, 1], Shape::new(vec![3])).unwrap();

        let mut slots = [ResultSlot::new()];
        let err = f.evaluate(&mut slots, &[a, b]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DivisionByZero);
        assert_eq!(err.node(), Some(NodeId(2)));
        assert!(err.to_string().contains("FloorMod_2"));
        assert!(slots[0].tensor().is_none());
    }

    #[test]
    fn test_float_division_policy() {
        let f = floor_mod_function(ElementType::F32, 2);
        let a = Tensor::from_vec(vec![1.0f32, 2.0], Shape::new(vec![2])).unwrap();
        let b = Tensor::from_vec(vec![0.0f32, 1.0], Shape::new(vec![2])).unwrap();

        let ieee = run(&f, &Evaluator::default(), &[a.clone(), b.clone()]).unwrap();
        assert!(ieee[0].as_slice::<f32>().unwrap()[0].is_nan());

        let config = EvaluatorConfig::default().with_division(DivisionPolicy::Strict);
        let strict = Evaluator::new(config).unwrap();
        let err = run(&f, &strict, &[a, b]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DivisionByZero);
    }

    #[test]
    fn test_arity_mismatch() {
        let f = floor_mod_function(ElementType::F32, 2);
        let a = Tensor::create(ElementType::F32, Shape::new(vec![2]));

        let mut slots = [ResultSlot::new()];
        let err = f.evaluate(&mut slots, &[a.clone()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArityMismatch);

        let mut slots = [ResultSlot::new(), ResultSlot::new()];
        let err = f.evaluate(&mut slots, &[a.clone(), a]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArityMismatch);
    }

    #[test]
    fn test_binding_mismatch() {
        let f = floor_mod_function(ElementType::F32, 2);
        let good = Tensor::create(ElementType::F32, Shape::new(vec![2]));
        let wrong_type = Tensor::create(ElementType::F64, Shape::new(vec![2]));
        let wrong_shape = Tensor::create(ElementType::F32, Shape::new(vec![3]));

        let mut slots = [ResultSlot::new()];
        let err = f.evaluate(&mut slots, &[good.clone(), wrong_type]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert_eq!(err.node(), Some(NodeId(1)));

        let err = f.evaluate(&mut slots, &[wrong_shape, good]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
        assert_eq!(err.node(), Some(NodeId(0)));
    }

    #[test]
    fn test_dynamic_parameter() {
        let mut g = GraphBuilder::new();
        let a = g.parameter(
            ElementType::I64,
            PartialShape::new(vec![Dimension::Dynamic, Dimension::Static(3)]),
        );
        let b = g.parameter(ElementType::I64, [3]);
        let c = g.floor_mod(a, b).unwrap();
        let f = g.build(&[c], &[a, b]).unwrap();

        let x = Tensor::from_vec(vec![-1i64, 5, 9, 10, -11, 12], Shape::new(vec![2, 3])).unwrap();
        let y = Tensor::from_vec(vec![4i64, -3, 5], Shape::new(vec![3])).unwrap();
        let out = run(&f, &Evaluator::default(), &[x, y]).unwrap();
        assert_eq!(out[0].shape(), &Shape::new(vec![2, 3]));
        assert_eq!(out[0].as_slice::<i64>().unwrap(), &[3, -1, 4, 2, -2, 2]);

        let bad = Tensor::create(ElementType::I64, Shape::new(vec![2, 4]));
        let y = Tensor::create(ElementType::I64, Shape::new(vec![3]));
        let err = run(&f, &Evaluator::default(), &[bad, y]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    }

    #[test]
    fn test_views_as_bindings() {
        let f = floor_mod_function(ElementType::I32, 3);
        let a_data = [10i32, -10, 7];
        let b_data = [3i32, 3, 7];
        let a = Tensor::view(&a_data, Shape::new(vec![3])).unwrap();
        let b = Tensor::view(&b_data, Shape::new(vec![3])).unwrap();
        assert!(a.is_view());
        let out = run(&f, &Evaluator::default(), &[a, b]).unwrap();
        assert_eq!(out[0].as_slice::<i32>().unwrap(), &[1, 2, 0]);
    }

    #[test]
    fn test_fixed_slot_written_in_place() {
        let f = floor_mod_function(ElementType::I32, 2);
        let a = Tensor::from_vec(vec![7i32, -7], Shape::new(vec![2])).unwrap();
        let b = Tensor::from_vec(vec![4i32, 4], Shape::new(vec![2])).unwrap();

        let mut slots = [ResultSlot::fixed(Tensor::create(ElementType::I32, Shape::new(vec![2])))];
        f.evaluate(&mut slots, &[a, b]).unwrap();
        assert!(slots[0].is_fixed());
        assert_eq!(slots[0].tensor().unwrap().as_slice::<i32>().unwrap(), &[3, 1]);
    }

    #[test]
    fn test_fixed_slot_mismatch_writes_nothing() {
        let mut g = GraphBuilder::new();
        let a = g.parameter(ElementType::I32, [2]);
        let b = g.parameter(ElementType::I32, [2]);
        let s = g.add(a, b).unwrap();
        let m = g.floor_mod(a, b).unwrap();
        let f = g.build(&[s, m], &[a, b]).unwrap();
        let a = Tensor::from_vec(vec![7i32, -7], Shape::new(vec![2])).unwrap();
        let b = Tensor::from_vec(vec![4i32, 4], Shape::new(vec![2])).unwrap();

        let mut slots = [
            ResultSlot::new(),
            ResultSlot::fixed(Tensor::create(ElementType::I32, Shape::new(vec![3]))),
        ];
        let err = f.evaluate(&mut slots, &[a.clone(), b.clone()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutputShapeMismatch);
        assert!(slots[0].tensor().is_none());

        let mut slots = [
            ResultSlot::new(),
            ResultSlot::fixed(Tensor::create(ElementType::F32, Shape::new(vec![2]))),
        ];
        let err = f.evaluate(&mut slots, &[a, b]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert!(slots[0].tensor().is_none());
    }

    #[test]
    fn test_constants_and_parameter_results() {
        let mut g = GraphBuilder::new();
        let a = g.parameter(ElementType::F64, [3]);
        let k = g.constant(Tensor::scalar(2.5f64));
        let m = g.floor_mod(a, k).unwrap();
        let f = g.build(&[m, a], &[a]).unwrap();

        let data = [6.0f64, -1.0, 2.5];
        let x = Tensor::view(&data, Shape::new(vec![3])).unwrap();
        let out = run(&f, &Evaluator::default(), &[x]).unwrap();
        let got = out[0].as_slice::<f64>().unwrap();
        for (g, w) in got.iter().zip([1.0, 1.5, 0.0]) {
            assert_abs_diff_eq!(*g, w, epsilon = 1e-12);
        }
        assert!(!out[1].is_view());
        assert_eq!(out[1].as_slice::<f64>().unwrap(), &data);
    }

    #[test]
    fn test_divide_attribute_through_graph() {
        let mut g = GraphBuilder::new();
        let a = g.parameter(ElementType::I32, [2]);
        let b = g.parameter(ElementType::I32, [2]);
        let q = g
            .op("Divide", &[a, b], Attributes::new().with("pythondiv", false))
            .unwrap();
        let f = g.build(&[q], &[a, b]).unwrap();
        let x = Tensor::from_vec(vec![-7i32, 7], Shape::new(vec![2])).unwrap();
        let y = Tensor::from_vec(vec![2i32, -2], Shape::new(vec![2])).unwrap();
        let out = run(&f, &Evaluator::default(), &[x, y]).unwrap();
        assert_eq!(out[0].as_slice::<i32>().unwrap(), &[-3, -3]);
    }

    fn diamond_function() -> Function {
        let mut g = GraphBuilder::new();
        let a = g.parameter(ElementType::F32, [16, 8]);
        let b = g.parameter(ElementType::F32, [8]);
        let s = g.add(a, b).unwrap();
        let d = g.subtract(a, b).unwrap();
        let p = g.multiply(s, d).unwrap();
        let q = g.floor_mod(p, b).unwrap();
        let r = g.maximum(q, d).unwrap();
        let t = g.minimum(r, s).unwrap();
        g.build(&[t, q], &[a, b]).unwrap()
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let f = diamond_function();
        let mut rng = StdRng::seed_from_u64(17);
        let a: Vec<f32> = (0..128).map(|_| rng.gen_range(-50.0f32..50.0)).collect();
        let b: Vec<f32> = (0..8)
            .map(|_| {
                let magnitude = rng.gen_range(0.5f32..9.0);
                if rng.gen_bool(0.5) {
                    magnitude
                } else {
                    -magnitude
                }
            })
            .collect();
        let inputs = [
            Tensor::from_vec(a, Shape::new(vec![16, 8])).unwrap(),
            Tensor::from_vec(b, Shape::new(vec![8])).unwrap(),
        ];

        let sequential = run(&f, &Evaluator::default(), &inputs).unwrap();
        let config = EvaluatorConfig::default()
            .with_parallel(true)
            .with_num_threads(3);
        let parallel = Evaluator::new(config).unwrap();
        for _ in 0..4 {
            let again = run(&f, &parallel, &inputs).unwrap();
            assert_eq!(again.len(), sequential.len());
            for (x, y) in again.iter().zip(&sequential) {
                assert_eq!(x.to_le_bytes(), y.to_le_bytes());
            }
        }
    }

    #[test]
    fn test_parallel_reports_first_failure_in_order() {
        let mut g = GraphBuilder::new();
        let a = g.parameter(ElementType::I32, [2]);
        let z = g.parameter(ElementType::I32, [2]);
        let s = g.add(a, a).unwrap();
        let t = g.add(s, a).unwrap();
        let late_level = g.floor_mod(t, z).unwrap();
        let early_level = g.modulo(a, z).unwrap();
        let f = g.build(&[late_level, early_level], &[a, z]).unwrap();
        assert_eq!(f.node_name(NodeId(4)), Some("FloorMod_4"));
        assert_eq!(f.node_name(NodeId(5)), Some("Mod_5"));

        let inputs = [
            Tensor::from_vec(vec![1i32, 2], Shape::new(vec![2])).unwrap(),
            Tensor::create(ElementType::I32, Shape::new(vec![2])),
        ];
        let sequential = run(&f, &Evaluator::default(), &inputs).unwrap_err();
        let parallel = Evaluator::new(EvaluatorConfig::default().with_parallel(true)).unwrap();
        let concurrent = run(&f, &parallel, &inputs).unwrap_err();
        assert_eq!(sequential.node(), Some(NodeId(4)));
        assert_eq!(concurrent, sequential);
    }

    #[test]
    fn test_concurrent_runs_share_function() {
        let f = Arc::new(floor_mod_function(ElementType::I32, 4));
        let evaluator = Evaluator::default();
        std::thread::scope(|scope| {
            for k in 1..=4i32 {
                let f = Arc::clone(&f);
                let evaluator = &evaluator;
                scope.spawn(move || {
                    let a = Tensor::from_vec(vec![k, -k, 10 * k, 0], Shape::new(vec![4])).unwrap();
                    let b = Tensor::from_vec(vec![3i32; 4], Shape::new(vec![4])).unwrap();
                    let out = run(&f, evaluator, &[a, b]).unwrap();
                    let expected: Vec<i32> =
                        [k, -k, 10 * k, 0].iter().map(|v| v.rem_euclid(3)).collect();
                    assert_eq!(out[0].to_vec::<i32>().unwrap(), expected);
                });
            }
        });
    }
}
