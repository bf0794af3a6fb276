//! `ge-graph` - Computation graphs over `ge-tensor` tensors.
//!
//! Build a graph with [`GraphBuilder`], freeze it into a validated
//! [`Function`] and run it with an [`Evaluator`]:
//!
//! ```
//! use ge_graph::{GraphBuilder, ResultSlot};
//! use ge_tensor::{ElementType, Shape, Tensor};
//!
//! let mut g = GraphBuilder::new();
//! let a = g.parameter(ElementType::I32, [3]);
//! let b = g.parameter(ElementType::I32, [3]);
//! let c = g.floor_mod(a, b).unwrap();
//! let f = g.build(&[c], &[a, b]).unwrap();
//!
//! let x = Tensor::from_vec(vec![-7i32, 7, 8], Shape::new(vec![3])).unwrap();
//! let y = Tensor::from_vec(vec![3i32, -3, 5], Shape::new(vec![3])).unwrap();
//! let mut out = [ResultSlot::new()];
//! f.evaluate(&mut out, &[x, y]).unwrap();
//! assert_eq!(out[0].tensor().unwrap().as_slice::<i32>().unwrap(), &[2, -2, 3]);
//! ```

pub mod attributes;
pub mod builder;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod function;
pub mod node;
mod ops;
pub mod registry;

pub use attributes::{AttributeValue, Attributes};
pub use builder::GraphBuilder;
pub use config::EvaluatorConfig;
pub use error::{ErrorKind, GraphError, Result};
pub use evaluator::{Evaluator, ResultSlot};
pub use function::Function;
pub use node::{NodeId, Output};
pub use registry::{InferFn, KernelFn, OpDescriptor, OperatorRegistry};
