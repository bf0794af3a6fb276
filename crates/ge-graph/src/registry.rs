use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use ge_tensor::{ElementType, KernelContext, Tensor, TensorDesc, TensorError};

use crate::attributes::Attributes;
use crate::error::{GraphError, Result};
use crate::ops;

/// Shape and type inference: input descriptors to output descriptors.
pub type InferFn = fn(&[TensorDesc], &Attributes) -> Result<Vec<TensorDesc>>;

/// Numeric kernel: input tensors to freshly allocated output tensors.
pub type KernelFn =
    fn(&[&Tensor<'_>], &Attributes, &KernelContext) -> Result<Vec<Tensor<'static>>>;

/// Everything the evaluator needs to know about one operator kind.
pub struct OpDescriptor {
    name: String,
    num_inputs: usize,
    infer: InferFn,
    kernels: HashMap<ElementType, KernelFn>,
}

impl OpDescriptor {
    pub fn new(name: &str, num_inputs: usize, infer: InferFn) -> Self {
        OpDescriptor {
            name: name.to_string(),
            num_inputs,
            infer,
            kernels: HashMap::new(),
        }
    }

    /// Register the kernel used when the first input has `element_type`.
    pub fn with_kernel(mut self, element_type: ElementType, kernel: KernelFn) -> Self {
        self.kernels.insert(element_type, kernel);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    /// Element types with a registered kernel, in a stable order.
    pub fn supported_types(&self) -> Vec<ElementType> {
        let mut types: Vec<ElementType> = self.kernels.keys().copied().collect();
        types.sort();
        types
    }

    /// Run shape/type inference after checking the input count.
    pub fn infer(&self, inputs: &[TensorDesc], attrs: &Attributes) -> Result<Vec<TensorDesc>> {
        if inputs.len() != self.num_inputs {
            return Err(GraphError::ArityMismatch {
                what: "operator inputs",
                expected: self.num_inputs,
                got: inputs.len(),
            });
        }
        (self.infer)(inputs, attrs)
    }

    /// Select the kernel specialized for `element_type`.
    pub fn kernel(&self, element_type: ElementType) -> Result<KernelFn> {
        self.kernels.get(&element_type).copied().ok_or_else(|| {
            TensorError::UnsupportedElementType {
                element_type,
                context: self.name.clone(),
            }
            .into()
        })
    }
}

impl fmt::Debug for OpDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpDescriptor")
            .field("name", &self.name)
            .field("num_inputs", &self.num_inputs)
            .field("kernels", &self.supported_types())
            .finish()
    }
}

/// Maps operator-kind identifiers such as `"FloorMod"` to their descriptors.
#[derive(Debug, Default)]
pub struct OperatorRegistry {
    ops: HashMap<String, Arc<OpDescriptor>>,
}

impl OperatorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in operator set.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        ops::register_standard(&mut registry);
        registry
    }

    /// Process-wide shared instance of [`OperatorRegistry::standard`].
    pub fn shared() -> Arc<OperatorRegistry> {
        static SHARED: OnceLock<Arc<OperatorRegistry>> = OnceLock::new();
        SHARED
            .get_or_init(|| Arc::new(OperatorRegistry::standard()))
            .clone()
    }

    /// Add an operator, returning the descriptor it replaced, if any.
    pub fn register(&mut self, descriptor: OpDescriptor) -> Option<Arc<OpDescriptor>> {
        self.ops
            .insert(descriptor.name.clone(), Arc::new(descriptor))
    }

    pub fn get(&self, name: &str) -> Result<Arc<OpDescriptor>> {
        self.ops
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::UnknownOperator(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    /// Registered operator names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.ops.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use ge_tensor::Shape;

    fn identity_infer(inputs: &[TensorDesc], _attrs: &Attributes) -> Result<Vec<TensorDesc>> {
        Ok(inputs.to_vec())
    }

    fn identity_kernel(
        inputs: &[&Tensor<'_>],
        _attrs: &Attributes,
        _ctx: &KernelContext,
    ) -> Result<Vec<Tensor<'static>>> {
        Ok(vec![inputs[0].clone().into_owned()])
    }

    #[test]
    fn test_standard_registry() {
        let registry = OperatorRegistry::standard();
        let names = [
            "Add", "Divide", "FloorMod", "Maximum", "Minimum", "Mod", "Multiply", "Subtract",
        ];
        for name in names {
            assert!(registry.contains(name), "{name} missing");
        }
        let floor_mod = registry.get("FloorMod").unwrap();
        assert_eq!(floor_mod.num_inputs(), 2);
        assert!(floor_mod.kernel(ElementType::F32).is_ok());
        assert!(floor_mod.kernel(ElementType::I32).is_ok());
        assert_eq!(
            floor_mod.kernel(ElementType::Boolean).unwrap_err().kind(),
            ErrorKind::UnsupportedElementType
        );
    }

    #[test]
    fn test_unknown_operator() {
        let registry = OperatorRegistry::new();
        assert_eq!(registry.get("Conv").unwrap_err().kind(), ErrorKind::UnknownOperator);
    }

    #[test]
    fn test_register_custom() {
        let mut registry = OperatorRegistry::new();
        let desc = OpDescriptor::new("Identity", 1, identity_infer)
            .with_kernel(ElementType::F32, identity_kernel);
        assert!(registry.register(desc).is_none());
        let op = registry.get("Identity").unwrap();
        assert_eq!(op.supported_types(), vec![ElementType::F32]);

        let desc = TensorDesc::new(ElementType::F32, Shape::new(vec![2]));
        let err = op.infer(&[desc.clone(), desc], &Attributes::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArityMismatch);
    }
}
