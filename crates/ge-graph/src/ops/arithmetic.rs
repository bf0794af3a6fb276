//! Elementwise binary arithmetic: Add, Subtract, Multiply, Divide, FloorMod,
//! Mod, Maximum and Minimum.
//!
//! All of them take two inputs of the same numeric element type and produce
//! one output of that type whose shape is the broadcast of the input shapes
//! (controlled by the `auto_broadcast` attribute).

use ge_tensor::cpu::{self, Arithmetic, BinaryOp};
use ge_tensor::{ElementType, KernelContext, Tensor, TensorDesc, TensorError};
use half::{bf16, f16};

use crate::attributes::Attributes;
use crate::error::Result;
use crate::registry::{OpDescriptor, OperatorRegistry};

fn infer_binary(inputs: &[TensorDesc], attrs: &Attributes) -> Result<Vec<TensorDesc>> {
    let (a, b) = (&inputs[0], &inputs[1]);
    if a.element_type != b.element_type {
        return Err(TensorError::TypeMismatch {
            expected: a.element_type,
            got: b.element_type,
        }
        .into());
    }
    if a.element_type == ElementType::Boolean {
        return Err(TensorError::UnsupportedElementType {
            element_type: a.element_type,
            context: "arithmetic".to_string(),
        }
        .into());
    }
    let shape = attrs.auto_broadcast()?.infer(&a.shape, &b.shape)?;
    Ok(vec![TensorDesc {
        element_type: a.element_type,
        shape,
    }])
}

fn infer_divide(inputs: &[TensorDesc], attrs: &Attributes) -> Result<Vec<TensorDesc>> {
    attrs.get_bool("pythondiv", true)?;
    infer_binary(inputs, attrs)
}

fn run_binary<T: Arithmetic>(
    op: BinaryOp,
    inputs: &[&Tensor<'_>],
    attrs: &Attributes,
    ctx: &KernelContext,
) -> Result<Vec<Tensor<'static>>> {
    let out = cpu::binary::<T>(op, inputs[0], inputs[1], attrs.auto_broadcast()?, ctx)?;
    Ok(vec![out])
}

macro_rules! binary_kernels {
    ($($kernel:ident => $op:expr),* $(,)?) => {
        $(
            fn $kernel<T: Arithmetic>(
                inputs: &[&Tensor<'_>],
                attrs: &Attributes,
                ctx: &KernelContext,
            ) -> Result<Vec<Tensor<'static>>> {
                run_binary::<T>($op, inputs, attrs, ctx)
            }
        )*
    };
}

binary_kernels! {
    add_kernel => BinaryOp::Add,
    subtract_kernel => BinaryOp::Subtract,
    multiply_kernel => BinaryOp::Multiply,
    floor_mod_kernel => BinaryOp::FloorMod,
    mod_kernel => BinaryOp::Mod,
    maximum_kernel => BinaryOp::Maximum,
    minimum_kernel => BinaryOp::Minimum,
}

fn divide_kernel<T: Arithmetic>(
    inputs: &[&Tensor<'_>],
    attrs: &Attributes,
    ctx: &KernelContext,
) -> Result<Vec<Tensor<'static>>> {
    let floor = attrs.get_bool("pythondiv", true)?;
    run_binary::<T>(BinaryOp::Divide { floor }, inputs, attrs, ctx)
}

/// Builds a two-input descriptor with `$kernel` instantiated for every numeric type.
macro_rules! numeric_op {
    ($name:expr, $infer:expr, $kernel:ident) => {
        OpDescriptor::new($name, 2, $infer)
            .with_kernel(ElementType::F16, $kernel::<f16>)
            .with_kernel(ElementType::BF16, $kernel::<bf16>)
            .with_kernel(ElementType::F32, $kernel::<f32>)
            .with_kernel(ElementType::F64, $kernel::<f64>)
            .with_kernel(ElementType::I8, $kernel::<i8>)
            .with_kernel(ElementType::I16, $kernel::<i16>)
            .with_kernel(ElementType::I32, $kernel::<i32>)
            .with_kernel(ElementType::I64, $kernel::<i64>)
            .with_kernel(ElementType::U8, $kernel::<u8>)
            .with_kernel(ElementType::U16, $kernel::<u16>)
            .with_kernel(ElementType::U32, $kernel::<u32>)
            .with_kernel(ElementType::U64, $kernel::<u64>)
    };
}

pub(crate) fn register(registry: &mut OperatorRegistry) {
    registry.register(numeric_op!("Add", infer_binary, add_kernel));
    registry.register(numeric_op!("Subtract", infer_binary, subtract_kernel));
    registry.register(numeric_op!("Multiply", infer_binary, multiply_kernel));
    registry.register(numeric_op!("Divide", infer_divide, divide_kernel));
    registry.register(numeric_op!("FloorMod", infer_binary, floor_mod_kernel));
    registry.register(numeric_op!("Mod", infer_binary, mod_kernel));
    registry.register(numeric_op!("Maximum", infer_binary, maximum_kernel));
    registry.register(numeric_op!("Minimum", infer_binary, minimum_kernel));
}
