use std::borrow::Cow;

use crate::element_type::ElementType;
use crate::error::{Result, TensorError};
use crate::shape::{PartialShape, Shape};
use crate::storage::{Element, Storage};

/// The static description of a value: element type plus partial shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorDesc {
    pub element_type: ElementType,
    pub shape: PartialShape,
}

impl TensorDesc {
    pub fn new(element_type: ElementType, shape: impl Into<PartialShape>) -> Self {
        TensorDesc {
            element_type,
            shape: shape.into(),
        }
    }
}

impl std::fmt::Display for TensorDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.element_type, self.shape)
    }
}

/// A host tensor: contiguous, row-major elements of one element type.
///
/// `Tensor<'static>` owns its data. A tensor created with [`Tensor::view`]
/// borrows caller memory for `'a` and copies it only if written to.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<'a> {
    storage: Storage<'a>,
    shape: Shape,
}

impl Tensor<'static> {
    /// Create a zero-filled tensor of the given element type and shape.
    pub fn create(element_type: ElementType, shape: Shape) -> Self {
        Tensor {
            storage: Storage::zeros(element_type, shape.numel()),
            shape,
        }
    }

    /// Create an owned tensor from a vector of elements.
    pub fn from_vec<T: Element>(data: Vec<T>, shape: Shape) -> Result<Self> {
        check_len(data.len(), &shape)?;
        Ok(Tensor {
            storage: T::wrap(Cow::Owned(data)),
            shape,
        })
    }

    /// Create a rank-0 tensor holding a single value.
    pub fn scalar<T: Element>(value: T) -> Self {
        Tensor {
            storage: T::wrap(Cow::Owned(vec![value])),
            shape: Shape::scalar(),
        }
    }

    /// Decode a tensor from raw little-endian bytes.
    pub fn from_le_bytes(element_type: ElementType, shape: Shape, bytes: &[u8]) -> Result<Self> {
        let expected = element_type.size_in_bytes() * shape.numel();
        if bytes.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                got: bytes.len(),
            });
        }
        Ok(Tensor {
            storage: Storage::from_le_bytes(element_type, bytes),
            shape,
        })
    }
}

impl<'a> Tensor<'a> {
    /// Wrap caller memory without copying.
    pub fn view<T: Element>(data: &'a [T], shape: Shape) -> Result<Self> {
        check_len(data.len(), &shape)?;
        Ok(Tensor {
            storage: T::wrap(Cow::Borrowed(data)),
            shape,
        })
    }

    /// Returns a reference to the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's element type.
    pub fn element_type(&self) -> ElementType {
        self.storage.element_type()
    }

    /// Element type and shape as a [`TensorDesc`].
    pub fn desc(&self) -> TensorDesc {
        TensorDesc::new(self.element_type(), &self.shape)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.len() == 0
    }

    /// Size of the element data in bytes.
    pub fn byte_size(&self) -> usize {
        self.len() * self.element_type().size_in_bytes()
    }

    /// Returns true if this tensor still borrows caller memory.
    pub fn is_view(&self) -> bool {
        self.storage.is_borrowed()
    }

    /// Returns the underlying storage reference.
    pub fn storage(&self) -> &Storage<'a> {
        &self.storage
    }

    /// Typed read access. Fails if `T` does not match the element type.
    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        T::slice(&self.storage).ok_or(TensorError::TypeMismatch {
            expected: self.element_type(),
            got: T::ELEMENT_TYPE,
        })
    }

    /// Typed write access. A view is copied into owned memory first.
    pub fn as_slice_mut<T: Element>(&mut self) -> Result<&mut [T]> {
        let element_type = self.element_type();
        T::slice_mut(&mut self.storage).ok_or(TensorError::TypeMismatch {
            expected: element_type,
            got: T::ELEMENT_TYPE,
        })
    }

    /// Copy the elements out into a vector.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        self.as_slice::<T>().map(<[T]>::to_vec)
    }

    /// Encode the elements as little-endian bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.storage.to_le_bytes()
    }

    /// Reinterpret the tensor with a new shape of the same element count.
    ///
    /// The storage is kept as is; no reallocation happens.
    pub fn reshape(self, new_shape: Shape) -> Result<Tensor<'a>> {
        if self.shape.numel() != new_shape.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape.into(),
                got: new_shape.into(),
            });
        }
        Ok(Tensor {
            storage: self.storage,
            shape: new_shape,
        })
    }

    /// Overwrite this tensor's elements with those of `src`.
    ///
    /// Element type and shape must match exactly.
    pub fn copy_from(&mut self, src: &Tensor<'_>) -> Result<()> {
        if self.element_type() != src.element_type() {
            return Err(TensorError::TypeMismatch {
                expected: self.element_type(),
                got: src.element_type(),
            });
        }
        if self.shape != src.shape {
            return Err(TensorError::ShapeMismatch {
                expected: (&self.shape).into(),
                got: (&src.shape).into(),
            });
        }
        self.storage.copy_from(&src.storage)
    }

    /// Detach from any borrowed memory.
    pub fn into_owned(self) -> Tensor<'static> {
        Tensor {
            storage: self.storage.into_owned(),
            shape: self.shape,
        }
    }
}

fn check_len(len: usize, shape: &Shape) -> Result<()> {
    if len != shape.numel() {
        return Err(TensorError::ShapeMismatch {
            expected: shape.into(),
            got: Shape::new(vec![len]).into(),
        });
    }
    Ok(())
}
