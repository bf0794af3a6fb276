use std::borrow::Cow;
use std::fmt::Debug;

use half::{bf16, f16};

use crate::element_type::ElementType;
use crate::error::{Result, TensorError};

/// Host-side tensor storage, one variant per element type.
///
/// Each variant either owns its elements or borrows them from caller memory.
/// Borrowed storage is copied the first time it is accessed mutably.
#[derive(Debug, Clone, PartialEq)]
pub enum Storage<'a> {
    Boolean(Cow<'a, [bool]>),
    F16(Cow<'a, [f16]>),
    BF16(Cow<'a, [bf16]>),
    F32(Cow<'a, [f32]>),
    F64(Cow<'a, [f64]>),
    I8(Cow<'a, [i8]>),
    I16(Cow<'a, [i16]>),
    I32(Cow<'a, [i32]>),
    I64(Cow<'a, [i64]>),
    U8(Cow<'a, [u8]>),
    U16(Cow<'a, [u16]>),
    U32(Cow<'a, [u32]>),
    U64(Cow<'a, [u64]>),
}

/// Expands `$body` once per storage variant with `$v` bound to the inner `Cow`.
macro_rules! with_storage {
    ($storage:expr, $v:ident => $body:expr) => {
        match $storage {
            Storage::Boolean($v) => $body,
            Storage::F16($v) => $body,
            Storage::BF16($v) => $body,
            Storage::F32($v) => $body,
            Storage::F64($v) => $body,
            Storage::I8($v) => $body,
            Storage::I16($v) => $body,
            Storage::I32($v) => $body,
            Storage::I64($v) => $body,
            Storage::U8($v) => $body,
            Storage::U16($v) => $body,
            Storage::U32($v) => $body,
            Storage::U64($v) => $body,
        }
    };
}

impl<'a> Storage<'a> {
    /// Number of elements in this storage.
    pub fn len(&self) -> usize {
        with_storage!(self, v => v.len())
    }

    /// Returns true if the elements are borrowed from caller memory.
    pub fn is_borrowed(&self) -> bool {
        with_storage!(self, v => matches!(v, Cow::Borrowed(_)))
    }

    /// Returns the element type of this storage.
    pub fn element_type(&self) -> ElementType {
        match self {
            Storage::Boolean(_) => ElementType::Boolean,
            Storage::F16(_) => ElementType::F16,
            Storage::BF16(_) => ElementType::BF16,
            Storage::F32(_) => ElementType::F32,
            Storage::F64(_) => ElementType::F64,
            Storage::I8(_) => ElementType::I8,
            Storage::I16(_) => ElementType::I16,
            Storage::I32(_) => ElementType::I32,
            Storage::I64(_) => ElementType::I64,
            Storage::U8(_) => ElementType::U8,
            Storage::U16(_) => ElementType::U16,
            Storage::U32(_) => ElementType::U32,
            Storage::U64(_) => ElementType::U64,
        }
    }

    /// Create zero-filled owned storage for the given element type and count.
    pub fn zeros(element_type: ElementType, n: usize) -> Storage<'static> {
        match element_type {
            ElementType::Boolean => Storage::Boolean(Cow::Owned(vec![false; n])),
            ElementType::F16 => Storage::F16(Cow::Owned(vec![f16::ZERO; n])),
            ElementType::BF16 => Storage::BF16(Cow::Owned(vec![bf16::ZERO; n])),
            ElementType::F32 => Storage::F32(Cow::Owned(vec![0.0; n])),
            ElementType::F64 => Storage::F64(Cow::Owned(vec![0.0; n])),
            ElementType::I8 => Storage::I8(Cow::Owned(vec![0; n])),
            ElementType::I16 => Storage::I16(Cow::Owned(vec![0; n])),
            ElementType::I32 => Storage::I32(Cow::Owned(vec![0; n])),
            ElementType::I64 => Storage::I64(Cow::Owned(vec![0; n])),
            ElementType::U8 => Storage::U8(Cow::Owned(vec![0; n])),
            ElementType::U16 => Storage::U16(Cow::Owned(vec![0; n])),
            ElementType::U32 => Storage::U32(Cow::Owned(vec![0; n])),
            ElementType::U64 => Storage::U64(Cow::Owned(vec![0; n])),
        }
    }

    /// Detach from any borrowed memory.
    pub fn into_owned(self) -> Storage<'static> {
        match self {
            Storage::Boolean(v) => Storage::Boolean(Cow::Owned(v.into_owned())),
            Storage::F16(v) => Storage::F16(Cow::Owned(v.into_owned())),
            Storage::BF16(v) => Storage::BF16(Cow::Owned(v.into_owned())),
            Storage::F32(v) => Storage::F32(Cow::Owned(v.into_owned())),
            Storage::F64(v) => Storage::F64(Cow::Owned(v.into_owned())),
            Storage::I8(v) => Storage::I8(Cow::Owned(v.into_owned())),
            Storage::I16(v) => Storage::I16(Cow::Owned(v.into_owned())),
            Storage::I32(v) => Storage::I32(Cow::Owned(v.into_owned())),
            Storage::I64(v) => Storage::I64(Cow::Owned(v.into_owned())),
            Storage::U8(v) => Storage::U8(Cow::Owned(v.into_owned())),
            Storage::U16(v) => Storage::U16(Cow::Owned(v.into_owned())),
            Storage::U32(v) => Storage::U32(Cow::Owned(v.into_owned())),
            Storage::U64(v) => Storage::U64(Cow::Owned(v.into_owned())),
        }
    }

    /// Copy elements from `src` into this storage in place.
    ///
    /// Fails, leaving `self` untouched, if the element types or lengths differ.
    pub fn copy_from(&mut self, src: &Storage<'_>) -> Result<()> {
        let (expected, got) = (self.element_type(), src.element_type());
        if expected != got {
            return Err(TensorError::TypeMismatch { expected, got });
        }
        if self.len() != src.len() {
            return Err(TensorError::BufferSizeMismatch {
                expected: self.len() * expected.size_in_bytes(),
                got: src.len() * got.size_in_bytes(),
            });
        }
        macro_rules! copy_arms {
            ($($variant:ident),*) => {
                match (self, src) {
                    $(
                        (Storage::$variant(d), Storage::$variant(s)) => {
                            d.to_mut().copy_from_slice(s)
                        }
                    )*
                    _ => {}
                }
            };
        }
        copy_arms!(Boolean, F16, BF16, F32, F64, I8, I16, I32, I64, U8, U16, U32, U64);
        Ok(())
    }

    /// Decode little-endian bytes into owned storage.
    ///
    /// `bytes.len()` must be a multiple of the element size; trailing bytes
    /// are ignored.
    pub fn from_le_bytes(element_type: ElementType, bytes: &[u8]) -> Storage<'static> {
        match element_type {
            ElementType::Boolean => bool::decode(bytes),
            ElementType::F16 => f16::decode(bytes),
            ElementType::BF16 => bf16::decode(bytes),
            ElementType::F32 => f32::decode(bytes),
            ElementType::F64 => f64::decode(bytes),
            ElementType::I8 => i8::decode(bytes),
            ElementType::I16 => i16::decode(bytes),
            ElementType::I32 => i32::decode(bytes),
            ElementType::I64 => i64::decode(bytes),
            ElementType::U8 => u8::decode(bytes),
            ElementType::U16 => u16::decode(bytes),
            ElementType::U32 => u32::decode(bytes),
            ElementType::U64 => u64::decode(bytes),
        }
    }

    /// Encode the elements as little-endian bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() * self.element_type().size_in_bytes());
        with_storage!(self, v => {
            for x in v.iter() {
                x.write_le_bytes(&mut out);
            }
        });
        out
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A Rust scalar type that can be stored in a tensor.
pub trait Element: Copy + Default + PartialEq + Debug + Send + Sync + 'static + sealed::Sealed {
    /// The element type tag for this scalar.
    const ELEMENT_TYPE: ElementType;

    /// Borrow the storage as a slice of `Self`, if the variant matches.
    fn slice<'s>(storage: &'s Storage<'_>) -> Option<&'s [Self]>;

    /// Mutably borrow the storage as a slice of `Self`, copying borrowed data first.
    fn slice_mut<'s>(storage: &'s mut Storage<'_>) -> Option<&'s mut [Self]>;

    /// Wrap a run of elements in the matching storage variant.
    fn wrap(data: Cow<'_, [Self]>) -> Storage<'_>;

    /// Append the little-endian encoding of `self` to `out`.
    fn write_le_bytes(self, out: &mut Vec<u8>);

    /// Decode a little-endian byte buffer into owned storage.
    fn decode(bytes: &[u8]) -> Storage<'static>;
}

macro_rules! impl_element {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $t {}

            impl Element for $t {
                const ELEMENT_TYPE: ElementType = ElementType::$variant;

                fn slice<'s>(storage: &'s Storage<'_>) -> Option<&'s [Self]> {
                    match storage {
                        Storage::$variant(v) => Some(v.as_ref()),
                        _ => None,
                    }
                }

                fn slice_mut<'s>(storage: &'s mut Storage<'_>) -> Option<&'s mut [Self]> {
                    match storage {
                        Storage::$variant(v) => Some(v.to_mut().as_mut_slice()),
                        _ => None,
                    }
                }

                fn wrap(data: Cow<'_, [Self]>) -> Storage<'_> {
                    Storage::$variant(data)
                }

                fn write_le_bytes(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn decode(bytes: &[u8]) -> Storage<'static> {
                    const SIZE: usize = std::mem::size_of::<$t>();
                    let data = bytes
                        .chunks_exact(SIZE)
                        .map(|chunk| {
                            let mut buf = [0u8; SIZE];
                            buf.copy_from_slice(chunk);
                            <$t>::from_le_bytes(buf)
                        })
                        .collect::<Vec<$t>>();
                    Storage::$variant(Cow::Owned(data))
                }
            }
        )*
    };
}

impl_element! {
    f16 => F16,
    bf16 => BF16,
    f32 => F32,
    f64 => F64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
}

impl sealed::Sealed for bool {}

impl Element for bool {
    const ELEMENT_TYPE: ElementType = ElementType::Boolean;

    fn slice<'s>(storage: &'s Storage<'_>) -> Option<&'s [Self]> {
        match storage {
            Storage::Boolean(v) => Some(v.as_ref()),
            _ => None,
        }
    }

    fn slice_mut<'s>(storage: &'s mut Storage<'_>) -> Option<&'s mut [Self]> {
        match storage {
            Storage::Boolean(v) => Some(v.to_mut().as_mut_slice()),
            _ => None,
        }
    }

    fn wrap(data: Cow<'_, [Self]>) -> Storage<'_> {
        Storage::Boolean(data)
    }

    fn write_le_bytes(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn decode(bytes: &[u8]) -> Storage<'static> {
        Storage::Boolean(Cow::Owned(bytes.iter().map(|&b| b != 0).collect()))
    }
}
