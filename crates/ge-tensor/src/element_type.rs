use std::fmt;
use std::str::FromStr;

use crate::error::TensorError;

/// Element types a tensor can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementType {
    /// Boolean, stored as one byte per element.
    Boolean,
    /// 16-bit IEEE 754 half-precision float (`half::f16`).
    F16,
    /// 16-bit brain float (`half::bf16`).
    BF16,
    /// 32-bit floating point.
    F32,
    /// 64-bit floating point.
    F64,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl ElementType {
    /// Every supported element type, in declaration order.
    pub const ALL: [ElementType; 13] = [
        ElementType::Boolean,
        ElementType::F16,
        ElementType::BF16,
        ElementType::F32,
        ElementType::F64,
        ElementType::I8,
        ElementType::I16,
        ElementType::I32,
        ElementType::I64,
        ElementType::U8,
        ElementType::U16,
        ElementType::U32,
        ElementType::U64,
    ];

    /// Returns the size in bytes of a single element.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            ElementType::Boolean | ElementType::I8 | ElementType::U8 => 1,
            ElementType::F16 | ElementType::BF16 | ElementType::I16 | ElementType::U16 => 2,
            ElementType::F32 | ElementType::I32 | ElementType::U32 => 4,
            ElementType::F64 | ElementType::I64 | ElementType::U64 => 8,
        }
    }

    /// Returns true for floating point types.
    pub fn is_real(&self) -> bool {
        matches!(
            self,
            ElementType::F16 | ElementType::BF16 | ElementType::F32 | ElementType::F64
        )
    }

    /// Returns true for integer types (boolean excluded).
    pub fn is_integral(&self) -> bool {
        !self.is_real() && *self != ElementType::Boolean
    }

    /// Returns true for types that can represent negative values.
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            ElementType::F16
                | ElementType::BF16
                | ElementType::F32
                | ElementType::F64
                | ElementType::I8
                | ElementType::I16
                | ElementType::I32
                | ElementType::I64
        )
    }

    /// Short lowercase name, e.g. `"f32"`.
    pub fn name(&self) -> &'static str {
        match self {
            ElementType::Boolean => "boolean",
            ElementType::F16 => "f16",
            ElementType::BF16 => "bf16",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
            ElementType::I8 => "i8",
            ElementType::I16 => "i16",
            ElementType::I32 => "i32",
            ElementType::I64 => "i64",
            ElementType::U8 => "u8",
            ElementType::U16 => "u16",
            ElementType::U32 => "u32",
            ElementType::U64 => "u64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ElementType {
    type Err = TensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ElementType::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| TensorError::UnknownElementType(s.to_string()))
    }
}
