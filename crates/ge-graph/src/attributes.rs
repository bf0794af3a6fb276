use std::collections::BTreeMap;
use std::fmt;

use ge_tensor::AutoBroadcast;

use crate::error::{GraphError, Result};

/// A single operator attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl AttributeValue {
    fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Bool(_) => "bool",
            AttributeValue::Int(_) => "int",
            AttributeValue::Float(_) => "float",
            AttributeValue::Str(_) => "string",
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(v) => write!(f, "{}", v),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::Str(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Str(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Str(v)
    }
}

/// Named attributes of an operator node, fixed when the node is created.
///
/// Operators read attributes with a default, so an empty map is always valid.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attributes {
    values: BTreeMap<String, AttributeValue>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute. Returns self for builder-style usage.
    pub fn with(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name)
    }

    pub fn get_bool(&self, name: &str, default: bool) -> Result<bool> {
        match self.get(name) {
            None => Ok(default),
            Some(AttributeValue::Bool(v)) => Ok(*v),
            Some(other) => Err(wrong_type(name, "bool", other)),
        }
    }

    pub fn get_str<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str> {
        match self.get(name) {
            None => Ok(default),
            Some(AttributeValue::Str(v)) => Ok(v.as_str()),
            Some(other) => Err(wrong_type(name, "string", other)),
        }
    }

    /// The `auto_broadcast` attribute, numpy by default.
    pub fn auto_broadcast(&self) -> Result<AutoBroadcast> {
        let mode = self.get_str("auto_broadcast", "numpy")?;
        mode.parse().map_err(|reason| GraphError::InvalidAttribute {
            name: "auto_broadcast".to_string(),
            reason,
        })
    }
}

fn wrong_type(name: &str, expected: &str, got: &AttributeValue) -> GraphError {
    GraphError::InvalidAttribute {
        name: name.to_string(),
        reason: format!("expected {}, got {} {}", expected, got.type_name(), got),
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        write!(f, "}}")
    }
}
