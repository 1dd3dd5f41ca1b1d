//! The Value type and the declared types members are typed with.
//!
//! Attribute values, operation arguments and return values all travel as
//! [`Value`]. Declarations describe what a member expects with [`ValueType`],
//! and incoming arguments are coerced to it before a member body runs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A dynamically typed value read from or written to a managed object.
///
/// # Design Notes
///
/// - Uses `BTreeMap` for deterministic ordering
/// - Includes `Bytes` for binary data
/// - Uses `i64` for integers and `f64` for floats
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// Absence of a value; what `Unit` members return.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// Key-value map with string keys.
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers are widened, so an `Integer` argument reads as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The type this value has without any coercion.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Unit,
            Value::Bool(_) => ValueType::Bool,
            Value::Integer(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
            Value::Bytes(_) => ValueType::Bytes,
            Value::Array(_) => ValueType::Array,
            Value::Map(_) => ValueType::Map,
        }
    }

    /// Short name used in type mismatch reports.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            other => other.value_type().as_str(),
        }
    }
}

// Conversion from common types

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

/// Declared type of an attribute, parameter or return value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// No value; the return type of setters and of operations without a result.
    Unit,
    Bool,
    Integer,
    Float,
    String,
    Bytes,
    Array,
    Map,
    /// Accepts any value unchanged.
    Any,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Unit => "unit",
            ValueType::Bool => "bool",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::Bytes => "bytes",
            ValueType::Array => "array",
            ValueType::Map => "map",
            ValueType::Any => "any",
        }
    }

    /// Whether `value` already has this type, without coercion.
    pub fn matches(&self, value: &Value) -> bool {
        *self == ValueType::Any || value.value_type() == *self
    }

    /// Coerce `value` to this type.
    ///
    /// The policy is fixed:
    /// - a value of this exact type, or any value for `Any`, passes unchanged
    /// - strings parse to integers, floats and case-insensitive booleans
    /// - integers widen to floats
    /// - floats narrow to integers only when integral and in range
    /// - arrays of integers in `0..=255` become bytes
    ///
    /// Returns `None` when no rule applies.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        if self.matches(value) {
            return Some(value.clone());
        }
        match (self, value) {
            (ValueType::Integer, Value::String(s)) => s.trim().parse().ok().map(Value::Integer),
            (ValueType::Float, Value::String(s)) => s.trim().parse().ok().map(Value::Float),
            (ValueType::Bool, Value::String(s)) => {
                let s = s.trim();
                if s.eq_ignore_ascii_case("true") {
                    Some(Value::Bool(true))
                } else if s.eq_ignore_ascii_case("false") {
                    Some(Value::Bool(false))
                } else {
                    None
                }
            }
            (ValueType::Float, Value::Integer(i)) => Some(Value::Float(*i as f64)),
            (ValueType::Integer, Value::Float(f)) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                    Some(Value::Integer(*f as i64))
                } else {
                    None
                }
            }
            (ValueType::Bytes, Value::Array(items)) => items
                .iter()
                .map(|item| item.as_i64().and_then(|i| u8::try_from(i).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(Value::Bytes),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
