//! Tag values and the type/access vocabulary used by tag metadata.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single process value as it travels between callers, the cache and the
/// hardware clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl TagValue {
    /// Short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            TagValue::Bool(_) => "bool",
            TagValue::Int(_) => "int",
            TagValue::Float(_) => "float",
            TagValue::String(_) => "string",
        }
    }

    /// Numeric view of the value. Booleans are not numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Int(v) => Some(*v as f64),
            TagValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean view: `true`/`false`, or numeric exactly 0 or 1.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TagValue::Bool(b) => Some(*b),
            TagValue::Int(0) => Some(false),
            TagValue::Int(1) => Some(true),
            TagValue::Float(v) if *v == 0.0 => Some(false),
            TagValue::Float(v) if *v == 1.0 => Some(true),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, TagValue::Int(_) | TagValue::Float(_))
    }

    /// Exact integer for an integral float inside the `i64` range.
    ///
    /// `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
    pub fn int_from_f64(v: f64) -> Option<i64> {
        if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
            Some(v as i64)
        } else {
            None
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bool(b) => write!(f, "{}", b),
            TagValue::Int(v) => write!(f, "{}", v),
            TagValue::Float(v) => write!(f, "{}", v),
            TagValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Bool(value)
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Int(value)
    }
}

impl From<i32> for TagValue {
    fn from(value: i32) -> Self {
        TagValue::Int(i64::from(value))
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::Float(value)
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::String(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::String(value)
    }
}

// =============================================================================
// Tag Type
// =============================================================================

/// Declared data type of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagType {
    Float,
    Int,
    String,
    Bool,
}

impl TagType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, TagType::Float | TagType::Int)
    }

    /// The zero value for this type.
    pub fn zero(&self) -> TagValue {
        match self {
            TagType::Float => TagValue::Float(0.0),
            TagType::Int => TagValue::Int(0),
            TagType::String => TagValue::String(String::new()),
            TagType::Bool => TagValue::Bool(false),
        }
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TagType::Float => "float",
            TagType::Int => "int",
            TagType::String => "string",
            TagType::Bool => "bool",
        };
        write!(f, "{}", label)
    }
}

impl FromStr for TagType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "float" | "double" | "real" => Ok(TagType::Float),
            "int" | "integer" => Ok(TagType::Int),
            "string" | "str" => Ok(TagType::String),
            "bool" | "boolean" => Ok(TagType::Bool),
            other => Err(format!("unknown tag type '{}'", other)),
        }
    }
}

// =============================================================================
// Access Mode
// =============================================================================

/// Whether callers may write a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessMode {
    Read,
    ReadWrite,
}

impl AccessMode {
    pub fn is_writable(&self) -> bool {
        matches!(self, AccessMode::ReadWrite)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Read => write!(f, "read"),
            AccessMode::ReadWrite => write!(f, "read-write"),
        }
    }
}

impl FromStr for AccessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" | "r" | "read-only" | "readonly" => Ok(AccessMode::Read),
            "read-write" | "read/write" | "read_write" | "rw" | "write" => {
                Ok(AccessMode::ReadWrite)
            }
            other => Err(format!("unknown access mode '{}'", other)),
        }
    }
}
