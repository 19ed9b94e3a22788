//! PackStream value types.

use std::collections::HashMap;
use std::mem;

/// String-keyed PackStream map, the shape of every message's `extra` field.
pub type ValueMap = HashMap<String, PackStreamValue>;

/// A decoded PackStream value.
#[derive(Debug, Clone, PartialEq)]
pub enum PackStreamValue {
    /// Null value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Float(f64),
    /// Byte array
    Bytes(Vec<u8>),
    /// UTF-8 string
    String(String),
    /// List of values
    List(Vec<PackStreamValue>),
    /// Map of string keys to values
    Map(ValueMap),
    /// Tagged structure nested inside a message field
    Structure(PackStreamStructure),
}

/// A tagged structure: `[marker][tag][field]*` on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamStructure {
    /// Structure tag
    pub tag: u8,
    /// Structure fields
    pub fields: Vec<PackStreamValue>,
}

impl PackStreamStructure {
    /// Create a structure from a tag and its fields.
    pub fn new(tag: u8, fields: Vec<PackStreamValue>) -> Self {
        Self { tag, fields }
    }
}

impl PackStreamValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, PackStreamValue::Null)
    }

    /// Try to get as boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PackStreamValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PackStreamValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PackStreamValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as list reference.
    pub fn as_list(&self) -> Option<&[PackStreamValue]> {
        match self {
            PackStreamValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Try to get as map reference.
    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            PackStreamValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Take the string out of this value without copying it.
    pub fn into_string(self) -> Option<String> {
        match self {
            PackStreamValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Take the list out of this value without copying it.
    pub fn into_list(self) -> Option<Vec<PackStreamValue>> {
        match self {
            PackStreamValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Take the map out of this value without copying it.
    pub fn into_map(self) -> Option<ValueMap> {
        match self {
            PackStreamValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Collect a list of strings, skipping non-string items.
    pub fn into_string_list(self) -> Option<Vec<String>> {
        self.into_list()
            .map(|items| items.into_iter().filter_map(PackStreamValue::into_string).collect())
    }

    /// Get the type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            PackStreamValue::Null => "Null",
            PackStreamValue::Boolean(_) => "Boolean",
            PackStreamValue::Integer(_) => "Integer",
            PackStreamValue::Float(_) => "Float",
            PackStreamValue::Bytes(_) => "Bytes",
            PackStreamValue::String(_) => "String",
            PackStreamValue::List(_) => "List",
            PackStreamValue::Map(_) => "Map",
            PackStreamValue::Structure(_) => "Structure",
        }
    }

    /// Rough in-memory footprint, used for memory accounting.
    pub fn estimated_size(&self) -> usize {
        let own = mem::size_of::<PackStreamValue>();
        own + match self {
            PackStreamValue::Bytes(b) => b.len(),
            PackStreamValue::String(s) => s.len(),
            PackStreamValue::List(l) => l.iter().map(PackStreamValue::estimated_size).sum(),
            PackStreamValue::Map(m) => m
                .iter()
                .map(|(k, v)| k.len() + v.estimated_size())
                .sum(),
            PackStreamValue::Structure(s) => {
                s.fields.iter().map(PackStreamValue::estimated_size).sum()
            }
            _ => 0,
        }
    }
}

impl From<bool> for PackStreamValue {
    fn from(v: bool) -> Self {
        PackStreamValue::Boolean(v)
    }
}

impl From<i64> for PackStreamValue {
    fn from(v: i64) -> Self {
        PackStreamValue::Integer(v)
    }
}

impl From<f64> for PackStreamValue {
    fn from(v: f64) -> Self {
        PackStreamValue::Float(v)
    }
}

impl From<String> for PackStreamValue {
    fn from(v: String) -> Self {
        PackStreamValue::String(v)
    }
}

impl From<&str> for PackStreamValue {
    fn from(v: &str) -> Self {
        PackStreamValue::String(v.to_string())
    }
}

impl From<Vec<PackStreamValue>> for PackStreamValue {
    fn from(v: Vec<PackStreamValue>) -> Self {
        PackStreamValue::List(v)
    }
}

impl From<Vec<String>> for PackStreamValue {
    fn from(v: Vec<String>) -> Self {
        PackStreamValue::List(v.into_iter().map(PackStreamValue::String).collect())
    }
}

impl From<ValueMap> for PackStreamValue {
    fn from(v: ValueMap) -> Self {
        PackStreamValue::Map(v)
    }
}

impl<T: Into<PackStreamValue>> From<Option<T>> for PackStreamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(PackStreamValue::Null)
    }
}
