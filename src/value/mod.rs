// src/value/mod.rs

//! Property values flowing between a program and the engine.
//!
//! - [`PropertyValue`] is plain, fully-resolved data (plus the first-class
//!   `Unknown` marker and secret/resource-reference wrappers).
//! - [`InputValue`] is what a program hands to a resource: any mix of plain
//!   values, deferred [`Output`](crate::output::Output)s, futures and live
//!   resource handles, nested through arrays and objects.

use std::collections::BTreeMap;
use std::fmt;

pub mod input;

pub use input::{InputMap, InputValue};

/// Map of property name to value, ordered for deterministic wire output.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// A reference to a registered resource, as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceReference {
    pub urn: String,
    /// Physical id for custom resources; `None` for components or while the
    /// id is unknown.
    pub id: Option<String>,
    pub package_version: String,
}

/// Plain property value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PropertyValue {
    /// Absent / undefined.
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<PropertyValue>),
    Object(PropertyMap),
    /// Not determinable during the current operation (e.g. preview).
    Unknown,
    /// A value that must be encrypted at rest by the engine.
    Secret(Box<PropertyValue>),
    ResourceReference(ResourceReference),
}

impl PropertyValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, PropertyValue::Unknown)
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, PropertyValue::Secret(_))
    }

    /// Whether this value, or anything nested inside it, is `Unknown`.
    pub fn contains_unknowns(&self) -> bool {
        match self {
            PropertyValue::Unknown => true,
            PropertyValue::Array(items) => items.iter().any(PropertyValue::contains_unknowns),
            PropertyValue::Object(map) => map.values().any(PropertyValue::contains_unknowns),
            PropertyValue::Secret(inner) => inner.contains_unknowns(),
            _ => false,
        }
    }

    /// Strip one level of secret wrapping, reporting whether it was present.
    pub fn unwrap_secret(&self) -> (&PropertyValue, bool) {
        match self {
            PropertyValue::Secret(inner) => (inner.as_ref(), true),
            other => (other, false),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&PropertyMap> {
        match self {
            PropertyValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Field lookup on an object value.
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.as_object().and_then(|map| map.get(key))
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => write!(f, "null"),
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Number(n) => write!(f, "{n}"),
            PropertyValue::String(s) => write!(f, "{s}"),
            PropertyValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            PropertyValue::Object(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            PropertyValue::Unknown => write!(f, "<unknown>"),
            PropertyValue::Secret(_) => write!(f, "[secret]"),
            PropertyValue::ResourceReference(r) => write!(f, "{}", r.urn),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Number(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Number(v as f64)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Number(f64::from(v))
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl From<Vec<PropertyValue>> for PropertyValue {
    fn from(v: Vec<PropertyValue>) -> Self {
        PropertyValue::Array(v)
    }
}

impl From<PropertyMap> for PropertyValue {
    fn from(v: PropertyMap) -> Self {
        PropertyValue::Object(v)
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(PropertyValue::Null)
    }
}
