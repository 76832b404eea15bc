// src/value/input.rs

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::output::{Output, Resolved};
use crate::resource::{Resource, ResourceSet};
use crate::value::PropertyValue;

/// Inputs handed to a resource registration, keyed by property name.
pub type InputMap = BTreeMap<String, InputValue>;

/// Anything a program may pass as a resource input.
#[derive(Clone)]
pub enum InputValue {
    Value(PropertyValue),
    Output(Output<PropertyValue>),
    Future(Shared<BoxFuture<'static, InputValue>>),
    Resource(Resource),
    Array(Vec<InputValue>),
    Object(InputMap),
}

impl InputValue {
    /// Wrap a future producing an input. The future is driven at most once.
    pub fn future<F>(fut: F) -> Self
    where
        F: Future<Output = InputValue> + Send + 'static,
    {
        InputValue::Future(fut.boxed().shared())
    }

    /// A declared property with no value; omitted on the wire but still
    /// given an output cell.
    pub fn undefined() -> Self {
        InputValue::Output(Output::settled(
            ResourceSet::new(),
            Resolved {
                value: None,
                known: true,
                secret: false,
                dependencies: ResourceSet::new(),
            },
        ))
    }

    /// Resources this input is already known to depend on, without awaiting
    /// anything. Futures contribute nothing until they settle.
    pub fn collect_declared_dependencies(&self, out: &mut ResourceSet) {
        match self {
            InputValue::Value(_) | InputValue::Future(_) => {}
            InputValue::Output(o) => out.extend(o.dependencies()),
            InputValue::Resource(r) => {
                out.insert(r.id());
            }
            InputValue::Array(items) => {
                for item in items {
                    item.collect_declared_dependencies(out);
                }
            }
            InputValue::Object(map) => {
                for item in map.values() {
                    item.collect_declared_dependencies(out);
                }
            }
        }
    }
}

impl fmt::Debug for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            InputValue::Output(o) => f.debug_tuple("Output").field(o).finish(),
            InputValue::Future(_) => f.write_str("Future(..)"),
            InputValue::Resource(r) => f.debug_tuple("Resource").field(r).finish(),
            InputValue::Array(items) => f.debug_tuple("Array").field(items).finish(),
            InputValue::Object(map) => f.debug_tuple("Object").field(map).finish(),
        }
    }
}

impl From<PropertyValue> for InputValue {
    fn from(v: PropertyValue) -> Self {
        InputValue::Value(v)
    }
}

impl From<&str> for InputValue {
    fn from(v: &str) -> Self {
        InputValue::Value(v.into())
    }
}

impl From<String> for InputValue {
    fn from(v: String) -> Self {
        InputValue::Value(v.into())
    }
}

impl From<bool> for InputValue {
    fn from(v: bool) -> Self {
        InputValue::Value(v.into())
    }
}

impl From<f64> for InputValue {
    fn from(v: f64) -> Self {
        InputValue::Value(v.into())
    }
}

impl From<i64> for InputValue {
    fn from(v: i64) -> Self {
        InputValue::Value(v.into())
    }
}

impl From<i32> for InputValue {
    fn from(v: i32) -> Self {
        InputValue::Value(v.into())
    }
}

impl From<Resource> for InputValue {
    fn from(v: Resource) -> Self {
        InputValue::Resource(v)
    }
}

impl From<&Resource> for InputValue {
    fn from(v: &Resource) -> Self {
        InputValue::Resource(v.clone())
    }
}

impl From<Output<PropertyValue>> for InputValue {
    fn from(v: Output<PropertyValue>) -> Self {
        InputValue::Output(v)
    }
}

impl From<&Output<PropertyValue>> for InputValue {
    fn from(v: &Output<PropertyValue>) -> Self {
        InputValue::Output(v.clone())
    }
}

impl From<Output<String>> for InputValue {
    fn from(v: Output<String>) -> Self {
        InputValue::Output(v.into_property())
    }
}

impl From<&Output<String>> for InputValue {
    fn from(v: &Output<String>) -> Self {
        InputValue::Output(v.clone().into_property())
    }
}

impl From<Vec<InputValue>> for InputValue {
    fn from(v: Vec<InputValue>) -> Self {
        InputValue::Array(v)
    }
}

impl From<InputMap> for InputValue {
    fn from(v: InputMap) -> Self {
        InputValue::Object(v)
    }
}
