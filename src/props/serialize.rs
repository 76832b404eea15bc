// src/props/serialize.rs

use std::collections::BTreeMap;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde_json::{Map, Number, Value, json};
use tracing::trace;

use crate::errors::{Result, RuntimeError};
use crate::props::wire::{
    OUTPUT_VALUE_SIG, RESOURCE_REFERENCE_SIG, SECRET_SIG, SIG_KEY, UNKNOWN_VALUE, WireOptions,
};
use crate::resource::{Resource, ResourceSet};
use crate::value::{InputMap, InputValue, PropertyValue};

/// Result of serializing a property map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SerializedProperties {
    pub object: Map<String, Value>,
    /// Resources each property depends on, keyed by property name.
    pub property_dependencies: BTreeMap<String, ResourceSet>,
    /// Union of every property's dependencies.
    pub dependencies: ResourceSet,
}

/// Serialize every entry of `props` concurrently.
pub async fn serialize_properties(
    label: &str,
    props: &InputMap,
    opts: WireOptions,
) -> Result<SerializedProperties> {
    serialize_filtered(label, props, opts, |_| true).await
}

/// Like [`serialize_properties`], skipping the engine-owned `id` and `urn`.
pub async fn serialize_resource_properties(
    label: &str,
    props: &InputMap,
    opts: WireOptions,
) -> Result<SerializedProperties> {
    serialize_filtered(label, props, opts, |k| k != "id" && k != "urn").await
}

async fn serialize_filtered(
    label: &str,
    props: &InputMap,
    opts: WireOptions,
    accept: impl Fn(&str) -> bool,
) -> Result<SerializedProperties> {
    let entries: Vec<(&String, &InputValue)> = props.iter().filter(|(k, _)| accept(k)).collect();
    let serialized = join_all(entries.iter().map(|(key, value)| {
        serialize_property(format!("{label}.{key}"), (*value).clone(), opts)
    }))
    .await;

    let mut out = SerializedProperties::default();
    for ((key, _), result) in entries.into_iter().zip(serialized) {
        let (value, deps) = result?;
        out.dependencies.extend(deps.iter().copied());
        out.property_dependencies.insert(key.clone(), deps);
        match value {
            Some(value) => {
                out.object.insert(key.clone(), value);
            }
            None => trace!(property = %key, "skipping undefined property"),
        }
    }
    Ok(out)
}

/// Serialize one input, awaiting anything deferred inside it.
///
/// Returns `None` for undefined values, plus the resources the value
/// depends on.
pub fn serialize_property(
    label: String,
    value: InputValue,
    opts: WireOptions,
) -> BoxFuture<'static, Result<(Option<Value>, ResourceSet)>> {
    async move {
        match value {
            InputValue::Value(v) => Ok((Some(encode_plain(&label, &v, opts)?), ResourceSet::new())),
            InputValue::Future(fut) => serialize_property(label, fut.await, opts).await,
            InputValue::Resource(resource) => serialize_resource(&resource, opts).await,
            InputValue::Output(output) => {
                let mut deps = output.dependencies();
                let settled = output.settle().await?;
                deps.extend(settled.dependencies.iter().copied());

                let encoded = match (&settled.value, settled.known) {
                    (Some(v), true) => Some(encode_plain(&label, v, opts)?),
                    _ => None,
                };
                let value = if opts.keep_output_values {
                    let mut obj = Map::new();
                    obj.insert(SIG_KEY.into(), Value::from(OUTPUT_VALUE_SIG));
                    if settled.known {
                        if let Some(v) = encoded {
                            obj.insert("value".into(), v);
                        }
                    }
                    if settled.secret {
                        obj.insert("secret".into(), Value::Bool(true));
                    }
                    Some(Value::Object(obj))
                } else if !settled.known {
                    Some(Value::from(UNKNOWN_VALUE))
                } else if settled.secret && opts.keep_secrets {
                    encoded.map(wrap_secret)
                } else {
                    encoded
                };
                Ok((value, deps))
            }
            InputValue::Array(items) => {
                let results = join_all(items.into_iter().enumerate().map(|(i, item)| {
                    serialize_property(format!("{label}[{i}]"), item, opts)
                }))
                .await;
                let mut deps = ResourceSet::new();
                let mut out = Vec::with_capacity(results.len());
                for result in results {
                    let (value, item_deps) = result?;
                    deps.extend(item_deps);
                    out.push(value.unwrap_or(Value::Null));
                }
                Ok((Some(Value::Array(out)), deps))
            }
            InputValue::Object(map) => {
                let keys: Vec<String> = map.keys().cloned().collect();
                let results = join_all(map.into_iter().map(|(key, item)| {
                    serialize_property(format!("{label}.{key}"), item, opts)
                }))
                .await;
                let mut deps = ResourceSet::new();
                let mut out = Map::new();
                for (key, result) in keys.into_iter().zip(results) {
                    let (value, item_deps) = result?;
                    deps.extend(item_deps);
                    if let Some(value) = value {
                        out.insert(key, value);
                    }
                }
                Ok((Some(Value::Object(out)), deps))
            }
        }
    }
    .boxed()
}

async fn serialize_resource(
    resource: &Resource,
    opts: WireOptions,
) -> Result<(Option<Value>, ResourceSet)> {
    let deps = ResourceSet::from([resource.id()]);
    let urn = resource.urn().settle().await?;
    let urn = match (&urn.value, urn.known) {
        (Some(urn), true) => urn.clone(),
        _ => return Ok((Some(Value::from(UNKNOWN_VALUE)), deps)),
    };
    let id = match resource.physical_id() {
        Some(id) => {
            let id = id.settle().await?;
            Some(match (&id.value, id.known) {
                (Some(id), true) if !id.is_empty() => id.clone(),
                _ => UNKNOWN_VALUE.to_string(),
            })
        }
        None => None,
    };

    let value = if opts.keep_resources {
        let mut obj = Map::new();
        obj.insert(SIG_KEY.into(), Value::from(RESOURCE_REFERENCE_SIG));
        obj.insert("urn".into(), Value::from(urn));
        if let Some(id) = id {
            obj.insert("id".into(), Value::from(id));
        }
        Value::Object(obj)
    } else {
        // Old engines: custom resources are their id, components their URN.
        Value::from(id.unwrap_or(urn))
    };
    Ok((Some(value), deps))
}

fn wrap_secret(value: Value) -> Value {
    json!({ SIG_KEY: SECRET_SIG, "value": value })
}

/// Encode a plain value. Fails on numbers JSON cannot carry.
pub fn encode_plain(label: &str, value: &PropertyValue, opts: WireOptions) -> Result<Value> {
    let encoded = match value {
        PropertyValue::Null => Value::Null,
        PropertyValue::Bool(b) => Value::Bool(*b),
        PropertyValue::Number(n) => {
            let number = Number::from_f64(*n).ok_or_else(|| RuntimeError::Serialization {
                label: label.to_string(),
                message: format!("{n} is not a finite number"),
            })?;
            Value::Number(number)
        }
        PropertyValue::String(s) => Value::String(s.clone()),
        PropertyValue::Unknown => Value::from(UNKNOWN_VALUE),
        PropertyValue::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(encode_plain(&format!("{label}[{i}]"), item, opts)?);
            }
            Value::Array(out)
        }
        PropertyValue::Object(map) => {
            let mut out = Map::new();
            for (key, item) in map {
                out.insert(key.clone(), encode_plain(&format!("{label}.{key}"), item, opts)?);
            }
            Value::Object(out)
        }
        PropertyValue::Secret(inner) => {
            let inner = encode_plain(label, inner, opts)?;
            if opts.keep_secrets {
                wrap_secret(inner)
            } else {
                inner
            }
        }
        PropertyValue::ResourceReference(r) => {
            if opts.keep_resources {
                let mut obj = Map::new();
                obj.insert(SIG_KEY.into(), Value::from(RESOURCE_REFERENCE_SIG));
                obj.insert("urn".into(), Value::from(r.urn.clone()));
                if let Some(id) = &r.id {
                    obj.insert("id".into(), Value::from(id.clone()));
                }
                if !r.package_version.is_empty() {
                    obj.insert("packageVersion".into(), Value::from(r.package_version.clone()));
                }
                Value::Object(obj)
            } else {
                Value::from(r.id.clone().unwrap_or_else(|| r.urn.clone()))
            }
        }
    };
    Ok(encoded)
}
