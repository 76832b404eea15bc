// src/props/deserialize.rs

use serde_json::{Map, Value};

use crate::errors::{Result, RuntimeError};
use crate::props::wire::{
    ARCHIVE_SIG, ASSET_SIG, OUTPUT_VALUE_SIG, RESOURCE_REFERENCE_SIG, SECRET_SIG, SIG_KEY,
    UNKNOWN_VALUE,
};
use crate::value::{PropertyMap, PropertyValue, ResourceReference};

fn malformed(message: impl Into<String>) -> RuntimeError {
    RuntimeError::Serialization {
        label: "engine response".to_string(),
        message: message.into(),
    }
}

/// Decode an engine property map.
pub fn deserialize_properties(
    object: &Map<String, Value>,
    keep_unknowns: bool,
) -> Result<PropertyMap> {
    object
        .iter()
        .map(|(k, v)| Ok((k.clone(), deserialize_property(v, keep_unknowns)?)))
        .collect()
}

/// Decode one wire value.
///
/// The unknown sentinel becomes [`PropertyValue::Unknown`] when
/// `keep_unknowns` is set and [`PropertyValue::Null`] otherwise. Assets and
/// archives pass through untouched.
pub fn deserialize_property(value: &Value, keep_unknowns: bool) -> Result<PropertyValue> {
    Ok(match value {
        Value::Null => PropertyValue::Null,
        Value::Bool(b) => PropertyValue::Bool(*b),
        Value::Number(n) => PropertyValue::Number(
            n.as_f64()
                .ok_or_else(|| malformed(format!("number {n} out of range")))?,
        ),
        Value::String(s) if s == UNKNOWN_VALUE => unknown(keep_unknowns),
        Value::String(s) => PropertyValue::String(s.clone()),
        Value::Array(items) => PropertyValue::Array(
            items
                .iter()
                .map(|item| deserialize_property(item, keep_unknowns))
                .collect::<Result<_>>()?,
        ),
        Value::Object(obj) => match obj.get(SIG_KEY) {
            None => PropertyValue::Object(deserialize_properties(obj, keep_unknowns)?),
            Some(Value::String(sig)) => deserialize_signed(sig, obj, keep_unknowns)?,
            Some(other) => return Err(malformed(format!("signature must be a string, got {other}"))),
        },
    })
}

fn unknown(keep_unknowns: bool) -> PropertyValue {
    if keep_unknowns {
        PropertyValue::Unknown
    } else {
        PropertyValue::Null
    }
}

fn deserialize_signed(
    sig: &str,
    obj: &Map<String, Value>,
    keep_unknowns: bool,
) -> Result<PropertyValue> {
    match sig {
        SECRET_SIG => {
            let inner = obj.get("value").unwrap_or(&Value::Null);
            Ok(PropertyValue::Secret(Box::new(deserialize_property(
                inner,
                keep_unknowns,
            )?)))
        }
        RESOURCE_REFERENCE_SIG => {
            let urn = obj
                .get("urn")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("resource reference without a URN"))?;
            let id = obj
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty() && *id != UNKNOWN_VALUE)
                .map(str::to_string);
            let package_version = obj
                .get("packageVersion")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(PropertyValue::ResourceReference(ResourceReference {
                urn: urn.to_string(),
                id,
                package_version,
            }))
        }
        OUTPUT_VALUE_SIG => {
            let value = match obj.get("value") {
                Some(v) => deserialize_property(v, keep_unknowns)?,
                None => unknown(keep_unknowns),
            };
            let secret = obj.get("secret").and_then(Value::as_bool).unwrap_or(false);
            Ok(if secret {
                PropertyValue::Secret(Box::new(value))
            } else {
                value
            })
        }
        ASSET_SIG | ARCHIVE_SIG => {
            let map = obj
                .iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => PropertyValue::String(s.clone()),
                        other => deserialize_property(other, keep_unknowns)?,
                    };
                    Ok((k.clone(), v))
                })
                .collect::<Result<PropertyMap>>()?;
            Ok(PropertyValue::Object(map))
        }
        other => Err(malformed(format!("unrecognized signature '{other}'"))),
    }
}
