// src/engine/monitor.rs

//! The engine's RPC boundary.
//!
//! The context talks to a [`ResourceMonitor`] instead of a concrete
//! transport. Request and response types mirror the engine's messages and
//! serialize with serde, so a transport only has to move JSON.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::Result;
use crate::props::WireOptions;
use crate::resource::CustomTimeouts;

/// Boxed future returned by monitor calls.
pub type MonitorFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

pub const FEATURE_SECRETS: &str = "secrets";
pub const FEATURE_RESOURCE_REFERENCES: &str = "resourceReferences";
pub const FEATURE_OUTPUT_VALUES: &str = "outputValues";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResourceRequest {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    pub parent: String,
    pub custom: bool,
    pub object: Map<String, Value>,
    pub protect: bool,
    pub dependencies: Vec<String>,
    pub provider: String,
    pub providers: BTreeMap<String, String>,
    pub property_dependencies: BTreeMap<String, Vec<String>>,
    pub delete_before_replace: bool,
    pub import_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_timeouts: Option<CustomTimeouts>,
    pub ignore_changes: Vec<String>,
    pub replace_on_changes: Vec<String>,
    pub aliases: Vec<String>,
    pub accept_secrets: bool,
    pub accept_resources: bool,
    pub additional_secret_outputs: Vec<String>,
    pub version: String,
    pub remote: bool,
    pub deleted_with: String,
    pub retain_on_delete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterResourceResponse {
    pub urn: String,
    pub id: String,
    pub object: Map<String, Value>,
    pub stable: bool,
    pub stables: Vec<String>,
    pub property_dependencies: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResourceRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    pub parent: String,
    pub properties: Map<String, Value>,
    pub dependencies: Vec<String>,
    pub provider: String,
    pub version: String,
    pub accept_secrets: bool,
    pub accept_resources: bool,
    pub additional_secret_outputs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadResourceResponse {
    pub urn: String,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterResourceOutputsRequest {
    pub urn: String,
    pub outputs: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    pub tok: String,
    pub args: Map<String, Value>,
    pub provider: String,
    pub version: String,
    pub accept_resources: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckFailure {
    pub property: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokeResponse {
    #[serde(rename = "return")]
    pub return_value: Map<String, Value>,
    pub failures: Vec<CheckFailure>,
}

/// Trait abstracting the engine's resource monitor.
///
/// Production code plugs in a transport; tests plug in a scripted fake.
pub trait ResourceMonitor: Send + Sync {
    fn supports_feature(&self, feature: &str) -> MonitorFuture<'_, bool>;

    fn register_resource(
        &self,
        request: RegisterResourceRequest,
    ) -> MonitorFuture<'_, RegisterResourceResponse>;

    fn read_resource(&self, request: ReadResourceRequest) -> MonitorFuture<'_, ReadResourceResponse>;

    fn register_resource_outputs(
        &self,
        request: RegisterResourceOutputsRequest,
    ) -> MonitorFuture<'_, ()>;

    fn invoke(&self, request: InvokeRequest) -> MonitorFuture<'_, InvokeResponse>;
}

/// Optional protocol capabilities the engine advertised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureSupport {
    pub secrets: bool,
    pub resource_references: bool,
    pub output_values: bool,
}

impl FeatureSupport {
    /// Ask the monitor about every optional feature. A failed query counts
    /// as unsupported.
    pub async fn query(monitor: &dyn ResourceMonitor) -> Self {
        let (secrets, resource_references, output_values) = futures::join!(
            monitor.supports_feature(FEATURE_SECRETS),
            monitor.supports_feature(FEATURE_RESOURCE_REFERENCES),
            monitor.supports_feature(FEATURE_OUTPUT_VALUES),
        );
        let features = FeatureSupport {
            secrets: secrets.unwrap_or(false),
            resource_references: resource_references.unwrap_or(false),
            output_values: output_values.unwrap_or(false),
        };
        debug!(?features, "engine features queried");
        features
    }

    /// Wire encoding for ordinary registrations and invokes.
    pub fn wire_options(&self) -> WireOptions {
        WireOptions {
            keep_secrets: self.secrets,
            keep_resources: self.resource_references,
            keep_output_values: false,
        }
    }

    /// Wire encoding for remote component registrations.
    pub fn remote_wire_options(&self) -> WireOptions {
        WireOptions {
            keep_output_values: self.output_values,
            ..self.wire_options()
        }
    }
}
