use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value};
use stackflow::engine::{
    InvokeRequest, InvokeResponse, MonitorFuture, ReadResourceRequest, ReadResourceResponse,
    RegisterResourceOutputsRequest, RegisterResourceRequest, RegisterResourceResponse,
    ResourceMonitor,
};
use stackflow::errors::RuntimeError;
use stackflow::props::wire::UNKNOWN_VALUE;
use stackflow::resource::urn::{create_urn, parse_urn};

#[derive(Default)]
struct MockState {
    registrations: Vec<RegisterResourceRequest>,
    reads: Vec<ReadResourceRequest>,
    outputs: Vec<RegisterResourceOutputsRequest>,
    invokes: Vec<InvokeRequest>,
    fail_names: HashSet<String>,
    delays: HashMap<String, Duration>,
    features: HashSet<String>,
    extra_outputs: HashMap<String, Map<String, Value>>,
    property_dependencies: HashMap<String, BTreeMap<String, Vec<String>>>,
    invoke_results: HashMap<String, InvokeResponse>,
    echo_inputs: bool,
}

/// A scripted resource monitor that:
/// - records every request it receives
/// - assigns deterministic URNs and ids (`<name>-id`, empty in preview)
/// - echoes inputs back as outputs, merged with per-name extra outputs
/// - fails or delays registrations for configured names
#[derive(Clone)]
pub struct MockMonitor {
    stack: String,
    project: String,
    dry_run: bool,
    state: Arc<Mutex<MockState>>,
}

impl MockMonitor {
    /// Monitor for project `proj`, stack `dev`, supporting every feature.
    pub fn new() -> Self {
        let state = MockState {
            features: ["secrets", "resourceReferences", "outputValues"]
                .into_iter()
                .map(String::from)
                .collect(),
            echo_inputs: true,
            ..Default::default()
        };
        Self {
            stack: "dev".to_string(),
            project: "proj".to_string(),
            dry_run: false,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Behave like an engine running a preview: custom ids come back empty.
    pub fn preview(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_features(self, features: &[&str]) -> Self {
        self.state.lock().unwrap().features = features.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn fail_on(self, name: &str) -> Self {
        self.state.lock().unwrap().fail_names.insert(name.to_string());
        self
    }

    pub fn delay(self, name: &str, delay: Duration) -> Self {
        self.state
            .lock()
            .unwrap()
            .delays
            .insert(name.to_string(), delay);
        self
    }

    pub fn with_outputs(self, name: &str, outputs: Value) -> Self {
        let map = match outputs {
            Value::Object(map) => map,
            other => panic!("outputs must be an object, got {other}"),
        };
        self.state
            .lock()
            .unwrap()
            .extra_outputs
            .insert(name.to_string(), map);
        self
    }

    pub fn with_property_dependencies(
        self,
        name: &str,
        deps: BTreeMap<String, Vec<String>>,
    ) -> Self {
        self.state
            .lock()
            .unwrap()
            .property_dependencies
            .insert(name.to_string(), deps);
        self
    }

    pub fn with_invoke(self, token: &str, response: InvokeResponse) -> Self {
        self.state
            .lock()
            .unwrap()
            .invoke_results
            .insert(token.to_string(), response);
        self
    }

    /// Stop echoing inputs back as outputs.
    pub fn without_echo(self) -> Self {
        self.state.lock().unwrap().echo_inputs = false;
        self
    }

    pub fn into_arc(self) -> Arc<dyn ResourceMonitor> {
        Arc::new(self)
    }

    pub fn registrations(&self) -> Vec<RegisterResourceRequest> {
        self.state.lock().unwrap().registrations.clone()
    }

    pub fn registration(&self, name: &str) -> Option<RegisterResourceRequest> {
        self.registrations().into_iter().find(|r| r.name == name)
    }

    /// Names in the order their registrations reached the monitor.
    pub fn registered_names(&self) -> Vec<String> {
        self.registrations().into_iter().map(|r| r.name).collect()
    }

    pub fn reads(&self) -> Vec<ReadResourceRequest> {
        self.state.lock().unwrap().reads.clone()
    }

    pub fn registered_outputs(&self) -> Vec<RegisterResourceOutputsRequest> {
        self.state.lock().unwrap().outputs.clone()
    }

    pub fn invokes(&self) -> Vec<InvokeRequest> {
        self.state.lock().unwrap().invokes.clone()
    }

    fn urn_for(&self, parent: &str, resource_type: &str, name: &str) -> String {
        let parent_type = parse_urn(parent).ok().map(|p| p.qualified_type);
        create_urn(
            &self.stack,
            &self.project,
            parent_type.as_deref(),
            resource_type,
            name,
        )
    }

    fn delay_for(&self, name: &str) -> Option<Duration> {
        self.state.lock().unwrap().delays.get(name).copied()
    }

    fn should_fail(&self, name: &str) -> bool {
        self.state.lock().unwrap().fail_names.contains(name)
    }

    fn outputs_for(&self, name: &str, inputs: &Map<String, Value>) -> Map<String, Value> {
        let state = self.state.lock().unwrap();
        let mut out = if state.echo_inputs {
            inputs.clone()
        } else {
            Map::new()
        };
        if let Some(extra) = state.extra_outputs.get(name) {
            for (k, v) in extra {
                let v = if self.dry_run {
                    Value::from(UNKNOWN_VALUE)
                } else {
                    v.clone()
                };
                out.insert(k.clone(), v);
            }
        }
        out
    }
}

impl Default for MockMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceMonitor for MockMonitor {
    fn supports_feature(&self, feature: &str) -> MonitorFuture<'_, bool> {
        let supported = self.state.lock().unwrap().features.contains(feature);
        Box::pin(async move { Ok(supported) })
    }

    fn register_resource(
        &self,
        request: RegisterResourceRequest,
    ) -> MonitorFuture<'_, RegisterResourceResponse> {
        Box::pin(async move {
            if let Some(delay) = self.delay_for(&request.name) {
                tokio::time::sleep(delay).await;
            }
            self.state
                .lock()
                .unwrap()
                .registrations
                .push(request.clone());

            if self.should_fail(&request.name) {
                return Err(RuntimeError::Rpc(format!(
                    "mock engine rejected '{}'",
                    request.name
                )));
            }

            let urn = self.urn_for(&request.parent, &request.resource_type, &request.name);
            let id = if request.custom && !self.dry_run {
                format!("{}-id", request.name)
            } else {
                String::new()
            };
            let object = self.outputs_for(&request.name, &request.object);
            let property_dependencies = self
                .state
                .lock()
                .unwrap()
                .property_dependencies
                .get(&request.name)
                .cloned()
                .unwrap_or_default();
            Ok(RegisterResourceResponse {
                urn,
                id,
                object,
                stable: false,
                stables: Vec::new(),
                property_dependencies,
            })
        })
    }

    fn read_resource(
        &self,
        request: ReadResourceRequest,
    ) -> MonitorFuture<'_, ReadResourceResponse> {
        Box::pin(async move {
            self.state.lock().unwrap().reads.push(request.clone());
            if self.should_fail(&request.name) {
                return Err(RuntimeError::Rpc(format!(
                    "mock engine could not read '{}'",
                    request.name
                )));
            }
            let urn = self.urn_for(&request.parent, &request.resource_type, &request.name);
            let properties = self.outputs_for(&request.name, &request.properties);
            Ok(ReadResourceResponse { urn, properties })
        })
    }

    fn register_resource_outputs(
        &self,
        request: RegisterResourceOutputsRequest,
    ) -> MonitorFuture<'_, ()> {
        Box::pin(async move {
            self.state.lock().unwrap().outputs.push(request);
            Ok(())
        })
    }

    fn invoke(&self, request: InvokeRequest) -> MonitorFuture<'_, InvokeResponse> {
        Box::pin(async move {
            let response = {
                let mut state = self.state.lock().unwrap();
                state.invokes.push(request.clone());
                state.invoke_results.get(&request.tok).cloned()
            };
            response.ok_or_else(|| RuntimeError::Rpc(format!("unknown function {}", request.tok)))
        })
    }
}
