// src/engine/context.rs

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::RunInfo;
use crate::engine::chain::RegistrationChain;
use crate::engine::monitor::{FeatureSupport, RegisterResourceOutputsRequest, ResourceMonitor};
use crate::engine::registration::RegistrationJob;
use crate::engine::tracker::{ErrorLog, RpcTracker};
use crate::errors::{Result, RuntimeError};
use crate::graph::{find_stall_cycle, transitive_wait_set};
use crate::output::{Output, PendingTracker};
use crate::props::wire::UNKNOWN_VALUE;
use crate::props::{ResourceOutputs, serialize_properties, transfer_properties};
use crate::resource::table::{IdentityResolvers, ResourceRecord};
use crate::resource::urn::{create_urn, parse_urn};
use crate::resource::{
    Alias, PROVIDER_TYPE_PREFIX, ROOT_STACK_TYPE, RegistrationState, Resource, ResourceId,
    ResourceKind, ResourceOptions, ResourceSet, ResourceTable, Transformation, TransformationArgs,
};
use crate::value::{InputMap, InputValue, PropertyValue};

/// A resource handle together with its output cells.
#[derive(Debug, Clone)]
pub struct RegisteredResource {
    pub resource: Resource,
    pub outputs: ResourceOutputs,
}

impl RegisteredResource {
    pub fn urn(&self) -> Output<String> {
        self.resource.urn()
    }

    pub fn id(&self) -> Option<Output<String>> {
        self.resource.physical_id()
    }

    /// Output cell for `key`; unknown if the property was never declared.
    pub fn output(&self, key: &str) -> Output<PropertyValue> {
        self.outputs
            .get(key)
            .cloned()
            .unwrap_or_else(|| Output::unknown_with(ResourceSet::from([self.resource.id()])))
    }
}

/// Final account of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub resources: usize,
    pub resolved: usize,
    pub failed: usize,
    pub errors: Vec<RuntimeError>,
    /// Labels of cells that never settled.
    pub leaked: Vec<String>,
    pub leak_check_suppressed: bool,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && (self.leaked.is_empty() || self.leak_check_suppressed)
    }

    /// Turn a failed run into its first error.
    pub fn into_result(self) -> Result<Self> {
        if let Some(err) = self.errors.first() {
            return Err(err.clone());
        }
        if !self.leaked.is_empty() && !self.leak_check_suppressed {
            return Err(RuntimeError::LeakedPending {
                count: self.leaked.len(),
                contexts: self.leaked,
            });
        }
        Ok(self)
    }
}

pub(crate) struct ContextInner {
    pub(crate) info: RunInfo,
    pub(crate) monitor: Arc<dyn ResourceMonitor>,
    pub(crate) features: FeatureSupport,
    pub(crate) table: Mutex<ResourceTable>,
    pub(crate) chain: RegistrationChain,
    pub(crate) pending: Arc<PendingTracker>,
    pub(crate) errors: ErrorLog,
    pub(crate) rpcs: RpcTracker,
    root: Mutex<Option<Resource>>,
    exports: Mutex<InputMap>,
}

/// Per-run state shared by every resource of a program.
///
/// Cheap to clone; all clones refer to the same run. Independent contexts
/// can coexist in one process.
#[derive(Clone)]
pub struct Context {
    pub(crate) inner: Arc<ContextInner>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("project", &self.inner.info.project)
            .field("stack", &self.inner.info.stack)
            .field("dry_run", &self.inner.info.dry_run)
            .field("features", &self.inner.features)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Create a context, probing the monitor for optional features.
    pub async fn new(info: RunInfo, monitor: Arc<dyn ResourceMonitor>) -> Self {
        let features = FeatureSupport::query(monitor.as_ref()).await;
        Self::with_features(info, monitor, features)
    }

    /// Create a context with features already known.
    pub fn with_features(
        info: RunInfo,
        monitor: Arc<dyn ResourceMonitor>,
        features: FeatureSupport,
    ) -> Self {
        let chain = RegistrationChain::new(info.serialize_registrations());
        Context {
            inner: Arc::new(ContextInner {
                info,
                monitor,
                features,
                table: Mutex::new(ResourceTable::new()),
                chain,
                pending: PendingTracker::new(),
                errors: ErrorLog::default(),
                rpcs: RpcTracker::default(),
                root: Mutex::new(None),
                exports: Mutex::new(InputMap::new()),
            }),
        }
    }

    pub fn info(&self) -> &RunInfo {
        &self.inner.info
    }

    pub fn is_dry_run(&self) -> bool {
        self.inner.info.dry_run
    }

    pub fn features(&self) -> FeatureSupport {
        self.inner.features
    }

    pub fn pending_tracker(&self) -> &Arc<PendingTracker> {
        &self.inner.pending
    }

    /// Stack configuration value; bare keys are namespaced by project.
    pub fn get_config(&self, key: &str) -> Option<&str> {
        self.inner.info.get_config(key)
    }

    /// The root stack resource, once [`Context::run`] has created it.
    pub fn root_resource(&self) -> Option<Resource> {
        self.inner
            .root
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn monitor(&self) -> &dyn ResourceMonitor {
        self.inner.monitor.as_ref()
    }

    pub(crate) fn lock_table(&self) -> MutexGuard<'_, ResourceTable> {
        self.inner
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn transition(
        &self,
        id: ResourceId,
        next: RegistrationState,
    ) -> Result<RegistrationState> {
        self.lock_table().transition(id, next)
    }

    pub fn resource_state(&self, resource: &Resource) -> Option<RegistrationState> {
        self.lock_table().state_of(resource.id())
    }

    pub fn children_of(&self, resource: &Resource) -> Vec<Resource> {
        let table = self.lock_table();
        table
            .children_of(resource.id())
            .into_iter()
            .filter_map(|id| table.handle(id))
            .collect()
    }

    pub fn resource_count(&self) -> usize {
        self.lock_table().len()
    }

    pub fn error_count(&self) -> usize {
        self.inner.errors.len()
    }

    /// Construct a resource handle without registering it.
    ///
    /// The URN cell (and the id cell for custom resources) exists from here
    /// on, so other resources may reference the handle before it registers.
    pub fn allocate(
        &self,
        kind: ResourceKind,
        resource_type: &str,
        name: &str,
        opts: &ResourceOptions,
    ) -> Result<Resource> {
        if resource_type.is_empty() {
            return Err(RuntimeError::ProtocolViolation(
                "missing resource type argument".to_string(),
            ));
        }
        if name.is_empty() {
            return Err(RuntimeError::ProtocolViolation(format!(
                "missing resource name argument for {resource_type}"
            )));
        }
        match &kind {
            ResourceKind::Provider { .. } if !resource_type.starts_with(PROVIDER_TYPE_PREFIX) => {
                return Err(RuntimeError::InvalidArgument(format!(
                    "provider type '{resource_type}' must start with '{PROVIDER_TYPE_PREFIX}'"
                )));
            }
            ResourceKind::DependencyStub => {
                return Err(RuntimeError::InvalidArgument(
                    "dependency stubs are created from URNs, not allocated".to_string(),
                ));
            }
            _ => {}
        }

        let parent = opts.parent.clone().or_else(|| self.root_resource());
        let mut table = self.lock_table();
        let id = table.next_id();
        let describe = format!("{resource_type} '{name}'");

        let (urn, urn_resolver) = Output::pending(
            ResourceSet::from([id]),
            Some(&self.inner.pending),
            format!("urn of {describe}"),
        );
        let (physical_id, id_resolver) = if kind.has_physical_id() {
            let (out, resolver) = Output::pending(
                ResourceSet::from([id]),
                Some(&self.inner.pending),
                format!("id of {describe}"),
            );
            (Some(out), Some(resolver))
        } else {
            (None, None)
        };

        let handle = Resource::new(id, kind, resource_type, name, urn, physical_id);
        let inherited = parent
            .as_ref()
            .map(|p| table.providers_of(p.id()))
            .unwrap_or_default();
        let providers = merge_providers(inherited, opts, handle.package());
        let (constructed, _) = watch::channel(!handle.kind().is_aggregate());

        table.insert(ResourceRecord {
            handle: handle.clone(),
            parent: parent.as_ref().map(Resource::id),
            children: Vec::new(),
            providers,
            transformations: Vec::new(),
            state: RegistrationState::Constructed,
            identity: Some(IdentityResolvers {
                urn: urn_resolver,
                id: id_resolver,
            }),
            declared: ResourceSet::new(),
            constructed,
        });
        table.transition(id, RegistrationState::Initialized)?;

        debug!(
            resource_type = %resource_type,
            name = %name,
            resource = %id,
            parent = ?parent.as_ref().map(Resource::id),
            "resource allocated"
        );
        Ok(handle)
    }

    /// Handle for a resource known only by URN. Stubs are already resolved.
    pub fn dependency_stub(&self, urn: &str) -> Resource {
        let mut table = self.lock_table();
        if let Some(existing) = table.find_stub(urn) {
            return existing;
        }
        let id = table.next_id();
        let (resource_type, name) = match parse_urn(urn) {
            Ok(parts) => (parts.resource_type().to_string(), parts.name),
            Err(_) => (String::new(), urn.to_string()),
        };
        let handle = Resource::new(
            id,
            ResourceKind::DependencyStub,
            resource_type,
            name,
            Output::from_resource(id, urn.to_string()),
            None,
        );
        let (constructed, _) = watch::channel(true);
        table.insert_stub(
            urn,
            ResourceRecord {
                handle: handle.clone(),
                parent: None,
                children: Vec::new(),
                providers: BTreeMap::new(),
                transformations: Vec::new(),
                state: RegistrationState::Resolved,
                identity: None,
                declared: ResourceSet::new(),
                constructed,
            },
        );
        handle
    }

    /// Register an allocated resource with the engine.
    ///
    /// Returns immediately with one pending output cell per input property;
    /// the registration itself runs as a background task. Registering the
    /// same handle twice is a protocol violation.
    pub fn register(
        &self,
        resource: &Resource,
        props: InputMap,
        opts: ResourceOptions,
    ) -> Result<ResourceOutputs> {
        let id = resource.id();
        let label = resource.describe();
        match self.lock_table().state_of(id) {
            Some(RegistrationState::Initialized) => {}
            Some(_) => {
                return Err(RuntimeError::ProtocolViolation(format!(
                    "{label} has already been registered"
                )));
            }
            None => {
                return Err(RuntimeError::ProtocolViolation(format!(
                    "{label} does not belong to this run"
                )));
            }
        }

        let (props, opts) = self.apply_transformations(resource, props, opts)?;
        if opts.id.is_some() && !resource.kind().is_custom() {
            return Err(RuntimeError::InvalidArgument(format!(
                "{label}: only custom resources can be read by id"
            )));
        }

        let identity = self.lock_table().take_identity(id)?;

        if let Err(err) = self.inner.rpcs.begin() {
            settle_identity_unknown(&identity);
            return Err(err);
        }

        let link = self.inner.chain.enqueue(id);
        {
            let mut declared = ResourceSet::new();
            for value in props.values() {
                value.collect_declared_dependencies(&mut declared);
            }
            for dep in &opts.depends_on {
                dep.collect_declared(&mut declared);
            }
            if let Some(prev) = link.predecessor() {
                declared.insert(prev);
            }
            let mut table = self.lock_table();
            table.set_declared(id, declared)?;
            table.transition(id, RegistrationState::Transferring)?;
        }

        let (outputs, resolvers) =
            transfer_properties(resource, &label, &props, Some(&self.inner.pending));
        debug!(
            resource_type = %resource.resource_type(),
            name = %resource.name(),
            properties = outputs.len(),
            "registration started"
        );

        let job = RegistrationJob {
            ctx: self.clone(),
            resource: resource.clone(),
            props,
            opts,
            identity,
            outputs: resolvers,
            link,
        };
        tokio::spawn(job.run());
        Ok(outputs)
    }

    /// Run the resource's own transformations, then those inherited from
    /// its parent chain, over `props` and `opts`.
    fn apply_transformations(
        &self,
        resource: &Resource,
        mut props: InputMap,
        mut opts: ResourceOptions,
    ) -> Result<(InputMap, ResourceOptions)> {
        let id = resource.id();
        let (parent, inherited) = {
            let table = self.lock_table();
            let parent = table.parent_of(id);
            let inherited = parent
                .map(|p| table.transformations_of(p))
                .unwrap_or_default();
            (parent, inherited)
        };
        let mut chain = opts.transformations.clone();
        chain.extend(inherited);
        if chain.is_empty() {
            return Ok((props, opts));
        }

        for transformation in &chain {
            let args = TransformationArgs {
                resource: resource.clone(),
                resource_type: resource.resource_type().to_string(),
                name: resource.name().to_string(),
                props,
                opts,
            };
            match transformation.apply(&args) {
                Some(result) => {
                    if let Some(new_parent) = &result.opts.parent {
                        if Some(new_parent.id()) != parent {
                            return Err(RuntimeError::InvalidArgument(format!(
                                "{}: transformations cannot change the parent of a resource",
                                resource.describe()
                            )));
                        }
                    }
                    props = result.props;
                    opts = result.opts;
                }
                None => {
                    props = args.props;
                    opts = args.opts;
                }
            }
        }

        debug!(
            resource_type = %resource.resource_type(),
            name = %resource.name(),
            transformations = chain.len(),
            "transformations applied"
        );
        let mut table = self.lock_table();
        let inherited_providers = parent
            .map(|p| table.providers_of(p))
            .unwrap_or_default();
        let providers = merge_providers(inherited_providers, &opts, resource.package());
        table.set_providers(id, providers)?;
        table.set_transformations(id, chain)?;
        Ok((props, opts))
    }

    /// Apply `transformation` to every resource registered from now on
    /// under the root stack.
    pub fn register_stack_transformation(&self, transformation: Transformation) -> Result<()> {
        let root = self.root_resource().ok_or_else(|| {
            RuntimeError::ProtocolViolation(
                "stack transformations can only be registered while a program runs".to_string(),
            )
        })?;
        self.lock_table().add_transformation(root.id(), transformation)
    }

    /// Allocate and register a custom resource.
    pub fn register_custom(
        &self,
        resource_type: &str,
        name: &str,
        props: InputMap,
        opts: ResourceOptions,
    ) -> Result<RegisteredResource> {
        let resource = self.allocate(ResourceKind::Custom, resource_type, name, &opts)?;
        let outputs = self.register(&resource, props, opts)?;
        Ok(RegisteredResource { resource, outputs })
    }

    /// Read an existing custom resource by its physical id.
    pub fn read_resource(
        &self,
        resource_type: &str,
        name: &str,
        id: impl Into<Output<String>>,
        props: InputMap,
        opts: ResourceOptions,
    ) -> Result<RegisteredResource> {
        self.register_custom(resource_type, name, props, opts.id(id))
    }

    /// Allocate and register a provider for `package`.
    pub fn register_provider(
        &self,
        package: &str,
        name: &str,
        props: InputMap,
        opts: ResourceOptions,
    ) -> Result<RegisteredResource> {
        let resource_type = format!("{PROVIDER_TYPE_PREFIX}{package}");
        let kind = ResourceKind::Provider {
            package: package.to_string(),
        };
        let resource = self.allocate(kind, &resource_type, name, &opts)?;
        let outputs = self.register(&resource, props, opts)?;
        Ok(RegisteredResource { resource, outputs })
    }

    /// Allocate and register a local component. Its child set stays open
    /// until [`Context::register_outputs`] or [`Context::complete_component`].
    pub fn register_component(
        &self,
        resource_type: &str,
        name: &str,
        opts: ResourceOptions,
    ) -> Result<Resource> {
        let resource = self.allocate(
            ResourceKind::Component { remote: false },
            resource_type,
            name,
            &opts,
        )?;
        self.register(&resource, InputMap::new(), opts)?;
        Ok(resource)
    }

    /// Register a component and run `body` to create its children. The
    /// component's child set is closed when `body` returns, whether or not
    /// it succeeded.
    pub async fn build_component<F, Fut>(
        &self,
        resource_type: &str,
        name: &str,
        opts: ResourceOptions,
        body: F,
    ) -> Result<Resource>
    where
        F: FnOnce(Context, Resource) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let component = self.register_component(resource_type, name, opts)?;
        let outcome = body(self.clone(), component.clone()).await;
        self.complete_component(&component);
        outcome.map_err(|err| RuntimeError::Program(format!("{err:#}")))?;
        Ok(component)
    }

    /// Register a component whose children live in another process.
    pub fn register_remote_component(
        &self,
        resource_type: &str,
        name: &str,
        props: InputMap,
        opts: ResourceOptions,
    ) -> Result<RegisteredResource> {
        let resource = self.allocate(
            ResourceKind::Component { remote: true },
            resource_type,
            name,
            &opts,
        )?;
        let outputs = self.register(&resource, props, opts)?;
        Ok(RegisteredResource { resource, outputs })
    }

    /// Close a component's child set without reporting outputs.
    pub fn complete_component(&self, component: &Resource) {
        self.lock_table().mark_constructed(component.id());
    }

    /// Report a component's outputs and close its child set.
    pub fn register_outputs(&self, component: &Resource, outputs: InputMap) -> Result<()> {
        self.complete_component(component);
        self.inner.rpcs.begin()?;
        let ctx = self.clone();
        let component = component.clone();
        tokio::spawn(async move {
            if let Err(err) = ctx.send_outputs(&component, outputs).await {
                error!(
                    resource_type = %component.resource_type(),
                    name = %component.name(),
                    error = %err,
                    "registering resource outputs failed"
                );
                ctx.inner.errors.record(err);
            }
            ctx.inner.rpcs.end();
        });
        Ok(())
    }

    async fn send_outputs(&self, component: &Resource, outputs: InputMap) -> Result<()> {
        let Some(urn) = known_urn(component).await? else {
            debug!(
                name = %component.name(),
                "component has no URN; skipping output registration"
            );
            return Ok(());
        };
        let label = format!("{} outputs", component.describe());
        let serialized =
            serialize_properties(&label, &outputs, self.inner.features.wire_options()).await?;
        self.monitor()
            .register_resource_outputs(RegisterResourceOutputsRequest {
                urn,
                outputs: serialized.object,
            })
            .await
    }

    /// Export a value from the root stack.
    pub fn export(&self, name: impl Into<String>, value: impl Into<InputValue>) {
        self.inner
            .exports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
    }

    /// Run a program against this context.
    ///
    /// Creates the root stack resource, runs `program`, registers exports
    /// as stack outputs and then shuts down, failing if anything failed or
    /// leaked during the run.
    pub async fn run<F, Fut>(&self, program: F) -> Result<RunSummary>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        if self.root_resource().is_some() {
            return Err(RuntimeError::ProtocolViolation(
                "a program has already run in this context".to_string(),
            ));
        }
        let info = &self.inner.info;
        let root_name = format!("{}-{}", info.project, info.stack);
        let root = self.register_component(ROOT_STACK_TYPE, &root_name, ResourceOptions::new())?;
        *self
            .inner
            .root
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(root.clone());

        info!(
            project = %info.project,
            stack = %info.stack,
            dry_run = info.dry_run,
            "running program"
        );
        if let Err(err) = program(self.clone()).await {
            let err = RuntimeError::Program(format!("{err:#}"));
            error!(error = %err, "program failed");
            self.inner.errors.record(err);
        }

        let exports = std::mem::take(
            &mut *self
                .inner
                .exports
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        self.register_outputs(&root, exports)?;
        self.shutdown().await?.into_result()
    }

    /// Wait for every outstanding registration, then forbid further RPCs
    /// and summarize the run.
    ///
    /// Fails early with [`RuntimeError::DependencyCycle`] if in-flight
    /// registrations wait on each other.
    pub async fn shutdown(&self) -> Result<RunSummary> {
        self.lock_table().mark_all_constructed();
        let interval = Duration::from_millis(self.inner.info.stall_check_interval_ms);
        let mut abandoned = Vec::new();
        let mut last_stranded = Vec::new();
        while !self.inner.rpcs.wait_idle(interval).await {
            let (cycle, stranded, dispatched) = {
                let table = self.lock_table();
                (
                    find_stall_cycle(&table),
                    table.stranded_dependencies(),
                    table.count_in(RegistrationState::Dispatched),
                )
            };
            if let Some(cycle) = cycle {
                self.inner.rpcs.close();
                error!(cycle = %cycle, "registrations are waiting on each other");
                return Err(RuntimeError::DependencyCycle(cycle));
            }
            // Two quiet intervals in a row with the same never-registered
            // dependencies: nothing left can register them.
            if dispatched == 0 && !stranded.is_empty() && stranded == last_stranded {
                abandoned.extend(self.abandon(&stranded));
                last_stranded.clear();
            } else {
                last_stranded = stranded;
            }
        }
        self.inner.rpcs.close();

        let summary = {
            let table = self.lock_table();
            RunSummary {
                resources: table.len(),
                resolved: table.count_in(RegistrationState::Resolved),
                failed: table.count_in(RegistrationState::Failed),
                errors: self.inner.errors.snapshot(),
                leaked: {
                    let mut leaked = abandoned;
                    leaked.extend(self.inner.pending.pending_labels());
                    leaked
                },
                leak_check_suppressed: self.inner.info.suppress_leak_check,
            }
        };
        if !summary.leaked.is_empty() {
            warn!(
                count = summary.leaked.len(),
                suppressed = summary.leak_check_suppressed,
                "deferred values were never resolved"
            );
            for label in &summary.leaked {
                debug!(pending = %label, "leaked deferred value");
            }
        }
        info!(
            resources = summary.resources,
            failed = summary.failed,
            errors = summary.errors.len(),
            "run finished"
        );
        Ok(summary)
    }

    /// Give up on resources that were allocated but never registered while
    /// registrations still wait on them. Their cells settle unknown so the
    /// waiters can finish; the returned labels are reported as leaked.
    fn abandon(&self, stranded: &[ResourceId]) -> Vec<String> {
        let mut labels = Vec::new();
        for id in stranded {
            let (describe, identity) = {
                let mut table = self.lock_table();
                let Some(handle) = table.handle(*id) else {
                    continue;
                };
                let Ok(identity) = table.take_identity(*id) else {
                    continue;
                };
                if let Err(err) = table.transition(*id, RegistrationState::Failed) {
                    warn!(error = %err, "could not mark abandoned resource failed");
                }
                (handle.describe(), identity)
            };
            warn!(
                resource = %describe,
                "dependency was never registered; settling its values as unknown"
            );
            if identity.urn.settle_unknown_if_pending() {
                labels.push(format!("urn of {describe}"));
            }
            if let Some(resolver) = &identity.id {
                if resolver.settle_unknown_if_pending() {
                    labels.push(format!("id of {describe}"));
                }
            }
        }
        labels
    }

    /// Resources a registration must wait for, given its direct references.
    pub async fn wait_set(&self, roots: ResourceSet, exclude: &ResourceSet) -> ResourceSet {
        transitive_wait_set(&self.inner.table, roots, exclude).await
    }

    /// Sorted, de-duplicated known URNs of `resources`.
    pub(crate) async fn urns_of(&self, resources: &ResourceSet) -> Vec<String> {
        let handles: Vec<Resource> = {
            let table = self.lock_table();
            resources.iter().filter_map(|id| table.handle(*id)).collect()
        };
        let urns = join_all(handles.iter().map(known_urn)).await;
        let mut out: Vec<String> = urns.into_iter().filter_map(|u| u.ok().flatten()).collect();
        out.sort();
        out.dedup();
        out
    }

    /// `urn::id` reference to a provider; the unknown sentinel stands in for
    /// an id that is not known yet.
    pub(crate) async fn provider_reference(&self, provider: &Resource) -> Result<String> {
        let urn = known_urn(provider).await?.ok_or_else(|| {
            RuntimeError::InvalidArgument(format!(
                "provider {} has no URN; its registration failed",
                provider.describe()
            ))
        })?;
        let id = match provider.physical_id() {
            Some(id) => {
                let id = id.settle().await?;
                match (&id.value, id.known) {
                    (Some(id), true) if !id.is_empty() => id.clone(),
                    _ => UNKNOWN_VALUE.to_string(),
                }
            }
            None => UNKNOWN_VALUE.to_string(),
        };
        Ok(format!("{urn}::{id}"))
    }

    /// Collapse an alias into the URN it names.
    pub(crate) async fn alias_urn(
        &self,
        alias: &Alias,
        resource: &Resource,
        parent: Option<&Resource>,
    ) -> Result<String> {
        if let Some(urn) = &alias.urn {
            return Ok(urn.clone());
        }
        let info = &self.inner.info;
        let name = alias.name.as_deref().unwrap_or(resource.name());
        let resource_type = alias
            .resource_type
            .as_deref()
            .unwrap_or(resource.resource_type());
        let stack = alias.stack.as_deref().unwrap_or(&info.stack);
        let project = alias.project.as_deref().unwrap_or(&info.project);

        let parent_urn = if alias.no_parent {
            None
        } else if let Some(p) = &alias.parent {
            known_urn(p).await?
        } else if let Some(urn) = &alias.parent_urn {
            Some(urn.clone())
        } else if let Some(p) = parent {
            known_urn(p).await?
        } else {
            None
        };
        let parent_type = match parent_urn {
            Some(urn) => Some(parse_urn(&urn)?.qualified_type),
            None => None,
        };
        Ok(create_urn(
            stack,
            project,
            parent_type.as_deref(),
            resource_type,
            name,
        ))
    }

    /// Dependency stubs for engine-reported property dependencies.
    pub(crate) fn stub_dependencies(
        &self,
        reported: &BTreeMap<String, Vec<String>>,
    ) -> BTreeMap<String, ResourceSet> {
        reported
            .iter()
            .map(|(key, urns)| {
                let set = urns.iter().map(|u| self.dependency_stub(u).id()).collect();
                (key.clone(), set)
            })
            .collect()
    }
}

/// The URN of `resource` if it settled known.
pub(crate) async fn known_urn(resource: &Resource) -> Result<Option<String>> {
    let urn = resource.urn().settle().await?;
    Ok(if urn.known { urn.value.clone() } else { None })
}

fn merge_providers(
    inherited: BTreeMap<String, Resource>,
    opts: &ResourceOptions,
    package: Option<&str>,
) -> BTreeMap<String, Resource> {
    let mut providers = inherited;
    providers.extend(opts.providers.iter().map(|(k, v)| (k.clone(), v.clone())));
    if let (Some(provider), Some(package)) = (&opts.provider, package) {
        providers.insert(package.to_string(), provider.clone());
    }
    providers
}

fn settle_identity_unknown(identity: &IdentityResolvers) {
    identity.urn.settle_unknown_if_pending();
    if let Some(id) = &identity.id {
        id.settle_unknown_if_pending();
    }
}
