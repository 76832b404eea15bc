// src/engine/registration.rs

//! Background task driving one resource from `Transferring` to a terminal
//! state.
//!
//! The task:
//! 1. awaits the parent URN, explicit dependencies and every input property,
//!    serializing the inputs and collecting the resources they reference,
//! 2. expands those references into the set of resources to wait for,
//! 3. waits for its turn in the registration chain,
//! 4. sends the register (or read) request,
//! 5. settles the URN, id and output cells from the response.
//!
//! Any failure settles every cell that is still pending as unknown and
//! records the error on the context.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::engine::chain::ChainLink;
use crate::engine::context::{Context, known_urn};
use crate::engine::monitor::{
    ReadResourceRequest, ReadResourceResponse, RegisterResourceRequest, RegisterResourceResponse,
};
use crate::errors::{Result, RuntimeError};
use crate::graph::gather_explicit_dependencies;
use crate::output::Output;
use crate::props::{
    PropertyResolvers, deserialize_properties, resolve_properties, serialize_resource_properties,
    settle_unknown,
};
use crate::resource::table::IdentityResolvers;
use crate::resource::{RegistrationState, Resource, ResourceKind, ResourceOptions, ResourceSet};
use crate::value::InputMap;

pub(crate) struct RegistrationJob {
    pub ctx: Context,
    pub resource: Resource,
    pub props: InputMap,
    pub opts: ResourceOptions,
    pub identity: IdentityResolvers,
    pub outputs: PropertyResolvers,
    pub link: ChainLink,
}

/// Inputs ready for the wire.
struct PreparedRequest {
    parent_urn: String,
    object: Map<String, Value>,
    dependencies: Vec<String>,
    property_dependencies: BTreeMap<String, Vec<String>>,
    provider: String,
    providers: BTreeMap<String, String>,
    aliases: Vec<String>,
    deleted_with: String,
}

enum Completion {
    Registered(RegisterResourceResponse),
    Read { id: String, response: ReadResourceResponse },
    /// Nothing to ask the engine (read of an id unknown during preview).
    Skipped,
}

impl RegistrationJob {
    pub(crate) async fn run(mut self) {
        match self.execute().await {
            Ok(()) => debug!(
                resource_type = %self.resource.resource_type(),
                name = %self.resource.name(),
                "resource registration resolved"
            ),
            Err(err) => self.fail(err),
        }
        self.link.release();
        self.ctx.inner.rpcs.end();
    }

    async fn execute(&mut self) -> Result<()> {
        let prepared = self.prepare().await?;
        self.link.wait_turn().await;
        self.ctx
            .transition(self.resource.id(), RegistrationState::Dispatched)?;

        let completion = match self.opts.id.clone() {
            Some(id) => self.dispatch_read(id, prepared).await?,
            None => self.dispatch_register(prepared).await?,
        };
        self.link.release();

        self.complete(completion)?;
        self.ctx
            .transition(self.resource.id(), RegistrationState::Resolved)?;
        Ok(())
    }

    fn label(&self) -> String {
        self.resource.describe()
    }

    async fn prepare(&self) -> Result<PreparedRequest> {
        let ctx = &self.ctx;
        let id = self.resource.id();
        let (parent, exclude, providers) = {
            let table = ctx.lock_table();
            let parent = table.parent_of(id).and_then(|p| table.handle(p));
            let mut exclude: ResourceSet = table.ancestors(id).into_iter().collect();
            exclude.insert(id);
            (parent, exclude, table.providers_of(id))
        };

        let parent_urn = match &parent {
            Some(p) => known_urn(p).await?.unwrap_or_default(),
            None => String::new(),
        };

        let explicit = gather_explicit_dependencies(&self.opts.depends_on).await?;
        let features = ctx.features();
        let wire = if self.resource.kind().is_remote() {
            features.remote_wire_options()
        } else {
            features.wire_options()
        };
        let serialized = serialize_resource_properties(&self.label(), &self.props, wire).await?;

        let mut roots = explicit;
        roots.extend(serialized.dependencies.iter().copied());
        let wait_set = ctx.wait_set(roots, &exclude).await;
        let dependencies = ctx.urns_of(&wait_set).await;

        let mut property_dependencies = BTreeMap::new();
        for (key, deps) in &serialized.property_dependencies {
            let set = ctx.wait_set(deps.clone(), &exclude).await;
            property_dependencies.insert(key.clone(), ctx.urns_of(&set).await);
        }

        let provider = match self.resource.kind() {
            ResourceKind::Provider { .. } => None,
            _ => self
                .resource
                .package()
                .and_then(|pkg| providers.get(pkg).cloned()),
        };
        let provider = match provider {
            Some(p) => ctx.provider_reference(&p).await?,
            None => String::new(),
        };

        let mut provider_refs = BTreeMap::new();
        if self.resource.kind().is_remote() {
            for (pkg, p) in &providers {
                provider_refs.insert(pkg.clone(), ctx.provider_reference(p).await?);
            }
        }

        let mut aliases = Vec::with_capacity(self.opts.aliases.len());
        for alias in &self.opts.aliases {
            aliases.push(ctx.alias_urn(alias, &self.resource, parent.as_ref()).await?);
        }

        let deleted_with = match &self.opts.deleted_with {
            Some(r) => known_urn(r).await?.unwrap_or_default(),
            None => String::new(),
        };

        debug!(
            resource_type = %self.resource.resource_type(),
            name = %self.resource.name(),
            dependencies = dependencies.len(),
            "inputs prepared"
        );
        Ok(PreparedRequest {
            parent_urn,
            object: serialized.object,
            dependencies,
            property_dependencies,
            provider,
            providers: provider_refs,
            aliases,
            deleted_with,
        })
    }

    fn remote_error(&self, err: RuntimeError) -> RuntimeError {
        RuntimeError::RemoteRegistration {
            resource_type: self.resource.resource_type().to_string(),
            name: self.resource.name().to_string(),
            message: err.to_string(),
        }
    }

    async fn dispatch_register(&self, prepared: PreparedRequest) -> Result<Completion> {
        let opts = &self.opts;
        let kind = self.resource.kind();
        let request = RegisterResourceRequest {
            resource_type: self.resource.resource_type().to_string(),
            name: self.resource.name().to_string(),
            parent: prepared.parent_urn,
            custom: kind.is_custom(),
            object: prepared.object,
            protect: opts.protect,
            dependencies: prepared.dependencies,
            provider: prepared.provider,
            providers: prepared.providers,
            property_dependencies: prepared.property_dependencies,
            delete_before_replace: opts.delete_before_replace,
            import_id: opts.import_id.clone().unwrap_or_default(),
            custom_timeouts: opts.custom_timeouts.clone(),
            ignore_changes: opts.ignore_changes.clone(),
            replace_on_changes: opts.replace_on_changes.clone(),
            aliases: prepared.aliases,
            accept_secrets: true,
            accept_resources: self.ctx.features().resource_references,
            additional_secret_outputs: opts.additional_secret_outputs.clone(),
            version: opts.version.clone().unwrap_or_default(),
            remote: kind.is_remote(),
            deleted_with: prepared.deleted_with,
            retain_on_delete: opts.retain_on_delete,
        };
        debug!(
            resource_type = %request.resource_type,
            name = %request.name,
            custom = request.custom,
            remote = request.remote,
            "dispatching RegisterResource"
        );
        let response = self
            .ctx
            .monitor()
            .register_resource(request)
            .await
            .map_err(|e| self.remote_error(e))?;
        Ok(Completion::Registered(response))
    }

    async fn dispatch_read(
        &self,
        id: Output<String>,
        prepared: PreparedRequest,
    ) -> Result<Completion> {
        let settled = id.settle().await?;
        let id = match (&settled.value, settled.known) {
            (Some(id), true) if !id.is_empty() => id.clone(),
            _ if self.ctx.is_dry_run() => {
                debug!(name = %self.resource.name(), "read id unknown during preview; skipping");
                return Ok(Completion::Skipped);
            }
            _ => {
                return Err(RuntimeError::InvalidArgument(format!(
                    "{}: cannot read a resource whose id is unknown",
                    self.label()
                )));
            }
        };
        let request = ReadResourceRequest {
            id: id.clone(),
            resource_type: self.resource.resource_type().to_string(),
            name: self.resource.name().to_string(),
            parent: prepared.parent_urn,
            properties: prepared.object,
            dependencies: prepared.dependencies,
            provider: prepared.provider,
            version: self.opts.version.clone().unwrap_or_default(),
            accept_secrets: true,
            accept_resources: self.ctx.features().resource_references,
            additional_secret_outputs: self.opts.additional_secret_outputs.clone(),
        };
        debug!(
            resource_type = %request.resource_type,
            name = %request.name,
            id = %request.id,
            "dispatching ReadResource"
        );
        let response = self
            .ctx
            .monitor()
            .read_resource(request)
            .await
            .map_err(|e| self.remote_error(e))?;
        Ok(Completion::Read { id, response })
    }

    fn complete(&self, completion: Completion) -> Result<()> {
        let dry_run = self.ctx.is_dry_run();
        let label = self.label();
        match completion {
            Completion::Registered(response) => {
                self.settle_identity(&response.urn, Some(&response.id))?;
                let values = deserialize_properties(&response.object, dry_run)?;
                let deps = self.ctx.stub_dependencies(&response.property_dependencies);
                resolve_properties(&label, &self.outputs, &values, dry_run, &deps)
            }
            Completion::Read { id, response } => {
                self.settle_identity(&response.urn, Some(&id))?;
                let values = deserialize_properties(&response.properties, dry_run)?;
                resolve_properties(&label, &self.outputs, &values, dry_run, &BTreeMap::new())
            }
            Completion::Skipped => {
                self.identity.urn.settle_unknown_if_pending();
                if let Some(id) = &self.identity.id {
                    id.settle_unknown_if_pending();
                }
                settle_unknown(&self.outputs);
                Ok(())
            }
        }
    }

    fn settle_identity(&self, urn: &str, id: Option<&str>) -> Result<()> {
        self.identity
            .urn
            .resolve(Some(urn.to_string()), true, false, ResourceSet::new())?;
        if let Some(resolver) = &self.identity.id {
            let id = id.unwrap_or_default();
            if id.is_empty() && self.ctx.is_dry_run() {
                resolver.resolve(None, false, false, ResourceSet::new())?;
            } else {
                resolver.resolve(Some(id.to_string()), true, false, ResourceSet::new())?;
            }
        }
        Ok(())
    }

    fn fail(&self, err: RuntimeError) {
        let mut settled = 0;
        if self.identity.urn.settle_unknown_if_pending() {
            settled += 1;
        }
        if let Some(id) = &self.identity.id {
            if id.settle_unknown_if_pending() {
                settled += 1;
            }
        }
        settled += settle_unknown(&self.outputs);
        error!(
            resource_type = %self.resource.resource_type(),
            name = %self.resource.name(),
            settled,
            error = %err,
            "resource registration failed; outputs settled as unknown"
        );
        if let Err(transition_err) = self
            .ctx
            .transition(self.resource.id(), RegistrationState::Failed)
        {
            warn!(error = %transition_err, "could not mark registration failed");
        }
        self.ctx.inner.errors.record(err);
    }
}
