// src/resource/table.rs

use std::collections::BTreeMap;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::errors::{Result, RuntimeError};
use crate::output::Resolver;
use crate::resource::{
    ROOT_STACK_TYPE, Resource, ResourceId, ResourceKind, ResourceSet, Transformation,
};

/// Lifecycle of a single resource within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// Handle allocated, URN cell not yet wired.
    Constructed,
    /// URN (and id) cells allocated; waiting for the registration call.
    Initialized,
    /// Output cells allocated; inputs are being awaited and serialized.
    Transferring,
    /// Registration request sent to the engine.
    Dispatched,
    /// Engine responded; all cells settled from the response.
    Resolved,
    /// Something failed; all cells settled as unknown.
    Failed,
}

impl RegistrationState {
    /// Whether `self -> next` is a legal step.
    pub fn can_transition_to(self, next: RegistrationState) -> bool {
        use RegistrationState::*;
        matches!(
            (self, next),
            (Constructed, Initialized)
                | (Initialized, Transferring)
                | (Initialized, Failed)
                | (Transferring, Dispatched)
                | (Transferring, Failed)
                | (Dispatched, Resolved)
                | (Dispatched, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RegistrationState::Resolved | RegistrationState::Failed)
    }
}

/// Resolvers for the cells every resource owns, taken once registration
/// starts.
#[derive(Debug)]
pub(crate) struct IdentityResolvers {
    pub urn: Resolver<String>,
    pub id: Option<Resolver<String>>,
}

/// Mutable per-resource state.
#[derive(Debug)]
pub(crate) struct ResourceRecord {
    pub handle: Resource,
    pub parent: Option<ResourceId>,
    pub children: Vec<ResourceId>,
    /// Providers by package; resolved at construction from the parent chain
    /// and options.
    pub providers: BTreeMap<String, Resource>,
    /// Own transformations followed by every ancestor's, as of registration.
    pub transformations: Vec<Transformation>,
    pub state: RegistrationState,
    pub identity: Option<IdentityResolvers>,
    /// Dependencies visible before any input settled; used to diagnose
    /// stalls.
    pub declared: ResourceSet,
    /// `true` once the child set is final.
    pub constructed: watch::Sender<bool>,
}

/// Arena of every resource created during a run.
#[derive(Debug, Default)]
pub struct ResourceTable {
    records: Vec<ResourceRecord>,
    /// Dependency stubs by URN, so each URN is materialized once.
    stubs: BTreeMap<String, ResourceId>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn next_id(&self) -> ResourceId {
        ResourceId::new(self.records.len())
    }

    pub(crate) fn insert(&mut self, record: ResourceRecord) -> ResourceId {
        let id = record.handle.id();
        debug_assert_eq!(id, self.next_id());
        if let Some(parent) = record.parent {
            if let Some(p) = self.records.get_mut(parent.index()) {
                p.children.push(id);
            }
        }
        self.records.push(record);
        id
    }

    pub(crate) fn insert_stub(&mut self, urn: &str, record: ResourceRecord) -> ResourceId {
        let id = self.insert(record);
        self.stubs.insert(urn.to_string(), id);
        id
    }

    pub fn find_stub(&self, urn: &str) -> Option<Resource> {
        self.stubs.get(urn).and_then(|id| self.handle(*id))
    }

    fn record_mut(&mut self, id: ResourceId) -> Result<&mut ResourceRecord> {
        self.records
            .get_mut(id.index())
            .ok_or_else(|| RuntimeError::ProtocolViolation(format!("unknown resource {id}")))
    }

    pub fn handle(&self, id: ResourceId) -> Option<Resource> {
        self.records.get(id.index()).map(|r| r.handle.clone())
    }

    pub fn kind_of(&self, id: ResourceId) -> Option<ResourceKind> {
        self.records.get(id.index()).map(|r| r.handle.kind().clone())
    }

    pub fn state_of(&self, id: ResourceId) -> Option<RegistrationState> {
        self.records.get(id.index()).map(|r| r.state)
    }

    pub fn parent_of(&self, id: ResourceId) -> Option<ResourceId> {
        self.records.get(id.index()).and_then(|r| r.parent)
    }

    pub fn children_of(&self, id: ResourceId) -> Vec<ResourceId> {
        self.records
            .get(id.index())
            .map(|r| r.children.clone())
            .unwrap_or_default()
    }

    /// Parent chain, nearest first.
    pub fn ancestors(&self, id: ResourceId) -> Vec<ResourceId> {
        let mut out = Vec::new();
        let mut cur = self.parent_of(id);
        while let Some(p) = cur {
            if out.contains(&p) {
                warn!(resource = %id, "parent chain loops; stopping walk");
                break;
            }
            out.push(p);
            cur = self.parent_of(p);
        }
        out
    }

    /// Type token qualified by every non-root ancestor, outermost first
    /// (`parentType$childType`).
    pub fn qualified_type(&self, id: ResourceId) -> Option<String> {
        let own = self.records.get(id.index())?.handle.resource_type().to_string();
        let mut parts: Vec<String> = self
            .ancestors(id)
            .into_iter()
            .filter_map(|a| self.handle(a))
            .filter(|h| h.resource_type() != ROOT_STACK_TYPE)
            .map(|h| h.resource_type().to_string())
            .collect();
        parts.reverse();
        parts.push(own);
        Some(parts.join("$"))
    }

    pub fn providers_of(&self, id: ResourceId) -> BTreeMap<String, Resource> {
        self.records
            .get(id.index())
            .map(|r| r.providers.clone())
            .unwrap_or_default()
    }

    pub(crate) fn set_providers(
        &mut self,
        id: ResourceId,
        providers: BTreeMap<String, Resource>,
    ) -> Result<()> {
        self.record_mut(id)?.providers = providers;
        Ok(())
    }

    pub fn transformations_of(&self, id: ResourceId) -> Vec<Transformation> {
        self.records
            .get(id.index())
            .map(|r| r.transformations.clone())
            .unwrap_or_default()
    }

    pub(crate) fn set_transformations(
        &mut self,
        id: ResourceId,
        transformations: Vec<Transformation>,
    ) -> Result<()> {
        self.record_mut(id)?.transformations = transformations;
        Ok(())
    }

    /// Append a transformation seen by children registered from now on.
    pub(crate) fn add_transformation(
        &mut self,
        id: ResourceId,
        transformation: Transformation,
    ) -> Result<()> {
        self.record_mut(id)?.transformations.push(transformation);
        Ok(())
    }

    /// Move a resource to `next`, returning the previous state.
    pub fn transition(
        &mut self,
        id: ResourceId,
        next: RegistrationState,
    ) -> Result<RegistrationState> {
        let record = self.record_mut(id)?;
        let prev = record.state;
        if !prev.can_transition_to(next) {
            return Err(RuntimeError::ProtocolViolation(format!(
                "{} cannot move from {prev:?} to {next:?}",
                record.handle.describe()
            )));
        }
        record.state = next;
        debug!(resource = %id, from = ?prev, to = ?next, "registration state changed");
        Ok(prev)
    }

    pub(crate) fn take_identity(&mut self, id: ResourceId) -> Result<IdentityResolvers> {
        let record = self.record_mut(id)?;
        record.identity.take().ok_or_else(|| {
            RuntimeError::ProtocolViolation(format!(
                "{} has already been registered",
                record.handle.describe()
            ))
        })
    }

    pub(crate) fn set_declared(&mut self, id: ResourceId, declared: ResourceSet) -> Result<()> {
        self.record_mut(id)?.declared = declared;
        Ok(())
    }

    /// Mark a component's child set as final. Idempotent.
    pub fn mark_constructed(&self, id: ResourceId) {
        if let Some(record) = self.records.get(id.index()) {
            record.constructed.send_replace(true);
        }
    }

    pub fn mark_all_constructed(&self) {
        for record in &self.records {
            record.constructed.send_replace(true);
        }
    }

    pub fn construction_watch(&self, id: ResourceId) -> Option<watch::Receiver<bool>> {
        self.records
            .get(id.index())
            .map(|r| r.constructed.subscribe())
    }

    /// Resources still waiting on their inputs, with their declared
    /// dependencies.
    pub fn transferring(&self) -> Vec<(ResourceId, ResourceSet)> {
        self.records
            .iter()
            .filter(|r| r.state == RegistrationState::Transferring)
            .map(|r| (r.handle.id(), r.declared.clone()))
            .collect()
    }

    /// Never-registered resources that an in-flight registration declares
    /// as a dependency. Once the program has returned nothing will register
    /// them, so their dependents would wait forever.
    pub fn stranded_dependencies(&self) -> Vec<ResourceId> {
        let stranded: ResourceSet = self
            .records
            .iter()
            .filter(|r| r.state == RegistrationState::Transferring)
            .flat_map(|r| r.declared.iter().copied())
            .filter(|dep| self.state_of(*dep) == Some(RegistrationState::Initialized))
            .collect();
        stranded.into_iter().collect()
    }

    pub fn count_in(&self, state: RegistrationState) -> usize {
        self.records.iter().filter(|r| r.state == state).count()
    }
}
