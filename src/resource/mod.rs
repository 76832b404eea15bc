// src/resource/mod.rs

//! Resource handles and their bookkeeping.
//!
//! A [`Resource`] is a cheap, clonable handle: an arena index plus the
//! immutable facts known at construction (kind, type, name) and the URN / id
//! cells that the registration settles later. Mutable lifecycle state lives
//! in the [`ResourceTable`] owned by the engine context.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::output::{Output, Resolved};
use crate::value::{PropertyValue, ResourceReference};

pub mod options;
pub mod table;
pub mod urn;

pub use options::{
    Alias, CustomTimeouts, DependsOn, InvokeOptions, ResourceOptions, Transformation,
    TransformationArgs, TransformationResult,
};
pub use table::{RegistrationState, ResourceTable};

/// Type token of the implicit root resource of every run.
pub const ROOT_STACK_TYPE: &str = "pulumi:pulumi:Stack";

/// Type prefix shared by all provider resources.
pub const PROVIDER_TYPE_PREFIX: &str = "pulumi:providers:";

/// Index of a resource in the run's [`ResourceTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(usize);

impl ResourceId {
    pub(crate) fn new(index: usize) -> Self {
        ResourceId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ordered set of resources; ordering gives deterministic wire output.
pub type ResourceSet = BTreeSet<ResourceId>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    /// Managed by a provider; has a physical id.
    Custom,
    /// Logical grouping of children. Remote components are constructed by
    /// the engine and behave like custom resources for dependency purposes.
    Component { remote: bool },
    /// A custom resource configuring a provider plugin.
    Provider { package: String },
    /// Placeholder for a resource known only by URN.
    DependencyStub,
}

impl ResourceKind {
    /// Whether the resource carries a physical id.
    pub fn has_physical_id(&self) -> bool {
        matches!(self, ResourceKind::Custom | ResourceKind::Provider { .. })
    }

    /// Whether dependents look through this resource to its children.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, ResourceKind::Component { remote: false })
    }

    /// Whether this resource is itself something a dependent waits for.
    pub fn is_wait_target(&self) -> bool {
        !self.is_aggregate()
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ResourceKind::Component { remote: true })
    }

    /// Whether the engine treats it as a custom resource.
    pub fn is_custom(&self) -> bool {
        self.has_physical_id()
    }
}

struct ResourceData {
    id: ResourceId,
    kind: ResourceKind,
    resource_type: String,
    name: String,
    urn: Output<String>,
    physical_id: Option<Output<String>>,
}

/// Handle to a constructed resource.
#[derive(Clone)]
pub struct Resource {
    data: Arc<ResourceData>,
}

impl Resource {
    pub(crate) fn new(
        id: ResourceId,
        kind: ResourceKind,
        resource_type: impl Into<String>,
        name: impl Into<String>,
        urn: Output<String>,
        physical_id: Option<Output<String>>,
    ) -> Self {
        Resource {
            data: Arc::new(ResourceData {
                id,
                kind,
                resource_type: resource_type.into(),
                name: name.into(),
                urn,
                physical_id,
            }),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.data.id
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.data.kind
    }

    pub fn resource_type(&self) -> &str {
        &self.data.resource_type
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn urn(&self) -> Output<String> {
        self.data.urn.clone()
    }

    /// Physical id; `None` for components and dependency stubs.
    pub fn physical_id(&self) -> Option<Output<String>> {
        self.data.physical_id.clone()
    }

    /// Package a resource type belongs to (`aws` for `aws:s3/bucket:Bucket`).
    pub fn package(&self) -> Option<&str> {
        match &self.data.kind {
            ResourceKind::Provider { package } => Some(package),
            _ => package_of(&self.data.resource_type),
        }
    }

    /// `type 'name'`, for diagnostics.
    pub fn describe(&self) -> String {
        format!("{} '{}'", self.data.resource_type, self.data.name)
    }

    /// Output holding a reference to this resource, depending on it.
    pub fn as_reference(&self) -> Output<PropertyValue> {
        let urn = self.urn();
        let physical_id = self.physical_id();
        let deps = [self.id()].into();
        Output::derived(deps, async move {
            let urn = urn.settle().await?;
            let Some(urn) = urn.value.clone().filter(|_| urn.known) else {
                return Ok(Arc::new(Resolved::unknown()));
            };
            let id = match physical_id {
                Some(id) => {
                    let id = id.settle().await?;
                    if id.known { id.value.clone() } else { None }
                }
                None => None,
            };
            Ok(Arc::new(Resolved::known(PropertyValue::ResourceReference(
                ResourceReference {
                    urn,
                    id,
                    package_version: String::new(),
                },
            ))))
        })
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.data.id == other.data.id
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data.id.hash(state);
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.data.id)
            .field("kind", &self.data.kind)
            .field("type", &self.data.resource_type)
            .field("name", &self.data.name)
            .finish()
    }
}

/// Package of a three-part type token; `None` for anything else.
pub fn package_of(resource_type: &str) -> Option<&str> {
    let parts: Vec<&str> = resource_type.split(':').collect();
    if parts.len() == 3 && !parts[0].is_empty() {
        Some(parts[0])
    } else {
        None
    }
}
