// src/resource/options.rs

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};

use crate::output::Output;
use crate::resource::{Resource, ResourceSet};
use crate::value::InputMap;

/// Explicit dependency declaration, possibly deferred.
#[derive(Clone)]
pub enum DependsOn {
    Resource(Resource),
    List(Vec<DependsOn>),
    Output(Output<Vec<Resource>>),
    Future(Shared<BoxFuture<'static, DependsOn>>),
}

impl DependsOn {
    pub fn future<F>(fut: F) -> Self
    where
        F: Future<Output = DependsOn> + Send + 'static,
    {
        DependsOn::Future(fut.boxed().shared())
    }

    /// Resources named without awaiting anything.
    pub fn collect_declared(&self, out: &mut ResourceSet) {
        match self {
            DependsOn::Resource(r) => {
                out.insert(r.id());
            }
            DependsOn::List(items) => {
                for item in items {
                    item.collect_declared(out);
                }
            }
            DependsOn::Output(o) => out.extend(o.dependencies()),
            DependsOn::Future(_) => {}
        }
    }
}

impl fmt::Debug for DependsOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependsOn::Resource(r) => f.debug_tuple("Resource").field(r).finish(),
            DependsOn::List(items) => f.debug_tuple("List").field(items).finish(),
            DependsOn::Output(o) => f.debug_tuple("Output").field(o).finish(),
            DependsOn::Future(_) => f.write_str("Future(..)"),
        }
    }
}

impl From<Resource> for DependsOn {
    fn from(r: Resource) -> Self {
        DependsOn::Resource(r)
    }
}

impl From<&Resource> for DependsOn {
    fn from(r: &Resource) -> Self {
        DependsOn::Resource(r.clone())
    }
}

impl From<Vec<Resource>> for DependsOn {
    fn from(rs: Vec<Resource>) -> Self {
        DependsOn::List(rs.into_iter().map(DependsOn::Resource).collect())
    }
}

impl From<Output<Vec<Resource>>> for DependsOn {
    fn from(o: Output<Vec<Resource>>) -> Self {
        DependsOn::Output(o)
    }
}

/// Engine-side operation timeouts, as duration strings ("5m").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomTimeouts {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub create: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub update: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub delete: String,
}

/// A previous identity of a resource.
///
/// Either a full URN, or a partial spec whose unset fields default to the
/// resource's current values.
#[derive(Debug, Clone, Default)]
pub struct Alias {
    pub urn: Option<String>,
    pub name: Option<String>,
    pub resource_type: Option<String>,
    pub parent: Option<Resource>,
    pub parent_urn: Option<String>,
    pub stack: Option<String>,
    pub project: Option<String>,
    /// The resource previously had no parent.
    pub no_parent: bool,
}

impl Alias {
    pub fn urn(urn: impl Into<String>) -> Self {
        Alias {
            urn: Some(urn.into()),
            ..Default::default()
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Alias {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn with_parent(mut self, parent: &Resource) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn without_parent(mut self) -> Self {
        self.no_parent = true;
        self
    }
}

/// What a transformation sees of a resource about to register.
pub struct TransformationArgs {
    pub resource: Resource,
    pub resource_type: String,
    pub name: String,
    pub props: InputMap,
    pub opts: ResourceOptions,
}

/// Replacement props and options for a resource.
pub struct TransformationResult {
    pub props: InputMap,
    pub opts: ResourceOptions,
}

type TransformFn = dyn Fn(&TransformationArgs) -> Option<TransformationResult> + Send + Sync;

/// Rewrites a resource's props and options before it registers; `None`
/// leaves them as they were. Transformations given to a resource also apply
/// to its children.
#[derive(Clone)]
pub struct Transformation(Arc<TransformFn>);

impl Transformation {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&TransformationArgs) -> Option<TransformationResult> + Send + Sync + 'static,
    {
        Transformation(Arc::new(f))
    }

    pub fn apply(&self, args: &TransformationArgs) -> Option<TransformationResult> {
        (self.0)(args)
    }
}

impl fmt::Debug for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transformation(..)")
    }
}

/// Options for registering or reading a resource.
#[derive(Debug, Clone, Default)]
pub struct ResourceOptions {
    pub parent: Option<Resource>,
    pub depends_on: Vec<DependsOn>,
    pub protect: bool,
    /// Provider for this resource's own package.
    pub provider: Option<Resource>,
    /// Providers by package, inherited by children.
    pub providers: BTreeMap<String, Resource>,
    pub aliases: Vec<Alias>,
    pub custom_timeouts: Option<CustomTimeouts>,
    pub deleted_with: Option<Resource>,
    pub ignore_changes: Vec<String>,
    pub replace_on_changes: Vec<String>,
    pub delete_before_replace: bool,
    pub retain_on_delete: bool,
    pub import_id: Option<String>,
    /// Physical id of an existing resource to read instead of managing.
    pub id: Option<Output<String>>,
    pub additional_secret_outputs: Vec<String>,
    pub version: Option<String>,
    /// Run in order, before the transformations inherited from the parent.
    pub transformations: Vec<Transformation>,
}

impl ResourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent(mut self, parent: &Resource) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn depends_on(mut self, dep: impl Into<DependsOn>) -> Self {
        self.depends_on.push(dep.into());
        self
    }

    pub fn protect(mut self, protect: bool) -> Self {
        self.protect = protect;
        self
    }

    pub fn provider(mut self, provider: &Resource) -> Self {
        self.provider = Some(provider.clone());
        self
    }

    /// Add a provider to the inherited provider map, keyed by its package.
    pub fn with_provider_for_children(mut self, provider: &Resource) -> Self {
        if let Some(pkg) = provider.package() {
            self.providers.insert(pkg.to_string(), provider.clone());
        }
        self
    }

    pub fn alias(mut self, alias: Alias) -> Self {
        self.aliases.push(alias);
        self
    }

    pub fn custom_timeouts(mut self, timeouts: CustomTimeouts) -> Self {
        self.custom_timeouts = Some(timeouts);
        self
    }

    pub fn deleted_with(mut self, resource: &Resource) -> Self {
        self.deleted_with = Some(resource.clone());
        self
    }

    pub fn ignore_changes<I, S>(mut self, props: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_changes.extend(props.into_iter().map(Into::into));
        self
    }

    pub fn replace_on_changes<I, S>(mut self, props: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replace_on_changes.extend(props.into_iter().map(Into::into));
        self
    }

    pub fn delete_before_replace(mut self, yes: bool) -> Self {
        self.delete_before_replace = yes;
        self
    }

    pub fn retain_on_delete(mut self, yes: bool) -> Self {
        self.retain_on_delete = yes;
        self
    }

    pub fn import(mut self, id: impl Into<String>) -> Self {
        self.import_id = Some(id.into());
        self
    }

    pub fn id(mut self, id: impl Into<Output<String>>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn additional_secret_outputs<I, S>(mut self, props: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.additional_secret_outputs
            .extend(props.into_iter().map(Into::into));
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn transformation(mut self, transformation: Transformation) -> Self {
        self.transformations.push(transformation);
        self
    }
}

/// Options for a provider function call.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    pub parent: Option<Resource>,
    pub provider: Option<Resource>,
    pub version: Option<String>,
}

impl InvokeOptions {
    pub fn parent(mut self, parent: &Resource) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn provider(mut self, provider: &Resource) -> Self {
        self.provider = Some(provider.clone());
        self
    }
}
