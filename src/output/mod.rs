// src/output/mod.rs

//! Deferred values with dependency tracking.
//!
//! An [`Output<T>`] is a cell that settles exactly once to a [`Resolved`]
//! snapshot: an optional value plus `known` and `secret` flags and any
//! resources discovered while settling. It also carries the set of resources
//! that contributed to it, fixed when the cell is created.
//!
//! Cells are shared (`Clone` is cheap) and awaiting a cell never drives the
//! producer twice. Derived cells are spawned onto the current runtime as soon
//! as they are built, so a chain of transformations makes progress even if
//! nobody awaits the tail.
//!
//! Reading a plain value out of a cell is only possible inside
//! [`run_in_callback_scope`]; everywhere else use the combinators.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, BoxFuture, Shared};
use tokio::runtime::Handle;
use tracing::trace;

use crate::errors::{Result, RuntimeError};
use crate::resource::{ResourceId, ResourceSet};
use crate::value::PropertyValue;

pub mod callback;
pub mod combinators;
pub mod leak;
pub mod resolver;

pub use callback::{current_callback, in_callback_scope, run_in_callback_scope};
pub use combinators::lift;
pub use leak::{PendingToken, PendingTracker};
pub use resolver::Resolver;

/// Final state of a settled cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    /// `None` means "undefined"; always `None` when `known` is false for
    /// cells produced by the combinators.
    pub value: Option<T>,
    pub known: bool,
    pub secret: bool,
    /// Resources discovered only while settling (flattened inner cells,
    /// engine-reported property dependencies).
    pub dependencies: ResourceSet,
}

impl<T> Resolved<T> {
    pub fn known(value: T) -> Self {
        Resolved {
            value: Some(value),
            known: true,
            secret: false,
            dependencies: ResourceSet::new(),
        }
    }

    pub fn unknown() -> Self {
        Resolved {
            value: None,
            known: false,
            secret: false,
            dependencies: ResourceSet::new(),
        }
    }

    pub fn with_secret(mut self, secret: bool) -> Self {
        self.secret = secret;
        self
    }
}

pub(crate) type Settled<T> = std::result::Result<Arc<Resolved<T>>, RuntimeError>;
type SettleFuture<T> = Shared<BoxFuture<'static, Settled<T>>>;

/// A deferred value.
pub struct Output<T> {
    dependencies: Arc<ResourceSet>,
    state: SettleFuture<T>,
}

impl<T> Clone for Output<T> {
    fn clone(&self) -> Self {
        Output {
            dependencies: Arc::clone(&self.dependencies),
            state: self.state.clone(),
        }
    }
}

impl<T> fmt::Debug for Output<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settled = match self.state.peek() {
            None => "pending",
            Some(Ok(r)) if r.known => "known",
            Some(Ok(_)) => "unknown",
            Some(Err(_)) => "rejected",
        };
        f.debug_struct("Output")
            .field("dependencies", &self.dependencies)
            .field("state", &settled)
            .finish()
    }
}

impl<T> Output<T>
where
    T: Send + Sync + 'static,
{
    /// Build a cell from a settle future. The future is not polled until
    /// someone awaits the cell.
    pub(crate) fn from_settle<F>(dependencies: ResourceSet, fut: F) -> Self
    where
        F: Future<Output = Settled<T>> + Send + 'static,
    {
        Output {
            dependencies: Arc::new(dependencies),
            state: fut.boxed().shared(),
        }
    }

    /// Like [`Output::from_settle`], but also starts driving the future on
    /// the current runtime (if any).
    pub(crate) fn derived<F>(dependencies: ResourceSet, fut: F) -> Self
    where
        F: Future<Output = Settled<T>> + Send + 'static,
    {
        let out = Self::from_settle(dependencies, fut);
        if let Ok(handle) = Handle::try_current() {
            let driver = out.state.clone();
            handle.spawn(async move {
                let _ = driver.await;
            });
        } else {
            trace!("no runtime available; derived output will settle lazily");
        }
        out
    }

    pub(crate) fn settled(dependencies: ResourceSet, resolved: Resolved<T>) -> Self {
        Self::from_settle(dependencies, future::ready(Ok(Arc::new(resolved))))
    }

    /// A known, non-secret value with no dependencies.
    pub fn known(value: T) -> Self {
        Self::settled(ResourceSet::new(), Resolved::known(value))
    }

    /// A known value attributed to one resource.
    pub fn from_resource(resource: ResourceId, value: T) -> Self {
        Self::settled(ResourceSet::from([resource]), Resolved::known(value))
    }

    /// An unknown value with no dependencies.
    pub fn unknown() -> Self {
        Self::unknown_with(ResourceSet::new())
    }

    pub fn unknown_with(dependencies: ResourceSet) -> Self {
        Self::settled(dependencies, Resolved::unknown())
    }

    /// A cell that fails every awaiter with `err`.
    pub fn rejected(err: RuntimeError) -> Self {
        Self::from_settle(ResourceSet::new(), future::ready(Err(err)))
    }

    /// Build a cell from a value future and a separate knownness future.
    ///
    /// When the value future fails, the cell rejects with that error.
    pub fn from_pending<V, K>(dependencies: ResourceSet, value: V, is_known: K) -> Self
    where
        V: Future<Output = Result<Option<T>>> + Send + 'static,
        K: Future<Output = bool> + Send + 'static,
    {
        Self::from_settle(dependencies, async move {
            let (value, known) = future::join(value, is_known).await;
            let value = value?;
            Ok(Arc::new(Resolved {
                value: if known { value } else { None },
                known,
                secret: false,
                dependencies: ResourceSet::new(),
            }))
        })
    }

    /// A cell settled later through the returned [`Resolver`].
    ///
    /// When a tracker is given, the cell counts as pending until resolved.
    pub fn pending(
        dependencies: ResourceSet,
        tracker: Option<&Arc<PendingTracker>>,
        label: impl Into<String>,
    ) -> (Self, Resolver<T>) {
        let label = label.into();
        let (resolver, receiver) = Resolver::channel(label.clone(), tracker);
        let fut = async move {
            match receiver.await {
                Ok(settled) => settled,
                Err(_) => Err(RuntimeError::ProtocolViolation(format!(
                    "{label} was dropped without being resolved"
                ))),
            }
        };
        (Self::from_settle(dependencies, fut), resolver)
    }

    /// Resources fixed at creation time.
    pub fn dependencies(&self) -> ResourceSet {
        (*self.dependencies).clone()
    }

    /// Creation-time resources plus those discovered while settling.
    pub async fn all_dependencies(&self) -> ResourceSet {
        let mut deps = self.dependencies();
        if let Ok(resolved) = self.settle().await {
            deps.extend(resolved.dependencies.iter().copied());
        }
        deps
    }

    pub async fn is_known(&self) -> Result<bool> {
        Ok(self.settle().await?.known)
    }

    pub async fn is_secret(&self) -> Result<bool> {
        Ok(self.settle().await?.secret)
    }

    /// Whether the cell has already settled (without awaiting it).
    pub fn is_settled(&self) -> bool {
        self.state.peek().is_some()
    }

    pub(crate) async fn settle(&self) -> Settled<T> {
        self.state.clone().await
    }

    /// Read the plain value. Only permitted inside
    /// [`run_in_callback_scope`]; unknown values read as `None`.
    pub async fn get(&self) -> Result<Option<T>>
    where
        T: Clone,
    {
        let Some(callback) = current_callback() else {
            return Err(RuntimeError::ValueUnavailable(
                "outputs can only be read inside a runtime-managed callback; \
                 use apply to transform the value instead"
                    .to_string(),
            ));
        };
        let resolved = self.settle().await?;
        trace!(callback, known = resolved.known, "output read directly");
        Ok(if resolved.known {
            resolved.value.clone()
        } else {
            None
        })
    }
}

impl<T> Output<T>
where
    T: Clone + Into<PropertyValue> + Send + Sync + 'static,
{
    /// Convert into a dynamically-typed property cell.
    pub fn into_property(self) -> Output<PropertyValue> {
        self.apply(Into::into)
    }
}

impl<T> From<T> for Output<T>
where
    T: Send + Sync + 'static,
{
    fn from(value: T) -> Self {
        Output::known(value)
    }
}
