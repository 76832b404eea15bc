// src/output/resolver.rs

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

use crate::errors::{Result, RuntimeError};
use crate::output::leak::{PendingToken, PendingTracker};
use crate::output::{Resolved, Settled};
use crate::resource::ResourceSet;

struct ResolverSlot<T> {
    sender: oneshot::Sender<Settled<T>>,
    token: Option<PendingToken>,
}

/// Settles a pending [`Output`](crate::output::Output) exactly once.
pub struct Resolver<T> {
    label: String,
    slot: Mutex<Option<ResolverSlot<T>>>,
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("label", &self.label)
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T> Resolver<T> {
    pub(crate) fn channel(
        label: String,
        tracker: Option<&Arc<PendingTracker>>,
    ) -> (Self, oneshot::Receiver<Settled<T>>) {
        let (sender, receiver) = oneshot::channel();
        let token = tracker.map(|t| t.track(label.clone()));
        let resolver = Resolver {
            label,
            slot: Mutex::new(Some(ResolverSlot { sender, token })),
        };
        (resolver, receiver)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_settled(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Settle the cell. Fails with a protocol violation on a second call.
    pub fn resolve(
        &self,
        value: Option<T>,
        known: bool,
        secret: bool,
        dependencies: ResourceSet,
    ) -> Result<()> {
        self.send(Ok(Arc::new(Resolved {
            value,
            known,
            secret,
            dependencies,
        })))
    }

    /// Fail the cell; every awaiter observes `err`.
    pub fn reject(&self, err: RuntimeError) -> Result<()> {
        self.send(Err(err))
    }

    /// Settle as unknown unless already settled. Returns whether this call
    /// settled the cell.
    pub fn settle_unknown_if_pending(&self) -> bool {
        self.send(Ok(Arc::new(Resolved::unknown()))).is_ok()
    }

    fn send(&self, settled: Settled<T>) -> Result<()> {
        let slot = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(slot) = slot else {
            return Err(RuntimeError::ProtocolViolation(format!(
                "{} was resolved more than once",
                self.label
            )));
        };
        if let Some(token) = slot.token {
            token.complete();
        }
        // Nobody awaiting the cell any more is fine.
        let _ = slot.sender.send(settled);
        Ok(())
    }
}
