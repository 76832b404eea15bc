// src/engine/chain.rs

//! Serialization barrier for registration dispatch.
//!
//! Each registration enqueues a [`ChainLink`] synchronously when it is made,
//! capturing the previous tail. Before dispatching its RPC a registration
//! waits for the previous link to be released, so dispatch happens in
//! declaration order.

use std::sync::{Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::oneshot;

use crate::resource::ResourceId;

type Released = Shared<BoxFuture<'static, ()>>;

/// Process-local queue of registrations; one per context.
pub struct RegistrationChain {
    enabled: bool,
    tail: Mutex<Option<(Released, ResourceId)>>,
}

impl RegistrationChain {
    /// `enabled == false` turns every link into a no-op.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            tail: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append a link for `resource`. Reading and replacing the tail happen
    /// under one lock, so two registrations can never follow the same
    /// predecessor.
    pub fn enqueue(&self, resource: ResourceId) -> ChainLink {
        if !self.enabled {
            return ChainLink {
                previous: None,
                predecessor: None,
                release: None,
            };
        }
        let (tx, rx) = oneshot::channel::<()>();
        let released: Released = rx.map(|_| ()).boxed().shared();
        let previous = self
            .tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((released, resource));
        let (previous, predecessor) = match previous {
            Some((released, id)) => (Some(released), Some(id)),
            None => (None, None),
        };
        ChainLink {
            previous,
            predecessor,
            release: Some(tx),
        }
    }
}

/// One registration's place in the [`RegistrationChain`].
///
/// Dropping a link releases it.
pub struct ChainLink {
    previous: Option<Released>,
    predecessor: Option<ResourceId>,
    release: Option<oneshot::Sender<()>>,
}

impl ChainLink {
    /// Resource registered immediately before this one, if chained.
    pub fn predecessor(&self) -> Option<ResourceId> {
        self.predecessor
    }

    /// Wait until every earlier link has been released. Cancel-safe: an
    /// abandoned wait can be retried.
    pub async fn wait_turn(&mut self) {
        if let Some(previous) = &self.previous {
            previous.clone().await;
        }
        self.previous = None;
    }

    /// Let the next registration proceed.
    pub fn release(&mut self) {
        if let Some(tx) = self.release.take() {
            let _ = tx.send(());
        }
    }
}
