// src/output/leak.rs

//! Bookkeeping for cells that have been created but not yet settled.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Counts pending cells so a run can report the ones it leaked.
#[derive(Debug, Default)]
pub struct PendingTracker {
    next_id: AtomicU64,
    pending: Mutex<BTreeMap<u64, String>>,
}

impl PendingTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new pending cell described by `label`.
    pub fn track(self: &Arc<Self>, label: impl Into<String>) -> PendingToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, label.into());
        PendingToken {
            id,
            tracker: Arc::clone(self),
        }
    }

    fn complete(&self, id: u64) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Labels of every still-pending cell, in creation order.
    pub fn pending_labels(&self) -> Vec<String> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

/// Membership of one cell in a [`PendingTracker`].
///
/// Dropping a token without calling [`PendingToken::complete`] leaves the
/// cell counted as leaked.
#[derive(Debug)]
pub struct PendingToken {
    id: u64,
    tracker: Arc<PendingTracker>,
}

impl PendingToken {
    pub fn complete(self) {
        self.tracker.complete(self.id);
    }
}
