// src/engine/tracker.rs

//! Run-wide bookkeeping: recorded errors and outstanding RPCs.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error};

use crate::errors::{Result, RuntimeError};

/// Errors that failed part of the run without aborting it.
#[derive(Debug, Default)]
pub struct ErrorLog {
    errors: Mutex<Vec<RuntimeError>>,
}

impl ErrorLog {
    pub fn record(&self, err: RuntimeError) {
        error!(error = %err, "recorded run error");
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(err);
    }

    pub fn len(&self) -> usize {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<RuntimeError> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Default)]
struct RpcState {
    outstanding: usize,
    closed: bool,
}

/// Counts RPCs in flight and lets shutdown wait for them.
#[derive(Debug, Default)]
pub struct RpcTracker {
    state: Mutex<RpcState>,
    idle: Notify,
}

impl RpcTracker {
    /// Start an RPC. Fails once the tracker has been closed.
    pub fn begin(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(RuntimeError::ProtocolViolation(
                "attempted illegal RPC after program completion".to_string(),
            ));
        }
        state.outstanding += 1;
        Ok(())
    }

    pub fn end(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.outstanding = state.outstanding.saturating_sub(1);
        if state.outstanding == 0 {
            self.idle.notify_waiters();
        }
    }

    pub fn outstanding(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .outstanding
    }

    /// Wait up to `timeout` for the count to reach zero. Returns whether it
    /// did.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let outstanding = self.outstanding();
            if outstanding == 0 {
                return true;
            }
            debug!(outstanding, "waiting for outstanding RPCs");
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return false;
            }
        }
    }

    /// Forbid further RPCs.
    pub fn close(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed = true;
    }
}
