// tests/common/mod.rs

#![allow(dead_code, unused_imports)]

use std::sync::Arc;

use stackflow::config::RunInfo;
use stackflow::engine::Context;
use stackflow_test_utils::mock_monitor::MockMonitor;

pub use stackflow_test_utils::builders::{Observed, inputs, observe, test_run_info};
pub use stackflow_test_utils::{init_tracing, with_timeout};

/// A context wired to `monitor`, with features queried from it.
pub async fn context_for(info: RunInfo, monitor: &MockMonitor) -> Context {
    Context::new(info, Arc::new(monitor.clone())).await
}

/// Default context: project `proj`, stack `dev`, every feature supported.
pub async fn default_context() -> (Context, MockMonitor) {
    let monitor = MockMonitor::new();
    let ctx = context_for(test_run_info(), &monitor).await;
    (ctx, monitor)
}
