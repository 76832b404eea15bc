// src/lib.rs

pub mod config;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod logging;
pub mod output;
pub mod props;
pub mod resource;
pub mod value;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{RunInfo, load_and_validate};
use crate::engine::{Context, ResourceMonitor, RunSummary};
use crate::errors::Result;

pub use crate::engine::RegisteredResource;
pub use crate::output::Output;
pub use crate::resource::{Resource, ResourceOptions};
pub use crate::value::{InputMap, InputValue, PropertyValue};

/// High-level entry point for an embedding program.
///
/// This wires together:
/// - feature probing against the monitor
/// - the per-run [`Context`] (root stack, registration chain, leak tracker)
/// - the program body
/// - shutdown (waiting for registrations, error and leak reporting)
pub async fn run_program<F, Fut>(
    info: RunInfo,
    monitor: Arc<dyn ResourceMonitor>,
    program: F,
) -> Result<RunSummary>
where
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let ctx = Context::new(info, monitor).await;
    debug!(?ctx, "context ready");
    let summary = ctx.run(program).await?;
    info!(resources = summary.resources, "program completed");
    Ok(summary)
}

/// Like [`run_program`], reading the run configuration from a TOML file
/// (with `STACKFLOW_*` environment overrides).
pub async fn run_program_from_config<F, Fut>(
    config_path: impl AsRef<Path>,
    monitor: Arc<dyn ResourceMonitor>,
    program: F,
) -> Result<RunSummary>
where
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let info = load_and_validate(config_path)?;
    run_program(info, monitor, program).await
}
