// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawRunConfig, RunInfo};
use crate::errors::{Result, RuntimeError};

/// Load a configuration file from a given path and return the raw
/// [`RawRunConfig`].
///
/// This only performs TOML deserialization; it does **not** validate. Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawRunConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawRunConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file, apply `STACKFLOW_*` environment overrides and
/// validate the result.
///
/// Environment overrides are applied *before* validation so that a file that
/// leaves `project`/`stack` empty is still usable when the engine supplies
/// them through the environment.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<RunInfo> {
    let mut raw = load_from_path(&path)?;
    apply_env_overrides(&mut raw, |key| std::env::var(key).ok())?;
    RunInfo::try_from(raw)
}

/// Default config path: `Stackflow.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Stackflow.toml")
}

/// Apply environment overrides using the given lookup function.
///
/// Taking the lookup as a parameter keeps this testable without mutating the
/// process environment.
pub fn apply_env_overrides<F>(raw: &mut RawRunConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(project) = lookup("STACKFLOW_PROJECT") {
        raw.run.project = project;
    }
    if let Some(stack) = lookup("STACKFLOW_STACK") {
        raw.run.stack = stack;
    }
    if let Some(dry_run) = lookup("STACKFLOW_DRY_RUN") {
        raw.run.dry_run = parse_bool("STACKFLOW_DRY_RUN", &dry_run)?;
    }
    if let Some(parallel) = lookup("STACKFLOW_PARALLEL") {
        raw.run.parallel = parallel.trim().parse().map_err(|_| {
            RuntimeError::Config(format!(
                "STACKFLOW_PARALLEL must be a non-negative integer (got '{parallel}')"
            ))
        })?;
    }
    if let Some(addr) = lookup("STACKFLOW_MONITOR") {
        raw.run.monitor_address = Some(addr);
    }
    if let Some(addr) = lookup("STACKFLOW_ENGINE") {
        raw.run.engine_address = Some(addr);
    }
    if let Some(suppress) = lookup("STACKFLOW_SUPPRESS_LEAK_CHECK") {
        raw.runtime.suppress_leak_check = parse_bool("STACKFLOW_SUPPRESS_LEAK_CHECK", &suppress)?;
    }

    debug!(
        project = %raw.run.project,
        stack = %raw.run.stack,
        dry_run = raw.run.dry_run,
        parallel = raw.run.parallel,
        "applied environment overrides to run config"
    );

    Ok(())
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        other => Err(RuntimeError::Config(format!(
            "{name} must be a boolean (got '{other}')"
        ))),
    }
}
