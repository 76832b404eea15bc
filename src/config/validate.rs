// src/config/validate.rs

use crate::config::model::{RawRunConfig, RunInfo};
use crate::errors::{Result, RuntimeError};

impl TryFrom<RawRunConfig> for RunInfo {
    type Error = RuntimeError;

    fn try_from(raw: RawRunConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(RunInfo {
            project: raw.run.project,
            stack: raw.run.stack,
            organization: raw.run.organization,
            dry_run: raw.run.dry_run,
            parallel: raw.run.parallel,
            monitor_address: raw.run.monitor_address,
            engine_address: raw.run.engine_address,
            suppress_leak_check: raw.runtime.suppress_leak_check,
            stall_check_interval_ms: raw.runtime.stall_check_interval_ms,
            config: raw.config,
        })
    }
}

fn validate_raw_config(cfg: &RawRunConfig) -> Result<()> {
    validate_run_section(cfg)?;
    validate_runtime_section(cfg)?;
    validate_config_keys(cfg)?;
    Ok(())
}

fn validate_run_section(cfg: &RawRunConfig) -> Result<()> {
    if cfg.run.project.trim().is_empty() {
        return Err(RuntimeError::Config(
            "[run].project must be a non-empty string".to_string(),
        ));
    }
    if cfg.run.stack.trim().is_empty() {
        return Err(RuntimeError::Config(
            "[run].stack must be a non-empty string".to_string(),
        ));
    }
    Ok(())
}

fn validate_runtime_section(cfg: &RawRunConfig) -> Result<()> {
    if cfg.runtime.stall_check_interval_ms == 0 {
        return Err(RuntimeError::Config(
            "[runtime].stall_check_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_config_keys(cfg: &RawRunConfig) -> Result<()> {
    for key in cfg.config.keys() {
        if key.trim().is_empty() || key.starts_with(':') || key.ends_with(':') {
            return Err(RuntimeError::Config(format!(
                "invalid stack configuration key '{key}'"
            )));
        }
    }
    Ok(())
}
