// src/config/mod.rs

//! Run configuration for a stackflow program.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk and apply environment overrides (`loader.rs`).
//! - Validate basic invariants before a [`RunInfo`] is handed to the engine
//!   context (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{apply_env_overrides, default_config_path, load_and_validate, load_from_path};
pub use model::{RawRunConfig, RunInfo, RunSection, RuntimeSection};
