// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

/// Configuration as read from a TOML file.
///
/// ```toml
/// [run]
/// project = "web"
/// stack = "dev"
/// dry_run = true
/// parallel = 1
///
/// [runtime]
/// suppress_leak_check = false
///
/// [config]
/// "web:region" = "eu-west-1"
/// ```
///
/// Use [`RunInfo::try_from`] to validate it.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawRunConfig {
    #[serde(default)]
    pub run: RunSection,

    #[serde(default)]
    pub runtime: RuntimeSection,

    /// Stack configuration values from `[config]`.
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// `[run]` section: what the engine told us about this operation.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSection {
    #[serde(default)]
    pub project: String,

    #[serde(default)]
    pub stack: String,

    #[serde(default)]
    pub organization: Option<String>,

    /// `true` while previewing; provider-assigned values are then unknown.
    #[serde(default)]
    pub dry_run: bool,

    /// Maximum number of concurrent registrations. `<= 1` serializes
    /// dispatch in declaration order.
    #[serde(default = "default_parallel")]
    pub parallel: usize,

    #[serde(default)]
    pub monitor_address: Option<String>,

    #[serde(default)]
    pub engine_address: Option<String>,
}

fn default_parallel() -> usize {
    1
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            project: String::new(),
            stack: String::new(),
            organization: None,
            dry_run: false,
            parallel: default_parallel(),
            monitor_address: None,
            engine_address: None,
        }
    }
}

/// `[runtime]` section: knobs for the client runtime itself.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSection {
    /// Do not fail the run when deferred values were left pending.
    #[serde(default)]
    pub suppress_leak_check: bool,

    /// How often `shutdown` re-checks unresolved resources for dependency
    /// cycles while waiting for outstanding registrations.
    #[serde(default = "default_stall_check_interval_ms")]
    pub stall_check_interval_ms: u64,
}

fn default_stall_check_interval_ms() -> u64 {
    1000
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            suppress_leak_check: false,
            stall_check_interval_ms: default_stall_check_interval_ms(),
        }
    }
}

/// Validated run information shared by everything in an engine context.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInfo {
    pub project: String,
    pub stack: String,
    pub organization: Option<String>,
    pub dry_run: bool,
    pub parallel: usize,
    pub monitor_address: Option<String>,
    pub engine_address: Option<String>,
    pub suppress_leak_check: bool,
    pub stall_check_interval_ms: u64,
    pub config: BTreeMap<String, String>,
}

impl RunInfo {
    /// Construct run info directly, bypassing file loading.
    ///
    /// Used by embedding programs and tests; `project` and `stack` are still
    /// expected to be non-empty.
    pub fn new(project: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            stack: stack.into(),
            organization: None,
            dry_run: false,
            parallel: default_parallel(),
            monitor_address: None,
            engine_address: None,
            suppress_leak_check: false,
            stall_check_interval_ms: default_stall_check_interval_ms(),
            config: BTreeMap::new(),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_suppress_leak_check(mut self, suppress: bool) -> Self {
        self.suppress_leak_check = suppress;
        self
    }

    pub fn with_stall_check_interval_ms(mut self, ms: u64) -> Self {
        self.stall_check_interval_ms = ms.max(1);
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Whether registrations must be dispatched one at a time, in order.
    pub fn serialize_registrations(&self) -> bool {
        self.parallel <= 1
    }

    /// Look up a stack configuration value.
    ///
    /// Bare keys (`"region"`) are namespaced with the project name
    /// (`"<project>:region"`); keys that already contain a `:` are looked up
    /// as given.
    pub fn get_config(&self, key: &str) -> Option<&str> {
        let full_key = if key.contains(':') {
            key.to_string()
        } else {
            format!("{}:{}", self.project, key)
        };
        self.config.get(&full_key).map(String::as_str)
    }
}
