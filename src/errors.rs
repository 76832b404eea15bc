// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! `RuntimeError` is `Clone` because a rejected [`Output`](crate::output::Output)
//! hands the same error to every awaiter of the cell.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// A logic bug in the caller or in the registration protocol itself
    /// (double registration, double resolution, ...). Never retried.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine rejected a resource registration.
    #[error("registration of {resource_type} '{name}' failed: {message}")]
    RemoteRegistration {
        resource_type: String,
        name: String,
        message: String,
    },

    /// A property could not be represented on the wire.
    #[error("cannot serialize {label}: {message}")]
    Serialization { label: String, message: String },

    /// A user transformation passed to `try_apply` failed.
    #[error("apply callback failed: {0}")]
    Apply(String),

    /// The user program body returned an error.
    #[error("program failed: {0}")]
    Program(String),

    #[error("monitor RPC failed: {0}")]
    Rpc(String),

    #[error("invoke of '{token}' failed: {}", failures.join("; "))]
    InvokeFailed { token: String, failures: Vec<String> },

    /// Deferred values that were never settled during the run.
    #[error("{count} deferred value(s) were never resolved: {}", contexts.join(", "))]
    LeakedPending { count: usize, contexts: Vec<String> },

    #[error("dependency cycle between unresolved resources: {0}")]
    DependencyCycle(String),

    /// Attempt to read a deferred value outside a runtime-managed callback.
    #[error("output value is not available here: {0}")]
    ValueUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("TOML parsing error: {0}")]
    Toml(String),
}

impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        RuntimeError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for RuntimeError {
    fn from(err: toml::de::Error) -> Self {
        RuntimeError::Toml(err.to_string())
    }
}

impl From<anyhow::Error> for RuntimeError {
    fn from(err: anyhow::Error) -> Self {
        RuntimeError::Apply(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
