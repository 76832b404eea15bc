// src/engine/mod.rs

//! Resource registration engine.
//!
//! - [`context`] owns the per-run state (resource table, registration chain,
//!   leak tracker, error log) and the public registration API.
//! - [`registration`] is the background task behind each registration.
//! - [`monitor`] defines the [`ResourceMonitor`] trait the context talks to.
//! - [`chain`] serializes dispatch order when parallelism is disabled.
//! - [`tracker`] counts outstanding RPCs and collects run errors.

pub mod chain;
pub mod context;
pub mod invoke;
pub mod monitor;
pub(crate) mod registration;
pub mod tracker;

pub use chain::{ChainLink, RegistrationChain};
pub use context::{Context, RegisteredResource, RunSummary};
pub use monitor::{
    CheckFailure, FeatureSupport, InvokeRequest, InvokeResponse, MonitorFuture,
    ReadResourceRequest, ReadResourceResponse, RegisterResourceOutputsRequest,
    RegisterResourceRequest, RegisterResourceResponse, ResourceMonitor,
};
pub use tracker::{ErrorLog, RpcTracker};
