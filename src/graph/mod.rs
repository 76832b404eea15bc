// src/graph/mod.rs

//! Dependency graph computations over the resource table.
//!
//! - `collector` expands explicit and data-flow dependencies into the flat
//!   set of resources a registration must wait for.
//! - `cycles` finds waits that can never finish.

pub mod collector;
pub mod cycles;

pub use collector::{gather_explicit_dependencies, transitive_wait_set};
pub use cycles::{DeclaredGraph, find_stall_cycle};
