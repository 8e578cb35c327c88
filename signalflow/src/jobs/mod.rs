//! Jobs and their execution.
//!
//! A [`JobGraph`] describes one request as an arena of jobs; the shared
//! [`JobEngine`] runs them against the artifact store, deduplicating work
//! by content key across every graph it executes.

mod engine;
mod graph;

pub use engine::{ExecutionStats, JobEngine, JobSpec};
pub use graph::{ComputeFn, GraphOutputs, JobGraph, JobId};
