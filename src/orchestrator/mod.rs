//! Top-level orchestration.
//!
//! [`Orchestrator`] manages scanner and scan records and hands out results.
//! [`Orchestrator::start`] spawns the worker pool and periodic sweep, and
//! returns a [`RunningOrchestrator`] that accepts manual commands.

mod manager;

pub use manager::{Orchestrator, OrchestratorBuilder, ResultBatch, RunningOrchestrator};
