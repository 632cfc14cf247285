// src/engine/mod.rs

//! Orchestration engine for one pipeline run.
//!
//! This module ties together:
//! - the per-run DAG scheduler
//! - the executor that runs ready tasks concurrently
//! - the main runtime event loop that reacts to:
//!   - task completion events
//!   - cancellation requests
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. [`report`] summarizes a finished run.

use crate::dag::TaskResult;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Events flowing into the runtime from the executor and abort handles.
#[derive(Debug)]
pub enum RuntimeEvent {
    /// A task finished all of its attempts.
    TaskCompleted { task: TaskName, result: TaskResult },
    /// Abort the run (e.g. Ctrl-C).
    CancelRequested,
}

pub mod core;
pub mod report;
pub mod runtime;

pub use core::{CoreCommand, CoreRuntime, CoreStep};
pub use report::{RunOutcome, RunReport, TaskReport};
pub use runtime::{RunAbort, Runtime, prepare_run, run_pipeline};
