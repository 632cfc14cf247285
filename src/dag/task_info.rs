// src/dag/task_info.rs

//! Task metadata and per-run state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::dag::definition::TaskSpec;
use crate::engine::TaskName;
use crate::errors::TaskError;
use crate::exec::RetryPolicy;
use crate::storage::ArtifactRef;
use crate::units::TaskUnit;

/// Outcome of a task within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting on dependencies.
    Pending,
    /// Dispatched to the executor.
    Running,
    Succeeded,
    /// Ran and exhausted its retries.
    Failed,
    /// Never started because an upstream task failed.
    Skipped,
    /// The run was aborted before this task finished.
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Pending | TaskState::Running)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Skipped => "skipped",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Static task information plus per-run state.
#[derive(Debug)]
pub struct TaskInfo {
    pub name: TaskName,
    pub unit: Arc<dyn TaskUnit>,
    pub policy: RetryPolicy,
    pub owner: Option<String>,
    /// Direct dependencies.
    pub deps: Vec<TaskName>,

    pub state: TaskState,
    pub attempts: u32,
    pub artifact: Option<ArtifactRef>,
    pub error: Option<TaskError>,
}

impl TaskInfo {
    pub fn from_spec(spec: &TaskSpec, deps: Vec<TaskName>) -> Self {
        Self {
            name: spec.name.clone(),
            unit: Arc::clone(&spec.unit),
            policy: spec.policy,
            owner: spec.owner.clone(),
            deps,
            state: TaskState::Pending,
            attempts: 0,
            artifact: None,
            error: None,
        }
    }
}

/// Description of a task that the scheduler wants the executor to run now.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub name: TaskName,
    pub unit: Arc<dyn TaskUnit>,
    pub policy: RetryPolicy,
    /// Artifacts of the direct dependencies, all of which succeeded.
    pub upstream: BTreeMap<TaskName, ArtifactRef>,
    pub run_id: u64,
    pub run_started_at: DateTime<Utc>,
}

/// What the executor reports back for a scheduled task.
#[derive(Debug)]
pub struct TaskResult {
    pub attempts: u32,
    pub outcome: Result<ArtifactRef, TaskError>,
}

impl TaskResult {
    pub fn succeeded(attempts: u32, artifact: ArtifactRef) -> Self {
        Self {
            attempts,
            outcome: Ok(artifact),
        }
    }

    pub fn failed(attempts: u32, error: TaskError) -> Self {
        Self {
            attempts,
            outcome: Err(error),
        }
    }
}
