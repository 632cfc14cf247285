// src/engine/report.rs

//! Summary of a finished run.

use std::fmt;

use crate::dag::TaskState;
use crate::engine::TaskName;
use crate::errors::{TaskError, TaskErrorKind};
use crate::storage::ArtifactRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    /// At least one task failed (its dependents were skipped).
    Failed,
    /// The run was aborted.
    Cancelled,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::Failed => "failed",
            RunOutcome::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct TaskReport {
    pub name: TaskName,
    pub state: TaskState,
    pub attempts: u32,
    pub artifact: Option<ArtifactRef>,
    pub error: Option<TaskError>,
    pub owner: Option<String>,
}

impl TaskReport {
    pub fn error_kind(&self) -> Option<TaskErrorKind> {
        self.error.as_ref().map(TaskError::kind)
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub pipeline: String,
    pub run_id: u64,
    pub outcome: RunOutcome,
    /// Sorted by task name.
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    pub fn new(pipeline: String, run_id: u64, tasks: Vec<TaskReport>) -> Self {
        let outcome = if tasks.iter().any(|t| t.state == TaskState::Cancelled) {
            RunOutcome::Cancelled
        } else if tasks.iter().all(|t| t.state == TaskState::Succeeded) {
            RunOutcome::Succeeded
        } else {
            RunOutcome::Failed
        };
        Self {
            pipeline,
            run_id,
            outcome,
            tasks,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }

    pub fn task(&self, name: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Tasks that ran and failed. Skipped dependents are not included.
    pub fn failures(&self) -> Vec<&TaskReport> {
        self.tasks
            .iter()
            .filter(|t| t.state == TaskState::Failed)
            .collect()
    }

    pub fn failed_tasks(&self) -> Vec<&str> {
        self.failures().into_iter().map(|t| t.name.as_str()).collect()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "pipeline '{}' run {} {}",
            self.pipeline, self.run_id, self.outcome
        )?;
        for task in &self.tasks {
            write!(f, "  {:<24} {:<10}", task.name, task.state)?;
            if task.attempts > 1 {
                write!(f, " attempts={}", task.attempts)?;
            }
            if let Some(artifact) = &task.artifact {
                write!(f, " {artifact}")?;
            }
            if let Some(err) = &task.error {
                write!(f, " [{}] {}", err.kind(), err.chain())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
