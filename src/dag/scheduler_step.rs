// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task_info::ScheduledTask;
use crate::engine::TaskName;

/// Structured result of a single scheduler "step".
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks that became ready to run as a result of this step.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Downstream tasks that will never run because of a failure in this step.
    pub newly_skipped: Vec<TaskName>,
    /// Pending tasks dropped by a cancellation in this step.
    pub newly_cancelled: Vec<TaskName>,
    /// Whether every task is now terminal.
    pub run_just_finished: bool,
}
