// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated run state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for reading
//! events from the channel, handing `ScheduledTask`s to the executor, and
//! recording events. The core has no Tokio types and performs no IO.

use chrono::{DateTime, Utc};

use crate::dag::{ScheduledTask, Scheduler, SchedulerStep};
use crate::engine::report::RunReport;
use crate::engine::{RuntimeEvent, TaskName};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// These tasks will not run because an upstream failed.
    ReportSkipped(Vec<TaskName>),
    /// These pending tasks were dropped by a cancellation.
    ReportCancelled(Vec<TaskName>),
    /// Signal every in-flight task to stop.
    CancelRunning,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Start the run and dispatch the root tasks.
    pub fn start(&mut self, now: DateTime<Utc>) -> CoreStep {
        let step = self.scheduler.start(now);
        to_core_step(step, false)
    }

    /// Handle a single runtime event, updating run state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TaskCompleted { task, result } => {
                let step = self.scheduler.handle_completion(&task, result);
                to_core_step(step, false)
            }
            RuntimeEvent::CancelRequested => {
                let step = self.scheduler.cancel();
                to_core_step(step, true)
            }
        }
    }

    pub fn into_report(self) -> RunReport {
        self.scheduler.into_report()
    }
}

fn to_core_step(step: SchedulerStep, cancel_running: bool) -> CoreStep {
    let mut commands = Vec::new();
    if !step.newly_skipped.is_empty() {
        commands.push(CoreCommand::ReportSkipped(step.newly_skipped));
    }
    if !step.newly_cancelled.is_empty() {
        commands.push(CoreCommand::ReportCancelled(step.newly_cancelled));
    }
    if cancel_running {
        commands.push(CoreCommand::CancelRunning);
    }
    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }
    CoreStep {
        commands,
        keep_running: !step.run_just_finished,
    }
}
