// src/engine/runtime.rs

use std::fmt;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::{PipelineDefinition, ScheduledTask, Scheduler, TaskResult};
use crate::errors::{Result, StagedagError};
use crate::events::{Event, SharedSink};
use crate::exec::{ExecutorBackend, RealExecutorBackend};

use super::core::CoreRuntime;
use super::report::{RunOutcome, RunReport};
use super::{CoreCommand, RuntimeEvent, TaskName};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Drives one run of the DAG scheduler in response to `RuntimeEvent`s,
/// and delegates task execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// run semantics.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    events: SharedSink,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        events: SharedSink,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            events,
        }
    }

    /// Main event loop. Returns once every task reached a terminal state.
    pub async fn run(mut self) -> Result<RunReport> {
        let run_id = self.core.scheduler().run_id();
        info!(run_id, "stagedag runtime started");
        self.events
            .record(Event::info("run.started").with("run_id", run_id));

        let step = self.core.start(Utc::now());
        let mut keep_running = step.keep_running;
        for command in step.commands {
            self.execute_command(command).await?;
        }

        while keep_running {
            let Some(event) = self.event_rx.recv().await else {
                return Err(StagedagError::Other(anyhow::anyhow!(
                    "runtime event channel closed before run {run_id} finished"
                )));
            };

            debug!(?event, "runtime received event");
            if let RuntimeEvent::TaskCompleted { task, result } = &event {
                self.record_finished(task, result);
            }

            let step = self.core.step(event);
            for command in step.commands {
                self.execute_command(command).await?;
            }
            keep_running = step.keep_running;
        }

        let report = self.core.into_report();
        let event = match report.outcome {
            RunOutcome::Succeeded => Event::info("run.finished"),
            RunOutcome::Failed => Event::error("run.finished"),
            RunOutcome::Cancelled => Event::warn("run.finished"),
        };
        self.events.record(
            event
                .with("run_id", run_id)
                .with("outcome", report.outcome)
                .with("failed", report.failed_tasks().join(",")),
        );
        info!(run_id, outcome = %report.outcome, "runtime exiting");
        Ok(report)
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => self.spawn_ready(tasks).await?,
            CoreCommand::ReportSkipped(names) => self.record_each("task.skipped", &names),
            CoreCommand::ReportCancelled(names) => self.record_each("task.cancelled", &names),
            CoreCommand::CancelRunning => {
                info!("cancelling in-flight tasks");
                self.executor.cancel_running();
            }
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
        debug!(?names, "spawning ready tasks");

        for task in &tasks {
            self.events.record(
                Event::info("task.dispatched")
                    .with("task", &task.name)
                    .with("kind", task.unit.kind())
                    .with("upstream", task.upstream.len()),
            );
        }
        self.executor.spawn_ready_tasks(tasks).await
    }

    fn record_finished(&self, task: &str, result: &TaskResult) {
        let event = match &result.outcome {
            Ok(artifact) => Event::info("task.finished")
                .with("outcome", "succeeded")
                .with("artifact", artifact),
            Err(err) => Event::error("task.finished")
                .with("outcome", err.kind())
                .with("error", err.chain()),
        };
        self.events
            .record(event.with("task", task).with("attempts", result.attempts));
    }

    fn record_each(&self, name: &'static str, tasks: &[TaskName]) {
        for task in tasks {
            self.events.record(Event::warn(name).with("task", task));
        }
    }
}

/// Handle used to abort a run from outside the runtime (Ctrl-C, tests).
#[derive(Debug, Clone)]
pub struct RunAbort {
    tx: mpsc::Sender<RuntimeEvent>,
}

impl RunAbort {
    /// Request cancellation. Returns `false` if the run already ended.
    pub async fn abort(&self) -> bool {
        self.tx.send(RuntimeEvent::CancelRequested).await.is_ok()
    }
}

/// Wire a validated definition to the real executor for run `run_id`.
pub fn prepare_run(
    def: &PipelineDefinition,
    run_id: u64,
    events: SharedSink,
) -> Result<(Runtime<RealExecutorBackend>, RunAbort)> {
    let scheduler = Scheduler::from_definition(def, run_id)?;
    if def.catchup() {
        warn!(pipeline = %def.name(), "catchup requested but no run history is kept; nothing will be backfilled");
    }

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(EVENT_CHANNEL_CAPACITY);
    let executor = RealExecutorBackend::new(tx.clone(), events.clone());
    let runtime = Runtime::new(CoreRuntime::new(scheduler), rx, executor, events);
    Ok((runtime, RunAbort { tx }))
}

/// Run the definition once to completion.
pub async fn run_pipeline(
    def: &PipelineDefinition,
    run_id: u64,
    events: SharedSink,
) -> Result<RunReport> {
    let (runtime, _abort) = prepare_run(def, run_id, events)?;
    runtime.run().await
}
