// src/exec/task_runner.rs

//! Individual task runner.

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::dag::{ScheduledTask, TaskResult};
use crate::engine::RuntimeEvent;
use crate::events::SharedSink;
use crate::units::TaskContext;

use super::cancel::CancelSignal;
use super::retry::run_with_retry;

/// Run a single task under its retry policy and emit exactly one
/// `TaskCompleted` event for it.
pub async fn run_task(
    task: ScheduledTask,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel: CancelSignal,
    events: SharedSink,
) {
    info!(
        task = %task.name,
        run_id = task.run_id,
        kind = task.unit.kind(),
        max_attempts = task.policy.max_attempts(),
        "starting task"
    );

    let mut ctx = TaskContext {
        task: task.name.clone(),
        run_id: task.run_id,
        attempt: 0,
        run_started_at: task.run_started_at,
        upstream: task.upstream,
        cancel,
        events,
    };
    let attempted = run_with_retry(task.unit.as_ref(), &mut ctx, task.policy).await;

    match &attempted.result {
        Ok(artifact) => info!(
            task = %task.name,
            run_id = task.run_id,
            attempts = attempted.attempts,
            artifact = %artifact,
            "task succeeded"
        ),
        Err(err) => warn!(
            task = %task.name,
            run_id = task.run_id,
            attempts = attempted.attempts,
            error = %err.chain(),
            "task failed"
        ),
    }

    let result = TaskResult {
        attempts: attempted.attempts,
        outcome: attempted.result,
    };
    if runtime_tx
        .send(RuntimeEvent::TaskCompleted {
            task: task.name.clone(),
            result,
        })
        .await
        .is_err()
    {
        warn!(task = %task.name, "runtime gone; dropping task completion");
    }
}
