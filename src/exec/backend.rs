// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning tasks
//! itself. This makes it easy to swap in a fake executor in tests while
//! keeping the production executor in [`RealExecutorBackend`].
//!
//! - `RealExecutorBackend` runs every scheduled task as its own tokio task
//!   and reports completion over the runtime's mpsc channel.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which tasks were scheduled and directly emits `TaskCompleted` events.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tracing::debug;

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::events::SharedSink;

use super::cancel::CancelHandle;
use super::task_runner::run_task;

/// Trait abstracting how scheduled tasks are executed.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution. Each task must eventually
    /// produce exactly one `RuntimeEvent::TaskCompleted`.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Ask every in-flight task to stop. Tasks still report completion
    /// (as `Cancelled`).
    fn cancel_running(&mut self);
}

/// Real executor backend used in production.
#[derive(Debug)]
pub struct RealExecutorBackend {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    events: SharedSink,
    cancel: CancelHandle,
}

impl RealExecutorBackend {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, events: SharedSink) -> Self {
        Self {
            runtime_tx,
            events,
            cancel: CancelHandle::new(),
        }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for task in tasks {
                debug!(task = %task.name, run_id = task.run_id, "spawning task");
                tokio::spawn(run_task(
                    task,
                    self.runtime_tx.clone(),
                    self.cancel.signal(),
                    self.events.clone(),
                ));
            }
            Ok(())
        })
    }

    fn cancel_running(&mut self) {
        self.cancel.cancel();
    }
}
