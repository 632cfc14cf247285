use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use stagedag::dag::{ScheduledTask, TaskResult};
use stagedag::engine::RuntimeEvent;
use stagedag::errors::{Result, StagedagError, TaskError};
use stagedag::exec::ExecutorBackend;
use stagedag::storage::ArtifactRef;

/// A fake executor that:
/// - records which tasks were "run", and what upstream artifacts they saw
/// - immediately reports a completion for each scheduled task, failing the
///   tasks named in `failing`
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<ScheduledTask>>>,
    failing: BTreeSet<String>,
}

impl FakeExecutor {
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<ScheduledTask>>>,
    ) -> Self {
        Self {
            runtime_tx,
            executed,
            failing: BTreeSet::new(),
        }
    }

    pub fn failing<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing = names.into_iter().map(Into::into).collect();
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let failing = self.failing.clone();

        Box::pin(async move {
            for t in tasks {
                executed.lock().unwrap().push(t.clone());

                let result = if failing.contains(&t.name) {
                    TaskResult::failed(1, TaskError::source_unavailable(t.name.clone(), "fake failure"))
                } else {
                    TaskResult::succeeded(1, ArtifactRef::new("fake", t.name.clone()))
                };

                // Completions are reported from a separate task: the runtime
                // is not reading the channel while it dispatches.
                let tx = tx.clone();
                let name = t.name.clone();
                tokio::spawn(async move {
                    let _ = tx.send(RuntimeEvent::TaskCompleted { task: name, result }).await;
                });
            }
            Ok::<(), StagedagError>(())
        })
    }

    fn cancel_running(&mut self) {}
}
