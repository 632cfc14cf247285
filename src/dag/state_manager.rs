// src/dag/state_manager.rs

//! Per-run state transitions for tasks in the scheduler.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::dag::DagGraph;
use crate::dag::task_info::{ScheduledTask, TaskInfo, TaskState};
use crate::engine::TaskName;
use crate::errors::TaskError;
use crate::storage::ArtifactRef;

/// Manages per-run state transitions for tasks.
pub struct StateManager<'a> {
    graph: &'a DagGraph,
    tasks: &'a mut BTreeMap<TaskName, TaskInfo>,
    run_id: u64,
    run_started_at: DateTime<Utc>,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a DagGraph,
        tasks: &'a mut BTreeMap<TaskName, TaskInfo>,
        run_id: u64,
        run_started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            graph,
            tasks,
            run_id,
            run_started_at,
        }
    }

    /// Collect tasks that are `Pending` and whose dependencies all
    /// `Succeeded`, mark them `Running`, and return them as `ScheduledTask`s.
    pub fn collect_new_ready_tasks(&mut self) -> Vec<ScheduledTask> {
        // Decide first, then mutate to avoid borrowing issues.
        let tasks = &*self.tasks;
        let candidates: Vec<TaskName> = tasks
            .values()
            .filter(|info| info.state == TaskState::Pending && deps_satisfied(tasks, info))
            .map(|info| info.name.clone())
            .collect();

        let mut ready = Vec::with_capacity(candidates.len());
        for name in candidates {
            let upstream = self.upstream_artifacts(&name);
            if let Some(info) = self.tasks.get_mut(&name) {
                info!(
                    task = %info.name,
                    run_id = self.run_id,
                    kind = info.unit.kind(),
                    "dependencies satisfied; scheduling task"
                );
                info.state = TaskState::Running;
                ready.push(ScheduledTask {
                    name: info.name.clone(),
                    unit: info.unit.clone(),
                    policy: info.policy,
                    upstream,
                    run_id: self.run_id,
                    run_started_at: self.run_started_at,
                });
            }
        }

        ready
    }

    fn upstream_artifacts(&self, name: &str) -> BTreeMap<TaskName, ArtifactRef> {
        self.graph
            .dependencies_of(name)
            .iter()
            .filter_map(|dep| {
                let artifact = self.tasks.get(dep)?.artifact.clone()?;
                Some((dep.clone(), artifact))
            })
            .collect()
    }

    /// Mark every pending task downstream of `failed_task` as `Skipped`.
    ///
    /// Returns the newly skipped names (excluding `failed_task`).
    pub fn mark_dependents_skipped(&mut self, failed_task: &str) -> Vec<TaskName> {
        let mut stack: Vec<TaskName> = self.graph.dependents_of(failed_task).to_vec();
        let mut newly_skipped = Vec::new();

        while let Some(name) = stack.pop() {
            let Some(info) = self.tasks.get_mut(&name) else {
                warn!(task = %name, "node in DAG not present in tasks map");
                continue;
            };
            match info.state {
                TaskState::Pending => {
                    info.state = TaskState::Skipped;
                    info.error = Some(TaskError::DependencyFailed {
                        upstream: vec![failed_task.to_string()],
                    });
                    debug!(
                        task = %info.name,
                        upstream = %failed_task,
                        "skipping task due to upstream failure"
                    );
                    newly_skipped.push(info.name.clone());
                    stack.extend(self.graph.dependents_of(&name).iter().cloned());
                }
                TaskState::Running => {
                    // Only reachable if dependencies were not all succeeded,
                    // which the scheduler never allows.
                    warn!(task = %info.name, "dependent already running during upstream failure");
                }
                _ => {}
            }
        }

        newly_skipped
    }

    /// Move every `Pending` task to `Cancelled`.
    pub fn cancel_pending(&mut self) -> Vec<TaskName> {
        let mut cancelled = Vec::new();
        for info in self.tasks.values_mut() {
            if info.state == TaskState::Pending {
                info.state = TaskState::Cancelled;
                info.error = Some(TaskError::Cancelled);
                cancelled.push(info.name.clone());
            }
        }
        cancelled
    }
}

/// Whether every direct dependency of `info` succeeded in this run.
pub fn deps_satisfied(tasks: &BTreeMap<TaskName, TaskInfo>, info: &TaskInfo) -> bool {
    info.deps.iter().all(|dep_name| match tasks.get(dep_name) {
        Some(dep) => dep.state == TaskState::Succeeded,
        None => {
            warn!(
                task = %info.name,
                dep = %dep_name,
                "dependency missing from tasks map"
            );
            false
        }
    })
}
