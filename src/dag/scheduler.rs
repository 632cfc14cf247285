use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::dag::definition::PipelineDefinition;
use crate::dag::graph::DagGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{StateManager, deps_satisfied};
use crate::dag::task_info::{TaskInfo, TaskResult, TaskState};
use crate::engine::TaskName;
use crate::engine::report::{RunReport, TaskReport};
use crate::errors::{Result, TaskError};

/// Scheduler holds the DAG plus the mutable state of ONE run.
///
/// It is responsible for:
/// - deciding when a task is ready (every dependency `Succeeded`)
/// - recording task outcomes and artifacts
/// - skipping everything downstream of a failed task
/// - dropping pending tasks when the run is cancelled
#[derive(Debug)]
pub struct Scheduler {
    pipeline: String,
    graph: DagGraph,
    tasks: BTreeMap<TaskName, TaskInfo>,
    run_id: u64,
    run_started_at: Option<DateTime<Utc>>,
    cancelled: bool,
}

impl Scheduler {
    /// Construct a scheduler for run `run_id`. Fails if the definition does
    /// not validate.
    pub fn from_definition(def: &PipelineDefinition, run_id: u64) -> Result<Self> {
        def.validate()?;
        let graph = def.graph().clone();

        let tasks = def
            .tasks()
            .map(|spec| {
                let deps = graph.dependencies_of(&spec.name).to_vec();
                (spec.name.clone(), TaskInfo::from_spec(spec, deps))
            })
            .collect();

        Ok(Self {
            pipeline: def.name().to_string(),
            graph,
            tasks,
            run_id,
            run_started_at: None,
            cancelled: false,
        })
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Whether every task reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.tasks.values().all(|info| info.state.is_terminal())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.tasks.get(task).map(|info| info.state)
    }

    /// Whether the dependencies of `task` are satisfied for this run.
    ///
    /// Returns `None` if the task is unknown.
    pub fn deps_satisfied(&self, task: &str) -> Option<bool> {
        let info = self.tasks.get(task)?;
        Some(deps_satisfied(&self.tasks, info))
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.graph.tasks()
    }

    pub fn running_tasks(&self) -> Vec<TaskName> {
        self.tasks
            .values()
            .filter(|info| info.state == TaskState::Running)
            .map(|info| info.name.clone())
            .collect()
    }

    fn manager(&mut self) -> StateManager<'_> {
        let started = self.run_started_at.unwrap_or_else(Utc::now);
        StateManager::new(&self.graph, &mut self.tasks, self.run_id, started)
    }

    /// Begin the run: every root task becomes ready.
    pub fn start(&mut self, now: DateTime<Utc>) -> SchedulerStep {
        if self.run_started_at.is_some() {
            warn!(run_id = self.run_id, "run already started; ignoring start");
            return SchedulerStep::default();
        }
        self.run_started_at = Some(now);
        info!(run_id = self.run_id, pipeline = %self.pipeline, "scheduler: starting run");

        let newly_scheduled = self.manager().collect_new_ready_tasks();
        SchedulerStep {
            newly_scheduled,
            run_just_finished: self.is_finished(),
            ..SchedulerStep::default()
        }
    }

    /// Record the final result of a dispatched task.
    pub fn handle_completion(&mut self, task: &str, result: TaskResult) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        let Some(info) = self.tasks.get_mut(task) else {
            warn!(task = %task, "completion for unknown task; ignoring");
            return step;
        };
        if info.state != TaskState::Running {
            warn!(task = %task, state = %info.state, "completion for task that is not running; ignoring");
            return step;
        }

        info.attempts = result.attempts;
        let mut skip_dependents = false;
        match result.outcome {
            Ok(artifact) => {
                debug!(task = %task, artifact = %artifact, "task succeeded");
                info.state = TaskState::Succeeded;
                info.artifact = Some(artifact);
            }
            Err(TaskError::Cancelled) => {
                info.state = TaskState::Cancelled;
                info.error = Some(TaskError::Cancelled);
                // A unit that gave up on its own: nothing downstream can run.
                if !self.cancelled {
                    warn!(task = %task, run_id = self.run_id, "task cancelled itself; skipping dependents");
                    skip_dependents = true;
                }
            }
            Err(err) => {
                warn!(
                    task = %task,
                    run_id = self.run_id,
                    attempts = result.attempts,
                    error = %err.chain(),
                    "task failed; skipping dependents in this run"
                );
                info.state = TaskState::Failed;
                info.error = Some(err);
                skip_dependents = true;
            }
        }

        if skip_dependents {
            step.newly_skipped = self.manager().mark_dependents_skipped(task);
        }
        if !self.cancelled {
            step.newly_scheduled = self.manager().collect_new_ready_tasks();
        }

        step.run_just_finished = self.is_finished();
        if step.run_just_finished {
            info!(run_id = self.run_id, "scheduler: all tasks terminal; run finished");
        }
        step
    }

    /// Abort the run: pending tasks are cancelled; running tasks stay
    /// `Running` until the executor reports them.
    pub fn cancel(&mut self) -> SchedulerStep {
        if self.cancelled {
            return SchedulerStep::default();
        }
        self.cancelled = true;
        let newly_cancelled = self.manager().cancel_pending();
        info!(
            run_id = self.run_id,
            cancelled = newly_cancelled.len(),
            "scheduler: run cancelled"
        );
        SchedulerStep {
            newly_cancelled,
            run_just_finished: self.is_finished(),
            ..SchedulerStep::default()
        }
    }

    /// Consume the scheduler and summarize the run.
    pub fn into_report(self) -> RunReport {
        let tasks = self
            .tasks
            .into_values()
            .map(|info| TaskReport {
                name: info.name,
                state: info.state,
                attempts: info.attempts,
                artifact: info.artifact,
                error: info.error,
                owner: info.owner,
            })
            .collect();
        RunReport::new(self.pipeline, self.run_id, tasks)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dag::definition::TaskSpec;
    use crate::errors::TaskErrorKind;
    use crate::storage::ArtifactRef;
    use crate::units::{TaskContext, TaskUnit, UnitFuture};

    #[derive(Debug)]
    struct Noop;

    impl TaskUnit for Noop {
        fn kind(&self) -> &'static str {
            "noop"
        }

        fn execute<'a>(&'a self, _ctx: &'a TaskContext) -> UnitFuture<'a> {
            Box::pin(async { Ok(ArtifactRef::new("c", "k")) })
        }
    }

    fn fan_in_definition() -> PipelineDefinition {
        let mut def = PipelineDefinition::new("etl");
        for name in ["ingest_country", "ingest_site", "ingest_file", "wait_for_clean"] {
            def.add_task(TaskSpec::new(name, Arc::new(Noop))).unwrap();
        }
        for up in ["ingest_country", "ingest_site", "ingest_file"] {
            def.add_dependency(up, "wait_for_clean").unwrap();
        }
        def
    }

    fn names(step: &SchedulerStep) -> Vec<&str> {
        step.newly_scheduled.iter().map(|t| t.name.as_str()).collect()
    }

    fn ok(key: &str) -> TaskResult {
        TaskResult::succeeded(1, ArtifactRef::new("source", key))
    }

    #[test]
    fn coordinator_waits_for_every_producer() {
        let mut s = Scheduler::from_definition(&fan_in_definition(), 1).unwrap();
        let step = s.start(Utc::now());
        assert_eq!(names(&step), vec!["ingest_country", "ingest_file", "ingest_site"]);

        assert!(s.handle_completion("ingest_country", ok("raw/c.json")).newly_scheduled.is_empty());
        assert!(s.handle_completion("ingest_site", ok("raw/s.json")).newly_scheduled.is_empty());
        assert_eq!(s.deps_satisfied("wait_for_clean"), Some(false));

        let step = s.handle_completion("ingest_file", ok("raw/f.csv"));
        assert_eq!(names(&step), vec!["wait_for_clean"]);
        let upstream = &step.newly_scheduled[0].upstream;
        assert_eq!(upstream.len(), 3);
        assert_eq!(upstream["ingest_country"].key, "raw/c.json");

        let step = s.handle_completion("wait_for_clean", ok("cleaned/c.csv"));
        assert!(step.run_just_finished);
        assert!(s.into_report().succeeded());
    }

    #[test]
    fn failed_producer_skips_coordinator() {
        let mut s = Scheduler::from_definition(&fan_in_definition(), 1).unwrap();
        s.start(Utc::now());

        let err = TaskError::source_unavailable("api", "connection refused");
        let step = s.handle_completion("ingest_file", TaskResult::failed(2, err));
        assert_eq!(step.newly_skipped, vec!["wait_for_clean".to_string()]);
        assert!(!step.run_just_finished);

        s.handle_completion("ingest_country", ok("a"));
        let step = s.handle_completion("ingest_site", ok("b"));
        assert!(step.newly_scheduled.is_empty());
        assert!(step.run_just_finished);

        let report = s.into_report();
        assert!(!report.succeeded());
        assert_eq!(report.failed_tasks(), vec!["ingest_file"]);
        let skipped = report.task("wait_for_clean").unwrap();
        assert_eq!(skipped.state, TaskState::Skipped);
        assert_eq!(skipped.error_kind(), Some(TaskErrorKind::DependencyFailed));
    }

    #[test]
    fn cancel_drops_pending_and_waits_for_running() {
        let mut s = Scheduler::from_definition(&fan_in_definition(), 1).unwrap();
        s.start(Utc::now());

        let step = s.cancel();
        assert_eq!(step.newly_cancelled, vec!["wait_for_clean".to_string()]);
        assert!(!step.run_just_finished);
        assert_eq!(s.running_tasks().len(), 3);

        for t in ["ingest_country", "ingest_site"] {
            s.handle_completion(t, TaskResult::failed(1, TaskError::Cancelled));
        }
        let step = s.handle_completion("ingest_file", ok("f"));
        assert!(step.newly_scheduled.is_empty());
        assert!(step.run_just_finished);
        assert_eq!(s.state_of("ingest_country"), Some(TaskState::Cancelled));
    }

    #[test]
    fn self_cancelled_task_skips_dependents_and_finishes_run() {
        let mut s = Scheduler::from_definition(&fan_in_definition(), 1).unwrap();
        s.start(Utc::now());

        let step = s.handle_completion("ingest_site", TaskResult::failed(1, TaskError::Cancelled));
        assert_eq!(step.newly_skipped, vec!["wait_for_clean".to_string()]);

        s.handle_completion("ingest_country", ok("a"));
        let step = s.handle_completion("ingest_file", ok("f"));
        assert!(step.newly_scheduled.is_empty());
        assert!(step.run_just_finished);

        let report = s.into_report();
        assert_eq!(report.task("ingest_site").unwrap().state, TaskState::Cancelled);
        assert_eq!(report.task("wait_for_clean").unwrap().state, TaskState::Skipped);
    }

    #[test]
    fn late_completion_is_ignored() {
        let mut s = Scheduler::from_definition(&fan_in_definition(), 1).unwrap();
        s.start(Utc::now());
        let step = s.handle_completion("wait_for_clean", ok("x"));
        assert!(step.newly_scheduled.is_empty());
        assert_eq!(s.state_of("wait_for_clean"), Some(TaskState::Pending));
    }
}
