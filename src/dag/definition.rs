// src/dag/definition.rs

//! Pipeline definition: the static graph of tasks plus schedule metadata.
//!
//! Built explicitly with [`PipelineDefinition::add_task`] and
//! [`PipelineDefinition::add_dependency`], then checked once with
//! [`PipelineDefinition::validate`]. A cycle is a definition-time error; no
//! run can be created from an invalid definition.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::dag::graph::DagGraph;
use crate::engine::TaskName;
use crate::errors::{Result, StagedagError};
use crate::exec::RetryPolicy;
use crate::types::Schedule;
use crate::units::TaskUnit;

/// A task as declared in the definition.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: TaskName,
    pub unit: Arc<dyn TaskUnit>,
    pub policy: RetryPolicy,
    /// Metadata only.
    pub owner: Option<String>,
}

impl TaskSpec {
    pub fn new(name: impl Into<TaskName>, unit: Arc<dyn TaskUnit>) -> Self {
        Self {
            name: name.into(),
            unit,
            policy: RetryPolicy::default(),
            owner: None,
        }
    }

    pub fn with_retries(mut self, retries: u32, retry_delay: Duration) -> Self {
        self.policy = RetryPolicy::new(retries, retry_delay);
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    name: String,
    schedule: Schedule,
    catchup: bool,
    owner: Option<String>,
    tasks: BTreeMap<TaskName, TaskSpec>,
    graph: DagGraph,
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schedule: Schedule::Once,
            catchup: false,
            owner: None,
            tasks: BTreeMap::new(),
            graph: DagGraph::new(),
        }
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Whether missed past runs should be backfilled by the trigger.
    pub fn with_catchup(mut self, catchup: bool) -> Self {
        self.catchup = catchup;
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn add_task(&mut self, spec: TaskSpec) -> Result<()> {
        if !self.graph.add_node(&spec.name) {
            return Err(StagedagError::DuplicateTask(spec.name));
        }
        self.tasks.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Declare that `downstream` may only run after `upstream` succeeded.
    pub fn add_dependency(&mut self, upstream: &str, downstream: &str) -> Result<()> {
        self.graph.add_edge(upstream, downstream)
    }

    /// Check the definition and return tasks in a valid execution order.
    pub fn validate(&self) -> Result<Vec<TaskName>> {
        if self.tasks.is_empty() {
            return Err(StagedagError::ConfigError(format!(
                "pipeline '{}' has no tasks",
                self.name
            )));
        }
        self.graph.validate()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    pub fn catchup(&self) -> bool {
        self.catchup
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.get(name)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskSpec> {
        self.tasks.values()
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }
}
