// src/units/coordinator.rs

//! Fan-in coordinator.
//!
//! Runs only once every upstream task has succeeded (the scheduler enforces
//! that). It derives a watch target from one upstream artifact and blocks on
//! the [`CompletionWatcher`] until the externally produced artifact appears.

use crate::engine::TaskName;
use crate::errors::TaskError;
use crate::storage::ArtifactRef;
use crate::types::Predicate;
use crate::watch::{CompletionWatcher, WatchError, WatchTarget};

use super::{TaskContext, TaskUnit, UnitFuture};

/// Target key template.
///
/// Placeholders, filled from the upstream artifact:
/// `{container}`, `{key}`, `{name}` (last path segment), `{stem}` (name
/// without extension).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTemplate {
    pub container: String,
    pub key: String,
    pub predicate: Predicate,
}

impl TargetTemplate {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
            predicate: Predicate::Exists,
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn render(&self, upstream: &ArtifactRef) -> WatchTarget {
        let key = self
            .key
            .replace("{container}", &upstream.container)
            .replace("{key}", &upstream.key)
            .replace("{name}", upstream.file_name())
            .replace("{stem}", upstream.file_stem());
        WatchTarget::new(self.container.clone(), key).with_predicate(self.predicate)
    }
}

#[derive(Debug)]
pub struct FanInCoordinator {
    from: TaskName,
    template: TargetTemplate,
    watcher: CompletionWatcher,
}

impl FanInCoordinator {
    /// `from` names the upstream task whose artifact the target derives from.
    pub fn new(from: impl Into<TaskName>, template: TargetTemplate, watcher: CompletionWatcher) -> Self {
        Self {
            from: from.into(),
            template,
            watcher,
        }
    }

    pub fn from_task(&self) -> &str {
        &self.from
    }
}

impl TaskUnit for FanInCoordinator {
    fn kind(&self) -> &'static str {
        "watch"
    }

    fn execute<'a>(&'a self, ctx: &'a TaskContext) -> UnitFuture<'a> {
        Box::pin(async move {
            let upstream = ctx.upstream.get(&self.from).ok_or_else(|| {
                TaskError::DependencyFailed {
                    upstream: vec![self.from.clone()],
                }
            })?;
            let target = self.template.render(upstream);

            match self.watcher.watch(&target, ctx.cancel.clone()).await {
                Ok(found) => Ok(found.artifact),
                Err(WatchError::TimedOut { target, waited, checks }) => {
                    Err(TaskError::Timeout { target, waited, checks })
                }
                Err(WatchError::CheckFailure { target, attempts, cause }) => {
                    Err(TaskError::CheckFailure { target, attempts, cause })
                }
                Err(WatchError::Cancelled { .. }) => Err(TaskError::Cancelled),
            }
        })
    }
}
