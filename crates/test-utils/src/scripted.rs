//! Scripted task units for driving the runtime deterministically.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use stagedag::errors::TaskError;
use stagedag::storage::{ArtifactRef, MemoryStagingArea, StoreError};
use stagedag::units::{TaskContext, TaskUnit, UnitFuture};

/// Which error a scripted failure produces.
#[derive(Debug, Clone, Copy)]
pub enum FailWith {
    SourceUnavailable,
    WriteFailure,
    Cancelled,
}

/// A unit that fails its first `failures` attempts, then writes a small
/// object into a `MemoryStagingArea` and succeeds.
#[derive(Debug, Clone)]
pub struct ScriptedUnit {
    container: String,
    key: String,
    failures: u32,
    fail_with: FailWith,
    work: Duration,
    staging: Option<MemoryStagingArea>,
    calls: Arc<AtomicU32>,
}

impl ScriptedUnit {
    pub fn succeeding(container: &str, key: &str) -> Self {
        Self {
            container: container.to_string(),
            key: key.to_string(),
            failures: 0,
            fail_with: FailWith::SourceUnavailable,
            work: Duration::ZERO,
            staging: None,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn failing(container: &str, key: &str, failures: u32) -> Self {
        Self {
            failures,
            ..Self::succeeding(container, key)
        }
    }

    pub fn always_failing(container: &str, key: &str) -> Self {
        Self::failing(container, key, u32::MAX)
    }

    pub fn fail_with(mut self, fail_with: FailWith) -> Self {
        self.fail_with = fail_with;
        self
    }

    /// Simulated time spent per attempt.
    pub fn taking(mut self, work: Duration) -> Self {
        self.work = work;
        self
    }

    pub fn writing_to(mut self, staging: &MemoryStagingArea) -> Self {
        self.staging = Some(staging.clone());
        self
    }

    /// Shared call counter; stays valid after the unit moves into an `Arc`.
    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }

    pub fn into_arc(self) -> Arc<dyn TaskUnit> {
        Arc::new(self)
    }
}

impl TaskUnit for ScriptedUnit {
    fn kind(&self) -> &'static str {
        "scripted"
    }

    fn execute<'a>(&'a self, ctx: &'a TaskContext) -> UnitFuture<'a> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.work.is_zero() {
                tokio::time::sleep(self.work).await;
            }
            if call <= self.failures {
                return Err(match self.fail_with {
                    FailWith::SourceUnavailable => TaskError::source_unavailable(
                        format!("scripted:{}", ctx.task),
                        format!("attempt {call} refused"),
                    ),
                    FailWith::WriteFailure => TaskError::WriteFailure {
                        location: format!("{}/{}", self.container, self.key),
                        cause: StoreError::Rejected(format!("attempt {call} rejected")),
                    },
                    FailWith::Cancelled => TaskError::Cancelled,
                });
            }
            if let Some(staging) = &self.staging {
                staging.insert(&self.container, &self.key, format!("{}:{call}", ctx.task));
            }
            Ok(ArtifactRef::new(self.container.clone(), self.key.clone()))
        })
    }
}

/// Stand-in for the external transformer: once `source` exists, writes
/// `target` after `latency`. Polls every 100ms of virtual time.
pub fn spawn_transformer(
    staging: MemoryStagingArea,
    source: (&str, &str),
    target: (&str, &str),
    latency: Duration,
) -> tokio::task::JoinHandle<()> {
    let (src_c, src_k) = (source.0.to_string(), source.1.to_string());
    let (dst_c, dst_k) = (target.0.to_string(), target.1.to_string());
    tokio::spawn(async move {
        while !staging.contains(&src_c, &src_k) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(latency).await;
        staging.insert(&dst_c, &dst_k, "transformed");
    })
}
