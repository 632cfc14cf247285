// src/exec/retry.rs

//! Per-task retry wrapper.
//!
//! Attempts run sequentially. A task with `retries = k` gets at most `k + 1`
//! attempts; when the budget is exhausted the error of the last attempt is
//! returned unchanged so its cause chain reaches the run report.

use std::time::Duration;

use tracing::debug;

use crate::errors::TaskError;
use crate::events::Event;
use crate::storage::ArtifactRef;
use crate::units::{TaskContext, TaskUnit};

pub const DEFAULT_RETRIES: u32 = 1;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, retry_delay: Duration) -> Self {
        Self {
            retries,
            retry_delay,
        }
    }

    pub fn no_retries() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRIES, DEFAULT_RETRY_DELAY)
    }
}

/// Final result of a retried task.
#[derive(Debug)]
pub struct Attempted {
    pub result: Result<ArtifactRef, TaskError>,
    pub attempts: u32,
}

/// Run `unit` under `policy`. Both the attempt itself and the delay between
/// attempts are abandoned as soon as `ctx.cancel` fires.
pub async fn run_with_retry(
    unit: &dyn TaskUnit,
    ctx: &mut TaskContext,
    policy: RetryPolicy,
) -> Attempted {
    let mut cancel = ctx.cancel.clone();
    let mut attempts = 0;

    loop {
        if cancel.is_cancelled() {
            return Attempted {
                result: Err(TaskError::Cancelled),
                attempts,
            };
        }

        attempts += 1;
        ctx.attempt = attempts;
        debug!(task = %ctx.task, attempt = attempts, kind = unit.kind(), "starting attempt");

        // Poll the unit first so it can observe cancellation and clean up.
        let outcome = tokio::select! {
            biased;
            res = unit.execute(ctx) => res,
            _ = cancel.cancelled() => Err(TaskError::Cancelled),
        };

        let err = match outcome {
            Ok(artifact) => {
                return Attempted {
                    result: Ok(artifact),
                    attempts,
                };
            }
            Err(err) => err,
        };

        if !err.is_retryable() || attempts >= policy.max_attempts() {
            return Attempted {
                result: Err(err),
                attempts,
            };
        }

        ctx.events.record(
            Event::warn("task.retry")
                .with("task", &ctx.task)
                .with("attempt", attempts)
                .with("kind", err.kind())
                .with("error", err.chain())
                .with("delay", format!("{:?}", policy.retry_delay)),
        );

        tokio::select! {
            _ = tokio::time::sleep(policy.retry_delay) => {}
            _ = cancel.cancelled() => {
                return Attempted {
                    result: Err(TaskError::Cancelled),
                    attempts,
                };
            }
        }
    }
}
