// src/watch/watcher.rs

//! Bounded polling for a watch target.
//!
//! State machine: `Waiting -> Found | TimedOut | Cancelled`, plus a fatal
//! `CheckFailure` when the probe itself keeps erroring.
//!
//! Loop shape, with `deadline = start + max_wait`:
//!
//! 1. probe the target; present -> `Found`
//! 2. sleep `poll_interval` (interruptible by cancellation)
//! 3. `now >= deadline` -> `TimedOut`, otherwise back to 1
//!
//! So a target that never appears is probed at `t = 0, i, 2i, ...` while
//! `t < max_wait`, and total time is bounded by `max_wait + poll_interval`.
//! Probe retries never sleep past the deadline, so the bound holds while the
//! staging area is erroring too.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::{Result, StagedagError};
use crate::events::{Event, SharedSink};
use crate::exec::CancelSignal;
use crate::storage::{ArtifactRef, StagingArea, StoreError};
use crate::types::Predicate;

pub const DEFAULT_CHECK_RETRIES: u32 = 3;
pub const DEFAULT_CHECK_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConfig {
    max_wait: Duration,
    poll_interval: Duration,
    check_retries: u32,
    check_retry_delay: Duration,
}

impl WatchConfig {
    /// `poll_interval` must be non-zero and strictly less than `max_wait`.
    pub fn new(max_wait: Duration, poll_interval: Duration) -> Result<Self> {
        if poll_interval.is_zero() {
            return Err(StagedagError::ConfigError(
                "poll_interval must be > 0".to_string(),
            ));
        }
        if poll_interval >= max_wait {
            return Err(StagedagError::ConfigError(format!(
                "poll_interval ({poll_interval:?}) must be < max_wait ({max_wait:?})"
            )));
        }
        Ok(Self {
            max_wait,
            poll_interval,
            check_retries: DEFAULT_CHECK_RETRIES,
            check_retry_delay: DEFAULT_CHECK_RETRY_DELAY,
        })
    }

    /// How many times a failing probe is retried before giving up.
    pub fn with_check_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.check_retries = retries;
        self.check_retry_delay = delay;
        self
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn check_retries(&self) -> u32 {
        self.check_retries
    }
}

/// Where to look and what counts as present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub container: String,
    pub key: String,
    pub predicate: Predicate,
}

impl WatchTarget {
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
}

impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.key)
    }
}

/// Progress of one poll loop.
#[derive(Debug, Clone, Copy)]
pub struct PollState {
    pub started: Instant,
    pub deadline: Instant,
    pub checks: u32,
    pub sleeps: u32,
}

impl PollState {
    fn start(max_wait: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + max_wait,
            checks: 0,
            sleeps: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Successful terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    pub artifact: ArtifactRef,
    pub checks: u32,
    pub sleeps: u32,
    pub elapsed: Duration,
}

/// Unsuccessful terminal states.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("'{target}' did not appear within {waited:?}")]
    TimedOut {
        target: String,
        waited: Duration,
        checks: u32,
    },

    #[error("probing '{target}' failed {attempts} times")]
    CheckFailure {
        target: String,
        attempts: u32,
        #[source]
        cause: StoreError,
    },

    #[error("watch on '{target}' cancelled")]
    Cancelled { target: String, checks: u32 },
}

/// Polls a staging area for a [`WatchTarget`].
#[derive(Debug, Clone)]
pub struct CompletionWatcher {
    staging: Arc<dyn StagingArea>,
    config: WatchConfig,
    events: SharedSink,
}

impl CompletionWatcher {
    pub fn new(staging: Arc<dyn StagingArea>, config: WatchConfig, events: SharedSink) -> Self {
        Self {
            staging,
            config,
            events,
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Poll until the target appears, the deadline passes, or `cancel` fires.
    pub async fn watch(
        &self,
        target: &WatchTarget,
        mut cancel: CancelSignal,
    ) -> std::result::Result<Found, WatchError> {
        let mut poll = PollState::start(self.config.max_wait);
        let target_str = target.to_string();

        self.events.record(
            Event::info("watch.started")
                .with("target", &target_str)
                .with("max_wait", format!("{:?}", self.config.max_wait))
                .with("poll_interval", format!("{:?}", self.config.poll_interval)),
        );

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(&target_str, &poll));
            }

            poll.checks += 1;
            if let Some(artifact) = self.probe(target, &mut cancel, &poll).await? {
                let found = Found {
                    artifact,
                    checks: poll.checks,
                    sleeps: poll.sleeps,
                    elapsed: poll.elapsed(),
                };
                self.events.record(
                    Event::info("watch.found")
                        .with("target", &target_str)
                        .with("checks", found.checks)
                        .with("elapsed", format!("{:?}", found.elapsed)),
                );
                return Ok(found);
            }

            debug!(
                target = %target_str,
                check = poll.checks,
                "watch target not present yet; sleeping"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = cancel.cancelled() => return Err(self.cancelled(&target_str, &poll)),
            }
            poll.sleeps += 1;

            if poll.expired() {
                let waited = poll.elapsed();
                self.events.record(
                    Event::warn("watch.timed_out")
                        .with("target", &target_str)
                        .with("checks", poll.checks)
                        .with("waited", format!("{waited:?}")),
                );
                return Err(WatchError::TimedOut {
                    target: target_str,
                    waited,
                    checks: poll.checks,
                });
            }
        }
    }

    /// One logical check. `Ok(None)` means "not there (yet)"; errors other
    /// than NotFound are retried up to `check_retries` times.
    async fn probe(
        &self,
        target: &WatchTarget,
        cancel: &mut CancelSignal,
        poll: &PollState,
    ) -> std::result::Result<Option<ArtifactRef>, WatchError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.staging.head(&target.container, &target.key).await {
                Ok(meta) if target.predicate.matches(meta.size) => {
                    return Ok(Some(
                        ArtifactRef::new(target.container.clone(), target.key.clone())
                            .with_meta(&meta),
                    ));
                }
                Ok(meta) => {
                    debug!(
                        target = %target,
                        size = meta.size,
                        "object present but predicate not satisfied"
                    );
                    return Ok(None);
                }
                Err(e) if e.is_not_found() => return Ok(None),
                Err(cause) if attempts > self.config.check_retries => {
                    self.events.record(
                        Event::error("watch.check_failed")
                            .with("target", target)
                            .with("attempts", attempts)
                            .with("error", &cause),
                    );
                    return Err(WatchError::CheckFailure {
                        target: target.to_string(),
                        attempts,
                        cause,
                    });
                }
                Err(cause) => {
                    warn!(
                        target = %target,
                        attempt = attempts,
                        error = %cause,
                        "watch probe failed; retrying"
                    );
                    let delay = self.config.check_retry_delay.min(poll.remaining());
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            return Err(self.cancelled(&target.to_string(), poll));
                        }
                    }
                }
            }
        }
    }

    fn cancelled(&self, target: &str, poll: &PollState) -> WatchError {
        self.events.record(
            Event::warn("watch.cancelled")
                .with("target", target)
                .with("checks", poll.checks),
        );
        WatchError::Cancelled {
            target: target.to_string(),
            checks: poll.checks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_must_be_shorter_than_max_wait() {
        assert!(WatchConfig::new(Duration::from_secs(30), Duration::from_secs(10)).is_ok());
        assert!(WatchConfig::new(Duration::from_secs(10), Duration::from_secs(10)).is_err());
        assert!(WatchConfig::new(Duration::from_secs(10), Duration::ZERO).is_err());
    }
}
