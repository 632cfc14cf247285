// src/errors.rs

//! Crate-wide error types.
//!
//! - [`StagedagError`] covers definition-time and setup problems (bad config,
//!   cycles, unknown tasks). These are never retried.
//! - [`TaskError`] is the outcome of a single task attempt and is what the
//!   retry wrapper and run report deal with.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::engine::TaskName;
use crate::storage::StoreError;

/// Boxed error used to chain root causes from external sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum StagedagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Duplicate task: {0}")]
    DuplicateTask(String),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, StagedagError>;

/// Failure of a task attempt.
#[derive(Error, Debug)]
pub enum TaskError {
    /// The producer's external source was unreachable or answered with an error.
    #[error("source '{source_id}' unavailable")]
    SourceUnavailable {
        source_id: String,
        #[source]
        cause: BoxError,
    },

    /// The staging area rejected a write.
    #[error("write to '{location}' failed")]
    WriteFailure {
        location: String,
        #[source]
        cause: StoreError,
    },

    /// The watch target never appeared within `max_wait`.
    #[error("'{target}' did not appear within {waited:?} ({checks} checks)")]
    Timeout {
        target: String,
        waited: Duration,
        checks: u32,
    },

    /// The existence probe itself kept failing.
    #[error("checking '{target}' failed after {attempts} attempts")]
    CheckFailure {
        target: String,
        attempts: u32,
        #[source]
        cause: StoreError,
    },

    /// An upstream task failed, so this task never ran.
    #[error("upstream task(s) failed: {}", .upstream.join(", "))]
    DependencyFailed { upstream: Vec<TaskName> },

    /// The run was aborted while this task was pending or running.
    #[error("cancelled")]
    Cancelled,
}

/// Coarse classification of a [`TaskError`] for reports and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskErrorKind {
    SourceUnavailable,
    WriteFailure,
    Timeout,
    CheckFailure,
    DependencyFailed,
    Cancelled,
}

impl fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskErrorKind::SourceUnavailable => "SourceUnavailable",
            TaskErrorKind::WriteFailure => "WriteFailure",
            TaskErrorKind::Timeout => "TimeoutError",
            TaskErrorKind::CheckFailure => "CheckFailure",
            TaskErrorKind::DependencyFailed => "DependencyFailed",
            TaskErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

impl TaskError {
    pub fn source_unavailable(
        source_id: impl Into<String>,
        cause: impl Into<BoxError>,
    ) -> Self {
        TaskError::SourceUnavailable {
            source_id: source_id.into(),
            cause: cause.into(),
        }
    }

    pub fn kind(&self) -> TaskErrorKind {
        match self {
            TaskError::SourceUnavailable { .. } => TaskErrorKind::SourceUnavailable,
            TaskError::WriteFailure { .. } => TaskErrorKind::WriteFailure,
            TaskError::Timeout { .. } => TaskErrorKind::Timeout,
            TaskError::CheckFailure { .. } => TaskErrorKind::CheckFailure,
            TaskError::DependencyFailed { .. } => TaskErrorKind::DependencyFailed,
            TaskError::Cancelled => TaskErrorKind::Cancelled,
        }
    }

    /// Whether the per-task retry wrapper may re-attempt after this error.
    ///
    /// Check failures point at a backend problem and must surface instead of
    /// being retried; dependency failures and cancellation are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            TaskErrorKind::SourceUnavailable | TaskErrorKind::WriteFailure | TaskErrorKind::Timeout
        )
    }

    /// Render the error and its full `source()` chain on one line.
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut current = std::error::Error::source(self);
        while let Some(cause) = current {
            out.push_str(": ");
            out.push_str(&cause.to_string());
            current = cause.source();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_includes_root_cause() {
        let err = TaskError::WriteFailure {
            location: "source/raw/a.json".to_string(),
            cause: StoreError::Rejected("bucket is read-only".to_string()),
        };
        let chain = err.chain();
        assert!(chain.starts_with("write to 'source/raw/a.json' failed"));
        assert!(chain.contains("bucket is read-only"));
    }

    #[test]
    fn only_transient_kinds_are_retryable() {
        let timeout = TaskError::Timeout {
            target: "t".into(),
            waited: Duration::from_secs(1),
            checks: 1,
        };
        assert!(timeout.is_retryable());
        assert!(!TaskError::Cancelled.is_retryable());
        assert!(!TaskError::DependencyFailed { upstream: vec!["a".into()] }.is_retryable());
        let check = TaskError::CheckFailure {
            target: "t".into(),
            attempts: 4,
            cause: StoreError::Unavailable("503".into()),
        };
        assert!(!check.is_retryable());
    }
}
