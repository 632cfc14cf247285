// src/units/mod.rs

//! Units of work executed by tasks.
//!
//! - [`http`] and [`copy`] are producers: they write exactly one artifact to
//!   the staging area.
//! - [`coordinator`] is the fan-in node: it waits for an artifact derived
//!   from an upstream output to appear.
//!
//! Everything a unit needs beyond its static configuration arrives through
//! [`TaskContext`].

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::engine::TaskName;
use crate::errors::TaskError;
use crate::events::SharedSink;
use crate::exec::CancelSignal;
use crate::storage::ArtifactRef;
use crate::types::NamingPolicy;

pub mod coordinator;
pub mod copy;
pub mod http;

pub use coordinator::{FanInCoordinator, TargetTemplate};
pub use copy::CopyProducer;
pub use http::HttpProducer;

/// Future returned by [`TaskUnit::execute`].
pub type UnitFuture<'a> = Pin<Box<dyn Future<Output = Result<ArtifactRef, TaskError>> + Send + 'a>>;

/// A callable unit of work.
///
/// `execute` may be called several times for one task in one run (retries);
/// implementations must target the same artifact on every attempt.
pub trait TaskUnit: Send + Sync + Debug {
    /// Short label for logs (`"http"`, `"copy"`, `"watch"`).
    fn kind(&self) -> &'static str;

    fn execute<'a>(&'a self, ctx: &'a TaskContext) -> UnitFuture<'a>;
}

/// Per-attempt context handed to a unit.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task: TaskName,
    pub run_id: u64,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Fixed for the whole run; used for time-derived artifact names.
    pub run_started_at: DateTime<Utc>,
    /// Artifacts produced by direct upstream tasks.
    pub upstream: BTreeMap<TaskName, ArtifactRef>,
    pub cancel: CancelSignal,
    pub events: SharedSink,
}

/// Destination of a producer's artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub container: String,
    pub key: String,
    pub naming: NamingPolicy,
}

/// Timestamp format substituted for `{timestamp}`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

impl Destination {
    pub fn fixed(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
            naming: NamingPolicy::Fixed,
        }
    }

    pub fn timestamped(container: impl Into<String>, key_template: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key_template.into(),
            naming: NamingPolicy::Timestamped,
        }
    }

    /// Resolve the concrete key for this run. Retries within one run get the
    /// same key because the timestamp comes from the run start.
    pub fn resolve_key(&self, ctx: &TaskContext) -> String {
        match self.naming {
            NamingPolicy::Fixed => self.key.clone(),
            NamingPolicy::Timestamped => self.key.replace(
                "{timestamp}",
                &ctx.run_started_at.format(TIMESTAMP_FORMAT).to_string(),
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::events::RecordingEventSink;

    pub fn context(task: &str) -> TaskContext {
        TaskContext {
            task: task.to_string(),
            run_id: 1,
            attempt: 1,
            run_started_at: Utc.with_ymd_and_hms(2024, 5, 1, 6, 30, 0).unwrap(),
            upstream: BTreeMap::new(),
            cancel: CancelSignal::never(),
            events: Arc::new(RecordingEventSink::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::context;
    use super::*;

    #[test]
    fn timestamped_key_is_stable_across_attempts() {
        let dest = Destination::timestamped("source", "raw/posts_data_{timestamp}.json");
        let mut ctx = context("ingest_site");
        let first = dest.resolve_key(&ctx);
        ctx.attempt = 2;
        assert_eq!(first, "raw/posts_data_20240501_063000.json");
        assert_eq!(dest.resolve_key(&ctx), first);
    }

    #[test]
    fn fixed_key_is_used_verbatim() {
        let dest = Destination::fixed("source", "raw/countries_data.json");
        assert_eq!(dest.resolve_key(&context("t")), "raw/countries_data.json");
    }
}
