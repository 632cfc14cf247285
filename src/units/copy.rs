// src/units/copy.rs

//! Producer that copies an existing object into place and verifies it.

use std::sync::Arc;

use tracing::debug;

use crate::errors::TaskError;
use crate::events::Event;
use crate::storage::{ArtifactRef, StagingArea};

use super::{Destination, TaskContext, TaskUnit, UnitFuture};

#[derive(Debug)]
pub struct CopyProducer {
    src_container: String,
    src_key: String,
    dest: Destination,
    staging: Arc<dyn StagingArea>,
}

impl CopyProducer {
    pub fn new(
        src_container: impl Into<String>,
        src_key: impl Into<String>,
        dest: Destination,
        staging: Arc<dyn StagingArea>,
    ) -> Self {
        Self {
            src_container: src_container.into(),
            src_key: src_key.into(),
            dest,
            staging,
        }
    }

    fn source_id(&self) -> String {
        format!("{}/{}", self.src_container, self.src_key)
    }
}

impl TaskUnit for CopyProducer {
    fn kind(&self) -> &'static str {
        "copy"
    }

    fn execute<'a>(&'a self, ctx: &'a TaskContext) -> UnitFuture<'a> {
        Box::pin(async move {
            let key = self.dest.resolve_key(ctx);
            let location = format!("{}/{}", self.dest.container, key);

            debug!(task = %ctx.task, from = %self.source_id(), to = %location, "copying object");

            self.staging
                .copy(&self.src_container, &self.src_key, &self.dest.container, &key)
                .await
                .map_err(|cause| {
                    if cause.is_not_found() {
                        TaskError::source_unavailable(self.source_id(), cause)
                    } else {
                        TaskError::WriteFailure {
                            location: location.clone(),
                            cause,
                        }
                    }
                })?;

            // Verify the copy landed before reporting success.
            let meta = self
                .staging
                .head(&self.dest.container, &key)
                .await
                .map_err(|cause| TaskError::WriteFailure {
                    location: location.clone(),
                    cause,
                })?;

            ctx.events.record(
                Event::info("artifact.written")
                    .with("task", &ctx.task)
                    .with("source", self.source_id())
                    .with("artifact", &location)
                    .with("bytes", meta.size),
            );

            Ok(ArtifactRef::new(self.dest.container.clone(), key).with_meta(&meta))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TaskErrorKind;
    use crate::storage::MemoryStagingArea;
    use crate::units::test_support::context;

    #[tokio::test]
    async fn copies_and_reports_size() {
        let store = MemoryStagingArea::new();
        store.insert("source", "raw/candidates/cand1.csv", "id,name\n1,ada\n");
        let unit = CopyProducer::new(
            "source",
            "raw/candidates/cand1.csv",
            Destination::fixed("destination", "cleaned/cand1.csv"),
            Arc::new(store.clone()),
        );

        let artifact = unit.execute(&context("ingest_file")).await.unwrap();
        assert_eq!(artifact.to_string(), "destination/cleaned/cand1.csv");
        assert_eq!(artifact.size, Some(14));
        assert!(artifact.etag.is_some());
        assert!(store.contains("destination", "cleaned/cand1.csv"));
    }

    #[tokio::test]
    async fn missing_source_is_source_unavailable() {
        let store = MemoryStagingArea::new();
        let unit = CopyProducer::new(
            "source",
            "raw/missing.csv",
            Destination::fixed("destination", "cleaned/missing.csv"),
            Arc::new(store),
        );

        let err = unit.execute(&context("ingest_file")).await.unwrap_err();
        assert_eq!(err.kind(), TaskErrorKind::SourceUnavailable);
        assert!(err.chain().contains("source/raw/missing.csv"));
    }

    #[tokio::test]
    async fn rejected_copy_is_write_failure() {
        let store = MemoryStagingArea::new();
        store.insert("source", "a.csv", "x");
        store.fail_next_puts(1);
        let unit = CopyProducer::new(
            "source",
            "a.csv",
            Destination::fixed("destination", "a.csv"),
            Arc::new(store),
        );

        let err = unit.execute(&context("ingest_file")).await.unwrap_err();
        assert_eq!(err.kind(), TaskErrorKind::WriteFailure);
    }
}
