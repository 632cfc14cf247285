// src/config/build.rs

//! Turn a validated [`ConfigFile`] into a [`PipelineDefinition`].
//!
//! Goes through the same `add_task` / `add_dependency` / `validate` API a
//! programmatic caller would use.

use std::sync::Arc;

use crate::config::model::{ConfigFile, TaskConfig, TaskKind};
use crate::dag::{PipelineDefinition, TaskSpec};
use crate::errors::{Result, StagedagError};
use crate::events::SharedSink;
use crate::storage::StagingArea;
use crate::units::{
    CopyProducer, Destination, FanInCoordinator, HttpProducer, TargetTemplate, TaskUnit,
};
use crate::watch::CompletionWatcher;

impl ConfigFile {
    pub fn build_definition(
        &self,
        staging: Arc<dyn StagingArea>,
        events: SharedSink,
    ) -> Result<PipelineDefinition> {
        let mut def = PipelineDefinition::new(self.pipeline.name.clone())
            .with_schedule(self.schedule)
            .with_catchup(self.pipeline.catchup);
        if let Some(owner) = &self.pipeline.owner {
            def = def.with_owner(owner.clone());
        }

        for (name, task) in &self.task {
            let unit = build_unit(task, Arc::clone(&staging), events.clone())?;
            let mut spec = TaskSpec::new(name.clone(), unit)
                .with_policy(task.effective_policy(&self.default)?);
            if let Some(owner) = task.owner.as_ref().or(self.pipeline.owner.as_ref()) {
                spec = spec.with_owner(owner.clone());
            }
            def.add_task(spec)?;
        }

        for (name, task) in &self.task {
            for dep in &task.after {
                def.add_dependency(dep, name)?;
            }
        }

        def.validate()?;
        Ok(def)
    }
}

fn build_unit(
    task: &TaskConfig,
    staging: Arc<dyn StagingArea>,
    events: SharedSink,
) -> Result<Arc<dyn TaskUnit>> {
    let dest = Destination {
        container: task.container.clone(),
        key: task.key.clone(),
        naming: task.naming,
    };

    let unit: Arc<dyn TaskUnit> = match task.kind {
        TaskKind::Http => {
            let url = task.url.clone().ok_or_else(|| missing("url"))?;
            let mut producer = HttpProducer::new(url, dest, staging)?;
            for (name, value) in &task.headers {
                producer = producer.with_header(name, value)?;
            }
            if let Some(timeout) = task.request_timeout()? {
                producer = producer.with_timeout(timeout);
            }
            if let Some(content_type) = &task.content_type {
                producer = producer.with_content_type(content_type.clone());
            }
            Arc::new(producer)
        }
        TaskKind::Copy => {
            let src_container = task.src_container.clone().ok_or_else(|| missing("src_container"))?;
            let src_key = task.src_key.clone().ok_or_else(|| missing("src_key"))?;
            Arc::new(CopyProducer::new(src_container, src_key, dest, staging))
        }
        TaskKind::Watch => {
            let from = task.from.clone().ok_or_else(|| missing("from"))?;
            let template = TargetTemplate::new(task.container.clone(), task.key.clone())
                .with_predicate(task.predicate);
            let watcher = CompletionWatcher::new(staging, task.watch_config()?, events);
            Arc::new(FanInCoordinator::new(from, template, watcher))
        }
    };
    Ok(unit)
}

fn missing(field: &str) -> StagedagError {
    StagedagError::ConfigError(format!("missing `{field}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::RawConfigFile;
    use crate::events::RecordingEventSink;
    use crate::storage::MemoryStagingArea;

    #[test]
    fn builds_units_and_edges() {
        let raw: RawConfigFile = toml::from_str(
            r#"
[pipeline]
name = "etl"
owner = "data-eng"

[default]
retries = 2
retry_delay = "1s"

[task.ingest_file]
kind = "copy"
src_container = "source"
src_key = "raw/cand1.csv"
container = "destination"
key = "cleaned/cand1.csv"
retries = 0

[task.ingest_site]
kind = "http"
url = "http://127.0.0.1:1/sites"
container = "source"
key = "raw/site.json"
headers = { Accept = "application/json" }

[task.wait]
kind = "watch"
after = ["ingest_file", "ingest_site"]
from = "ingest_file"
container = "destination"
key = "final/{stem}.parquet"
"#,
        )
        .unwrap();
        let cfg = ConfigFile::try_from(raw).unwrap();
        let def = cfg
            .build_definition(
                Arc::new(MemoryStagingArea::new()),
                Arc::new(RecordingEventSink::new()),
            )
            .unwrap();

        assert_eq!(def.tasks().count(), 3);
        assert_eq!(def.task("wait").unwrap().unit.kind(), "watch");
        assert_eq!(def.task("ingest_file").unwrap().policy.retries, 0);
        assert_eq!(def.task("ingest_site").unwrap().policy.retries, 2);
        assert_eq!(def.task("ingest_site").unwrap().owner.as_deref(), Some("data-eng"));
        assert_eq!(def.graph().dependencies_of("wait").len(), 2);
    }
}
