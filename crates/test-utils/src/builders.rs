#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use stagedag::dag::{PipelineDefinition, TaskSpec};
use stagedag::units::TaskUnit;

/// Builder for `PipelineDefinition` to simplify test setup.
pub struct DefinitionBuilder {
    def: PipelineDefinition,
}

impl DefinitionBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            def: PipelineDefinition::new(name),
        }
    }

    /// Add a task with the given retry budget and a zero retry delay.
    pub fn task(self, name: &str, unit: Arc<dyn TaskUnit>, retries: u32) -> Self {
        self.task_with_delay(name, unit, retries, Duration::ZERO)
    }

    pub fn task_with_delay(
        mut self,
        name: &str,
        unit: Arc<dyn TaskUnit>,
        retries: u32,
        retry_delay: Duration,
    ) -> Self {
        self.def
            .add_task(TaskSpec::new(name, unit).with_retries(retries, retry_delay))
            .expect("duplicate task in builder");
        self
    }

    /// `downstream` runs after every task in `upstream`.
    pub fn after(mut self, downstream: &str, upstream: &[&str]) -> Self {
        for up in upstream {
            self.def
                .add_dependency(up, downstream)
                .expect("unknown task in builder dependency");
        }
        self
    }

    /// Build and validate.
    pub fn build(self) -> PipelineDefinition {
        self.def.validate().expect("builder produced an invalid definition");
        self.def
    }

    /// Build without validating (for cycle tests).
    pub fn build_unchecked(self) -> PipelineDefinition {
        self.def
    }
}

/// Builder for a `Stagedag.toml` document.
pub struct ConfigTomlBuilder {
    doc: String,
}

impl ConfigTomlBuilder {
    pub fn new(pipeline: &str) -> Self {
        let mut doc = String::new();
        let _ = writeln!(doc, "[pipeline]\nname = \"{pipeline}\"\n");
        Self { doc }
    }

    pub fn staging_root(mut self, root: &str) -> Self {
        let _ = writeln!(self.doc, "[staging]\nroot = \"{root}\"\n");
        self
    }

    /// Add `[task.<name>]` with raw `key = value` lines (values already
    /// TOML-encoded, e.g. `("kind", "\"copy\"")`).
    pub fn task(mut self, name: &str, fields: &[(&str, &str)]) -> Self {
        let _ = writeln!(self.doc, "[task.{name}]");
        for (k, v) in fields {
            let _ = writeln!(self.doc, "{k} = {v}");
        }
        self.doc.push('\n');
        self
    }

    pub fn build(self) -> String {
        self.doc
    }

    /// Write to `<dir>/Stagedag.toml` and return the path.
    pub fn write_to(self, dir: &Path) -> PathBuf {
        let path = dir.join("Stagedag.toml");
        std::fs::write(&path, self.doc).expect("failed to write config");
        path
    }
}
