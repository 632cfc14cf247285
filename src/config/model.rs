// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{Result, StagedagError};
use crate::exec::retry::{DEFAULT_RETRIES, DEFAULT_RETRY_DELAY, RetryPolicy};
use crate::types::{NamingPolicy, Predicate, Schedule, parse_duration};
use crate::watch::WatchConfig;
use crate::watch::watcher::{DEFAULT_CHECK_RETRIES, DEFAULT_CHECK_RETRY_DELAY};

pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [pipeline]
/// name = "aws-etl"
/// schedule = "@daily"
///
/// [default]
/// retries = 1
/// retry_delay = "5m"
///
/// [task.ingest_country]
/// kind = "http"
/// url = "https://restcountries.com/v3.1/all"
/// container = "source"
/// key = "raw/countries_data.json"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub staging: StagingSection,

    #[serde(default)]
    pub default: DefaultSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub pipeline: PipelineSection,
    pub staging: StagingSection,
    pub default: DefaultSection,
    pub task: BTreeMap<String, TaskConfig>,
    pub schedule: Schedule,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, schedule: Schedule) -> Self {
        Self {
            pipeline: raw.pipeline,
            staging: raw.staging,
            default: raw.default,
            task: raw.task,
            schedule,
        }
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    pub name: String,

    /// `@once`, `@hourly`, `@daily`, `@weekly` or a duration like `"30m"`.
    #[serde(default = "default_schedule")]
    pub schedule: String,

    /// Accepted for compatibility; there is no run history to backfill from.
    #[serde(default)]
    pub catchup: bool,

    #[serde(default)]
    pub owner: Option<String>,
}

fn default_schedule() -> String {
    "@once".to_string()
}

/// `[staging]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StagingSection {
    /// Root directory of the local staging area. Relative paths are resolved
    /// against the config file's directory.
    #[serde(default = "default_staging_root")]
    pub root: PathBuf,
}

fn default_staging_root() -> PathBuf {
    PathBuf::from("staging")
}

impl Default for StagingSection {
    fn default() -> Self {
        Self {
            root: default_staging_root(),
        }
    }
}

/// `[default]` section: retry settings inherited by every task.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultSection {
    #[serde(default)]
    pub retries: Option<u32>,

    #[serde(default)]
    pub retry_delay: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Fetch a URL and store the body.
    Http,
    /// Copy an existing object inside the staging area.
    Copy,
    /// Fan-in coordinator waiting on an externally produced artifact.
    Watch,
}

/// `[task.<name>]` section.
///
/// One flat table for all kinds; validation checks that the fields each kind
/// needs are present.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub kind: TaskKind,

    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub owner: Option<String>,

    /// Overrides `default.retries`.
    #[serde(default)]
    pub retries: Option<u32>,

    /// Overrides `default.retry_delay`.
    #[serde(default)]
    pub retry_delay: Option<String>,

    /// Destination container for producers, target container for `watch`.
    pub container: String,

    /// Destination key for producers, target key template for `watch`.
    pub key: String,

    #[serde(default)]
    pub naming: NamingPolicy,

    // http
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default)]
    pub content_type: Option<String>,

    // copy
    #[serde(default)]
    pub src_container: Option<String>,

    #[serde(default)]
    pub src_key: Option<String>,

    // watch
    /// Upstream task whose artifact the target key is derived from.
    #[serde(default)]
    pub from: Option<String>,

    #[serde(default)]
    pub max_wait: Option<String>,

    #[serde(default)]
    pub poll_interval: Option<String>,

    #[serde(default)]
    pub check_retries: Option<u32>,

    #[serde(default)]
    pub check_retry_delay: Option<String>,

    #[serde(default)]
    pub predicate: Predicate,
}

impl TaskConfig {
    /// Retry policy after applying `[default]`.
    pub fn effective_policy(&self, defaults: &DefaultSection) -> Result<RetryPolicy> {
        let retries = self.retries.or(defaults.retries).unwrap_or(DEFAULT_RETRIES);
        let delay = match self.retry_delay.as_deref().or(defaults.retry_delay.as_deref()) {
            Some(s) => duration_field("retry_delay", s)?,
            None => DEFAULT_RETRY_DELAY,
        };
        Ok(RetryPolicy::new(retries, delay))
    }

    /// Polling parameters for a `watch` task.
    pub fn watch_config(&self) -> Result<WatchConfig> {
        let max_wait = optional_duration("max_wait", &self.max_wait, DEFAULT_MAX_WAIT)?;
        let poll_interval =
            optional_duration("poll_interval", &self.poll_interval, DEFAULT_POLL_INTERVAL)?;
        let check_delay = optional_duration(
            "check_retry_delay",
            &self.check_retry_delay,
            DEFAULT_CHECK_RETRY_DELAY,
        )?;
        let retries = self.check_retries.unwrap_or(DEFAULT_CHECK_RETRIES);
        Ok(WatchConfig::new(max_wait, poll_interval)?.with_check_retries(retries, check_delay))
    }

    pub fn request_timeout(&self) -> Result<Option<Duration>> {
        self.timeout
            .as_deref()
            .map(|s| duration_field("timeout", s))
            .transpose()
    }
}

fn optional_duration(field: &str, value: &Option<String>, default: Duration) -> Result<Duration> {
    match value.as_deref() {
        Some(s) => duration_field(field, s),
        None => Ok(default),
    }
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| StagedagError::ConfigError(format!("invalid `{field}` '{value}': {e}")))
}
