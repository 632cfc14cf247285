// src/config/validate.rs

use std::collections::BTreeMap;

use crate::config::model::{ConfigFile, RawConfigFile, TaskConfig, TaskKind};
use crate::dag::DagGraph;
use crate::errors::{Result, StagedagError};
use crate::types::{NamingPolicy, Schedule};

const TIMESTAMP_PLACEHOLDER: &str = "{timestamp}";

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = StagedagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let schedule = validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw, schedule))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<Schedule> {
    ensure_has_tasks(cfg)?;
    let schedule = validate_pipeline(cfg)?;
    for (name, task) in cfg.task.iter() {
        validate_task(cfg, name, task)?;
    }
    validate_distinct_destinations(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(schedule)
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(StagedagError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_pipeline(cfg: &RawConfigFile) -> Result<Schedule> {
    if cfg.pipeline.name.trim().is_empty() {
        return Err(StagedagError::ConfigError(
            "[pipeline].name must not be empty".to_string(),
        ));
    }
    cfg.pipeline
        .schedule
        .parse::<Schedule>()
        .map_err(|e| StagedagError::ConfigError(format!("[pipeline].schedule: {e}")))
}

fn task_error(name: &str, msg: impl std::fmt::Display) -> StagedagError {
    StagedagError::ConfigError(format!("task '{name}': {msg}"))
}

fn require<'a>(name: &str, field: &str, value: &'a Option<String>) -> Result<&'a str> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(task_error(name, format!("`{field}` is required for this kind"))),
    }
}

fn validate_task(cfg: &RawConfigFile, name: &str, task: &TaskConfig) -> Result<()> {
    if task.container.trim().is_empty() || task.key.trim().is_empty() {
        return Err(task_error(name, "`container` and `key` must not be empty"));
    }

    task.effective_policy(&cfg.default)
        .map_err(|e| task_error(name, e))?;

    match task.kind {
        TaskKind::Http => {
            require(name, "url", &task.url)?;
            task.request_timeout().map_err(|e| task_error(name, e))?;
            validate_naming(name, task)?;
        }
        TaskKind::Copy => {
            require(name, "src_container", &task.src_container)?;
            require(name, "src_key", &task.src_key)?;
            validate_naming(name, task)?;
        }
        TaskKind::Watch => {
            let from = require(name, "from", &task.from)?;
            if !task.after.iter().any(|dep| dep == from) {
                return Err(task_error(
                    name,
                    format!("`from = \"{from}\"` must also be listed in `after`"),
                ));
            }
            if task.naming != NamingPolicy::Fixed {
                return Err(task_error(name, "`naming` does not apply to watch tasks"));
            }
            task.watch_config().map_err(|e| task_error(name, e))?;
        }
    }
    Ok(())
}

/// Timestamped keys must carry the placeholder, fixed keys must not.
fn validate_naming(name: &str, task: &TaskConfig) -> Result<()> {
    let has_placeholder = task.key.contains(TIMESTAMP_PLACEHOLDER);
    match task.naming {
        NamingPolicy::Timestamped if !has_placeholder => Err(task_error(
            name,
            format!("timestamped key '{}' has no {TIMESTAMP_PLACEHOLDER} placeholder", task.key),
        )),
        NamingPolicy::Fixed if has_placeholder => Err(task_error(
            name,
            format!("key '{}' uses {TIMESTAMP_PLACEHOLDER} but naming is \"fixed\"", task.key),
        )),
        _ => Ok(()),
    }
}

/// Producers write disjoint objects. Equal key templates collide even when
/// timestamped, since two tasks can render the same second.
fn validate_distinct_destinations(cfg: &RawConfigFile) -> Result<()> {
    let mut seen: BTreeMap<(&str, &str), &str> = BTreeMap::new();
    for (name, task) in cfg.task.iter() {
        if task.kind == TaskKind::Watch {
            continue;
        }
        let dest = (task.container.trim(), task.key.trim());
        if let Some(other) = seen.insert(dest, name) {
            return Err(task_error(
                name,
                format!(
                    "destination '{}/{}' is also written by task '{other}'",
                    dest.0, dest.1
                ),
            ));
        }
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(StagedagError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(StagedagError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task, so `after = ["A"]` on B adds A -> B.
    let mut graph = DagGraph::new();
    for name in cfg.task.keys() {
        graph.add_node(name);
    }
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep, name)?;
        }
    }
    graph.validate().map(|_| ())
}
