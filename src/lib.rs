// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod events;
pub mod exec;
pub mod logging;
pub mod storage;
pub mod types;
pub mod units;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::PipelineDefinition;
use crate::engine::{RunOutcome, RunReport, prepare_run};
use crate::events::{SharedSink, TracingEventSink};
use crate::storage::LocalStagingArea;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and validation
/// - the local staging area
/// - one runtime per run, repeated on the pipeline's schedule
/// - Ctrl-C handling (aborts the active run)
///
/// Returns the outcome of the last run.
pub async fn run(args: CliArgs) -> Result<RunOutcome> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let staging_root = resolve_staging_root(&config_path, &cfg.staging.root);
    let events: SharedSink = Arc::new(TracingEventSink);
    let staging = Arc::new(LocalStagingArea::new(&staging_root));
    let def = cfg.build_definition(staging, events.clone())?;

    if args.dry_run {
        print_dry_run(&cfg, &def, &staging_root)?;
        return Ok(RunOutcome::Succeeded);
    }

    let interval = if args.once {
        None
    } else {
        def.schedule().interval()
    };

    let mut run_id = 0;
    loop {
        run_id += 1;
        let (report, interrupted) = run_once(&def, run_id, events.clone()).await?;
        println!("{report}");

        let Some(interval) = interval else {
            return Ok(report.outcome);
        };
        if interrupted {
            return Ok(report.outcome);
        }

        info!(run_id, next_in = ?interval, "waiting for next scheduled run");
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received; stopping scheduler");
                return Ok(report.outcome);
            }
        }
    }
}

/// Execute a single run, forwarding Ctrl-C to the run's abort handle.
async fn run_once(
    def: &PipelineDefinition,
    run_id: u64,
    events: SharedSink,
) -> Result<(RunReport, bool)> {
    let (runtime, abort) = prepare_run(def, run_id, events)?;
    let mut handle = tokio::spawn(runtime.run());

    let (joined, interrupted) = tokio::select! {
        res = &mut handle => (res, false),
        _ = tokio::signal::ctrl_c() => {
            warn!(run_id, "Ctrl-C received; cancelling run");
            abort.abort().await;
            ((&mut handle).await, true)
        }
    };

    let report = joined.context("runtime task panicked")??;
    Ok((report, interrupted))
}

/// Relative staging roots are resolved against the config file's directory.
fn resolve_staging_root(config_path: &Path, root: &Path) -> PathBuf {
    if root.is_absolute() {
        return root.to_path_buf();
    }
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(root),
        _ => root.to_path_buf(),
    }
}

/// Simple dry-run output: print the pipeline, its tasks and their order.
fn print_dry_run(cfg: &ConfigFile, def: &PipelineDefinition, staging_root: &Path) -> Result<()> {
    let order = def.validate()?;

    println!("stagedag dry-run");
    println!("  pipeline = {}", def.name());
    println!("  schedule = {}", cfg.pipeline.schedule);
    if def.catchup() {
        println!("  catchup = true (no backfill is performed)");
    }
    println!("  staging.root = {}", staging_root.display());
    println!();

    println!("tasks ({}), in execution order:", order.len());
    for name in &order {
        let Some(spec) = def.task(name) else { continue };
        let Some(task) = cfg.task.get(name) else { continue };
        println!("  - {name} [{}]", spec.unit.kind());
        println!("      target: {}/{}", task.container, task.key);
        let deps = def.graph().dependencies_of(name);
        if !deps.is_empty() {
            println!("      after: {:?}", deps);
        }
        if let Some(from) = &task.from {
            println!("      from: {from}");
        }
        println!(
            "      retries: {} (delay {:?})",
            spec.policy.retries, spec.policy.retry_delay
        );
        if let Some(owner) = &spec.owner {
            println!("      owner: {owner}");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
