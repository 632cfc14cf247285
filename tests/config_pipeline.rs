use std::sync::Arc;

use stagedag::cli::CliArgs;
use stagedag::config::load_and_validate;
use stagedag::engine::{RunOutcome, run_pipeline};
use stagedag::events::RecordingEventSink;
use stagedag::storage::{LocalStagingArea, StagingArea};
use stagedag_test_utils::builders::ConfigTomlBuilder;
use stagedag_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn pipeline_toml() -> ConfigTomlBuilder {
    ConfigTomlBuilder::new("aws-etl")
        .staging_root("staging")
        .task(
            "ingest_file",
            &[
                ("kind", "\"copy\""),
                ("src_container", "\"source\""),
                ("src_key", "\"raw/candidates/cand1.csv\""),
                ("container", "\"destination\""),
                ("key", "\"cleaned/cand1.csv\""),
                ("retries", "0"),
            ],
        )
        .task(
            "wait_for_clean",
            &[
                ("kind", "\"watch\""),
                ("after", "[\"ingest_file\"]"),
                ("from", "\"ingest_file\""),
                ("container", "\"destination\""),
                ("key", "\"cleaned/{stem}.csv\""),
                ("max_wait", "\"2s\""),
                ("poll_interval", "\"100ms\""),
                ("predicate", "\"non_empty\""),
            ],
        )
}

#[tokio::test]
async fn config_file_drives_a_run_against_local_staging() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = pipeline_toml().write_to(dir.path());

    let staging = Arc::new(LocalStagingArea::new(dir.path().join("staging")));
    staging
        .put("source", "raw/candidates/cand1.csv", b"id,name\n1,ana\n".to_vec(), "text/csv")
        .await?;

    let cfg = load_and_validate(&path)?;
    let sink = RecordingEventSink::new();
    let def = cfg.build_definition(staging.clone(), Arc::new(sink.clone()))?;

    let report = run_pipeline(&def, 1, Arc::new(sink.clone())).await?;
    assert_eq!(report.outcome, RunOutcome::Succeeded, "{report}");

    let copied = report.task("ingest_file").unwrap().artifact.clone().unwrap();
    assert_eq!(copied.to_string(), "destination/cleaned/cand1.csv");
    assert_eq!(copied.size, Some(14));

    // The copy already satisfies the watch target.
    let watched = report.task("wait_for_clean").unwrap().artifact.clone().unwrap();
    assert_eq!(watched.etag, copied.etag);
    assert_eq!(sink.names().first(), Some(&"run.started"));
    assert_eq!(sink.names().last(), Some(&"run.finished"));
    Ok(())
}

#[tokio::test]
async fn missing_source_fails_the_run() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = pipeline_toml().write_to(dir.path());

    let args = CliArgs {
        config: path.display().to_string(),
        once: true,
        log_level: None,
        dry_run: false,
    };
    let outcome = stagedag::run(args).await?;
    assert_eq!(outcome, RunOutcome::Failed);
    Ok(())
}

#[tokio::test]
async fn dry_run_validates_without_touching_staging() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = pipeline_toml().write_to(dir.path());

    let args = CliArgs {
        config: path.display().to_string(),
        once: false,
        log_level: None,
        dry_run: true,
    };
    assert_eq!(stagedag::run(args).await?, RunOutcome::Succeeded);
    assert!(!dir.path().join("staging").exists());
    Ok(())
}
