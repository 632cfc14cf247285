use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use stagedag::events::RecordingEventSink;
use stagedag::exec::{CancelHandle, CancelSignal};
use stagedag::storage::MemoryStagingArea;
use stagedag::types::Predicate;
use stagedag::watch::{CompletionWatcher, WatchConfig, WatchError, WatchTarget};
use stagedag_test_utils::init_tracing;

fn watcher(
    staging: &MemoryStagingArea,
    sink: &RecordingEventSink,
    max_wait: u64,
    interval: u64,
) -> CompletionWatcher {
    let config = WatchConfig::new(Duration::from_secs(max_wait), Duration::from_secs(interval))
        .unwrap()
        .with_check_retries(3, Duration::from_secs(1));
    CompletionWatcher::new(Arc::new(staging.clone()), config, Arc::new(sink.clone()))
}

fn target() -> WatchTarget {
    WatchTarget::new("destination", "cleaned/cand1.csv")
}

#[tokio::test(start_paused = true)]
async fn present_target_is_found_without_sleeping() {
    init_tracing();
    let staging = MemoryStagingArea::new();
    staging.insert("destination", "cleaned/cand1.csv", "id,name\n1,a\n");
    let sink = RecordingEventSink::new();

    let start = Instant::now();
    let found = watcher(&staging, &sink, 30, 10)
        .watch(&target(), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(found.checks, 1);
    assert_eq!(found.sleeps, 0);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(found.artifact.size, Some(12));
    assert_eq!(sink.names(), vec!["watch.started", "watch.found"]);
}

#[tokio::test(start_paused = true)]
async fn never_appearing_target_times_out_after_three_checks() {
    init_tracing();
    let staging = MemoryStagingArea::new();
    let sink = RecordingEventSink::new();

    let start = Instant::now();
    let err = watcher(&staging, &sink, 30, 10)
        .watch(&target(), CancelSignal::never())
        .await
        .unwrap_err();

    match err {
        WatchError::TimedOut { checks, waited, .. } => {
            assert_eq!(checks, 3);
            assert!(waited <= Duration::from_secs(30) + Duration::from_millis(5), "{waited:?}");
        }
        other => panic!("expected TimedOut, got {other:?}"),
    }
    assert_eq!(staging.head_calls(), 3);
    assert!(start.elapsed() <= Duration::from_secs(40));
    assert_eq!(sink.count("watch.check_failed"), 0);
    assert_eq!(sink.count("watch.timed_out"), 1);
}

#[tokio::test(start_paused = true)]
async fn target_appearing_mid_wait_is_found_on_next_check() {
    init_tracing();
    let staging = MemoryStagingArea::new();
    let sink = RecordingEventSink::new();

    let writer = {
        let staging = staging.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(14)).await;
            staging.insert("destination", "cleaned/cand1.csv", "done");
        })
    };

    let found = watcher(&staging, &sink, 60, 10)
        .watch(&target(), CancelSignal::never())
        .await
        .unwrap();
    writer.await.unwrap();

    // Checks at 0, 10, 20.
    assert_eq!(found.checks, 3);
    assert_eq!(found.sleeps, 2);
}

#[tokio::test(start_paused = true)]
async fn persistent_probe_errors_are_check_failures() {
    init_tracing();
    let staging = MemoryStagingArea::new();
    staging.fail_next_heads(100);
    let sink = RecordingEventSink::new();

    let err = watcher(&staging, &sink, 30, 10)
        .watch(&target(), CancelSignal::never())
        .await
        .unwrap_err();

    match err {
        WatchError::CheckFailure { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("expected CheckFailure, got {other:?}"),
    }
    assert_eq!(staging.head_calls(), 4);
    assert_eq!(sink.count("watch.check_failed"), 1);
    assert_eq!(sink.count("watch.timed_out"), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_probe_errors_are_retried_within_one_check() {
    init_tracing();
    let staging = MemoryStagingArea::new();
    staging.insert("destination", "cleaned/cand1.csv", "ok");
    staging.fail_next_heads(2);
    let sink = RecordingEventSink::new();

    let found = watcher(&staging, &sink, 30, 10)
        .watch(&target(), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(found.checks, 1);
    assert_eq!(found.sleeps, 0);
    assert_eq!(staging.head_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn check_retries_do_not_extend_the_wait_bound() {
    init_tracing();
    let staging = MemoryStagingArea::new();
    staging.fail_next_heads(3);
    let sink = RecordingEventSink::new();
    let config = WatchConfig::new(Duration::from_secs(30), Duration::from_secs(10))
        .unwrap()
        .with_check_retries(3, Duration::from_secs(20));
    let watcher = CompletionWatcher::new(Arc::new(staging.clone()), config, Arc::new(sink.clone()));

    let start = Instant::now();
    let err = watcher.watch(&target(), CancelSignal::never()).await.unwrap_err();

    // Retry sleeps of 20s, 10s, 0s stop at the deadline; one interval follows.
    assert!(matches!(err, WatchError::TimedOut { checks: 1, .. }), "{err:?}");
    assert_eq!(staging.head_calls(), 4);
    assert!(start.elapsed() <= Duration::from_secs(40), "{:?}", start.elapsed());
    assert_eq!(sink.count("watch.check_failed"), 0);
}

#[tokio::test(start_paused = true)]
async fn empty_object_does_not_satisfy_non_empty_predicate() {
    init_tracing();
    let staging = MemoryStagingArea::new();
    staging.insert("destination", "cleaned/cand1.csv", "");
    let sink = RecordingEventSink::new();

    let err = watcher(&staging, &sink, 30, 10)
        .watch(&target().with_predicate(Predicate::NonEmpty), CancelSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, WatchError::TimedOut { checks: 3, .. }));

    let found = watcher(&staging, &sink, 30, 10)
        .watch(&target(), CancelSignal::never())
        .await
        .unwrap();
    assert_eq!(found.artifact.size, Some(0));
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_the_poll_sleep() {
    init_tracing();
    let staging = MemoryStagingArea::new();
    let sink = RecordingEventSink::new();
    let handle = CancelHandle::new();

    let w = watcher(&staging, &sink, 300, 10);
    let signal = handle.signal();
    let task = tokio::spawn(async move { w.watch(&target(), signal).await });

    tokio::time::sleep(Duration::from_secs(25)).await;
    let before = Instant::now();
    handle.cancel();

    let err = task.await.unwrap().unwrap_err();
    match err {
        WatchError::Cancelled { checks, .. } => assert_eq!(checks, 3),
        other => panic!("expected Cancelled, got {other:?}"),
    }
    assert!(before.elapsed() < Duration::from_secs(1));
    assert_eq!(sink.count("watch.cancelled"), 1);
    assert_eq!(sink.count("watch.timed_out"), 0);
}
