use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use stagedag::errors::TaskErrorKind;
use stagedag::events::RecordingEventSink;
use stagedag::exec::CancelSignal;
use stagedag::storage::MemoryStagingArea;
use stagedag::units::{Destination, HttpProducer, TaskContext, TaskUnit};
use stagedag_test_utils::init_tracing;

/// Serve exactly one HTTP response and hand back the raw request.
async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });

    (format!("http://{addr}/v3.1/all"), rx)
}

fn context(sink: &RecordingEventSink) -> TaskContext {
    TaskContext {
        task: "ingest_country".to_string(),
        run_id: 1,
        attempt: 1,
        run_started_at: Utc.with_ymd_and_hms(2024, 5, 1, 6, 30, 0).unwrap(),
        upstream: BTreeMap::new(),
        cancel: CancelSignal::never(),
        events: Arc::new(sink.clone()),
    }
}

#[tokio::test]
async fn stores_body_under_timestamped_key() {
    init_tracing();
    let (url, request) = serve_once("200 OK", r#"[{"name":"Chile"}]"#).await;
    let staging = MemoryStagingArea::new();
    let sink = RecordingEventSink::new();

    let producer = HttpProducer::new(
        url,
        Destination::timestamped("source", "raw/countries_{timestamp}.json"),
        Arc::new(staging.clone()),
    )
    .unwrap()
    .with_header("Accept", "application/json")
    .unwrap();

    let artifact = producer.execute(&context(&sink)).await.unwrap();
    assert_eq!(artifact.key, "raw/countries_20240501_063000.json");
    assert_eq!(artifact.size, Some(18));
    assert_eq!(
        staging.get("source", "raw/countries_20240501_063000.json").unwrap(),
        br#"[{"name":"Chile"}]"#
    );

    let request = request.await.unwrap().to_lowercase();
    assert!(request.starts_with("get /v3.1/all"));
    assert!(request.contains("accept: application/json"));
    assert_eq!(sink.count("artifact.written"), 1);
}

#[tokio::test]
async fn error_status_is_source_unavailable() {
    init_tracing();
    let (url, _request) = serve_once("503 Service Unavailable", "busy").await;
    let staging = MemoryStagingArea::new();
    let sink = RecordingEventSink::new();

    let producer = HttpProducer::new(url, Destination::fixed("source", "raw/a.json"), Arc::new(staging.clone())).unwrap();
    let err = producer.execute(&context(&sink)).await.unwrap_err();

    assert_eq!(err.kind(), TaskErrorKind::SourceUnavailable);
    assert!(err.is_retryable());
    assert!(err.chain().contains("503"), "{}", err.chain());
    assert!(staging.keys("source").is_empty());
}

#[tokio::test]
async fn unreachable_host_is_source_unavailable() {
    init_tracing();
    // Bind then drop to get a port nobody listens on.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let sink = RecordingEventSink::new();
    let producer = HttpProducer::new(
        format!("http://127.0.0.1:{port}/"),
        Destination::fixed("source", "raw/a.json"),
        Arc::new(MemoryStagingArea::new()),
    )
    .unwrap()
    .with_timeout(Duration::from_secs(2));

    let err = producer.execute(&context(&sink)).await.unwrap_err();
    assert_eq!(err.kind(), TaskErrorKind::SourceUnavailable);
}

#[tokio::test]
async fn rejected_write_is_write_failure() {
    init_tracing();
    let (url, _request) = serve_once("200 OK", "{}").await;
    let staging = MemoryStagingArea::new();
    staging.fail_next_puts(1);
    let sink = RecordingEventSink::new();

    let producer = HttpProducer::new(url, Destination::fixed("source", "raw/a.json"), Arc::new(staging)).unwrap();
    let err = producer.execute(&context(&sink)).await.unwrap_err();
    assert_eq!(err.kind(), TaskErrorKind::WriteFailure);
    assert!(err.to_string().contains("source/raw/a.json"));
}
