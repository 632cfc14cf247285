use stagedag::storage::{LocalStagingArea, StagingArea, StoreError};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn leftover_partials(dir: &std::path::Path) -> Vec<String> {
    let mut found = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(d) = stack.pop() {
        for entry in std::fs::read_dir(&d).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else if path.to_string_lossy().ends_with(".partial") {
                found.push(path.display().to_string());
            }
        }
    }
    found
}

#[tokio::test]
async fn put_then_head_reports_size_tag_and_content_type() -> TestResult {
    let dir = tempfile::tempdir()?;
    let staging = LocalStagingArea::new(dir.path());

    staging
        .put("source", "raw/countries_data.json", b"[{\"name\":\"x\"}]".to_vec(), "application/json")
        .await?;

    let meta = staging.head("source", "raw/countries_data.json").await?;
    assert_eq!(meta.size, 14);
    assert_eq!(meta.etag.len(), 64);
    assert_eq!(meta.content_type.as_deref(), Some("application/json"));

    let on_disk = dir.path().join("source/raw/countries_data.json");
    assert_eq!(std::fs::read(on_disk)?, b"[{\"name\":\"x\"}]");
    assert!(leftover_partials(dir.path()).is_empty());
    Ok(())
}

#[tokio::test]
async fn overwrite_changes_the_tag() -> TestResult {
    let dir = tempfile::tempdir()?;
    let staging = LocalStagingArea::new(dir.path());

    staging.put("source", "raw/a.json", b"one".to_vec(), "text/plain").await?;
    let first = staging.head("source", "raw/a.json").await?;
    staging.put("source", "raw/a.json", b"two!".to_vec(), "text/plain").await?;
    let second = staging.head("source", "raw/a.json").await?;

    assert_ne!(first.etag, second.etag);
    assert_eq!(second.size, 4);
    Ok(())
}

#[tokio::test]
async fn missing_objects_and_directories_are_not_found() -> TestResult {
    let dir = tempfile::tempdir()?;
    let staging = LocalStagingArea::new(dir.path());
    staging.put("source", "raw/nested/a.csv", b"x".to_vec(), "text/csv").await?;

    let err = staging.head("source", "raw/missing.csv").await.unwrap_err();
    assert!(err.is_not_found(), "{err}");

    // "raw/nested" exists as a directory, not an object.
    let err = staging.head("source", "raw/nested").await.unwrap_err();
    assert!(err.is_not_found(), "{err}");
    Ok(())
}

#[tokio::test]
async fn copy_carries_body_and_content_type() -> TestResult {
    let dir = tempfile::tempdir()?;
    let staging = LocalStagingArea::new(dir.path());
    staging
        .put("source", "raw/candidates/cand1.csv", b"id,name\n".to_vec(), "text/csv")
        .await?;

    staging
        .copy("source", "raw/candidates/cand1.csv", "destination", "cleaned/cand1.csv")
        .await?;

    let src = staging.head("source", "raw/candidates/cand1.csv").await?;
    let dst = staging.head("destination", "cleaned/cand1.csv").await?;
    assert_eq!(src.etag, dst.etag);
    assert_eq!(dst.content_type.as_deref(), Some("text/csv"));

    let err = staging
        .copy("source", "raw/nope.csv", "destination", "cleaned/nope.csv")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(leftover_partials(dir.path()).is_empty());
    Ok(())
}

#[tokio::test]
async fn keys_cannot_escape_the_root() -> TestResult {
    let dir = tempfile::tempdir()?;
    let staging = LocalStagingArea::new(dir.path().join("staging"));

    for (container, key) in [("source", "../outside"), ("source", "/abs"), ("..", "x"), (".stagedag", "meta")] {
        let err = staging.put(container, key, b"x".to_vec(), "text/plain").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)), "{container}/{key}: {err}");
    }
    Ok(())
}
