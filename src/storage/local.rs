// src/storage/local.rs

//! Filesystem-backed staging area.
//!
//! Layout under `root`:
//!
//! ```text
//! <root>/<container>/<key>                 object body
//! <root>/.stagedag/meta/<container>/<key>  content type (optional)
//! ```
//!
//! Bodies are written to a temporary sibling and renamed into place, so a
//! concurrent `head` sees either the old object, the new one, or nothing.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs;
use tracing::debug;

use super::{ObjectMeta, StagingArea, StoreError, StoreFuture, content_tag, validate_key};

const META_DIR: &str = ".stagedag/meta";

/// Staging area rooted at a local directory.
#[derive(Debug)]
pub struct LocalStagingArea {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl LocalStagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of the object body.
    pub fn object_path(&self, container: &str, key: &str) -> Result<PathBuf, StoreError> {
        validate_container(container)?;
        validate_key(key)?;
        Ok(self.root.join(container).join(key))
    }

    fn meta_path(&self, container: &str, key: &str) -> PathBuf {
        self.root.join(META_DIR).join(container).join(key)
    }

    fn tmp_path_for(&self, target: &Path) -> PathBuf {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        target.with_file_name(format!(".{name}.{}.{n}.partial", std::process::id()))
    }

    /// Write `body` to `target` via a temp file + rename.
    async fn write_atomic(&self, target: &Path, body: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err("creating dir", parent, e))?;
        }

        let tmp = self.tmp_path_for(target);
        if let Err(e) = fs::write(&tmp, body).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_err("writing", &tmp, e));
        }
        if let Err(e) = fs::rename(&tmp, target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_err("renaming into", target, e));
        }
        Ok(())
    }
}

impl StagingArea for LocalStagingArea {
    fn put<'a>(
        &'a self,
        container: &'a str,
        key: &'a str,
        body: Vec<u8>,
        content_type: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let path = self.object_path(container, key)?;
            self.write_atomic(&path, &body).await?;
            self.write_atomic(&self.meta_path(container, key), content_type.as_bytes())
                .await?;
            debug!(container, key, bytes = body.len(), "put object");
            Ok(())
        })
    }

    fn head<'a>(&'a self, container: &'a str, key: &'a str) -> StoreFuture<'a, ObjectMeta> {
        Box::pin(async move {
            let path = self.object_path(container, key)?;
            let body = match fs::read(&path).await {
                Ok(body) => body,
                Err(e) if is_missing(&e) => return Err(StoreError::not_found(container, key)),
                Err(e) => return Err(io_err("reading", &path, e)),
            };

            let content_type = match fs::read_to_string(self.meta_path(container, key)).await {
                Ok(ct) => Some(ct),
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => return Err(io_err("reading metadata for", &path, e)),
            };

            Ok(ObjectMeta {
                size: body.len() as u64,
                etag: content_tag(&body),
                content_type,
            })
        })
    }

    fn copy<'a>(
        &'a self,
        src_container: &'a str,
        src_key: &'a str,
        dst_container: &'a str,
        dst_key: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let src = self.object_path(src_container, src_key)?;
            let dst = self.object_path(dst_container, dst_key)?;

            let body = match fs::read(&src).await {
                Ok(body) => body,
                Err(e) if is_missing(&e) => {
                    return Err(StoreError::not_found(src_container, src_key));
                }
                Err(e) => return Err(io_err("reading", &src, e)),
            };
            self.write_atomic(&dst, &body).await?;

            match fs::read(self.meta_path(src_container, src_key)).await {
                Ok(ct) => {
                    self.write_atomic(&self.meta_path(dst_container, dst_key), &ct)
                        .await?
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(io_err("reading metadata for", &src, e)),
            }

            debug!(
                from = %src.display(),
                to = %dst.display(),
                bytes = body.len(),
                "copied object"
            );
            Ok(())
        })
    }
}

fn validate_container(container: &str) -> Result<(), StoreError> {
    if container.is_empty() || container.contains(['/', '\\']) || container.starts_with('.') {
        return Err(StoreError::InvalidKey(format!("container '{container}'")));
    }
    Ok(())
}

/// A directory at the object path counts as "no such object".
fn is_missing(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory)
}

fn io_err(op: &'static str, path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        op,
        location: path.display().to_string(),
        source,
    }
}
