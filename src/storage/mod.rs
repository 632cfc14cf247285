// src/storage/mod.rs

//! Staging area abstraction.
//!
//! Producers write artifacts here and the completion watcher probes it. The
//! staging area is addressed by `(container, key)`, object-store style.
//!
//! - [`local`] stores containers as directories under a root path, with
//!   all-or-nothing writes (temp file + rename).
//! - [`memory`] is an in-process implementation used by tests, with
//!   failure injection.

use std::fmt::{self, Debug};
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

pub mod local;
pub mod memory;

pub use local::LocalStagingArea;
pub use memory::MemoryStagingArea;

/// Boxed future returned by [`StagingArea`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors reported by a staging area backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("object not found: {container}/{key}")]
    NotFound { container: String, key: String },

    #[error("invalid key '{0}'")]
    InvalidKey(String),

    #[error("{op} {location}: {source}")]
    Io {
        op: &'static str,
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(container: &str, key: &str) -> Self {
        StoreError::NotFound {
            container: container.to_string(),
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Metadata returned by `head`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    /// Content tag (blake3 of the body, hex).
    pub etag: String,
    pub content_type: Option<String>,
}

/// Reference to an artifact in the staging area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub container: String,
    pub key: String,
    pub size: Option<u64>,
    pub etag: Option<String>,
}

impl ArtifactRef {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
            size: None,
            etag: None,
        }
    }

    pub fn with_meta(mut self, meta: &ObjectMeta) -> Self {
        self.size = Some(meta.size);
        self.etag = Some(meta.etag.clone());
        self
    }

    /// Last path segment of the key (`raw/a.json` -> `a.json`).
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// File name without its final extension (`raw/a.json` -> `a`).
    pub fn file_stem(&self) -> &str {
        let name = self.file_name();
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.key)
    }
}

/// Object-store-like staging area.
pub trait StagingArea: Send + Sync + Debug {
    /// Write `body` at `(container, key)`, replacing any existing object.
    /// Readers never observe a partially written object.
    fn put<'a>(
        &'a self,
        container: &'a str,
        key: &'a str,
        body: Vec<u8>,
        content_type: &'a str,
    ) -> StoreFuture<'a, ()>;

    /// Look up object metadata; `StoreError::NotFound` if absent.
    fn head<'a>(&'a self, container: &'a str, key: &'a str) -> StoreFuture<'a, ObjectMeta>;

    /// Server-side copy.
    fn copy<'a>(
        &'a self,
        src_container: &'a str,
        src_key: &'a str,
        dst_container: &'a str,
        dst_key: &'a str,
    ) -> StoreFuture<'a, ()>;
}

/// Content tag used by both backends.
pub(crate) fn content_tag(body: &[u8]) -> String {
    blake3::hash(body).to_hex().to_string()
}

/// Reject keys that would escape their container or address nothing.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.ends_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
