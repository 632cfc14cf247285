// src/storage/memory.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{ObjectMeta, StagingArea, StoreError, StoreFuture, content_tag, validate_key};

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    content_type: Option<String>,
}

/// In-memory staging area.
///
/// Clones share the same objects, so a test can keep a handle and inspect or
/// seed objects while a run is using another clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryStagingArea {
    objects: Arc<Mutex<HashMap<(String, String), StoredObject>>>,
    head_failures: Arc<AtomicU32>,
    put_failures: Arc<AtomicU32>,
    head_calls: Arc<AtomicU32>,
}

impl MemoryStagingArea {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(String, String), StoredObject>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an object directly (simulates an external writer).
    pub fn insert(&self, container: &str, key: &str, body: impl Into<Vec<u8>>) {
        self.lock().insert(
            (container.to_string(), key.to_string()),
            StoredObject {
                body: body.into(),
                content_type: None,
            },
        );
    }

    pub fn get(&self, container: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .get(&(container.to_string(), key.to_string()))
            .map(|o| o.body.clone())
    }

    pub fn contains(&self, container: &str, key: &str) -> bool {
        self.lock()
            .contains_key(&(container.to_string(), key.to_string()))
    }

    /// All keys in a container, sorted.
    pub fn keys(&self, container: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .lock()
            .keys()
            .filter(|(c, _)| c == container)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Make the next `n` `head` calls fail with `Unavailable`.
    pub fn fail_next_heads(&self, n: u32) {
        self.head_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` `put` calls fail with `Rejected`.
    pub fn fail_next_puts(&self, n: u32) {
        self.put_failures.store(n, Ordering::SeqCst);
    }

    /// Number of `head` calls served so far (including injected failures).
    pub fn head_calls(&self) -> u32 {
        self.head_calls.load(Ordering::SeqCst)
    }
}

/// Decrement `counter` if positive; returns whether a failure should fire.
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl StagingArea for MemoryStagingArea {
    fn put<'a>(
        &'a self,
        container: &'a str,
        key: &'a str,
        body: Vec<u8>,
        content_type: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            validate_key(key)?;
            if take_failure(&self.put_failures) {
                return Err(StoreError::Rejected(format!(
                    "injected put failure for {container}/{key}"
                )));
            }
            self.lock().insert(
                (container.to_string(), key.to_string()),
                StoredObject {
                    body,
                    content_type: Some(content_type.to_string()),
                },
            );
            Ok(())
        })
    }

    fn head<'a>(&'a self, container: &'a str, key: &'a str) -> StoreFuture<'a, ObjectMeta> {
        Box::pin(async move {
            self.head_calls.fetch_add(1, Ordering::SeqCst);
            if take_failure(&self.head_failures) {
                return Err(StoreError::Unavailable(format!(
                    "injected head failure for {container}/{key}"
                )));
            }
            let objects = self.lock();
            match objects.get(&(container.to_string(), key.to_string())) {
                Some(obj) => Ok(ObjectMeta {
                    size: obj.body.len() as u64,
                    etag: content_tag(&obj.body),
                    content_type: obj.content_type.clone(),
                }),
                None => Err(StoreError::not_found(container, key)),
            }
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
            validate_key(dst_key)?;
            if take_failure(&self.put_failures) {
                return Err(StoreError::Rejected(format!(
                    "injected copy failure for {dst_container}/{dst_key}"
                )));
            }
            let mut objects = self.lock();
            let obj = objects
                .get(&(src_container.to_string(), src_key.to_string()))
                .cloned()
                .ok_or_else(|| StoreError::not_found(src_container, src_key))?;
            objects.insert((dst_container.to_string(), dst_key.to_string()), obj);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn injected_head_failures_are_consumed() {
        let store = MemoryStagingArea::new();
        store.insert("c", "k", "v");
        store.fail_next_heads(2);

        assert!(matches!(
            store.head("c", "k").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.head("c", "k").await.is_err());
        let meta = store.head("c", "k").await.unwrap();
        assert_eq!(meta.size, 1);
        assert_eq!(store.head_calls(), 3);
    }

    #[tokio::test]
    async fn copy_of_missing_source_is_not_found() {
        let store = MemoryStagingArea::new();
        let err = store.copy("a", "missing", "b", "x").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!store.contains("b", "x"));
    }
}
