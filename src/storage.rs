use crate::error::{Result, SorterError};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Content fingerprint used to confirm two objects are byte-identical
/// across buckets (the etag analogue).
pub fn content_fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Object storage the sorter moves files through. `copy` is a server-side
/// copy by key, never a download+upload.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Whether an object exists, optionally also matching a content fingerprint.
    async fn exists(&self, bucket: &str, key: &str, fingerprint: Option<&str>) -> Result<bool>;

    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// Content fingerprint of a stored object, `None` when the object is absent.
    async fn fingerprint(&self, bucket: &str, key: &str) -> Result<Option<String>>;
}

/// In-memory object store for development/testing. Records every mutating
/// call and can be told to fail them, so tests can assert both outcomes and
/// the exact storage traffic.
pub struct InMemoryStore {
    objects: Arc<Mutex<HashMap<(String, String), Vec<u8>>>>,
    copy_calls: Arc<Mutex<Vec<(String, String, String, String)>>>,
    delete_calls: Arc<Mutex<Vec<(String, String)>>>,
    fail_copy: AtomicBool,
    fail_delete: AtomicBool,
    fail_fingerprint: AtomicBool,
    // copy reports success but writes nothing, for confirm-step tests
    drop_copies: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(HashMap::new())),
            copy_calls: Arc::new(Mutex::new(Vec::new())),
            delete_calls: Arc::new(Mutex::new(Vec::new())),
            fail_copy: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            fail_fingerprint: AtomicBool::new(false),
            drop_copies: AtomicBool::new(false),
        }
    }

    pub fn put(&self, bucket: &str, key: &str, bytes: &[u8]) {
        let mut objects = self.objects.lock().unwrap();
        objects.insert((bucket.to_string(), key.to_string()), bytes.to_vec());
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        let objects = self.objects.lock().unwrap();
        objects.contains_key(&(bucket.to_string(), key.to_string()))
    }

    pub fn copy_call_count(&self) -> usize {
        self.copy_calls.lock().unwrap().len()
    }

    pub fn delete_call_count(&self) -> usize {
        self.delete_calls.lock().unwrap().len()
    }

    pub fn set_fail_copy(&self, fail: bool) {
        self.fail_copy.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_fingerprint(&self, fail: bool) {
        self.fail_fingerprint.store(fail, Ordering::SeqCst);
    }

    pub fn set_drop_copies(&self, drop: bool) {
        self.drop_copies.store(drop, Ordering::SeqCst);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn exists(&self, bucket: &str, key: &str, fingerprint: Option<&str>) -> Result<bool> {
        let objects = self.objects.lock().unwrap();
        match objects.get(&(bucket.to_string(), key.to_string())) {
            Some(bytes) => Ok(match fingerprint {
                Some(expected) => content_fingerprint(bytes) == expected,
                None => true,
            }),
            None => Ok(false),
        }
    }

    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()> {
        self.copy_calls.lock().unwrap().push((
            src_bucket.to_string(),
            src_key.to_string(),
            dst_bucket.to_string(),
            dst_key.to_string(),
        ));

        if self.fail_copy.load(Ordering::SeqCst) {
            return Err(SorterError::Storage("injected copy failure".to_string()));
        }
        if self.drop_copies.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut objects = self.objects.lock().unwrap();
        let bytes = objects
            .get(&(src_bucket.to_string(), src_key.to_string()))
            .cloned()
            .ok_or_else(|| {
                SorterError::Storage(format!("copy source {src_bucket}/{src_key} not found"))
            })?;
        objects.insert((dst_bucket.to_string(), dst_key.to_string()), bytes);

        debug!("Copied {}/{} to {}/{}", src_bucket, src_key, dst_bucket, dst_key);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.delete_calls
            .lock()
            .unwrap()
            .push((bucket.to_string(), key.to_string()));

        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(SorterError::Storage("injected delete failure".to_string()));
        }

        let mut objects = self.objects.lock().unwrap();
        objects.remove(&(bucket.to_string(), key.to_string()));

        debug!("Deleted {}/{}", bucket, key);
        Ok(())
    }

    async fn fingerprint(&self, bucket: &str, key: &str) -> Result<Option<String>> {
        if self.fail_fingerprint.load(Ordering::SeqCst) {
            return Err(SorterError::Storage(
                "injected fingerprint failure".to_string(),
            ));
        }

        let objects = self.objects.lock().unwrap();
        Ok(objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|bytes| content_fingerprint(bytes)))
    }
}
