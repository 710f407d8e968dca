use crate::error::{Result, SorterError};
use crate::storage::{content_fingerprint, ObjectStore};
use async_trait::async_trait;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Directory-backed object store: each bucket is a subdirectory of `root`,
/// each key a relative path within it. Lets the sorter run end-to-end
/// against a local filesystem.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Paths stay inside the store root: keys and bucket names with
    /// parent-directory components are rejected.
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        for (label, value) in [("bucket", bucket), ("key", key)] {
            if Path::new(value)
                .components()
                .any(|c| matches!(c, Component::ParentDir))
            {
                return Err(SorterError::Storage(format!(
                    "{label} '{value}' contains parent-directory components"
                )));
            }
        }
        Ok(self.root.join(bucket).join(key))
    }

    fn read_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.object_path(bucket, key)?;
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn exists(&self, bucket: &str, key: &str, fingerprint: Option<&str>) -> Result<bool> {
        match self.read_object(bucket, key)? {
            Some(bytes) => Ok(match fingerprint {
                Some(expected) => content_fingerprint(&bytes) == expected,
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
        let src = self.object_path(src_bucket, src_key)?;
        let dst = self.object_path(dst_bucket, dst_key)?;
        ensure_parent(&dst)?;
        fs::copy(&src, &dst).map_err(|e| {
            SorterError::Storage(format!(
                "copy {src_bucket}/{src_key} to {dst_bucket}/{dst_key}: {e}"
            ))
        })?;
        debug!("Copied {}/{} to {}/{}", src_bucket, src_key, dst_bucket, dst_key);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        fs::remove_file(&path)
            .map_err(|e| SorterError::Storage(format!("delete {bucket}/{key}: {e}")))?;
        debug!("Deleted {}/{}", bucket, key);
        Ok(())
    }

    async fn fingerprint(&self, bucket: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .read_object(bucket, key)?
            .map(|bytes| content_fingerprint(&bytes)))
    }
}
