//! Object store client: thin wrapper over an S3-compatible blob store.
//!
//! Keys follow `{collection}/{filename}`. Deletion is best-effort cleanup,
//! never correctness-critical: `remove` on a missing key succeeds.

pub mod fs;
pub mod memory;

use std::io::Read;
use std::path::Path;

use thiserror::Error;

pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;

/// Cache-control header value served by the public read proxy.
pub const CACHE_CONTROL: &str = "public, max-age=86400";

/// Whether `key` is a plain relative path: non-empty segments only,
/// no `.` or `..`, no leading slash. Anything else must not reach the
/// filesystem backend, where it could resolve outside the bucket root.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('/')
        && key
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != "..")
}

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Object store configuration.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub bucket: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            bucket: "storefront-media".to_string(),
        }
    }
}

impl ObjectStoreConfig {
    /// Map a public path suffix (e.g. `gallery/Gallery-x-1.jpg`) onto the
    /// `(bucket, key)` pair streamed by the read proxy endpoint.
    pub fn resolve_public_path(&self, path: &str) -> Option<(String, String)> {
        let key = path.trim_start_matches('/');
        if !is_valid_key(key) || !key.contains('/') {
            return None;
        }
        Some((self.bucket.clone(), key.to_string()))
    }
}

/// Blob store client surface.
pub trait ObjectStore: Send + Sync {
    /// Upload a local file under `key`.
    fn put(&self, key: &str, local_path: &Path, content_type: &str)
        -> Result<(), ObjectStoreError>;

    /// Whether an object exists at `key`.
    fn stat_exists(&self, key: &str) -> Result<bool, ObjectStoreError>;

    /// Open a streaming reader over the object.
    fn get_stream(&self, key: &str) -> Result<Box<dyn Read + Send>, ObjectStoreError>;

    /// Delete the object at `key`. A missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), ObjectStoreError>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for std::sync::Arc<S> {
    fn put(
        &self,
        key: &str,
        local_path: &Path,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        (**self).put(key, local_path, content_type)
    }

    fn stat_exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        (**self).stat_exists(key)
    }

    fn get_stream(&self, key: &str) -> Result<Box<dyn Read + Send>, ObjectStoreError> {
        (**self).get_stream(key)
    }

    fn remove(&self, key: &str) -> Result<(), ObjectStoreError> {
        (**self).remove(key)
    }
}
