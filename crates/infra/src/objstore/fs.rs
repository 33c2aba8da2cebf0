//! Filesystem-backed object store. Keys map to paths under `{root}/{bucket}`.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::{ObjectStore, ObjectStoreError, is_valid_key};

#[derive(Debug)]
pub struct FsObjectStore {
    root: PathBuf,
    bucket: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
        }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        if !is_valid_key(key) {
            return Err(ObjectStoreError::Backend(format!(
                "invalid object key: {key}"
            )));
        }
        Ok(self.root.join(&self.bucket).join(key))
    }
}

impl ObjectStore for FsObjectStore {
    fn put(
        &self,
        key: &str,
        local_path: &Path,
        _content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let dest = self.object_path(key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(local_path, &dest)?;
        Ok(())
    }

    fn stat_exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        Ok(self.object_path(key)?.is_file())
    }

    fn get_stream(&self, key: &str) -> Result<Box<dyn Read + Send>, ObjectStoreError> {
        let path = self.object_path(key)?;
        match fs::File::open(&path) {
            Ok(f) => Ok(Box::new(f)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, key: &str) -> Result<(), ObjectStoreError> {
        match fs::remove_file(self.object_path(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
