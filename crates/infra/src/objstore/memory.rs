//! In-memory object store for tests/dev.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::RwLock;

use super::{ObjectStore, ObjectStoreError};

#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, (String, Vec<u8>)>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys currently stored, sorted (test assertions).
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put(
        &self,
        key: &str,
        local_path: &Path,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let bytes = std::fs::read(local_path)?;
        let mut objects = self.objects.write().unwrap();
        objects.insert(key.to_string(), (content_type.to_string(), bytes));
        Ok(())
    }

    fn stat_exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        Ok(self.objects.read().unwrap().contains_key(key))
    }

    fn get_stream(&self, key: &str) -> Result<Box<dyn Read + Send>, ObjectStoreError> {
        let objects = self.objects.read().unwrap();
        let (_, bytes) = objects
            .get(key)
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))?;
        Ok(Box::new(Cursor::new(bytes.clone())))
    }

    fn remove(&self, key: &str) -> Result<(), ObjectStoreError> {
        // Best-effort: missing keys are fine.
        self.objects.write().unwrap().remove(key);
        Ok(())
    }
}
