//! Document database client abstraction: CRUD, conditional `update_where`,
//! field addressing, and optimistic multi-document transactions.
//!
//! `transaction` records the version of every read and buffers writes;
//! commit re-validates the versions under the write lock and applies the
//! buffer atomically, or fails with `Conflict`.

pub mod memory;

use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use storefront_core::{DomainError, DomainResult};

pub use memory::InMemoryDocumentStore;

/// Document collections in the storefront database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Users,
    Addresses,
    Products,
    Orders,
    Carts,
    Galleries,
    Banners,
    Outbox,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Addresses => "addresses",
            Collection::Products => "products",
            Collection::Orders => "orders",
            Collection::Carts => "carts",
            Collection::Galleries => "galleries",
            Collection::Banners => "banners",
            Collection::Outbox => "outbox",
        }
    }
}

/// Explicit field addressing inside one document.
///
/// `within` optionally descends into `doc[array_field][index]` first, then
/// `field` names the scalar or array being read/written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAddress {
    pub collection: Collection,
    pub doc_id: String,
    pub field: String,
    pub within: Option<(String, usize)>,
}

impl FieldAddress {
    pub fn new(collection: Collection, doc_id: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            collection,
            doc_id: doc_id.into(),
            field: field.into(),
            within: None,
        }
    }

    pub fn within_array(mut self, array_field: impl Into<String>, index: usize) -> Self {
        self.within = Some((array_field.into(), index));
        self
    }
}

/// Filter for conditional updates (the `findOneAndUpdate` guard).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Match unconditionally.
    Any,
    /// Match when a top-level field equals the given value.
    FieldEquals { field: String, value: Value },
}

impl Filter {
    pub fn field_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::Any => true,
            Filter::FieldEquals { field, value } => doc.get(field) == Some(value),
        }
    }
}

/// One mutation inside a conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOp {
    /// Set a top-level field.
    Set { field: String, value: Value },
    /// Append to a top-level array field (created when missing).
    Push { field: String, value: Value },
}

impl PatchOp {
    pub fn set(field: impl Into<String>, value: Value) -> Self {
        Self::Set {
            field: field.into(),
            value,
        }
    }

    pub fn push(field: impl Into<String>, value: Value) -> Self {
        Self::Push {
            field: field.into(),
            value,
        }
    }

    pub(crate) fn apply(&self, doc: &mut Value) -> Result<(), DocStoreError> {
        let obj = doc
            .as_object_mut()
            .ok_or_else(|| DocStoreError::BadAddress("document is not an object".to_string()))?;
        match self {
            PatchOp::Set { field, value } => {
                obj.insert(field.clone(), value.clone());
            }
            PatchOp::Push { field, value } => {
                let entry = obj
                    .entry(field.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                entry
                    .as_array_mut()
                    .ok_or_else(|| {
                        DocStoreError::BadAddress(format!("field '{field}' is not an array"))
                    })?
                    .push(value.clone());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum DocStoreError {
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: &'static str, id: String },
    #[error("document already exists: {collection}/{id}")]
    AlreadyExists { collection: &'static str, id: String },
    #[error("bad field address: {0}")]
    BadAddress(String),
    #[error("serialization failed: {0}")]
    Serialize(String),
}

impl DocStoreError {
    pub fn not_found(collection: Collection, id: &str) -> Self {
        Self::NotFound {
            collection: collection.as_str(),
            id: id.to_string(),
        }
    }

    pub fn already_exists(collection: Collection, id: &str) -> Self {
        Self::AlreadyExists {
            collection: collection.as_str(),
            id: id.to_string(),
        }
    }
}

impl From<DocStoreError> for DomainError {
    fn from(err: DocStoreError) -> Self {
        match err {
            DocStoreError::NotFound { collection, id } => {
                DomainError::not_found(format!("{collection}/{id}"))
            }
            DocStoreError::AlreadyExists { collection, id } => {
                DomainError::conflict(format!("{collection}/{id} already exists"))
            }
            other => DomainError::invalid_input(other.to_string()),
        }
    }
}

/// Document store abstraction.
pub trait DocumentStore: Send + Sync {
    fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, DocStoreError>;

    /// Insert a new document; fails when the id is taken.
    fn insert(&self, collection: Collection, id: &str, doc: Value) -> Result<(), DocStoreError>;

    /// Replace an existing document; fails when missing.
    fn replace(&self, collection: Collection, id: &str, doc: Value) -> Result<(), DocStoreError>;

    /// Delete a document. Returns whether it existed.
    fn delete(&self, collection: Collection, id: &str) -> Result<bool, DocStoreError>;

    /// Conditional read-modify-write: apply `patch` only when `filter`
    /// matches the current document. Returns whether a document matched.
    /// Zero matches is not an error — it is the idempotency guard.
    fn update_where(
        &self,
        collection: Collection,
        id: &str,
        filter: &Filter,
        patch: &[PatchOp],
    ) -> Result<bool, DocStoreError>;

    /// Atomic array append at an addressed field. Concurrent appends to the
    /// same document must not lose updates.
    fn push_to_array(&self, addr: &FieldAddress, value: Value) -> Result<(), DocStoreError>;

    /// Overwrite the scalar at an addressed field.
    fn set_field(&self, addr: &FieldAddress, value: Value) -> Result<(), DocStoreError>;

    /// Read the value at an addressed field (None when unset).
    fn get_field(&self, addr: &FieldAddress) -> Result<Option<Value>, DocStoreError>;

    /// All live documents in a collection (outbox polling, admin listings).
    fn list(&self, collection: Collection) -> Result<Vec<(String, Value)>, DocStoreError>;

    /// Run a closure inside an optimistic multi-document transaction.
    ///
    /// The closure's writes apply atomically at commit; a version conflict
    /// surfaces as `DomainError::Conflict` with nothing applied.
    fn transaction(
        &self,
        f: &mut dyn FnMut(&mut Txn<'_>) -> DomainResult<()>,
    ) -> DomainResult<()>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<S> {
    fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, DocStoreError> {
        (**self).get(collection, id)
    }

    fn insert(&self, collection: Collection, id: &str, doc: Value) -> Result<(), DocStoreError> {
        (**self).insert(collection, id, doc)
    }

    fn replace(&self, collection: Collection, id: &str, doc: Value) -> Result<(), DocStoreError> {
        (**self).replace(collection, id, doc)
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<bool, DocStoreError> {
        (**self).delete(collection, id)
    }

    fn update_where(
        &self,
        collection: Collection,
        id: &str,
        filter: &Filter,
        patch: &[PatchOp],
    ) -> Result<bool, DocStoreError> {
        (**self).update_where(collection, id, filter, patch)
    }

    fn push_to_array(&self, addr: &FieldAddress, value: Value) -> Result<(), DocStoreError> {
        (**self).push_to_array(addr, value)
    }

    fn set_field(&self, addr: &FieldAddress, value: Value) -> Result<(), DocStoreError> {
        (**self).set_field(addr, value)
    }

    fn get_field(&self, addr: &FieldAddress) -> Result<Option<Value>, DocStoreError> {
        (**self).get_field(addr)
    }

    fn list(&self, collection: Collection) -> Result<Vec<(String, Value)>, DocStoreError> {
        (**self).list(collection)
    }

    fn transaction(
        &self,
        f: &mut dyn FnMut(&mut Txn<'_>) -> DomainResult<()>,
    ) -> DomainResult<()> {
        (**self).transaction(f)
    }
}

type Key = (Collection, String);

/// Buffered transactional view over a document store snapshot.
pub struct Txn<'a> {
    fetch: &'a dyn Fn(Collection, &str) -> Option<(u64, Value)>,
    /// Version observed for every document read (None = absent at read time).
    reads: HashMap<Key, Option<u64>>,
    /// Buffered writes, last write wins (None = delete).
    writes: HashMap<Key, Option<Value>>,
}

impl<'a> Txn<'a> {
    pub(crate) fn new(fetch: &'a dyn Fn(Collection, &str) -> Option<(u64, Value)>) -> Self {
        Self {
            fetch,
            reads: HashMap::new(),
            writes: HashMap::new(),
        }
    }

    /// Read a document, seeing this transaction's own writes.
    pub fn get(&mut self, collection: Collection, id: &str) -> Option<Value> {
        let key = (collection, id.to_string());
        if let Some(buffered) = self.writes.get(&key) {
            return buffered.clone();
        }
        let fetched = (self.fetch)(collection, id);
        self.reads
            .entry(key)
            .or_insert(fetched.as_ref().map(|(v, _)| *v));
        fetched.map(|(_, doc)| doc)
    }

    /// Typed read.
    pub fn get_as<T: DeserializeOwned>(
        &mut self,
        collection: Collection,
        id: &str,
    ) -> DomainResult<Option<T>> {
        match self.get(collection, id) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| DomainError::invalid_input(format!("decode {collection:?}/{id}: {e}"))),
        }
    }

    /// Buffer an insert; fails if the document is visible in this transaction.
    pub fn insert(&mut self, collection: Collection, id: &str, doc: Value) -> DomainResult<()> {
        if self.get(collection, id).is_some() {
            return Err(DomainError::conflict(format!(
                "{}/{id} already exists",
                collection.as_str()
            )));
        }
        self.writes.insert((collection, id.to_string()), Some(doc));
        Ok(())
    }

    pub fn insert_as<T: Serialize>(
        &mut self,
        collection: Collection,
        id: &str,
        doc: &T,
    ) -> DomainResult<()> {
        let value = serde_json::to_value(doc)
            .map_err(|e| DomainError::invalid_input(format!("encode {collection:?}/{id}: {e}")))?;
        self.insert(collection, id, value)
    }

    /// Buffer an unconditional write (insert-or-replace).
    pub fn put(&mut self, collection: Collection, id: &str, doc: Value) {
        self.writes.insert((collection, id.to_string()), Some(doc));
    }

    pub fn put_as<T: Serialize>(
        &mut self,
        collection: Collection,
        id: &str,
        doc: &T,
    ) -> DomainResult<()> {
        let value = serde_json::to_value(doc)
            .map_err(|e| DomainError::invalid_input(format!("encode {collection:?}/{id}: {e}")))?;
        self.put(collection, id, value);
        Ok(())
    }

    /// Buffer a delete.
    pub fn delete(&mut self, collection: Collection, id: &str) {
        self.writes.insert((collection, id.to_string()), None);
    }

    pub(crate) fn reads(&self) -> &HashMap<Key, Option<u64>> {
        &self.reads
    }

    pub(crate) fn into_writes(self) -> HashMap<Key, Option<Value>> {
        self.writes
    }
}

/// Resolve the object that owns `addr.field`, descending into a nested
/// array element when `addr.within` is set.
pub(crate) fn target_object<'v>(
    doc: &'v mut Value,
    addr: &FieldAddress,
) -> Result<&'v mut serde_json::Map<String, Value>, DocStoreError> {
    let container = match &addr.within {
        None => doc,
        Some((array_field, index)) => doc
            .get_mut(array_field)
            .and_then(Value::as_array_mut)
            .ok_or_else(|| {
                DocStoreError::BadAddress(format!("'{array_field}' is not an array"))
            })?
            .get_mut(*index)
            .ok_or_else(|| {
                DocStoreError::BadAddress(format!("'{array_field}[{index}]' out of bounds"))
            })?,
    };
    container
        .as_object_mut()
        .ok_or_else(|| DocStoreError::BadAddress("target is not an object".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_matches_on_field_value() {
        let doc = json!({"status": "pending", "total": 5});
        assert!(Filter::field_equals("status", "pending").matches(&doc));
        assert!(!Filter::field_equals("status", "processing").matches(&doc));
        assert!(Filter::Any.matches(&doc));
    }

    #[test]
    fn patch_set_and_push() {
        let mut doc = json!({"status": "pending"});
        PatchOp::set("status", json!("processing"))
            .apply(&mut doc)
            .unwrap();
        PatchOp::push("steps", json!({"status": "processing"}))
            .apply(&mut doc)
            .unwrap();
        PatchOp::push("steps", json!({"status": "shipped"}))
            .apply(&mut doc)
            .unwrap();

        assert_eq!(doc["status"], "processing");
        assert_eq!(doc["steps"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn patch_push_rejects_non_array() {
        let mut doc = json!({"steps": "oops"});
        let err = PatchOp::push("steps", json!(1)).apply(&mut doc).unwrap_err();
        assert!(matches!(err, DocStoreError::BadAddress(_)));
    }

    #[test]
    fn target_object_descends_into_array_elements() {
        let mut doc = json!({
            "visuals": [
                {"images": ["a.jpg"]},
                {"images": []},
                {"images": ["b.jpg"]}
            ]
        });
        let addr = FieldAddress::new(Collection::Galleries, "g1", "images")
            .within_array("visuals", 2);
        let obj = target_object(&mut doc, &addr).unwrap();
        obj.get_mut("images")
            .unwrap()
            .as_array_mut()
            .unwrap()
            .push(json!("c.jpg"));

        assert_eq!(doc["visuals"][2]["images"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn target_object_rejects_out_of_bounds() {
        let mut doc = json!({"visuals": []});
        let addr = FieldAddress::new(Collection::Galleries, "g1", "images")
            .within_array("visuals", 3);
        assert!(matches!(
            target_object(&mut doc, &addr).unwrap_err(),
            DocStoreError::BadAddress(_)
        ));
    }
}
