//! In-memory document store.
//!
//! Intended for tests/dev and as the reference semantics for a real
//! document-database adapter. Versions are monotonic per key and survive
//! deletes (tombstones), so optimistic transactions cannot be fooled by
//! delete-then-reinsert races.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;

use storefront_core::{DomainError, DomainResult};

use super::{
    Collection, DocStoreError, DocumentStore, FieldAddress, Filter, PatchOp, Txn, target_object,
};

#[derive(Debug, Clone)]
struct Versioned {
    version: u64,
    /// None = tombstone (deleted, version retained).
    doc: Option<Value>,
}

#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    docs: RwLock<HashMap<(Collection, String), Versioned>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutate_live<F>(&self, collection: Collection, id: &str, f: F) -> Result<(), DocStoreError>
    where
        F: FnOnce(&mut Value) -> Result<(), DocStoreError>,
    {
        let mut docs = self.docs.write().unwrap();
        let entry = docs
            .get_mut(&(collection, id.to_string()))
            .filter(|v| v.doc.is_some())
            .ok_or_else(|| DocStoreError::not_found(collection, id))?;

        // Mutate a copy so a failed patch leaves the document untouched.
        let mut doc = entry.doc.clone().expect("live document");
        f(&mut doc)?;
        entry.doc = Some(doc);
        entry.version += 1;
        Ok(())
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, DocStoreError> {
        let docs = self.docs.read().unwrap();
        Ok(docs
            .get(&(collection, id.to_string()))
            .and_then(|v| v.doc.clone()))
    }

    fn insert(&self, collection: Collection, id: &str, doc: Value) -> Result<(), DocStoreError> {
        let mut docs = self.docs.write().unwrap();
        let entry = docs
            .entry((collection, id.to_string()))
            .or_insert(Versioned {
                version: 0,
                doc: None,
            });
        if entry.doc.is_some() {
            return Err(DocStoreError::already_exists(collection, id));
        }
        entry.doc = Some(doc);
        entry.version += 1;
        Ok(())
    }

    fn replace(&self, collection: Collection, id: &str, doc: Value) -> Result<(), DocStoreError> {
        self.mutate_live(collection, id, |current| {
            *current = doc;
            Ok(())
        })
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<bool, DocStoreError> {
        let mut docs = self.docs.write().unwrap();
        match docs.get_mut(&(collection, id.to_string())) {
            Some(entry) if entry.doc.is_some() => {
                entry.doc = None;
                entry.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn update_where(
        &self,
        collection: Collection,
        id: &str,
        filter: &Filter,
        patch: &[PatchOp],
    ) -> Result<bool, DocStoreError> {
        let mut docs = self.docs.write().unwrap();
        let Some(entry) = docs
            .get_mut(&(collection, id.to_string()))
            .filter(|v| v.doc.is_some())
        else {
            return Ok(false);
        };

        let current = entry.doc.as_ref().expect("live document");
        if !filter.matches(current) {
            return Ok(false);
        }

        let mut doc = current.clone();
        for op in patch {
            op.apply(&mut doc)?;
        }
        entry.doc = Some(doc);
        entry.version += 1;
        Ok(true)
    }

    fn push_to_array(&self, addr: &FieldAddress, value: Value) -> Result<(), DocStoreError> {
        self.mutate_live(addr.collection, &addr.doc_id, |doc| {
            let obj = target_object(doc, addr)?;
            let entry = obj
                .entry(addr.field.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            entry
                .as_array_mut()
                .ok_or_else(|| {
                    DocStoreError::BadAddress(format!("field '{}' is not an array", addr.field))
                })?
                .push(value);
            Ok(())
        })
    }

    fn set_field(&self, addr: &FieldAddress, value: Value) -> Result<(), DocStoreError> {
        self.mutate_live(addr.collection, &addr.doc_id, |doc| {
            let obj = target_object(doc, addr)?;
            obj.insert(addr.field.clone(), value);
            Ok(())
        })
    }

    fn get_field(&self, addr: &FieldAddress) -> Result<Option<Value>, DocStoreError> {
        let mut doc = self
            .get(addr.collection, &addr.doc_id)?
            .ok_or_else(|| DocStoreError::not_found(addr.collection, &addr.doc_id))?;
        let obj = target_object(&mut doc, addr)?;
        Ok(obj.get(&addr.field).cloned())
    }

    fn list(&self, collection: Collection) -> Result<Vec<(String, Value)>, DocStoreError> {
        let docs = self.docs.read().unwrap();
        let mut result: Vec<(String, Value)> = docs
            .iter()
            .filter(|((c, _), v)| *c == collection && v.doc.is_some())
            .map(|((_, id), v)| (id.clone(), v.doc.clone().expect("live document")))
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(result)
    }

    fn transaction(
        &self,
        f: &mut dyn FnMut(&mut Txn<'_>) -> DomainResult<()>,
    ) -> DomainResult<()> {
        let fetch = |collection: Collection, id: &str| -> Option<(u64, Value)> {
            let docs = self.docs.read().unwrap();
            docs.get(&(collection, id.to_string()))
                .and_then(|v| v.doc.clone().map(|doc| (v.version, doc)))
        };

        let mut txn = Txn::new(&fetch);
        f(&mut txn)?;

        // Commit: re-validate every read under the write lock, then apply.
        let mut docs = self.docs.write().unwrap();
        for ((collection, id), recorded) in txn.reads() {
            let current = docs
                .get(&(*collection, id.clone()))
                .and_then(|v| v.doc.as_ref().map(|_| v.version));
            if current != *recorded {
                return Err(DomainError::conflict(format!(
                    "{}/{id} modified concurrently",
                    collection.as_str()
                )));
            }
        }

        for ((collection, id), write) in txn.into_writes() {
            let entry = docs.entry((collection, id)).or_insert(Versioned {
                version: 0,
                doc: None,
            });
            entry.doc = write;
            entry.version += 1;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_get_replace_delete() {
        let store = InMemoryDocumentStore::new();
        store
            .insert(Collection::Products, "p1", json!({"title": "Shirt"}))
            .unwrap();

        assert!(matches!(
            store.insert(Collection::Products, "p1", json!({})),
            Err(DocStoreError::AlreadyExists { .. })
        ));

        store
            .replace(Collection::Products, "p1", json!({"title": "Hat"}))
            .unwrap();
        assert_eq!(
            store.get(Collection::Products, "p1").unwrap().unwrap()["title"],
            "Hat"
        );

        assert!(store.delete(Collection::Products, "p1").unwrap());
        assert!(!store.delete(Collection::Products, "p1").unwrap());
        assert!(store.get(Collection::Products, "p1").unwrap().is_none());
    }

    #[test]
    fn conditional_update_applies_once() {
        let store = InMemoryDocumentStore::new();
        store
            .insert(Collection::Orders, "o1", json!({"status": "pending", "steps": []}))
            .unwrap();

        let filter = Filter::field_equals("status", "pending");
        let patch = vec![
            PatchOp::set("status", json!("processing")),
            PatchOp::push("steps", json!({"status": "processing"})),
        ];

        assert!(store
            .update_where(Collection::Orders, "o1", &filter, &patch)
            .unwrap());
        // Second delivery: guard no longer matches, nothing changes.
        assert!(!store
            .update_where(Collection::Orders, "o1", &filter, &patch)
            .unwrap());

        let doc = store.get(Collection::Orders, "o1").unwrap().unwrap();
        assert_eq!(doc["status"], "processing");
        assert_eq!(doc["steps"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn update_where_on_missing_doc_is_no_match() {
        let store = InMemoryDocumentStore::new();
        assert!(!store
            .update_where(Collection::Orders, "ghost", &Filter::Any, &[])
            .unwrap());
    }

    #[test]
    fn push_to_array_creates_and_appends() {
        let store = InMemoryDocumentStore::new();
        store
            .insert(Collection::Galleries, "g1", json!({"status": "processing"}))
            .unwrap();

        let addr = FieldAddress::new(Collection::Galleries, "g1", "images");
        store.push_to_array(&addr, json!("a.jpg")).unwrap();
        store.push_to_array(&addr, json!("b.jpg")).unwrap();

        let images = store.get_field(&addr).unwrap().unwrap();
        assert_eq!(images, json!(["a.jpg", "b.jpg"]));
    }

    #[test]
    fn set_and_get_nested_field() {
        let store = InMemoryDocumentStore::new();
        store
            .insert(
                Collection::Galleries,
                "g1",
                json!({"visuals": [{"images": []}, {"images": []}]}),
            )
            .unwrap();

        let addr = FieldAddress::new(Collection::Galleries, "g1", "images")
            .within_array("visuals", 1);
        store.push_to_array(&addr, json!("x.jpg")).unwrap();

        let doc = store.get(Collection::Galleries, "g1").unwrap().unwrap();
        assert_eq!(doc["visuals"][1]["images"], json!(["x.jpg"]));
        assert_eq!(doc["visuals"][0]["images"], json!([]));
    }

    #[test]
    fn transaction_commits_atomically() {
        let store = InMemoryDocumentStore::new();
        store
            .insert(Collection::Products, "p1", json!({"stock": 5}))
            .unwrap();

        store
            .transaction(&mut |txn| {
                let mut doc = txn.get(Collection::Products, "p1").unwrap();
                doc["stock"] = json!(4);
                txn.put(Collection::Products, "p1", doc);
                txn.insert(Collection::Orders, "o1", json!({"status": "pending"}))?;
                txn.delete(Collection::Carts, "c1");
                Ok(())
            })
            .unwrap();

        assert_eq!(
            store.get(Collection::Products, "p1").unwrap().unwrap()["stock"],
            4
        );
        assert!(store.get(Collection::Orders, "o1").unwrap().is_some());
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let store = InMemoryDocumentStore::new();
        store
            .insert(Collection::Products, "p1", json!({"stock": 5}))
            .unwrap();

        let err = store
            .transaction(&mut |txn| {
                let mut doc = txn.get(Collection::Products, "p1").unwrap();
                doc["stock"] = json!(0);
                txn.put(Collection::Products, "p1", doc);
                Err(DomainError::insufficient_stock("nope"))
            })
            .unwrap_err();

        assert!(matches!(err, DomainError::InsufficientStock(_)));
        assert_eq!(
            store.get(Collection::Products, "p1").unwrap().unwrap()["stock"],
            5
        );
    }

    #[test]
    fn concurrent_modification_conflicts() {
        let store = InMemoryDocumentStore::new();
        store
            .insert(Collection::Products, "p1", json!({"stock": 1}))
            .unwrap();

        let err = store
            .transaction(&mut |txn| {
                let _read = txn.get(Collection::Products, "p1").unwrap();
                // Another writer sneaks in between read and commit.
                store
                    .replace(Collection::Products, "p1", json!({"stock": 0}))
                    .unwrap();
                txn.put(Collection::Products, "p1", json!({"stock": 0}));
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn transaction_sees_its_own_writes() {
        let store = InMemoryDocumentStore::new();
        store
            .transaction(&mut |txn| {
                txn.insert(Collection::Users, "u1", json!({"phone": null}))?;
                let doc = txn.get(Collection::Users, "u1").unwrap();
                assert!(doc["phone"].is_null());
                txn.delete(Collection::Users, "u1");
                assert!(txn.get(Collection::Users, "u1").is_none());
                Ok(())
            })
            .unwrap();

        assert!(store.get(Collection::Users, "u1").unwrap().is_none());
    }
}
