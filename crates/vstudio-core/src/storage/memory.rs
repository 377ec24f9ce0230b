//! In-memory document store
//!
//! `HashMap`-backed store for testing and short-lived sessions. Collections
//! keep insertion order. Clone-friendly via `Arc`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::ops::{apply_array_update, apply_set, index_key, is_live, run_pipeline};
use super::{ArrayUpdate, DocumentStore, Stage, StoreError, StoreResult, UpdateResult};
use crate::object_id::{ObjectId, ID_FIELD};
use crate::query::{Document, Filter, Projection};

#[derive(Default)]
struct Collections {
    documents: HashMap<String, Vec<Document>>,
    unique_indexes: HashMap<String, Vec<Vec<String>>>,
}

impl Collections {
    /// Reject `candidate` if it collides with another live document on any
    /// registered unique index. `skip` is the position of the document being
    /// replaced, if any.
    fn check_unique(
        &self,
        collection: &str,
        candidate: &Document,
        skip: Option<usize>,
    ) -> StoreResult<()> {
        let Some(indexes) = self.unique_indexes.get(collection) else {
            return Ok(());
        };
        if !is_live(candidate) {
            return Ok(());
        }
        let docs = self.documents.get(collection).map(Vec::as_slice).unwrap_or(&[]);

        for fields in indexes {
            let Some(key) = index_key(candidate, fields) else {
                continue;
            };
            let collides = docs.iter().enumerate().any(|(i, other)| {
                Some(i) != skip && is_live(other) && index_key(other, fields).as_ref() == Some(&key)
            });
            if collides {
                return Err(StoreError::duplicate(collection));
            }
        }
        Ok(())
    }
}

/// In-memory document store backed by a `HashMap`
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Collections>> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Collections>> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }

    /// Number of documents in a collection, soft-deleted ones included
    pub fn count(&self, collection: &str) -> StoreResult<usize> {
        Ok(self.read()?.documents.get(collection).map_or(0, Vec::len))
    }
}

impl DocumentStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> StoreResult<Vec<Document>> {
        let inner = self.read()?;
        Ok(inner
            .documents
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| filter.matches(d))
                    .map(|d| projection.apply(d))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn insert_one(&self, collection: &str, mut document: Document) -> StoreResult<ObjectId> {
        let id = match document.get(ID_FIELD) {
            Some(value) => ObjectId::from_value(value)?,
            None => {
                let id = ObjectId::new();
                document.insert(ID_FIELD.to_string(), id.to_value());
                id
            }
        };

        let mut inner = self.write()?;
        let exists = inner
            .documents
            .get(collection)
            .is_some_and(|docs| docs.iter().any(|d| d.get(ID_FIELD) == Some(&id.to_value())));
        if exists {
            return Err(StoreError::duplicate(collection));
        }
        inner.check_unique(collection, &document, None)?;

        inner
            .documents
            .entry(collection.to_string())
            .or_default()
            .push(document);
        debug!(collection, %id, "Inserted document");
        Ok(id)
    }

    fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        set: &Document,
    ) -> StoreResult<Option<Document>> {
        let mut inner = self.write()?;
        let Some(position) = inner
            .documents
            .get(collection)
            .and_then(|docs| docs.iter().position(|d| filter.matches(d)))
        else {
            return Ok(None);
        };

        let mut updated = inner.documents[collection][position].clone();
        if apply_set(&mut updated, set) {
            inner.check_unique(collection, &updated, Some(position))?;
            if let Some(docs) = inner.documents.get_mut(collection) {
                docs[position] = updated.clone();
            }
            debug!(collection, "Updated document");
        }
        Ok(Some(updated))
    }

    fn find_one_and_delete(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> StoreResult<Option<Document>> {
        let mut inner = self.write()?;
        let Some(docs) = inner.documents.get_mut(collection) else {
            return Ok(None);
        };
        let removed = docs
            .iter()
            .position(|d| filter.matches(d))
            .map(|position| docs.remove(position));
        if removed.is_some() {
            debug!(collection, "Deleted document");
        }
        Ok(removed)
    }

    fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &ArrayUpdate,
    ) -> StoreResult<UpdateResult> {
        let mut inner = self.write()?;
        let Some(docs) = inner.documents.get_mut(collection) else {
            return Ok(UpdateResult::default());
        };

        // Apply to copies first so a failure leaves every document untouched
        let mut result = UpdateResult::default();
        let mut changed = Vec::new();
        for (position, doc) in docs.iter().enumerate() {
            if !filter.matches(doc) {
                continue;
            }
            result.matched += 1;
            let mut copy = doc.clone();
            if apply_array_update(&mut copy, update)? {
                result.modified += 1;
                changed.push((position, copy));
            }
        }
        for (position, copy) in changed {
            docs[position] = copy;
        }

        debug!(
            collection,
            field = update.field(),
            matched = result.matched,
            modified = result.modified,
            "Applied array update"
        );
        Ok(result)
    }

    fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> StoreResult<Vec<Document>> {
        let docs = self
            .read()?
            .documents
            .get(collection)
            .cloned()
            .unwrap_or_default();
        Ok(run_pipeline(docs, pipeline))
    }

    fn ensure_unique_index(&self, collection: &str, fields: &[&str]) -> StoreResult<bool> {
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let mut inner = self.write()?;

        // Existing documents must already satisfy the index
        let mut seen = Vec::new();
        for doc in inner.documents.get(collection).into_iter().flatten() {
            if !is_live(doc) {
                continue;
            }
            if let Some(key) = index_key(doc, &fields) {
                if seen.contains(&key) {
                    return Err(StoreError::duplicate(collection));
                }
                seen.push(key);
            }
        }

        let indexes = inner.unique_indexes.entry(collection.to_string()).or_default();
        if !indexes.contains(&fields) {
            indexes.push(fields);
        }
        debug!(collection, "Registered unique index");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_insert_assigns_id_and_find() {
        let store = MemoryStore::new();
        let id = store.insert_one("projects", doc(json!({"name": "p"}))).unwrap();

        let found = store
            .find("projects", &Filter::by_id(&id), &Projection::new())
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["_id"], id.to_hex());
        assert!(store.find("other", &Filter::new(), &Projection::new()).unwrap().is_empty());
    }

    #[test]
    fn test_insert_rejects_existing_id() {
        let store = MemoryStore::new();
        let id = ObjectId::new();
        let d = doc(json!({"_id": id.to_hex()}));
        store.insert_one("projects", d.clone()).unwrap();
        assert!(store.insert_one("projects", d).is_err());
        assert_eq!(store.count("projects").unwrap(), 1);
    }

    #[test]
    fn test_find_one_and_update_returns_new_state() {
        let store = MemoryStore::new();
        let id = store.insert_one("projects", doc(json!({"name": "p"}))).unwrap();

        let updated = store
            .find_one_and_update("projects", &Filter::by_id(&id), &doc(json!({"name": "q"})))
            .unwrap()
            .unwrap();
        assert_eq!(updated["name"], "q");

        let missing = store
            .find_one_and_update(
                "projects",
                &Filter::by_id(&ObjectId::new()),
                &doc(json!({"name": "q"})),
            )
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_find_one_and_delete() {
        let store = MemoryStore::new();
        let id = store.insert_one("projects", doc(json!({"name": "p"}))).unwrap();
        assert!(store
            .find_one_and_delete("projects", &Filter::by_id(&id))
            .unwrap()
            .is_some());
        assert!(store
            .find_one_and_delete("projects", &Filter::by_id(&id))
            .unwrap()
            .is_none());
        assert_eq!(store.count("projects").unwrap(), 0);
    }

    #[test]
    fn test_update_many_counts() {
        let store = MemoryStore::new();
        let id = store
            .insert_one("sequences", doc(json!({"steps": [{"_id": "a"}]})))
            .unwrap();

        let push = ArrayUpdate::Push {
            field: "steps".to_string(),
            items: vec![json!({"_id": "b"})],
            position: Some(0),
        };
        let result = store.update_many("sequences", &Filter::by_id(&id), &push).unwrap();
        assert_eq!(result, UpdateResult { matched: 1, modified: 1 });

        let pull = ArrayUpdate::Pull {
            field: "steps".to_string(),
            condition: Filter::new().with("_id", "zzz"),
        };
        let result = store.update_many("sequences", &Filter::by_id(&id), &pull).unwrap();
        assert_eq!(result, UpdateResult { matched: 1, modified: 0 });

        let stored = store
            .find("sequences", &Filter::by_id(&id), &Projection::new())
            .unwrap();
        assert_eq!(stored[0]["steps"], json!([{"_id": "b"}, {"_id": "a"}]));
    }

    #[test]
    fn test_unique_index_ignores_soft_deleted() {
        let store = MemoryStore::new();
        assert!(store.ensure_unique_index("users", &["email"]).unwrap());

        let id = store.insert_one("users", doc(json!({"email": "a@x.com"}))).unwrap();
        assert!(matches!(
            store.insert_one("users", doc(json!({"email": "a@x.com"}))),
            Err(StoreError::DuplicateDocumentRejected { .. })
        ));

        store
            .find_one_and_update("users", &Filter::by_id(&id), &doc(json!({"is_deleted": true})))
            .unwrap();
        store.insert_one("users", doc(json!({"email": "a@x.com"}))).unwrap();
    }

    #[test]
    fn test_unique_index_rejects_existing_duplicates() {
        let store = MemoryStore::new();
        store.insert_one("users", doc(json!({"email": "a@x.com"}))).unwrap();
        store.insert_one("users", doc(json!({"email": "a@x.com"}))).unwrap();
        assert!(store.ensure_unique_index("users", &["email"]).is_err());
    }
}
