//! Top-level document primitives
//!
//! Create, read, update and delete for a single document in a named
//! collection. Duplicate detection compares the declared key fields against
//! live documents before writing; when the store also enforces a unique
//! index, its rejection surfaces as the same error.

use serde_json::Value;
use tracing::debug;

use crate::object_id::{ObjectId, ID_FIELD};
use crate::query::{Document, Filter, Projection};
use crate::storage::ops::{apply_set, is_live};
use crate::storage::{DocumentStore, StoreError, StoreResult};

/// Fail if any key field is absent from `document`
pub fn validate_missing_fields(document: &Document, key_fields: &[&str]) -> StoreResult<()> {
    match key_fields.iter().find(|field| !document.contains_key(**field)) {
        Some(field) => Err(StoreError::MandatoryFieldMissing {
            field: field.to_string(),
        }),
        None => Ok(()),
    }
}

/// Reject `document` if a live document other than `exclude` shares all of
/// its key-field values
fn check_duplicates(
    store: &dyn DocumentStore,
    collection: &str,
    document: &Document,
    key_fields: &[&str],
    exclude: Option<&ObjectId>,
) -> StoreResult<()> {
    if key_fields.is_empty() {
        return Ok(());
    }

    let mut filter = Filter::new();
    for field in key_fields {
        filter.insert(*field, document.get(*field).cloned().unwrap_or(Value::Null));
    }

    let excluded = exclude.map(ObjectId::to_value);
    let duplicate = store
        .find(collection, &filter, &Projection::new())?
        .iter()
        .any(|doc| is_live(doc) && doc.get(ID_FIELD) != excluded.as_ref());
    if duplicate {
        debug!(collection, "Rejected duplicate key fields");
        return Err(StoreError::duplicate(collection));
    }
    Ok(())
}

/// Insert a document and return it as stored
pub fn create_document(
    store: &dyn DocumentStore,
    collection: &str,
    document: Document,
    key_fields: &[&str],
    allow_duplicates: bool,
) -> StoreResult<Document> {
    validate_missing_fields(&document, key_fields)?;
    if !allow_duplicates {
        check_duplicates(store, collection, &document, key_fields, None)?;
    }

    let id = store.insert_one(collection, document)?;
    read_one(store, collection, &id)
}

/// Documents matching `filter`; an empty filter reads the whole collection
pub fn read_document(
    store: &dyn DocumentStore,
    collection: &str,
    filter: &Filter,
    projection: &Projection,
) -> StoreResult<Vec<Document>> {
    store.find(collection, filter, projection)
}

fn read_one(store: &dyn DocumentStore, collection: &str, id: &ObjectId) -> StoreResult<Document> {
    store
        .find(collection, &Filter::by_id(id), &Projection::new())?
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::not_found(collection))
}

/// Apply a partial update and return the document after it
pub fn update_document(
    store: &dyn DocumentStore,
    collection: &str,
    id: &ObjectId,
    mut partial: Document,
    key_fields: &[&str],
    allow_duplicates: bool,
) -> StoreResult<Document> {
    let existing = read_one(store, collection, id)?;
    partial.remove(ID_FIELD);

    if !allow_duplicates && !key_fields.is_empty() {
        // Compare against the full key tuple the document will end up with
        let mut candidate = partial.clone();
        for field in key_fields {
            if !candidate.contains_key(*field) {
                if let Some(value) = existing.get(*field) {
                    candidate.insert(field.to_string(), value.clone());
                }
            }
        }

        let key_changed = key_fields
            .iter()
            .any(|field| candidate.get(*field) != existing.get(*field));

        // A retired document coming back must not collide with its replacement
        let mut after = existing.clone();
        apply_set(&mut after, &partial);
        let revived = !is_live(&existing) && is_live(&after);

        if is_live(&after) && (key_changed || revived) {
            check_duplicates(store, collection, &candidate, key_fields, Some(id))?;
        }
    }

    store
        .find_one_and_update(collection, &Filter::by_id(id), &partial)?
        .ok_or_else(|| StoreError::not_found(collection))
}

/// Physically delete a document
pub fn delete_document(store: &dyn DocumentStore, collection: &str, id: &ObjectId) -> StoreResult<bool> {
    read_one(store, collection, id)?;

    // It may have been removed since the existence check
    store
        .find_one_and_delete(collection, &Filter::by_id(id))?
        .ok_or_else(|| StoreError::not_found(collection))?;
    debug!(collection, %id, "Document deleted");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, SqliteStore};
    use serde_json::json;

    const ORG_KEYS: &[&str] = &["name", "org_owner_email"];

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn org(name: &str, email: &str) -> Document {
        doc(json!({"name": name, "org_owner_email": email}))
    }

    #[test]
    fn test_organisation_scenario() {
        let store = MemoryStore::new();

        let created = create_document(&store, "organisations", org("Acme", "a@x.com"), ORG_KEYS, false)
            .unwrap();
        assert!(ObjectId::from_value(&created["_id"]).is_ok());
        assert_eq!(created["name"], "Acme");

        let err = create_document(&store, "organisations", org("Acme", "a@x.com"), ORG_KEYS, false)
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateDocumentRejected { .. }));

        create_document(&store, "organisations", org("Acme", "b@y.com"), ORG_KEYS, false).unwrap();
        assert_eq!(store.count("organisations").unwrap(), 2);
    }

    #[test]
    fn test_allow_duplicates() {
        let store = MemoryStore::new();
        create_document(&store, "organisations", org("Acme", "a@x.com"), ORG_KEYS, false).unwrap();
        create_document(&store, "organisations", org("Acme", "a@x.com"), ORG_KEYS, true).unwrap();
        assert_eq!(store.count("organisations").unwrap(), 2);
    }

    #[test]
    fn test_soft_deleted_documents_do_not_collide() {
        let store = MemoryStore::new();
        let mut retired = org("Acme", "a@x.com");
        retired.insert("is_deleted".to_string(), json!(true));
        create_document(&store, "organisations", retired, ORG_KEYS, false).unwrap();

        create_document(&store, "organisations", org("Acme", "a@x.com"), ORG_KEYS, false).unwrap();
    }

    #[test]
    fn test_mandatory_fields() {
        let store = MemoryStore::new();
        let err = create_document(
            &store,
            "organisations",
            doc(json!({"name": "Acme", "extra": 1, "more": true})),
            ORG_KEYS,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::MandatoryFieldMissing { field } if field == "org_owner_email"));
        assert_eq!(store.count("organisations").unwrap(), 0);

        // A null value still counts as present
        create_document(
            &store,
            "organisations",
            doc(json!({"name": "Acme", "org_owner_email": null})),
            ORG_KEYS,
            false,
        )
        .unwrap();
    }

    #[test]
    fn test_read_is_idempotent() {
        let store = MemoryStore::new();
        create_document(&store, "organisations", org("Acme", "a@x.com"), ORG_KEYS, false).unwrap();
        create_document(&store, "organisations", org("Beta", "b@y.com"), ORG_KEYS, false).unwrap();

        let first = read_document(&store, "organisations", &Filter::new(), &Projection::new()).unwrap();
        let second = read_document(&store, "organisations", &Filter::new(), &Projection::new()).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);

        let none = read_document(
            &store,
            "organisations",
            &Filter::new().with("name", "Gamma"),
            &Projection::new(),
        )
        .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_update_merges_and_checks_duplicates() {
        let store = MemoryStore::new();
        let acme = create_document(&store, "organisations", org("Acme", "a@x.com"), ORG_KEYS, false).unwrap();
        create_document(&store, "organisations", org("Beta", "a@x.com"), ORG_KEYS, false).unwrap();
        let id = ObjectId::from_value(&acme["_id"]).unwrap();

        // Renaming onto another document's key tuple is rejected
        let err = update_document(&store, "organisations", &id, doc(json!({"name": "Beta"})), ORG_KEYS, false)
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateDocumentRejected { .. }));

        // Non-key changes leave the rest untouched
        let updated = update_document(
            &store,
            "organisations",
            &id,
            doc(json!({"phone": "123"})),
            ORG_KEYS,
            false,
        )
        .unwrap();
        assert_eq!(updated["name"], "Acme");
        assert_eq!(updated["phone"], "123");

        // Rewriting its own key values is not a collision
        update_document(&store, "organisations", &id, org("Acme", "a@x.com"), ORG_KEYS, false).unwrap();
    }

    #[test]
    fn test_restore_checks_duplicates() {
        let store = MemoryStore::new();
        let mut retired = org("Acme", "a@x.com");
        retired.insert("is_deleted".to_string(), json!(true));
        let retired = create_document(&store, "organisations", retired, ORG_KEYS, false).unwrap();
        let retired_id = ObjectId::from_value(&retired["_id"]).unwrap();
        create_document(&store, "organisations", org("Acme", "a@x.com"), ORG_KEYS, false).unwrap();

        let err = update_document(
            &store,
            "organisations",
            &retired_id,
            doc(json!({"is_deleted": false})),
            ORG_KEYS,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateDocumentRejected { .. }));

        // Restoring under a fresh key tuple is fine
        let restored = update_document(
            &store,
            "organisations",
            &retired_id,
            doc(json!({"is_deleted": false, "name": "Acme Old"})),
            ORG_KEYS,
            false,
        )
        .unwrap();
        assert_eq!(restored["is_deleted"], false);

        // Changes to a document that stays retired never collide
        let mut other = org("Beta", "b@y.com");
        other.insert("is_deleted".to_string(), json!(true));
        let other = create_document(&store, "organisations", other, ORG_KEYS, false).unwrap();
        let other_id = ObjectId::from_value(&other["_id"]).unwrap();
        update_document(&store, "organisations", &other_id, org("Acme", "a@x.com"), ORG_KEYS, false)
            .unwrap();
    }

    #[test]
    fn test_update_missing_document() {
        let store = MemoryStore::new();
        let err = update_document(
            &store,
            "organisations",
            &ObjectId::new(),
            doc(json!({"name": "x"})),
            ORG_KEYS,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::DocumentNotFound { .. }));
    }

    #[test]
    fn test_delete_missing_leaves_collection_unchanged() {
        let store = MemoryStore::new();
        create_document(&store, "organisations", org("Acme", "a@x.com"), ORG_KEYS, false).unwrap();

        let err = delete_document(&store, "organisations", &ObjectId::new()).unwrap_err();
        assert!(matches!(err, StoreError::DocumentNotFound { .. }));
        assert_eq!(store.count("organisations").unwrap(), 1);
    }

    #[test]
    fn test_delete_on_sqlite() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created =
            create_document(&store, "organisations", org("Acme", "a@x.com"), ORG_KEYS, false).unwrap();
        let id = ObjectId::from_value(&created["_id"]).unwrap();

        assert!(delete_document(&store, "organisations", &id).unwrap());
        assert!(delete_document(&store, "organisations", &id).is_err());
    }
}
