//! Foreign-key validation
//!
//! References are checked at write time only; the store never enforces
//! them. Validation stops at the first unresolved reference.

use serde_json::Value;
use tracing::debug;

use crate::model::{ModelSchema, Reference};
use crate::query::{Document, Filter, Projection};
use crate::storage::ops::is_live;
use crate::storage::{DocumentStore, StoreError, StoreResult};

/// Confirm every foreign-key value present in `data` resolves to a live
/// document. List values are checked element by element.
pub fn check_foreign_keys(
    store: &dyn DocumentStore,
    schema: &ModelSchema,
    data: &Document,
) -> StoreResult<()> {
    for (field, reference) in schema.foreign_keys() {
        let values = match data.get(field) {
            None | Some(Value::Null) => continue,
            Some(Value::Array(items)) => items.iter().collect(),
            Some(value) => vec![value],
        };

        for value in values {
            if !reference_exists(store, &reference, value)? {
                debug!(resource = schema.name, field, "Foreign key check failed");
                return Err(StoreError::ForeignKeyNotFound {
                    field: field.to_string(),
                    collection: reference.collection.to_string(),
                    value: match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    },
                });
            }
        }
    }
    Ok(())
}

fn reference_exists(
    store: &dyn DocumentStore,
    reference: &Reference,
    value: &Value,
) -> StoreResult<bool> {
    let filter = Filter::new().with(reference.field, value.clone());
    Ok(store
        .find(reference.collection, &filter, &Projection::new())?
        .iter()
        .any(is_live))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PROJECTS, USERS};
    use crate::error::ErrorCode;
    use crate::object_id::ObjectId;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_absent_and_null_fields_pass() {
        let store = MemoryStore::new();
        let data = doc(json!({"first_name": "a", "organisation_id": null}));
        check_foreign_keys(&store, &USERS, &data).unwrap();
    }

    #[test]
    fn test_resolved_reference_passes() {
        let store = MemoryStore::new();
        let org = store.insert_one("organisations", doc(json!({"name": "Acme"}))).unwrap();
        let data = doc(json!({"organisation_id": org.to_hex()}));
        check_foreign_keys(&store, &USERS, &data).unwrap();
    }

    #[test]
    fn test_missing_reference_fails() {
        let store = MemoryStore::new();
        let missing = ObjectId::new().to_hex();
        let data = doc(json!({"organisation_id": missing}));

        let err = check_foreign_keys(&store, &USERS, &data).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DocumentNotFound);
        assert_eq!(
            err.to_string(),
            format!(
                "Foreign key check failed. Provided organisation_id '{}' is not present in organisations",
                missing
            )
        );
    }

    #[test]
    fn test_list_elements_checked_individually() {
        let store = MemoryStore::new();
        let p1 = store.insert_one("projects", doc(json!({"name": "p1"}))).unwrap();
        let missing = ObjectId::new();

        let ok = doc(json!({"favourite_project": [p1.to_hex()]}));
        check_foreign_keys(&store, &USERS, &ok).unwrap();

        let bad = doc(json!({"favourite_project": [p1.to_hex(), missing.to_hex()]}));
        let err = check_foreign_keys(&store, &USERS, &bad).unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyNotFound { value, .. } if value == missing.to_hex()));
    }

    #[test]
    fn test_soft_deleted_target_does_not_resolve() {
        let store = MemoryStore::new();
        let user = store
            .insert_one("users", doc(json!({"email": "a@x.com", "is_deleted": true})))
            .unwrap();
        let data = doc(json!({"created_by": user.to_hex()}));
        assert!(check_foreign_keys(&store, &PROJECTS, &data).is_err());
    }

    #[test]
    fn test_stops_at_first_failure() {
        let store = MemoryStore::new();
        let data = doc(json!({
            "organisation_id": ObjectId::new().to_hex(),
            "created_by": ObjectId::new().to_hex(),
        }));
        let err = check_foreign_keys(&store, &PROJECTS, &data).unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyNotFound { field, .. } if field == "organisation_id"));
    }
}
