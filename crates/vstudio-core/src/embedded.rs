//! Embedded document primitives
//!
//! Sub-documents live in an array field of a parent document. Reads go
//! through a match, project, unwind, match pipeline, so each result is the
//! parent's `_id` plus one element nested under the field name:
//!
//! ```text
//! { "_id": "<parent>", "steps": { "_id": "<step>", "name": "init" } }
//! ```
//!
//! Writes use array operators: push with position, positional set and pull.

use serde_json::Value;
use tracing::{debug, warn};

use crate::object_id::{ObjectId, ID_FIELD};
use crate::query::{get_path, Document, Filter, Projection};
use crate::storage::{ArrayUpdate, DocumentStore, Stage, StoreError, StoreResult};

/// Result of an embedded update
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddedUpdate {
    /// The element changed; carries its new state
    Updated(Document),
    /// Submitted values equal the stored ones; carries the current state
    Unchanged(Document),
    /// The element could not be addressed or the store reported no change
    Failed,
}

impl EmbeddedUpdate {
    pub fn document(&self) -> Option<&Document> {
        match self {
            EmbeddedUpdate::Updated(doc) | EmbeddedUpdate::Unchanged(doc) => Some(doc),
            EmbeddedUpdate::Failed => None,
        }
    }
}

/// Flattened entries of `field` in parents matching `parent_filter`
pub fn read_embedded_document(
    store: &dyn DocumentStore,
    collection: &str,
    parent_filter: &Filter,
    field: &str,
    sub_filter: &Filter,
    sub_projection: &Projection,
) -> StoreResult<Vec<Document>> {
    let mut pipeline = vec![
        Stage::Match(parent_filter.clone()),
        Stage::Project(Projection::new().include(field)),
        Stage::Unwind(field.to_string()),
    ];
    if !sub_filter.is_empty() {
        pipeline.push(Stage::Match(sub_filter.prefixed(field)));
    }
    if !sub_projection.is_empty() {
        pipeline.push(Stage::Project(sub_projection.prefixed(field)));
    }

    store.aggregate(collection, &pipeline)
}

/// Strip flattened entries down to the sub-documents themselves
pub fn unwrap_entries(entries: Vec<Document>, field: &str) -> Vec<Document> {
    entries
        .into_iter()
        .filter_map(|mut entry| match entry.remove(field) {
            Some(Value::Object(sub)) => Some(sub),
            _ => None,
        })
        .collect()
}

/// Condition on the key fields that are present in `document`
fn key_filter(document: &Document, key_fields: &[&str]) -> Filter {
    let mut filter = Filter::new();
    for field in key_fields {
        if let Some(value) = document.get(*field) {
            filter.insert(*field, value.clone());
        }
    }
    filter
}

/// Insert a sub-document at `position` (negative appends) and return it
#[allow(clippy::too_many_arguments)]
pub fn create_embedded_document(
    store: &dyn DocumentStore,
    collection: &str,
    parent_filter: &Filter,
    field: &str,
    mut sub_document: Document,
    key_fields: &[&str],
    position: i64,
    allow_duplicates: bool,
) -> StoreResult<Document> {
    if !sub_document.contains_key(ID_FIELD) {
        sub_document.insert(ID_FIELD.to_string(), ObjectId::new().to_value());
    }

    if !allow_duplicates {
        let keys = key_filter(&sub_document, key_fields);
        if !keys.is_empty() {
            let existing = read_embedded_document(
                store,
                collection,
                parent_filter,
                field,
                &keys,
                &Projection::new(),
            )?;
            if !existing.is_empty() {
                debug!(collection, field, "Rejected duplicate embedded document");
                return Err(StoreError::duplicate(collection));
            }
        }
    }

    let update = ArrayUpdate::Push {
        field: field.to_string(),
        items: vec![Value::Object(sub_document.clone())],
        position: Some(position),
    };
    let result = store.update_many(collection, parent_filter, &update)?;
    if result.modified == 0 {
        return Err(StoreError::not_modified(collection));
    }

    debug!(collection, field, position, "Embedded document created");
    Ok(sub_document)
}

/// Update the element of `field` matched by `sub_filter`
pub fn update_embedded_document(
    store: &dyn DocumentStore,
    collection: &str,
    parent_filter: &Filter,
    sub_filter: &Filter,
    field: &str,
    mut partial: Document,
    key_fields: &[&str],
) -> StoreResult<EmbeddedUpdate> {
    partial.remove(ID_FIELD);

    let current = unwrap_entries(
        read_embedded_document(
            store,
            collection,
            parent_filter,
            field,
            sub_filter,
            &Projection::new(),
        )?,
        field,
    )
    .into_iter()
    .next();
    let Some(current) = current else {
        return Ok(EmbeddedUpdate::Failed);
    };

    let identical = partial
        .iter()
        .all(|(path, value)| get_path(&current, path) == Some(value));
    if identical {
        return Ok(EmbeddedUpdate::Unchanged(current));
    }

    let key_changed = key_fields
        .iter()
        .any(|key| partial.get(*key).is_some_and(|v| current.get(*key) != Some(v)));
    if key_changed {
        let mut candidate = current.clone();
        candidate.extend(partial.clone());
        let siblings = unwrap_entries(
            read_embedded_document(
                store,
                collection,
                parent_filter,
                field,
                &key_filter(&candidate, key_fields),
                &Projection::new(),
            )?,
            field,
        );
        if siblings
            .iter()
            .any(|sibling| sibling.get(ID_FIELD) != current.get(ID_FIELD))
        {
            debug!(collection, field, "Rejected duplicate embedded update");
            return Err(StoreError::duplicate(collection));
        }
    }

    let update = ArrayUpdate::SetPositional {
        field: field.to_string(),
        element_filter: sub_filter.clone(),
        values: partial,
    };
    let result = store.update_many(collection, parent_filter, &update)?;
    if result.modified == 0 {
        return Ok(EmbeddedUpdate::Failed);
    }

    // Re-read the element by its own id; the update may have changed what
    // `sub_filter` selects
    let mut by_id = Filter::new();
    if let Some(id) = current.get(ID_FIELD) {
        by_id.insert(ID_FIELD, id.clone());
    }
    let updated = unwrap_entries(
        read_embedded_document(store, collection, parent_filter, field, &by_id, &Projection::new())?,
        field,
    )
    .into_iter()
    .next();

    debug!(collection, field, "Embedded document updated");
    Ok(updated.map_or(EmbeddedUpdate::Failed, EmbeddedUpdate::Updated))
}

/// Remove the elements of `field` matched by `pull_condition`
pub fn delete_embedded_document(
    store: &dyn DocumentStore,
    collection: &str,
    parent_filter: &Filter,
    field: &str,
    pull_condition: &Filter,
) -> StoreResult<bool> {
    let update = ArrayUpdate::Pull {
        field: field.to_string(),
        condition: pull_condition.clone(),
    };
    let result = store.update_many(collection, parent_filter, &update)?;

    if result.matched > 1 {
        warn!(
            collection,
            field,
            matched = result.matched,
            "Parent filter matched more than one document"
        );
    }
    if result.modified == 0 {
        return Err(StoreError::not_found(collection));
    }

    debug!(collection, field, "Embedded document deleted");
    Ok(true)
}
