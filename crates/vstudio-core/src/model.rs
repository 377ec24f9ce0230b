//! Schema descriptors
//!
//! Each resource is described once by a [`ModelSchema`]: where its documents
//! live, which fields are key fields, which hold object ids and what those
//! ids reference. The generic primitives consume these descriptors; there is
//! no per-resource code.

use serde_json::Value;

use crate::object_id::{ObjectId, ID_FIELD};
use crate::query::Document;
use crate::storage::{StoreError, StoreResult};

/// Soft-delete flag
pub const DELETED_FIELD: &str = "is_deleted";
/// Actor recorded with a soft delete
pub const DELETED_BY_FIELD: &str = "deleted_by";
/// Creation timestamp
pub const CREATED_ON_FIELD: &str = "created_on";
/// Last modification timestamp
pub const LAST_UPDATED_FIELD: &str = "last_updated";

/// Target of a foreign key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub collection: &'static str,
    pub field: &'static str,
}

/// One declared field of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Part of the uniqueness tuple
    pub key: bool,
    /// Holds an object id (or a list of them)
    pub id: bool,
    pub references: Option<Reference>,
}

impl FieldSpec {
    /// A key field holding a plain value
    pub const fn key(name: &'static str) -> Self {
        Self {
            name,
            key: true,
            id: false,
            references: None,
        }
    }

    /// An id-typed field
    pub const fn id(name: &'static str) -> Self {
        Self {
            name,
            key: false,
            id: true,
            references: None,
        }
    }

    /// Mark this field as a reference to `_id` in `collection`
    pub const fn references(self, collection: &'static str) -> Self {
        Self {
            id: true,
            references: Some(Reference {
                collection,
                field: ID_FIELD,
            }),
            ..self
        }
    }

    /// Also make this field part of the key tuple
    pub const fn as_key(self) -> Self {
        Self { key: true, ..self }
    }
}

/// Declarative description of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSchema {
    /// Resource name, e.g. `organisations` or `sequences.steps`
    pub name: &'static str,
    /// Collection holding the documents (the parent's, for embedded resources)
    pub collection: &'static str,
    /// Array field inside the parent, for embedded resources
    pub embedded_field: Option<&'static str>,
    pub fields: &'static [FieldSpec],
    /// Documents are retired with `is_deleted` + `deleted_by`
    pub soft_delete: bool,
    /// Documents carry `created_on` / `last_updated`
    pub timestamps: bool,
}

impl ModelSchema {
    pub fn is_embedded(&self) -> bool {
        self.embedded_field.is_some()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn key_fields(&self) -> Vec<&'static str> {
        self.fields.iter().filter(|f| f.key).map(|f| f.name).collect()
    }

    pub fn id_fields(&self) -> Vec<&'static str> {
        self.fields.iter().filter(|f| f.id).map(|f| f.name).collect()
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = (&'static str, Reference)> + '_ {
        self.fields
            .iter()
            .filter_map(|f| f.references.map(|r| (f.name, r)))
    }

    /// Normalise `_id` and every id-typed field of `doc` to canonical hex.
    ///
    /// Lists are normalised element by element; `null` is left alone.
    pub fn coerce_ids(&self, doc: &mut Document) -> StoreResult<()> {
        let fields = std::iter::once(ID_FIELD).chain(self.id_fields());
        for field in fields {
            if let Some(value) = doc.get_mut(field) {
                coerce_value(field, value)?;
            }
        }
        Ok(())
    }
}

fn coerce_value(field: &str, value: &mut Value) -> StoreResult<()> {
    match value {
        Value::Null => Ok(()),
        Value::String(s) => {
            *s = ObjectId::parse_str(s)?.to_hex();
            Ok(())
        }
        Value::Array(items) => items.iter_mut().try_for_each(|item| {
            if item.is_string() {
                coerce_value(field, item)
            } else {
                Err(StoreError::InvalidFieldType {
                    field: field.to_string(),
                })
            }
        }),
        _ => Err(StoreError::InvalidFieldType {
            field: field.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIELDS: &[FieldSpec] = &[
        FieldSpec::key("name"),
        FieldSpec::id("organisation_id")
            .references("organisations")
            .as_key(),
        FieldSpec::id("favourite_project").references("projects"),
        FieldSpec::id("owner"),
    ];

    const SCHEMA: ModelSchema = ModelSchema {
        name: "widgets",
        collection: "widgets",
        embedded_field: None,
        fields: FIELDS,
        soft_delete: true,
        timestamps: false,
    };

    #[test]
    fn test_derived_views() {
        assert_eq!(SCHEMA.key_fields(), vec!["name", "organisation_id"]);
        assert_eq!(
            SCHEMA.id_fields(),
            vec!["organisation_id", "favourite_project", "owner"]
        );

        let fks: Vec<_> = SCHEMA.foreign_keys().map(|(f, r)| (f, r.collection)).collect();
        assert_eq!(
            fks,
            vec![("organisation_id", "organisations"), ("favourite_project", "projects")]
        );
        assert!(!SCHEMA.is_embedded());
        assert!(SCHEMA.field("owner").is_some_and(|f| f.id && f.references.is_none()));
    }

    #[test]
    fn test_coerce_ids_normalises() {
        let mut doc = json!({
            "_id": "666B578ABA5977CC5816B8B7",
            "organisation_id": "666b578aba5977cc5816b8b8",
            "favourite_project": ["666B578ABA5977CC5816B8B9"],
            "owner": null,
            "name": "not an id"
        })
        .as_object()
        .cloned()
        .unwrap();

        SCHEMA.coerce_ids(&mut doc).unwrap();
        assert_eq!(doc["_id"], "666b578aba5977cc5816b8b7");
        assert_eq!(doc["favourite_project"], json!(["666b578aba5977cc5816b8b9"]));
        assert_eq!(doc["name"], "not an id");
    }

    #[test]
    fn test_coerce_ids_rejects_bad_values() {
        let mut bad_string = json!({"organisation_id": "nope"}).as_object().cloned().unwrap();
        assert!(matches!(
            SCHEMA.coerce_ids(&mut bad_string),
            Err(StoreError::InvalidObjectId { .. })
        ));

        let mut bad_type = json!({"owner": 12}).as_object().cloned().unwrap();
        let err = SCHEMA.coerce_ids(&mut bad_type).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidTypeGiven);

        let mut bad_element = json!({"favourite_project": [1]}).as_object().cloned().unwrap();
        assert!(SCHEMA.coerce_ids(&mut bad_element).is_err());
    }
}
