//! Resource operations
//!
//! The operations every catalogued resource exposes: search, create, update,
//! soft delete and delete, plus their embedded counterparts addressed by a
//! parent id. Boundary concerns live here: id coercion, foreign-key checks,
//! timestamps, soft-delete bookkeeping and the "in use" guard on delete.
//! Storage work is delegated to the [`Controller`]; every failure of an
//! operation here is reported at `<resource>/<operation>`.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::catalog;
use crate::controller::Controller;
use crate::error::{ErrorCode, Location, ServiceError, ServiceResult};
use crate::foreign_keys::check_foreign_keys;
use crate::model::{
    ModelSchema, CREATED_ON_FIELD, DELETED_BY_FIELD, DELETED_FIELD, LAST_UPDATED_FIELD,
};
use crate::object_id::{ObjectId, ID_FIELD};
use crate::query::{Document, Filter, Projection};
use crate::storage::ops::is_live;
use crate::storage::{DocumentStore, StoreError, StoreResult};

/// Reject a payload that sets only one half of the soft-delete pair.
///
/// `is_deleted: true` needs a `deleted_by`, and a `deleted_by` needs
/// `is_deleted: true`.
pub fn check_soft_delete_fields(partial: &Document) -> StoreResult<()> {
    let flagged = partial.get(DELETED_FIELD) == Some(&Value::Bool(true));
    let actor = partial.get(DELETED_BY_FIELD).is_some_and(|v| !v.is_null());

    let missing = match (flagged, actor) {
        (true, false) => DELETED_BY_FIELD,
        (false, true) => DELETED_FIELD,
        _ => return Ok(()),
    };
    Err(StoreError::MandatoryFieldMissing {
        field: missing.to_string(),
    })
}

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn located(schema: &ModelSchema, operation: &str) -> Location {
    Location::new(schema.name, operation)
}

fn fail(schema: &ModelSchema, operation: &str, err: StoreError) -> ServiceError {
    ServiceError::from_store(err, located(schema, operation))
}

/// Report a controller failure at the resource operation that caused it
fn relocate(schema: &ModelSchema, operation: &str) -> impl FnOnce(ServiceError) -> ServiceError {
    let location = located(schema, operation);
    move |err| err.relocated(location)
}

fn parse_id(schema: &ModelSchema, operation: &str, raw: &str) -> ServiceResult<ObjectId> {
    ObjectId::parse_str(raw).map_err(|err| fail(schema, operation, err))
}

fn require_top_level(schema: &ModelSchema, operation: &str) -> ServiceResult<()> {
    if schema.is_embedded() {
        return Err(ServiceError::new(ErrorCode::InvalidTypeGiven, located(schema, operation))
            .with_detail(format!("{} is an embedded resource and needs a parent id", schema.name)));
    }
    Ok(())
}

fn require_embedded(schema: &ModelSchema, operation: &str) -> ServiceResult<&'static str> {
    schema.embedded_field.ok_or_else(|| {
        ServiceError::new(ErrorCode::InvalidTypeGiven, located(schema, operation))
            .with_detail(format!("{} is not an embedded resource", schema.name))
    })
}

/// Is a live document of any referencing resource pointing at `id`?
fn find_reference(
    store: &dyn DocumentStore,
    schema: &ModelSchema,
    id: &ObjectId,
) -> StoreResult<Option<(&'static ModelSchema, &'static str)>> {
    for (holder, field) in catalog::referencing(schema.collection) {
        let path = match holder.embedded_field {
            Some(array) => format!("{}.{}", array, field),
            None => field.to_string(),
        };
        let filter = Filter::new().with(path, id.to_value());
        let in_use = store
            .find(holder.collection, &filter, &Projection::new())?
            .iter()
            .any(|doc| is_live(doc) && doc.get(ID_FIELD) != Some(&id.to_value()));
        if in_use {
            return Ok(Some((holder, field)));
        }
    }
    Ok(None)
}

/// Resource-level operations over a shared store
#[derive(Clone)]
pub struct Resources {
    controller: Controller,
}

impl Resources {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            controller: Controller::new(store),
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Coerce ids and validate foreign keys on the blocking pool
    async fn prepare(
        &self,
        schema: &'static ModelSchema,
        operation: &str,
        mut document: Document,
    ) -> ServiceResult<Document> {
        self.controller
            .run(located(schema, operation), move |store| {
                schema.coerce_ids(&mut document)?;
                check_foreign_keys(store, schema, &document)?;
                Ok(document)
            })
            .await
    }

    /// Documents matching `filter`, with `unset` applied as a projection.
    ///
    /// Soft-deleted documents are hidden unless the filter names
    /// `is_deleted` itself.
    pub async fn search(
        &self,
        schema: &'static ModelSchema,
        mut filter: Document,
        unset: Document,
    ) -> ServiceResult<Vec<Document>> {
        require_top_level(schema, "search")?;
        schema
            .coerce_ids(&mut filter)
            .map_err(|err| fail(schema, "search", err))?;

        let hide_deleted = schema.soft_delete && !filter.contains_key(DELETED_FIELD);
        let projection = Projection::from_document(unset);
        let found = self
            .controller
            .read_document(schema.collection, Filter::from_document(filter), Projection::new())
            .await
            .map_err(relocate(schema, "search"))?;

        Ok(found
            .iter()
            .filter(|doc| !hide_deleted || is_live(doc))
            .map(|doc| projection.apply(doc))
            .collect())
    }

    /// Sub-documents of one parent matching `filter`
    pub async fn search_embedded(
        &self,
        schema: &'static ModelSchema,
        parent_id: &str,
        mut filter: Document,
        unset: Document,
    ) -> ServiceResult<Vec<Document>> {
        let field = require_embedded(schema, "search")?;
        let parent = parse_id(schema, "search", parent_id)?;
        schema
            .coerce_ids(&mut filter)
            .map_err(|err| fail(schema, "search", err))?;

        self.controller
            .read_embedded_document(
                schema.collection,
                parent,
                field,
                Filter::from_document(filter),
                Projection::from_document(unset),
            )
            .await
            .map_err(relocate(schema, "search"))
    }

    /// Create a document and return it as stored
    pub async fn create(
        &self,
        schema: &'static ModelSchema,
        mut document: Document,
    ) -> ServiceResult<Document> {
        require_top_level(schema, "create")?;
        document.remove(ID_FIELD);
        if schema.soft_delete {
            document.insert(DELETED_FIELD.to_string(), Value::Bool(false));
            document.remove(DELETED_BY_FIELD);
        }
        if schema.timestamps {
            let stamp = now();
            document.insert(CREATED_ON_FIELD.to_string(), stamp.clone());
            document.insert(LAST_UPDATED_FIELD.to_string(), stamp);
        }

        let document = self.prepare(schema, "create", document).await?;
        let created = self
            .controller
            .create_document(schema.collection, document, &schema.key_fields())
            .await
            .map_err(relocate(schema, "create"))?;
        info!(resource = schema.name, id = %created[ID_FIELD], "Created");
        Ok(created)
    }

    /// Partially update a document and return it after the update
    pub async fn update(
        &self,
        schema: &'static ModelSchema,
        id: &str,
        mut partial: Document,
    ) -> ServiceResult<Document> {
        require_top_level(schema, "update")?;
        if schema.soft_delete {
            check_soft_delete_fields(&partial).map_err(|err| fail(schema, "update", err))?;
        }
        let id = parse_id(schema, "update", id)?;

        partial.remove(ID_FIELD);
        partial.remove(CREATED_ON_FIELD);
        // A restored document no longer has a deleter
        if schema.soft_delete && partial.get(DELETED_FIELD) == Some(&Value::Bool(false)) {
            partial.insert(DELETED_BY_FIELD.to_string(), Value::Null);
        }
        if schema.timestamps {
            partial.insert(LAST_UPDATED_FIELD.to_string(), now());
        }

        let partial = self.prepare(schema, "update", partial).await?;
        self.controller
            .update_document(schema.collection, id, partial, &schema.key_fields())
            .await
            .map_err(relocate(schema, "update"))
    }

    /// Retire a document, recording who retired it
    pub async fn soft_delete(
        &self,
        schema: &'static ModelSchema,
        id: &str,
        actor: &str,
    ) -> ServiceResult<Document> {
        if !schema.soft_delete {
            return Err(ServiceError::new(ErrorCode::InvalidTypeGiven, located(schema, "update"))
                .with_detail(format!("{} does not support soft delete", schema.name)));
        }

        let mut partial = Document::new();
        partial.insert(DELETED_FIELD.to_string(), Value::Bool(true));
        partial.insert(DELETED_BY_FIELD.to_string(), Value::String(actor.to_string()));
        self.update(schema, id, partial).await
    }

    /// Physically delete a document no live document still refers to
    pub async fn delete(&self, schema: &'static ModelSchema, id: &str) -> ServiceResult<bool> {
        require_top_level(schema, "delete")?;
        let id = parse_id(schema, "delete", id)?;

        self.controller
            .run(located(schema, "delete"), move |store| {
                match find_reference(store, schema, &id)? {
                    Some((holder, field)) => {
                        debug!(resource = schema.name, %id, holder = holder.name, field, "Delete refused");
                        Err(StoreError::DocumentInUse {
                            collection: holder.collection.to_string(),
                            field: field.to_string(),
                        })
                    }
                    None => Ok(()),
                }
            })
            .await?;

        self.controller
            .delete_document(schema.collection, id)
            .await
            .map_err(relocate(schema, "delete"))
    }

    /// Insert a sub-document at `position` (negative appends)
    pub async fn create_embedded(
        &self,
        schema: &'static ModelSchema,
        parent_id: &str,
        mut document: Document,
        position: i64,
    ) -> ServiceResult<Document> {
        let field = require_embedded(schema, "create")?;
        let parent = parse_id(schema, "create", parent_id)?;
        document.remove(ID_FIELD);

        let document = self.prepare(schema, "create", document).await?;
        self.controller
            .create_embedded_document(
                schema.collection,
                parent,
                field,
                document,
                &schema.key_fields(),
                position,
            )
            .await
            .map_err(relocate(schema, "create"))
    }

    pub async fn update_embedded(
        &self,
        schema: &'static ModelSchema,
        parent_id: &str,
        sub_id: &str,
        mut partial: Document,
    ) -> ServiceResult<Document> {
        let field = require_embedded(schema, "update")?;
        let parent = parse_id(schema, "update", parent_id)?;
        let sub = parse_id(schema, "update", sub_id)?;
        partial.remove(ID_FIELD);

        let partial = self.prepare(schema, "update", partial).await?;
        self.controller
            .update_embedded_document(
                schema.collection,
                parent,
                sub,
                field,
                partial,
                &schema.key_fields(),
            )
            .await
            .map_err(relocate(schema, "update"))
    }

    pub async fn delete_embedded(
        &self,
        schema: &'static ModelSchema,
        parent_id: &str,
        sub_id: &str,
    ) -> ServiceResult<bool> {
        let field = require_embedded(schema, "delete")?;
        let parent = parse_id(schema, "delete", parent_id)?;
        let sub = parse_id(schema, "delete", sub_id)?;
        self.controller
            .delete_embedded_document(schema.collection, parent, sub, field)
            .await
            .map_err(relocate(schema, "delete"))
    }
}
