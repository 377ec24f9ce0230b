//! Controller façade
//!
//! The async entry point in front of the store primitives. Each call runs the
//! blocking primitive on tokio's blocking pool and converts any
//! [`StoreError`] into a [`ServiceError`] located at `controller/<operation>`.

use std::sync::Arc;

use tracing::debug;

use crate::documents;
use crate::embedded::{self, EmbeddedUpdate};
use crate::error::{ErrorCode, Location, ServiceError, ServiceResult};
use crate::object_id::{ObjectId, ID_FIELD};
use crate::query::{Document, Filter, Projection};
use crate::storage::{DocumentStore, StoreError, StoreResult};

/// Async façade over a shared document store
#[derive(Clone)]
pub struct Controller {
    store: Arc<dyn DocumentStore>,
}

fn owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

fn borrowed(fields: &[String]) -> Vec<&str> {
    fields.iter().map(String::as_str).collect()
}

impl Controller {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Run `f` against the store on the blocking pool, reporting failures at
    /// `location`
    pub async fn run<T, F>(&self, location: Location, f: F) -> ServiceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn DocumentStore) -> StoreResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || f(store.as_ref())).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                debug!(%location, error = %err, "Store operation failed");
                Err(ServiceError::from_store(err, location))
            }
            Err(join_err) => Err(ServiceError::new(ErrorCode::UnhandledError, location)
                .with_detail(join_err.to_string())),
        }
    }

    async fn call<T, F>(&self, operation: &str, f: F) -> ServiceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn DocumentStore) -> StoreResult<T> + Send + 'static,
    {
        self.run(Location::new("controller", operation), f).await
    }

    /// Create a top-level document
    pub async fn create_document(
        &self,
        collection: &str,
        document: Document,
        key_fields: &[&str],
    ) -> ServiceResult<Document> {
        let collection = collection.to_string();
        let key_fields = owned(key_fields);
        self.call("create", move |store| {
            documents::create_document(store, &collection, document, &borrowed(&key_fields), false)
        })
        .await
    }

    /// Read top-level documents
    pub async fn read_document(
        &self,
        collection: &str,
        filter: Filter,
        projection: Projection,
    ) -> ServiceResult<Vec<Document>> {
        let collection = collection.to_string();
        self.call("read", move |store| {
            documents::read_document(store, &collection, &filter, &projection)
        })
        .await
    }

    /// Partially update a top-level document
    pub async fn update_document(
        &self,
        collection: &str,
        id: ObjectId,
        partial: Document,
        key_fields: &[&str],
    ) -> ServiceResult<Document> {
        let collection = collection.to_string();
        let key_fields = owned(key_fields);
        self.call("update", move |store| {
            documents::update_document(store, &collection, &id, partial, &borrowed(&key_fields), false)
        })
        .await
    }

    /// Physically delete a top-level document
    pub async fn delete_document(&self, collection: &str, id: ObjectId) -> ServiceResult<bool> {
        let collection = collection.to_string();
        self.call("delete", move |store| {
            documents::delete_document(store, &collection, &id)
        })
        .await
    }

    /// Insert a sub-document into `field` of the parent and return it
    #[allow(clippy::too_many_arguments)]
    pub async fn create_embedded_document(
        &self,
        collection: &str,
        parent_id: ObjectId,
        field: &str,
        document: Document,
        key_fields: &[&str],
        position: i64,
    ) -> ServiceResult<Document> {
        let collection = collection.to_string();
        let field = field.to_string();
        let key_fields = owned(key_fields);
        self.call("create_embedded", move |store| {
            embedded::create_embedded_document(
                store,
                &collection,
                &Filter::by_id(&parent_id),
                &field,
                document,
                &borrowed(&key_fields),
                position,
                false,
            )
        })
        .await
    }

    /// Sub-documents of `field` in the parent matching `filter`
    pub async fn read_embedded_document(
        &self,
        collection: &str,
        parent_id: ObjectId,
        field: &str,
        filter: Filter,
        projection: Projection,
    ) -> ServiceResult<Vec<Document>> {
        let collection = collection.to_string();
        let field = field.to_string();
        self.call("read_embedded", move |store| {
            let entries = embedded::read_embedded_document(
                store,
                &collection,
                &Filter::by_id(&parent_id),
                &field,
                &filter,
                &projection,
            )?;
            Ok(embedded::unwrap_entries(entries, &field))
        })
        .await
    }

    /// Update one sub-document and return its current state
    pub async fn update_embedded_document(
        &self,
        collection: &str,
        parent_id: ObjectId,
        sub_id: ObjectId,
        field: &str,
        partial: Document,
        key_fields: &[&str],
    ) -> ServiceResult<Document> {
        let location = Location::new("controller", "update_embedded");
        let target = collection.to_string();
        let field = field.to_string();
        let key_fields = owned(key_fields);

        let outcome = self
            .run(location.clone(), move |store| {
                embedded::update_embedded_document(
                    store,
                    &target,
                    &Filter::by_id(&parent_id),
                    &Filter::new().with(ID_FIELD, sub_id.to_value()),
                    &field,
                    partial,
                    &borrowed(&key_fields),
                )
            })
            .await?;

        match outcome {
            EmbeddedUpdate::Updated(doc) | EmbeddedUpdate::Unchanged(doc) => Ok(doc),
            EmbeddedUpdate::Failed => Err(ServiceError::from_store(
                StoreError::not_modified(collection),
                location,
            )),
        }
    }

    /// Remove one sub-document by id
    pub async fn delete_embedded_document(
        &self,
        collection: &str,
        parent_id: ObjectId,
        sub_id: ObjectId,
        field: &str,
    ) -> ServiceResult<bool> {
        let collection = collection.to_string();
        let field = field.to_string();
        self.call("delete_embedded", move |store| {
            embedded::delete_embedded_document(
                store,
                &collection,
                &Filter::by_id(&parent_id),
                &field,
                &Filter::new().with(ID_FIELD, sub_id.to_value()),
            )
        })
        .await
    }
}
