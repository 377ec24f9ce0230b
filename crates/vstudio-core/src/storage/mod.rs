//! Storage layer
//!
//! The document-store driver boundary and its backends.
//!
//! ## Architecture
//!
//! - [`DocumentStore`]: the handful of primitives the CRUD layer needs
//!   (filtered find, insert-one, find-one-and-update, find-one-and-delete,
//!   array update-many and a match/project/unwind pipeline)
//! - [`MemoryStore`]: `HashMap`-backed store for tests and scratch sessions
//! - [`SqliteStore`]: documents persisted as JSON bodies in a single SQLite
//!   table, with optional expression indexes for key-field uniqueness
//!
//! Both backends share the document-level semantics in [`ops`], so a given
//! sequence of calls produces the same documents whichever backend runs it.

pub mod error;
pub mod memory;
pub mod ops;
pub mod schema;
pub mod sqlite;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use crate::config::{Backend, Config};
use crate::object_id::ObjectId;
use crate::query::{Document, Filter, Projection};

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
pub use sqlite::SqliteStore;

/// Outcome of an `update_many` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// Documents selected by the filter
    pub matched: u64,
    /// Documents whose contents actually changed
    pub modified: u64,
}

/// Array mutation applied by `update_many`
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayUpdate {
    /// Insert `items` into the array at `field`. `None` or a negative
    /// position appends; a position past the end also appends.
    Push {
        field: String,
        items: Vec<Value>,
        position: Option<i64>,
    },
    /// Remove every element of `field` matched by `condition`
    Pull { field: String, condition: Filter },
    /// Set `values` on the first element of `field` matched by
    /// `element_filter` (the positional `$` operator)
    SetPositional {
        field: String,
        element_filter: Filter,
        values: Document,
    },
}

impl ArrayUpdate {
    pub fn field(&self) -> &str {
        match self {
            ArrayUpdate::Push { field, .. }
            | ArrayUpdate::Pull { field, .. }
            | ArrayUpdate::SetPositional { field, .. } => field,
        }
    }
}

/// Aggregation pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Project(Projection),
    /// Emit one document per element of the array at this path
    Unwind(String),
}

/// Document-store driver
///
/// Implementations must be usable from several threads; every method takes
/// `&self` and does its own locking.
pub trait DocumentStore: Send + Sync {
    /// Short backend name used in logs
    fn backend_name(&self) -> &'static str;

    /// Documents matching `filter`, in insertion order, with `projection` applied
    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> StoreResult<Vec<Document>>;

    /// Insert a document, assigning `_id` when it has none
    fn insert_one(&self, collection: &str, document: Document) -> StoreResult<ObjectId>;

    /// Set fields on the first matching document and return it after the update
    fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        set: &Document,
    ) -> StoreResult<Option<Document>>;

    /// Remove the first matching document and return it
    fn find_one_and_delete(&self, collection: &str, filter: &Filter)
        -> StoreResult<Option<Document>>;

    /// Apply an array mutation to every matching document
    fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &ArrayUpdate,
    ) -> StoreResult<UpdateResult>;

    /// Run a pipeline over the collection
    fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> StoreResult<Vec<Document>>;

    /// Enforce uniqueness of the `fields` tuple among live documents.
    ///
    /// Returns `false` when the backend cannot enforce it. Documents missing
    /// one of the fields are not covered by the index.
    fn ensure_unique_index(&self, _collection: &str, _fields: &[&str]) -> StoreResult<bool> {
        Ok(false)
    }
}

/// Open the store selected by `config`
pub fn open(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match config.backend {
        Backend::Memory => Arc::new(MemoryStore::new()),
        Backend::Sqlite => {
            let path = config.database_path();
            Arc::new(
                SqliteStore::open(&path)
                    .with_context(|| format!("Failed to open document store at {:?}", path))?,
            )
        }
    };
    info!(backend = store.backend_name(), "Opened document store");

    if config.unique_indexes {
        let created = crate::catalog::ensure_unique_indexes(store.as_ref())
            .context("Failed to create unique indexes")?;
        info!(count = created, "Unique key-field indexes in place");
    }

    Ok(store)
}
