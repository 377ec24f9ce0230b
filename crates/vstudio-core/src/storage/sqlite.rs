//! SQLite-backed document store
//!
//! Documents are stored as JSON bodies in the shared `documents` table.
//! Collection and `_id` lookups are answered by SQLite; the remaining filter
//! conditions are evaluated on decoded documents with the same semantics as
//! the in-memory backend. Every write runs in its own transaction.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use rusqlite::{params, Connection, ToSql};
use serde_json::Value;
use tracing::{debug, info};

use super::ops::{apply_array_update, apply_set, run_pipeline};
use super::schema::{init_schema, needs_init, unique_index_sql};
use super::{ArrayUpdate, DocumentStore, Stage, StoreError, StoreResult, UpdateResult};
use crate::model::DELETED_FIELD;
use crate::object_id::{ObjectId, ID_FIELD};
use crate::query::{Document, Filter, Projection};

/// Document store persisted in a SQLite database
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {:?}", path))?;

        if needs_init(&conn) {
            init_schema(&conn).context("Failed to initialize SQLite schema")?;
            info!(path = ?path, "Initialized document store schema");
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// Matching rows of a collection in insertion order, as `(seq, document)`
fn load(conn: &Connection, collection: &str, filter: &Filter) -> StoreResult<Vec<(i64, Document)>> {
    let id = filter.get(ID_FIELD).and_then(Value::as_str);

    let (sql, args): (&str, Vec<&dyn ToSql>) = match &id {
        Some(id) => (
            "SELECT seq, body FROM documents WHERE collection = ?1 AND id = ?2 ORDER BY seq",
            vec![&collection as &dyn ToSql, id as &dyn ToSql],
        ),
        None => (
            "SELECT seq, body FROM documents WHERE collection = ?1 ORDER BY seq",
            vec![&collection as &dyn ToSql],
        ),
    };

    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(args.as_slice(), |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut docs = Vec::new();
    for row in rows {
        let (seq, body) = row?;
        let doc = decode(collection, &body)?;
        if filter.matches(&doc) {
            docs.push((seq, doc));
        }
    }
    Ok(docs)
}

fn decode(collection: &str, body: &str) -> StoreResult<Document> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(doc) => Ok(doc),
        other => Err(StoreError::CorruptDocument {
            collection: collection.to_string(),
            details: format!("expected an object, found {}", other),
        }),
    }
}

fn write_body(conn: &Connection, collection: &str, seq: i64, doc: &Document) -> StoreResult<()> {
    let body = serde_json::to_string(doc)?;
    conn.execute(
        "UPDATE documents SET body = ?1 WHERE seq = ?2",
        params![body, seq],
    )
    .map_err(|e| write_error(e, collection))?;
    Ok(())
}

/// Unique-constraint failures are duplicate documents
fn write_error(err: rusqlite::Error, collection: &str) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::duplicate(collection)
        }
        _ => StoreError::Database(err),
    }
}

impl DocumentStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> StoreResult<Vec<Document>> {
        let conn = self.lock()?;
        Ok(load(&conn, collection, filter)?
            .into_iter()
            .map(|(_, doc)| projection.apply(&doc))
            .collect())
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
        let body = serde_json::to_string(&document)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
            params![collection, id.to_hex(), body],
        )
        .map_err(|e| write_error(e, collection))?;
        tx.commit()?;

        debug!(collection, %id, "Inserted document");
        Ok(id)
    }

    fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        set: &Document,
    ) -> StoreResult<Option<Document>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let Some((seq, mut doc)) = load(&tx, collection, filter)?.into_iter().next() else {
            return Ok(None);
        };
        if apply_set(&mut doc, set) {
            write_body(&tx, collection, seq, &doc)?;
            tx.commit()?;
            debug!(collection, "Updated document");
        }
        Ok(Some(doc))
    }

    fn find_one_and_delete(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> StoreResult<Option<Document>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let Some((seq, doc)) = load(&tx, collection, filter)?.into_iter().next() else {
            return Ok(None);
        };
        tx.execute("DELETE FROM documents WHERE seq = ?1", params![seq])?;
        tx.commit()?;

        debug!(collection, "Deleted document");
        Ok(Some(doc))
    }

    fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &ArrayUpdate,
    ) -> StoreResult<UpdateResult> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut result = UpdateResult::default();
        for (seq, mut doc) in load(&tx, collection, filter)? {
            result.matched += 1;
            if apply_array_update(&mut doc, update)? {
                write_body(&tx, collection, seq, &doc)?;
                result.modified += 1;
            }
        }
        tx.commit()?;

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
        // A leading match narrows the scan; the pipeline still applies it
        let scan = match pipeline.first() {
            Some(Stage::Match(filter)) => filter.clone(),
            _ => Filter::new(),
        };

        let conn = self.lock()?;
        let docs = load(&conn, collection, &scan)?
            .into_iter()
            .map(|(_, doc)| doc)
            .collect();
        Ok(run_pipeline(docs, pipeline))
    }

    fn ensure_unique_index(&self, collection: &str, fields: &[&str]) -> StoreResult<bool> {
        let sql = unique_index_sql(collection, fields, DELETED_FIELD);
        let conn = self.lock()?;
        conn.execute_batch(&sql)
            .map_err(|e| write_error(e, collection))?;
        debug!(collection, ?fields, "Ensured unique index");
        Ok(true)
    }
}
