//! SQLite schema for the document store
//!
//! Every collection shares one `documents` table. Bodies are stored as JSON
//! text; `seq` preserves insertion order and `id` mirrors the body's `_id`.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Documents of every collection
        CREATE TABLE IF NOT EXISTS documents (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            body TEXT NOT NULL CHECK (json_valid(body)),
            UNIQUE (collection, id)
        );

        -- Collection scans in insertion order
        CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, seq);
        "#,
    )?;

    // Set schema version
    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}

/// Name of the unique index over `fields` in `collection`
pub fn unique_index_name(collection: &str, fields: &[&str]) -> String {
    let mut name = format!("uniq_{}", sanitize(collection));
    for field in fields {
        name.push_str("__");
        name.push_str(&sanitize(field));
    }
    name
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Escape a value for use inside a single-quoted SQL literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// DDL for a partial unique expression index over the key-field tuple of
/// live documents in one collection
pub fn unique_index_sql(collection: &str, fields: &[&str], deleted_field: &str) -> String {
    let columns: Vec<String> = fields
        .iter()
        .map(|field| format!("json_extract(body, {})", quote_literal(&format!("$.{}", field))))
        .collect();

    format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {name} ON documents({columns}) \
         WHERE collection = {collection} \
         AND coalesce(json_extract(body, {deleted}), 0) = 0",
        name = unique_index_name(collection, fields),
        columns = columns.join(", "),
        collection = quote_literal(collection),
        deleted = quote_literal(&format!("$.{}", deleted_field)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"documents".to_string()));
        assert!(tables.contains(&"schema_info".to_string()));
    }

    #[test]
    fn test_schema_version() {
        let conn = Connection::open_in_memory().unwrap();

        // Before init, needs init
        assert!(needs_init(&conn));

        init_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
        assert!(!needs_init(&conn));
    }

    #[test]
    fn test_body_must_be_json() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO documents (collection, id, body) VALUES ('c', '1', 'not json')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unique_index_sql() {
        let sql = unique_index_sql("organisations", &["name", "org_owner_email"], "is_deleted");
        assert!(sql.contains("uniq_organisations__name__org_owner_email"));
        assert!(sql.contains("json_extract(body, '$.name')"));
        assert!(sql.contains("collection = 'organisations'"));

        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute_batch(&sql).unwrap();

        let insert = "INSERT INTO documents (collection, id, body) VALUES ('organisations', ?1, ?2)";
        let body = r#"{"name":"Acme","org_owner_email":"a@x.com"}"#;
        conn.execute(insert, ["1", body]).unwrap();
        assert!(conn.execute(insert, ["2", body]).is_err());

        // Soft-deleted documents are outside the index
        let deleted = r#"{"name":"Acme","org_owner_email":"a@x.com","is_deleted":true}"#;
        conn.execute(insert, ["3", deleted]).unwrap();
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("it's"), "'it''s'");
    }
}
