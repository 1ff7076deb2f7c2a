//! SQLite schema and migrations for the bundled engines.

use rusqlite::{params, Connection, Result as SqliteResult};

/// Current vector schema version.
pub const VECTOR_SCHEMA_VERSION: i32 = 1;

/// Current graph schema version.
pub const GRAPH_SCHEMA_VERSION: i32 = 1;

fn prepare(conn: &Connection) -> SqliteResult<()> {
    // WAL is unavailable for in-memory databases; SQLite silently keeps "memory"
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            component TEXT PRIMARY KEY,
            version INTEGER NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;
    Ok(())
}

fn current_version(conn: &Connection, component: &str) -> i32 {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version WHERE component = ?1",
        params![component],
        |row| row.get(0),
    )
    .unwrap_or(0)
}

fn record_version(conn: &Connection, component: &str, version: i32) -> SqliteResult<()> {
    conn.execute(
        "INSERT INTO schema_version (component, version) VALUES (?1, ?2)
         ON CONFLICT(component) DO UPDATE SET version = excluded.version,
             applied_at = datetime('now')",
        params![component, version],
    )?;
    Ok(())
}

/// Initialize the vector engine schema.
pub fn initialize_vector_schema(conn: &Connection) -> SqliteResult<()> {
    prepare(conn)?;

    if current_version(conn, "vector") < 1 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
                id TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB,
                metadata TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);",
        )?;
        record_version(conn, "vector", VECTOR_SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Initialize the graph engine schema.
pub fn initialize_graph_schema(conn: &Connection) -> SqliteResult<()> {
    prepare(conn)?;

    if current_version(conn, "graph") < 1 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS graph_nodes (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                thread_id TEXT,
                created_at TEXT,
                labels TEXT NOT NULL DEFAULT '[]',
                properties TEXT NOT NULL DEFAULT '{}',
                updated_at TEXT NOT NULL,
                PRIMARY KEY (kind, id)
            );

            CREATE TABLE IF NOT EXISTS graph_edges (
                from_kind TEXT NOT NULL,
                from_id TEXT NOT NULL,
                to_kind TEXT NOT NULL,
                to_id TEXT NOT NULL,
                rel_type TEXT NOT NULL,
                properties TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (from_kind, from_id, to_kind, to_id, rel_type)
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_thread ON graph_nodes(thread_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_edges_to ON graph_edges(to_kind, to_id);
            CREATE INDEX IF NOT EXISTS idx_edges_type ON graph_edges(rel_type);",
        )?;
        record_version(conn, "graph", GRAPH_SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Check whether a component's schema has been applied.
pub fn is_initialized(conn: &Connection, component: &str) -> bool {
    let has_table: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .unwrap_or(false);
    has_table && current_version(conn, component) > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_both_components_in_one_file() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(!is_initialized(&conn, "vector"));

        initialize_vector_schema(&conn).unwrap();
        initialize_graph_schema(&conn).unwrap();

        assert!(is_initialized(&conn, "vector"));
        assert!(is_initialized(&conn, "graph"));
        assert_eq!(current_version(&conn, "graph"), GRAPH_SCHEMA_VERSION);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_graph_schema(&conn).unwrap();
        initialize_graph_schema(&conn).unwrap();
        assert_eq!(current_version(&conn, "graph"), 1);
    }
}
