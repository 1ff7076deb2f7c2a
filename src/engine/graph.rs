//! SQLite-backed graph engine.
//!
//! Nodes and edges are plain tables; each [`GraphStatement`] is translated to a
//! handful of SQL operations. Edges are unique per (from, to, kind), which is
//! what makes every merge an upsert.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{json, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use super::schema::{initialize_graph_schema, is_initialized};
use crate::error::{Error, Result};
use crate::store::{
    AccessMode, Counters, GraphStatement, Metadata, NodeLabel, NodeRef, QueryResult,
    Record, RelationKind,
};

/// SQLite graph engine client.
pub struct SqliteGraphEngine {
    conn: Arc<Mutex<Connection>>,
    database: String,
}

impl SqliteGraphEngine {
    /// Open or create a graph database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening graph engine");
        let conn = Connection::open(path)
            .map_err(|e| Error::relationship_with_source("failed to open graph database", e))?;

        if !is_initialized(&conn, "graph") {
            initialize_graph_schema(&conn).map_err(|e| {
                Error::relationship_with_source("failed to initialize graph schema", e)
            })?;
        }

        let database = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            database,
        })
    }

    /// Create an in-memory graph (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::relationship_with_source("failed to open graph database", e))?;
        initialize_graph_schema(&conn)
            .map_err(|e| Error::relationship_with_source("failed to initialize graph schema", e))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            database: "memory".to_string(),
        })
    }

    /// Override the logical database name.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Logical database name.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Run one statement atomically.
    pub async fn run(&self, statement: &GraphStatement) -> Result<QueryResult> {
        let conn = self.conn.lock().await;
        let tx = conn.unchecked_transaction().map_err(sql_err)?;
        let result = execute(&tx, statement)?;
        tx.commit().map_err(sql_err)?;
        Ok(result)
    }

    /// Open a transaction holding the connection until commit, rollback or drop.
    pub async fn begin(&self, mode: AccessMode) -> Result<SqliteGraphTransaction> {
        let conn = self.conn.clone().lock_owned().await;
        let begin = match mode {
            AccessMode::Read => "BEGIN DEFERRED",
            AccessMode::Write => "BEGIN IMMEDIATE",
        };
        conn.execute_batch(begin).map_err(sql_err)?;
        Ok(SqliteGraphTransaction {
            conn,
            mode,
            finished: false,
        })
    }

    pub async fn verify_connectivity(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT COUNT(*) FROM graph_nodes", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(sql_err)?;
        Ok(())
    }
}

/// An open graph transaction.
pub struct SqliteGraphTransaction {
    conn: OwnedMutexGuard<Connection>,
    mode: AccessMode,
    finished: bool,
}

impl SqliteGraphTransaction {
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn run(&mut self, statement: &GraphStatement) -> Result<QueryResult> {
        if self.finished {
            return Err(Error::relationship("transaction already closed"));
        }
        if self.mode == AccessMode::Read && statement.is_write() {
            return Err(Error::relationship(format!(
                "write statement {} in read transaction",
                statement.name()
            )));
        }
        execute(&self.conn, statement)
    }

    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.conn.execute_batch("COMMIT").map_err(sql_err)
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK").map_err(sql_err)
    }
}

impl Drop for SqliteGraphTransaction {
    fn drop(&mut self) {
        if !self.finished {
            debug!("rolling back unfinished graph transaction");
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}

fn sql_err(e: rusqlite::Error) -> Error {
    Error::relationship_with_source(e.to_string(), e)
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    // Fixed width so lexical order matches time order
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn execute(conn: &Connection, statement: &GraphStatement) -> Result<QueryResult> {
    match statement {
        GraphStatement::MergeNode {
            node,
            thread_id,
            created_at,
            properties,
        } => merge_node(conn, node, thread_id.as_deref(), created_at.as_ref(), properties),
        GraphStatement::AddLabel { node, label } => add_label(conn, node, *label),
        GraphStatement::MergeEdge {
            from,
            to,
            kind,
            properties,
        } => merge_edge(conn, from, to, *kind, properties),
        GraphStatement::LatestMemoryInThread {
            thread_id,
            before,
            exclude,
        } => latest_memory(conn, thread_id, before, exclude),
        GraphStatement::MemoriesInThread {
            thread_id,
            before,
            without_label,
        } => memories_in_thread(conn, thread_id, before.as_ref(), *without_label),
        GraphStatement::DetachDelete { nodes } => detach_delete(conn, nodes),
        GraphStatement::DeleteOrphanThreads => delete_orphan_threads(conn),
        GraphStatement::Edges { node, kind } => edges(conn, node.as_ref(), *kind),
        GraphStatement::CountEdges { kind } => count_edges(conn, *kind),
        GraphStatement::GetNode { node } => get_node(conn, node),
    }
}

struct NodeRow {
    labels: Vec<String>,
    properties: Metadata,
}

fn load_node(conn: &Connection, node: &NodeRef) -> Result<Option<NodeRow>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT labels, properties FROM graph_nodes WHERE kind = ?1 AND id = ?2",
            params![node.kind.as_str(), node.id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(sql_err)?;

    match row {
        Some((labels, properties)) => Ok(Some(NodeRow {
            labels: serde_json::from_str(&labels)?,
            properties: serde_json::from_str(&properties)?,
        })),
        None => Ok(None),
    }
}

fn node_exists(conn: &Connection, node: &NodeRef) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM graph_nodes WHERE kind = ?1 AND id = ?2",
            params![node.kind.as_str(), node.id],
            |row| row.get(0),
        )
        .optional()
        .map_err(sql_err)?;
    Ok(found.is_some())
}

fn merge_node(
    conn: &Connection,
    node: &NodeRef,
    thread_id: Option<&str>,
    created_at: Option<&DateTime<Utc>>,
    properties: &Metadata,
) -> Result<QueryResult> {
    let now = timestamp(&Utc::now());
    let created = created_at.map(timestamp);
    let mut counters = Counters {
        properties_set: properties.len() as u64,
        ..Counters::default()
    };

    match load_node(conn, node)? {
        None => {
            conn.execute(
                "INSERT INTO graph_nodes (kind, id, thread_id, created_at, labels, properties, updated_at)
                 VALUES (?1, ?2, ?3, ?4, '[]', ?5, ?6)",
                params![
                    node.kind.as_str(),
                    node.id,
                    thread_id,
                    created,
                    serde_json::to_string(properties)?,
                    now,
                ],
            )
            .map_err(sql_err)?;
            counters.nodes_created = 1;
        }
        Some(existing) => {
            let mut merged = existing.properties;
            for (key, value) in properties {
                merged.insert(key.clone(), value.clone());
            }
            conn.execute(
                "UPDATE graph_nodes SET
                    thread_id = COALESCE(thread_id, ?3),
                    created_at = COALESCE(created_at, ?4),
                    properties = ?5,
                    updated_at = ?6
                 WHERE kind = ?1 AND id = ?2",
                params![
                    node.kind.as_str(),
                    node.id,
                    thread_id,
                    created,
                    serde_json::to_string(&merged)?,
                    now,
                ],
            )
            .map_err(sql_err)?;
        }
    }

    Ok(QueryResult {
        records: Vec::new(),
        counters,
    })
}

fn add_label(conn: &Connection, node: &NodeRef, label: NodeLabel) -> Result<QueryResult> {
    let mut counters = Counters::default();
    if let Some(mut existing) = load_node(conn, node)? {
        if !existing.labels.iter().any(|l| l == label.as_str()) {
            existing.labels.push(label.as_str().to_string());
            conn.execute(
                "UPDATE graph_nodes SET labels = ?3 WHERE kind = ?1 AND id = ?2",
                params![
                    node.kind.as_str(),
                    node.id,
                    serde_json::to_string(&existing.labels)?
                ],
            )
            .map_err(sql_err)?;
            counters.labels_added = 1;
        }
    }
    Ok(QueryResult {
        records: Vec::new(),
        counters,
    })
}

fn merge_edge(
    conn: &Connection,
    from: &NodeRef,
    to: &NodeRef,
    kind: RelationKind,
    properties: &Metadata,
) -> Result<QueryResult> {
    let mut counters = Counters::default();
    if !node_exists(conn, from)? || !node_exists(conn, to)? {
        debug!(%from, %to, %kind, "skipping edge with missing endpoint");
        return Ok(QueryResult::default());
    }

    let now = timestamp(&Utc::now());
    let inserted = conn
        .execute(
            "INSERT INTO graph_edges
                (from_kind, from_id, to_kind, to_id, rel_type, properties, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(from_kind, from_id, to_kind, to_id, rel_type) DO NOTHING",
            params![
                from.kind.as_str(),
                from.id,
                to.kind.as_str(),
                to.id,
                kind.as_str(),
                serde_json::to_string(properties)?,
                now,
            ],
        )
        .map_err(sql_err)?;

    if inserted > 0 {
        counters.relationships_created = 1;
    } else if !properties.is_empty() {
        let current: String = conn
            .query_row(
                "SELECT properties FROM graph_edges
                 WHERE from_kind = ?1 AND from_id = ?2 AND to_kind = ?3 AND to_id = ?4 AND rel_type = ?5",
                params![from.kind.as_str(), from.id, to.kind.as_str(), to.id, kind.as_str()],
                |row| row.get(0),
            )
            .map_err(sql_err)?;
        let mut merged: Metadata = serde_json::from_str(&current)?;
        for (key, value) in properties {
            merged.insert(key.clone(), value.clone());
        }
        conn.execute(
            "UPDATE graph_edges SET properties = ?6, updated_at = ?7
             WHERE from_kind = ?1 AND from_id = ?2 AND to_kind = ?3 AND to_id = ?4 AND rel_type = ?5",
            params![
                from.kind.as_str(),
                from.id,
                to.kind.as_str(),
                to.id,
                kind.as_str(),
                serde_json::to_string(&merged)?,
                now,
            ],
        )
        .map_err(sql_err)?;
    }
    counters.properties_set = properties.len() as u64;

    Ok(QueryResult {
        records: Vec::new(),
        counters,
    })
}

fn latest_memory(
    conn: &Connection,
    thread_id: &str,
    before: &DateTime<Utc>,
    exclude: &str,
) -> Result<QueryResult> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT id, created_at FROM graph_nodes
             WHERE kind = 'memory' AND thread_id = ?1 AND id != ?2 AND created_at <= ?3
             ORDER BY created_at DESC, rowid DESC
             LIMIT 1",
            params![thread_id, exclude, timestamp(before)],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(sql_err)?;

    let records = row
        .map(|(id, created_at)| {
            let mut record = Record::new();
            record.insert("id".into(), json!(id));
            record.insert("created_at".into(), json!(created_at));
            vec![record]
        })
        .unwrap_or_default();

    Ok(QueryResult {
        records,
        counters: Counters::default(),
    })
}

fn memories_in_thread(
    conn: &Connection,
    thread_id: &str,
    before: Option<&DateTime<Utc>>,
    without_label: Option<NodeLabel>,
) -> Result<QueryResult> {
    let mut stmt = conn
        .prepare(
            "SELECT id, created_at, labels FROM graph_nodes
             WHERE kind = 'memory' AND thread_id = ?1 AND (?2 IS NULL OR created_at < ?2)
             ORDER BY created_at ASC, rowid ASC",
        )
        .map_err(sql_err)?;
    let rows = stmt
        .query_map(params![thread_id, before.map(timestamp)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .map_err(sql_err)?;

    let mut records = Vec::new();
    for row in rows {
        let (id, created_at, labels) = row.map_err(sql_err)?;
        let labels: Vec<String> = serde_json::from_str(&labels)?;
        if let Some(label) = without_label {
            if labels.iter().any(|l| l == label.as_str()) {
                continue;
            }
        }
        let mut record = Record::new();
        record.insert("id".into(), json!(id));
        record.insert("created_at".into(), json!(created_at));
        record.insert("labels".into(), json!(labels));
        records.push(record);
    }

    Ok(QueryResult {
        records,
        counters: Counters::default(),
    })
}

fn detach_delete(conn: &Connection, nodes: &[NodeRef]) -> Result<QueryResult> {
    let mut counters = Counters::default();
    for node in nodes {
        let edges = conn
            .execute(
                "DELETE FROM graph_edges
                 WHERE (from_kind = ?1 AND from_id = ?2) OR (to_kind = ?1 AND to_id = ?2)",
                params![node.kind.as_str(), node.id],
            )
            .map_err(sql_err)?;
        let removed = conn
            .execute(
                "DELETE FROM graph_nodes WHERE kind = ?1 AND id = ?2",
                params![node.kind.as_str(), node.id],
            )
            .map_err(sql_err)?;
        counters.relationships_deleted += edges as u64;
        counters.nodes_deleted += removed as u64;
    }
    Ok(QueryResult {
        records: Vec::new(),
        counters,
    })
}

fn delete_orphan_threads(conn: &Connection) -> Result<QueryResult> {
    let removed = conn
        .execute(
            "DELETE FROM graph_nodes
             WHERE kind = 'thread' AND NOT EXISTS (
                 SELECT 1 FROM graph_edges e
                 WHERE (e.from_kind = 'thread' AND e.from_id = graph_nodes.id)
                    OR (e.to_kind = 'thread' AND e.to_id = graph_nodes.id)
             )",
            [],
        )
        .map_err(sql_err)?;
    Ok(QueryResult {
        records: Vec::new(),
        counters: Counters {
            nodes_deleted: removed as u64,
            ..Counters::default()
        },
    })
}

fn edges(
    conn: &Connection,
    node: Option<&NodeRef>,
    kind: Option<RelationKind>,
) -> Result<QueryResult> {
    let mut stmt = conn
        .prepare(
            "SELECT from_kind, from_id, to_kind, to_id, rel_type, properties FROM graph_edges
             WHERE (?1 IS NULL OR (from_kind = ?1 AND from_id = ?2) OR (to_kind = ?1 AND to_id = ?2))
               AND (?3 IS NULL OR rel_type = ?3)
             ORDER BY rowid",
        )
        .map_err(sql_err)?;
    let rows = stmt
        .query_map(
            params![
                node.map(|n| n.kind.as_str()),
                node.map(|n| n.id.as_str()),
                kind.map(|k| k.as_str()),
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .map_err(sql_err)?;

    let mut records = Vec::new();
    for row in rows {
        let (from_kind, from_id, to_kind, to_id, rel_type, properties) = row.map_err(sql_err)?;
        let mut record = Record::new();
        record.insert("from_kind".into(), json!(from_kind));
        record.insert("from_id".into(), json!(from_id));
        record.insert("to_kind".into(), json!(to_kind));
        record.insert("to_id".into(), json!(to_id));
        record.insert("kind".into(), json!(rel_type));
        record.insert(
            "properties".into(),
            serde_json::from_str::<Value>(&properties)?,
        );
        records.push(record);
    }

    Ok(QueryResult {
        records,
        counters: Counters::default(),
    })
}

fn count_edges(conn: &Connection, kind: Option<RelationKind>) -> Result<QueryResult> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM graph_edges WHERE (?1 IS NULL OR rel_type = ?1)",
            params![kind.map(|k| k.as_str())],
            |row| row.get(0),
        )
        .map_err(sql_err)?;
    let mut record = Record::new();
    record.insert("count".into(), json!(count));
    Ok(QueryResult {
        records: vec![record],
        counters: Counters::default(),
    })
}

fn get_node(conn: &Connection, node: &NodeRef) -> Result<QueryResult> {
    let row: Option<(Option<String>, Option<String>, String, String)> = conn
        .query_row(
            "SELECT thread_id, created_at, labels, properties FROM graph_nodes
             WHERE kind = ?1 AND id = ?2",
            params![node.kind.as_str(), node.id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()
        .map_err(sql_err)?;

    let mut records = Vec::new();
    if let Some((thread_id, created_at, labels, properties)) = row {
        let mut record = Record::new();
        record.insert("kind".into(), json!(node.kind.as_str()));
        record.insert("id".into(), json!(node.id));
        record.insert("thread_id".into(), json!(thread_id));
        record.insert("created_at".into(), json!(created_at));
        record.insert("labels".into(), serde_json::from_str::<Value>(&labels)?);
        record.insert(
            "properties".into(),
            serde_json::from_str::<Value>(&properties)?,
        );
        records.push(record);
    }

    Ok(QueryResult {
        records,
        counters: Counters::default(),
    })
}
