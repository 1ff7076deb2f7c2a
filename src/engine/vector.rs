//! SQLite-backed vector engine.
//!
//! Documents and their embeddings live in SQLite; similarity ranking is a
//! brute-force cosine scan over the filtered collection.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use super::embedding::{cosine_distance, Embedder, HashingEmbedder};
use super::schema::{initialize_vector_schema, is_initialized};
use crate::error::{Error, ErrorContext, Result};
use crate::store::{
    CollectionInfo, DeleteRequest, Document, GetRequest, Metadata, ScoredDocument, VectorQuery,
};

/// SQLite vector engine client.
pub struct SqliteVectorEngine {
    conn: Arc<Mutex<Connection>>,
    embedder: Arc<dyn Embedder>,
    location: String,
}

impl SqliteVectorEngine {
    /// Open or create an engine at the given path.
    pub fn open(path: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening vector engine");
        let conn = Connection::open(path)
            .map_err(|e| Error::storage_with_source("failed to open vector database", e))?;

        if !is_initialized(&conn, "vector") {
            initialize_vector_schema(&conn)
                .map_err(|e| Error::storage_with_source("failed to initialize vector schema", e))?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            embedder,
            location: path.display().to_string(),
        })
    }

    /// Create an in-memory engine (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::in_memory_with(Arc::new(HashingEmbedder::default()))
    }

    /// Create an in-memory engine with a specific embedder.
    pub fn in_memory_with(embedder: Arc<dyn Embedder>) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::storage_with_source("failed to open vector database", e))?;
        initialize_vector_schema(&conn)
            .map_err(|e| Error::storage_with_source("failed to initialize vector schema", e))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            embedder,
            location: ":memory:".to_string(),
        })
    }

    /// Where the engine stores data.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Dimension of the embeddings this engine produces.
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::storage(format!("failed to lock connection: {}", e)))?;
        f(&conn)
    }

    // ==================== Collection Operations ====================

    pub fn create_collection(&self, name: &str, metadata: Metadata) -> Result<CollectionInfo> {
        self.with_conn(|conn| {
            if collection_exists(conn, name)? {
                return Err(Error::storage(format!("collection already exists: {}", name)));
            }
            conn.execute(
                "INSERT INTO collections (name, metadata, created_at) VALUES (?1, ?2, ?3)",
                params![
                    name,
                    serde_json::to_string(&metadata)?,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(sql_err)?;
            debug!(collection = name, "created collection");
            Ok(CollectionInfo {
                name: name.to_string(),
                metadata,
            })
        })
    }

    pub fn get_or_create_collection(
        &self,
        name: &str,
        metadata: Metadata,
    ) -> Result<CollectionInfo> {
        let existing = self.with_conn(|conn| load_collection(conn, name))?;
        match existing {
            Some(info) => Ok(info),
            None => self.create_collection(name, metadata),
        }
    }

    pub fn delete_collection(&self, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM documents WHERE collection = ?1", params![name])
                .map_err(sql_err)?;
            let rows = conn
                .execute("DELETE FROM collections WHERE name = ?1", params![name])
                .map_err(sql_err)?;
            if rows == 0 {
                return Err(Error::storage(format!("collection not found: {}", name)));
            }
            Ok(())
        })
    }

    pub fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT name, metadata FROM collections ORDER BY name")
                .map_err(sql_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(sql_err)?;

            let mut collections = Vec::new();
            for row in rows {
                let (name, metadata) = row.map_err(sql_err)?;
                collections.push(CollectionInfo {
                    name,
                    metadata: serde_json::from_str(&metadata).unwrap_or_default(),
                });
            }
            Ok(collections)
        })
    }

    pub fn count(&self, collection: &str) -> Result<usize> {
        self.with_conn(|conn| {
            require_collection(conn, collection)?;
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                    params![collection],
                    |row| row.get(0),
                )
                .map_err(sql_err)?;
            Ok(count as usize)
        })
    }

    // ==================== Document Operations ====================

    pub async fn add(&self, collection: &str, documents: Vec<Document>) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let documents = self.ensure_embeddings(documents).await?;

        self.with_conn(|conn| {
            require_collection(conn, collection)?;
            let tx = conn.unchecked_transaction().map_err(sql_err)?;
            for doc in &documents {
                tx.execute(
                    "INSERT INTO documents (collection, id, content, embedding, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        collection,
                        doc.id,
                        doc.content,
                        doc.embedding.as_deref().map(embedding_to_bytes),
                        serde_json::to_string(&doc.metadata)?,
                    ],
                )
                .map_err(|e| {
                    Error::storage_with_source(format!("failed to add document {}", doc.id), e)
                })?;
            }
            tx.commit().map_err(sql_err)?;
            debug!(collection, count = documents.len(), "added documents");
            Ok(())
        })
    }

    pub async fn update(&self, collection: &str, documents: Vec<Document>) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let documents = self.ensure_embeddings(documents).await?;

        self.with_conn(|conn| {
            require_collection(conn, collection)?;
            let tx = conn.unchecked_transaction().map_err(sql_err)?;
            for doc in &documents {
                let rows = tx
                    .execute(
                        "UPDATE documents SET content = ?3, embedding = ?4, metadata = ?5
                         WHERE collection = ?1 AND id = ?2",
                        params![
                            collection,
                            doc.id,
                            doc.content,
                            doc.embedding.as_deref().map(embedding_to_bytes),
                            serde_json::to_string(&doc.metadata)?,
                        ],
                    )
                    .map_err(sql_err)?;
                if rows == 0 {
                    debug!(collection, id = %doc.id, "skipping update of unknown document");
                }
            }
            tx.commit().map_err(sql_err)?;
            Ok(())
        })
    }

    pub async fn query(&self, collection: &str, query: VectorQuery) -> Result<Vec<ScoredDocument>> {
        let query_embedding = match (query.embedding, query.text) {
            (Some(embedding), _) => embedding,
            (None, Some(text)) => self
                .embedder
                .embed(&[text])
                .await?
                .pop()
                .ok_or_else(|| Error::embedding("embedder returned no vector"))?,
            (None, None) => {
                return Err(Error::storage("query needs text or an embedding"));
            }
        };
        if query_embedding.len() != self.dimension() {
            return Err(Error::embedding(format!(
                "query embedding is {}-dimensional, expected {}",
                query_embedding.len(),
                self.dimension()
            )));
        }

        let candidates = self.with_conn(|conn| {
            require_collection(conn, collection)?;
            load_documents(conn, collection, None)
        })?;

        let mut scored = Vec::new();
        for doc in candidates {
            if let Some(ref filter) = query.filter {
                if !filter.matches(&doc.metadata) {
                    continue;
                }
            }
            let distance = match doc.embedding {
                Some(ref embedding) if embedding.len() == query_embedding.len() => {
                    cosine_distance(&query_embedding, embedding)?
                }
                // Rows written before dimensions were enforced
                Some(ref embedding) => {
                    warn!(
                        collection,
                        id = %doc.id,
                        dimension = embedding.len(),
                        "skipping document with mismatched embedding"
                    );
                    continue;
                }
                None => 1.0,
            };
            scored.push(ScoredDocument {
                document: doc,
                distance,
            });
        }

        // Stable sort keeps insertion order among equal distances
        scored.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        scored.truncate(query.n_results);
        Ok(scored)
    }

    pub fn get(&self, collection: &str, request: GetRequest) -> Result<Vec<Document>> {
        let docs = self.with_conn(|conn| {
            require_collection(conn, collection)?;
            load_documents(conn, collection, request.ids.as_deref())
        })?;

        let mut out: Vec<Document> = docs
            .into_iter()
            .filter(|d| request.filter.as_ref().map_or(true, |f| f.matches(&d.metadata)))
            .collect();
        if let Some(limit) = request.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    pub fn delete(&self, collection: &str, request: DeleteRequest) -> Result<usize> {
        let targets: Vec<String> = self
            .get(
                collection,
                GetRequest {
                    ids: request.ids,
                    filter: request.filter,
                    limit: None,
                },
            )?
            .into_iter()
            .map(|d| d.id)
            .collect();

        if targets.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(sql_err)?;
            let mut removed = 0;
            for id in &targets {
                removed += tx
                    .execute(
                        "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                        params![collection, id],
                    )
                    .map_err(sql_err)?;
            }
            tx.commit().map_err(sql_err)?;
            debug!(collection, removed, "deleted documents");
            Ok(removed)
        })
    }

    async fn ensure_embeddings(&self, mut documents: Vec<Document>) -> Result<Vec<Document>> {
        let missing: Vec<usize> = documents
            .iter()
            .enumerate()
            .filter(|(_, d)| d.embedding.is_none())
            .map(|(i, _)| i)
            .collect();
        if !missing.is_empty() {
            let texts: Vec<String> =
                missing.iter().map(|&i| documents[i].content.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != texts.len() {
                return Err(Error::embedding(format!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    texts.len()
                )));
            }
            for (i, vector) in missing.into_iter().zip(vectors) {
                documents[i].embedding = Some(vector);
            }
        }

        let dimension = self.dimension();
        for doc in &documents {
            let len = doc.embedding.as_ref().map_or(dimension, Vec::len);
            if len != dimension {
                return Err(Error::embedding(format!(
                    "document {} has a {}-dimensional embedding, expected {}",
                    doc.id, len, dimension
                ))
                .with_context(ErrorContext::operation("add_documents").with_memory(&doc.id)));
            }
        }
        Ok(documents)
    }
}

fn sql_err(e: rusqlite::Error) -> Error {
    Error::storage_with_source(e.to_string(), e)
}

fn collection_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM collections WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()
        .map_err(sql_err)?;
    Ok(found.is_some())
}

fn require_collection(conn: &Connection, name: &str) -> Result<()> {
    if collection_exists(conn, name)? {
        Ok(())
    } else {
        Err(Error::storage(format!("collection not found: {}", name)))
    }
}

fn load_collection(conn: &Connection, name: &str) -> Result<Option<CollectionInfo>> {
    let row: Option<String> = conn
        .query_row(
            "SELECT metadata FROM collections WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()
        .map_err(sql_err)?;
    Ok(row.map(|metadata| CollectionInfo {
        name: name.to_string(),
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
    }))
}

fn load_documents(
    conn: &Connection,
    collection: &str,
    ids: Option<&[String]>,
) -> Result<Vec<Document>> {
    let mut sql = String::from(
        "SELECT id, content, embedding, metadata FROM documents WHERE collection = ?",
    );
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(collection.to_string())];

    if let Some(ids) = ids {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
        sql.push_str(&format!(" AND id IN ({})", placeholders.join(",")));
        for id in ids {
            params_vec.push(Box::new(id.clone()));
        }
    }
    sql.push_str(" ORDER BY rowid");

    let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
    let mut stmt = conn.prepare(&sql).map_err(sql_err)?;
    let rows = stmt
        .query_map(params_refs.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<Vec<u8>>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(sql_err)?;

    let mut docs = Vec::new();
    for row in rows {
        let (id, content, embedding, metadata) = row.map_err(sql_err)?;
        docs.push(Document {
            id,
            content,
            embedding: embedding.map(|b| bytes_to_embedding(&b)),
            metadata: serde_json::from_str(&metadata)?,
        });
    }
    Ok(docs)
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let arr: [u8; 4] = chunk.try_into().unwrap_or([0; 4]);
            f32::from_le_bytes(arr)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MetadataFilter;
    use serde_json::json;

    fn engine_with_collection() -> SqliteVectorEngine {
        let engine = SqliteVectorEngine::in_memory().unwrap();
        engine.create_collection("docs", Metadata::new()).unwrap();
        engine
    }

    #[tokio::test]
    async fn test_add_get_and_count() {
        let engine = engine_with_collection();
        engine
            .add(
                "docs",
                vec![
                    Document::new("a", "first").with_metadata("thread_id", "t1"),
                    Document::new("b", "second").with_metadata("thread_id", "t2"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(engine.count("docs").unwrap(), 2);
        let all = engine.get("docs", GetRequest::all()).unwrap();
        assert_eq!(all.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), ["a", "b"]);
        assert!(all[0].embedding.is_some());

        let t2 = engine
            .get("docs", GetRequest::filter(MetadataFilter::eq("thread_id", "t2")))
            .unwrap();
        assert_eq!(t2.len(), 1);
        assert_eq!(t2[0].content, "second");
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let engine = engine_with_collection();
        engine
            .add("docs", vec![Document::new("a", "x")])
            .await
            .unwrap();
        let err = engine
            .add("docs", vec![Document::new("a", "y")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to add document a"));
    }

    #[tokio::test]
    async fn test_query_ranks_by_similarity() {
        let engine = engine_with_collection();
        engine
            .add(
                "docs",
                vec![
                    Document::new("hike", "weekend hiking trip in the mountains"),
                    Document::new("db", "postgres database migrations and schema changes"),
                ],
            )
            .await
            .unwrap();

        let results = engine
            .query("docs", VectorQuery::text("database schema migrations", 5))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.id, "db");
        assert!(results[0].relevance() > results[1].relevance());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let engine = engine_with_collection();
        engine
            .add(
                "docs",
                vec![
                    Document::new("a", "x").with_metadata("thread_id", "t1"),
                    Document::new("b", "y").with_metadata("thread_id", "t2"),
                ],
            )
            .await
            .unwrap();

        let mut a = engine.get("docs", GetRequest::ids(vec!["a".into()])).unwrap().remove(0);
        a.metadata.insert("access_count".into(), json!(3));
        engine.update("docs", vec![a]).await.unwrap();
        let a = engine.get("docs", GetRequest::ids(vec!["a".into()])).unwrap().remove(0);
        assert_eq!(a.metadata.get("access_count"), Some(&json!(3)));

        // ids outside the filter are untouched
        let removed = engine
            .delete(
                "docs",
                DeleteRequest::ids(vec!["a".into(), "b".into()])
                    .with_filter(MetadataFilter::eq("thread_id", "t1")),
            )
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(engine.count("docs").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected_on_write() {
        let engine = engine_with_collection();
        engine
            .add("docs", vec![Document::new("good", "rust async runtime")])
            .await
            .unwrap();

        let err = engine
            .add(
                "docs",
                vec![Document::new("bad", "bad dim").with_embedding(vec![1.0, 0.0, 0.0])],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Embedding);
        assert_eq!(engine.count("docs").unwrap(), 1);

        let mut good = engine.get("docs", GetRequest::all()).unwrap().remove(0);
        good.embedding = Some(vec![0.5; 4]);
        assert!(engine.update("docs", vec![good]).await.is_err());

        let results = engine
            .query("docs", VectorQuery::text("rust", 5))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);

        let bad_query = VectorQuery {
            embedding: Some(vec![1.0]),
            n_results: 5,
            ..VectorQuery::default()
        };
        assert!(engine.query("docs", bad_query).await.is_err());
    }

    #[test]
    fn test_collections() {
        let engine = SqliteVectorEngine::in_memory().unwrap();
        engine.get_or_create_collection("a", Metadata::new()).unwrap();
        engine.get_or_create_collection("a", Metadata::new()).unwrap();
        engine.create_collection("b", Metadata::new()).unwrap();
        assert!(engine.create_collection("b", Metadata::new()).is_err());

        let names: Vec<String> = engine
            .list_collections()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["a", "b"]);

        engine.delete_collection("a").unwrap();
        assert!(engine.delete_collection("a").is_err());
        assert!(engine.count("a").is_err());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.db");
        {
            let engine =
                SqliteVectorEngine::open(&path, Arc::new(HashingEmbedder::default())).unwrap();
            engine.create_collection("docs", Metadata::new()).unwrap();
            engine
                .add("docs", vec![Document::new("a", "kept")])
                .await
                .unwrap();
        }
        let engine = SqliteVectorEngine::open(&path, Arc::new(HashingEmbedder::default())).unwrap();
        assert_eq!(engine.count("docs").unwrap(), 1);
    }
}
