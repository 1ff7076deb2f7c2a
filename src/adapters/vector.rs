//! Vector store adapter.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::engine::SqliteVectorEngine;
use crate::error::{Error, Result};
use crate::store::{
    Capability, CollectionInfo, DeleteRequest, Document, GetRequest, MemoryBackend, Metadata,
    ProviderType, ScoredDocument, VectorQuery, VectorStore,
};

/// Adapter over an optional [`SqliteVectorEngine`].
#[derive(Clone, Default)]
pub struct VectorAdapter {
    engine: Option<Arc<SqliteVectorEngine>>,
}

impl VectorAdapter {
    pub fn new(engine: Option<Arc<SqliteVectorEngine>>) -> Self {
        Self { engine }
    }

    /// An adapter with no engine bound.
    pub fn unbound() -> Self {
        Self { engine: None }
    }

    pub fn bound(engine: SqliteVectorEngine) -> Self {
        Self {
            engine: Some(Arc::new(engine)),
        }
    }

    fn engine(&self) -> Result<&SqliteVectorEngine> {
        self.engine
            .as_deref()
            .ok_or_else(|| Error::unavailable(ProviderType::Vector))
    }
}

#[async_trait]
impl MemoryBackend for VectorAdapter {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Vector
    }

    fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    async fn health_check(&self) -> Result<bool> {
        let Some(engine) = self.engine.as_deref() else {
            return Ok(false);
        };
        match engine.list_collections() {
            Ok(_) => Ok(true),
            Err(e) => {
                debug!(error = %e, "vector health probe failed");
                Ok(false)
            }
        }
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![
            Capability::SemanticSearch,
            Capability::DocumentStorage,
            Capability::MetadataFiltering,
            Capability::CollectionManagement,
        ]
    }

    fn describe(&self) -> HashMap<String, Value> {
        let mut info = HashMap::new();
        info.insert("engine".to_string(), json!("sqlite-vector"));
        if let Some(engine) = self.engine.as_deref() {
            info.insert("location".to_string(), json!(engine.location()));
            info.insert("dimension".to_string(), json!(engine.dimension()));
        }
        info
    }
}

#[async_trait]
impl VectorStore for VectorAdapter {
    async fn add(&self, collection: &str, documents: Vec<Document>) -> Result<()> {
        self.engine()?.add(collection, documents).await
    }

    async fn query(&self, collection: &str, query: VectorQuery) -> Result<Vec<ScoredDocument>> {
        self.engine()?.query(collection, query).await
    }

    async fn get(&self, collection: &str, request: GetRequest) -> Result<Vec<Document>> {
        self.engine()?.get(collection, request)
    }

    async fn update(&self, collection: &str, documents: Vec<Document>) -> Result<()> {
        self.engine()?.update(collection, documents).await
    }

    async fn delete(&self, collection: &str, request: DeleteRequest) -> Result<usize> {
        self.engine()?.delete(collection, request)
    }

    async fn create_collection(&self, name: &str, metadata: Metadata) -> Result<CollectionInfo> {
        self.engine()?.create_collection(name, metadata)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.engine()?.delete_collection(name)
    }

    async fn get_or_create_collection(
        &self,
        name: &str,
        metadata: Metadata,
    ) -> Result<CollectionInfo> {
        self.engine()?.get_or_create_collection(name, metadata)
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        self.engine()?.list_collections()
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.engine()?.count(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unbound_adapter() {
        let adapter = VectorAdapter::unbound();
        assert!(!adapter.is_available());
        assert!(!adapter.health_check().await.unwrap());

        let err = adapter.count("anything").await.unwrap_err();
        assert!(err.is_unavailable());
        let err = adapter
            .add("anything", vec![Document::new("a", "b")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("vector backend not available"));
    }

    #[tokio::test]
    async fn test_bound_adapter_delegates() {
        let adapter = VectorAdapter::bound(SqliteVectorEngine::in_memory().unwrap());
        assert!(adapter.is_available());
        assert!(adapter.health_check().await.unwrap());

        adapter
            .get_or_create_collection("docs", Metadata::new())
            .await
            .unwrap();
        adapter
            .add("docs", vec![Document::new("a", "hello")])
            .await
            .unwrap();
        assert_eq!(adapter.count("docs").await.unwrap(), 1);
        assert_eq!(adapter.describe()["engine"], json!("sqlite-vector"));
    }
}
