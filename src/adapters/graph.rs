//! Graph store adapter.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::engine::{SqliteGraphEngine, SqliteGraphTransaction};
use crate::error::{Error, Result};
use crate::store::{
    AccessMode, Capability, GraphStatement, GraphStore, GraphTransaction, MemoryBackend,
    ProviderType, QueryResult,
};

/// Adapter over an optional [`SqliteGraphEngine`].
#[derive(Clone, Default)]
pub struct GraphAdapter {
    engine: Option<Arc<SqliteGraphEngine>>,
}

impl GraphAdapter {
    pub fn new(engine: Option<Arc<SqliteGraphEngine>>) -> Self {
        Self { engine }
    }

    /// An adapter with no engine bound.
    pub fn unbound() -> Self {
        Self { engine: None }
    }

    pub fn bound(engine: SqliteGraphEngine) -> Self {
        Self {
            engine: Some(Arc::new(engine)),
        }
    }

    fn engine(&self) -> Result<&SqliteGraphEngine> {
        self.engine
            .as_deref()
            .ok_or_else(|| Error::unavailable(ProviderType::Graph))
    }
}

#[async_trait]
impl MemoryBackend for GraphAdapter {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Graph
    }

    fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    async fn health_check(&self) -> Result<bool> {
        let Some(engine) = self.engine.as_deref() else {
            return Ok(false);
        };
        match engine.verify_connectivity().await {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!(error = %e, "graph health probe failed");
                Ok(false)
            }
        }
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![
            Capability::GraphTraversal,
            Capability::RelationshipTracking,
            Capability::Transactions,
        ]
    }

    fn describe(&self) -> HashMap<String, Value> {
        let mut info = HashMap::new();
        info.insert("engine".to_string(), json!("sqlite-graph"));
        if let Some(engine) = self.engine.as_deref() {
            info.insert("database".to_string(), json!(engine.database()));
        }
        info
    }
}

#[async_trait]
impl GraphStore for GraphAdapter {
    async fn run(&self, statement: GraphStatement) -> Result<QueryResult> {
        self.engine()?.run(&statement).await
    }

    async fn begin(&self, mode: AccessMode) -> Result<Box<dyn GraphTransaction>> {
        let tx = self.engine()?.begin(mode).await?;
        Ok(Box::new(tx))
    }

    async fn verify_connectivity(&self) -> Result<()> {
        self.engine()?.verify_connectivity().await
    }
}

#[async_trait]
impl GraphTransaction for SqliteGraphTransaction {
    async fn run(&mut self, statement: GraphStatement) -> Result<QueryResult> {
        SqliteGraphTransaction::run(self, &statement)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        SqliteGraphTransaction::commit(*self)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        SqliteGraphTransaction::rollback(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Metadata, NodeRef};

    #[tokio::test]
    async fn test_unbound_adapter() {
        let adapter = GraphAdapter::unbound();
        assert!(!adapter.is_available());
        assert!(!adapter.health_check().await.unwrap());
        assert!(adapter.verify_connectivity().await.unwrap_err().is_unavailable());
        assert!(adapter.begin(AccessMode::Read).await.is_err());
    }

    #[tokio::test]
    async fn test_transaction_through_trait_object() {
        let adapter = GraphAdapter::bound(SqliteGraphEngine::in_memory().unwrap());
        assert!(adapter.health_check().await.unwrap());

        let mut tx = adapter.begin(AccessMode::Write).await.unwrap();
        let result = tx
            .run(GraphStatement::MergeNode {
                node: NodeRef::thread("t1"),
                thread_id: None,
                created_at: None,
                properties: Metadata::new(),
            })
            .await
            .unwrap();
        assert_eq!(result.counters.nodes_created, 1);
        tx.commit().await.unwrap();

        let found = adapter
            .run(GraphStatement::GetNode {
                node: NodeRef::thread("t1"),
            })
            .await
            .unwrap();
        assert_eq!(found.records.len(), 1);
    }
}
