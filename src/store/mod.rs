//! Backend-neutral store interfaces.
//!
//! Two contracts sit at the bottom of the crate:
//!
//! - [`VectorStore`]: documents with embeddings, similarity queries, collections
//! - [`GraphStore`]: typed nodes and edges driven by [`GraphStatement`]s, with
//!   read/write transaction scopes
//!
//! Both extend [`MemoryBackend`], which carries the availability predicate and
//! health probe used by the provider factory. Nothing outside an adapter names a
//! concrete engine type.

mod graph;
mod vector;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use graph::{
    AccessMode, Counters, GraphStatement, GraphStore, GraphTransaction, NodeKind, NodeLabel,
    NodeRef, QueryResult, Record, RelationKind,
};
pub use vector::{
    CollectionInfo, DeleteRequest, Document, GetRequest, Metadata, MetadataFilter,
    ScoredDocument, VectorQuery, VectorStore,
};

/// The kinds of backend the memory system knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Vector,
    Graph,
}

impl ProviderType {
    /// Every known backend type, in evaluation order.
    pub const ALL: [ProviderType; 2] = [ProviderType::Vector, ProviderType::Graph];
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vector => write!(f, "vector"),
            Self::Graph => write!(f, "graph"),
        }
    }
}

/// A capability a backend contributes when healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    SemanticSearch,
    DocumentStorage,
    MetadataFiltering,
    CollectionManagement,
    GraphTraversal,
    RelationshipTracking,
    Transactions,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SemanticSearch => "semantic_search",
            Self::DocumentStorage => "document_storage",
            Self::MetadataFiltering => "metadata_filtering",
            Self::CollectionManagement => "collection_management",
            Self::GraphTraversal => "graph_traversal",
            Self::RelationshipTracking => "relationship_tracking",
            Self::Transactions => "transactions",
        };
        write!(f, "{}", name)
    }
}

/// Availability and health surface shared by every backend.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Which kind of backend this is.
    fn provider_type(&self) -> ProviderType;

    /// Whether an engine client was bound at construction. Never fails.
    fn is_available(&self) -> bool;

    /// Lightweight liveness probe.
    ///
    /// Adapters convert probe failures into `Ok(false)`; an `Err` here comes
    /// only from foreign implementations and is treated as unhealthy by callers.
    async fn health_check(&self) -> Result<bool>;

    /// Capabilities this backend provides when healthy.
    fn capabilities(&self) -> Vec<Capability>;

    /// Descriptive metadata for status surfaces.
    fn describe(&self) -> HashMap<String, Value> {
        HashMap::new()
    }
}
