//! Vector store contract and its request/response types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::MemoryBackend;
use crate::error::Result;

/// Free-form document metadata.
pub type Metadata = serde_json::Map<String, Value>;

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    /// Embedding vector; engines compute one when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            embedding: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A document returned from a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Document,
    /// Cosine distance to the query (0 = identical)
    pub distance: f32,
}

impl ScoredDocument {
    /// Relevance in [0, 1], derived from the distance.
    pub fn relevance(&self) -> f64 {
        (1.0 - self.distance as f64).clamp(0.0, 1.0)
    }
}

/// Engine-neutral metadata predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataFilter {
    /// Field equals value
    Eq(String, Value),
    /// Field equals one of the values
    In(String, Vec<Value>),
    /// Array field contains value
    Contains(String, Value),
    /// All nested filters match
    And(Vec<MetadataFilter>),
}

impl MetadataFilter {
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(key.into(), value.into())
    }

    pub fn one_of(key: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In(key.into(), values)
    }

    pub fn contains(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Contains(key.into(), value.into())
    }

    /// Combine with another filter, flattening nested conjunctions.
    pub fn and(self, other: MetadataFilter) -> Self {
        match (self, other) {
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), right) => {
                left.push(right);
                Self::And(left)
            }
            (left, Self::And(mut right)) => {
                right.insert(0, left);
                Self::And(right)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }

    /// Combine two optional filters.
    pub fn combine(left: Option<Self>, right: Option<Self>) -> Option<Self> {
        match (left, right) {
            (Some(l), Some(r)) => Some(l.and(r)),
            (l, r) => l.or(r),
        }
    }

    /// Evaluate against a metadata map.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Self::Eq(key, value) => metadata.get(key) == Some(value),
            Self::In(key, values) => metadata
                .get(key)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            Self::Contains(key, value) => match metadata.get(key) {
                Some(Value::Array(items)) => items.contains(value),
                _ => false,
            },
            Self::And(filters) => filters.iter().all(|f| f.matches(metadata)),
        }
    }
}

/// A similarity query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VectorQuery {
    /// Query text, embedded by the engine when no embedding is given
    pub text: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub n_results: usize,
    pub filter: Option<MetadataFilter>,
}

impl VectorQuery {
    pub fn text(text: impl Into<String>, n_results: usize) -> Self {
        Self {
            text: Some(text.into()),
            embedding: None,
            n_results,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: Option<MetadataFilter>) -> Self {
        self.filter = filter;
        self
    }
}

/// A direct lookup by ids and/or metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetRequest {
    pub ids: Option<Vec<String>>,
    pub filter: Option<MetadataFilter>,
    pub limit: Option<usize>,
}

impl GetRequest {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn ids(ids: Vec<String>) -> Self {
        Self {
            ids: Some(ids),
            ..Self::default()
        }
    }

    pub fn filter(filter: MetadataFilter) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = MetadataFilter::combine(self.filter.take(), Some(filter));
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Documents to delete: the intersection of `ids` and `filter` when both are set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteRequest {
    pub ids: Option<Vec<String>>,
    pub filter: Option<MetadataFilter>,
}

impl DeleteRequest {
    pub fn ids(ids: Vec<String>) -> Self {
        Self {
            ids: Some(ids),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// A named document collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Similarity-search document store.
#[async_trait]
pub trait VectorStore: MemoryBackend {
    /// Add new documents. Duplicate ids are an error.
    async fn add(&self, collection: &str, documents: Vec<Document>) -> Result<()>;

    /// Rank documents by similarity to the query.
    async fn query(&self, collection: &str, query: VectorQuery) -> Result<Vec<ScoredDocument>>;

    /// Fetch documents in insertion order.
    async fn get(&self, collection: &str, request: GetRequest) -> Result<Vec<Document>>;

    /// Replace existing documents. Unknown ids are skipped.
    async fn update(&self, collection: &str, documents: Vec<Document>) -> Result<()>;

    /// Delete documents, returning how many were removed.
    async fn delete(&self, collection: &str, request: DeleteRequest) -> Result<usize>;

    async fn create_collection(&self, name: &str, metadata: Metadata) -> Result<CollectionInfo>;

    async fn delete_collection(&self, name: &str) -> Result<()>;

    async fn get_or_create_collection(
        &self,
        name: &str,
        metadata: Metadata,
    ) -> Result<CollectionInfo>;

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    /// Number of documents in a collection.
    async fn count(&self, collection: &str) -> Result<usize>;
}
