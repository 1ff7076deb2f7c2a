//! Provider handles and detection snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::MemoryConfig;
use crate::error::Result;
use crate::store::{Capability, GraphStore, MemoryBackend, ProviderType, VectorStore};

/// A backend handle, typed by the store it implements.
#[derive(Clone)]
pub enum MemoryProvider {
    Vector(Arc<dyn VectorStore>),
    Graph(Arc<dyn GraphStore>),
}

impl MemoryProvider {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            Self::Vector(_) => ProviderType::Vector,
            Self::Graph(_) => ProviderType::Graph,
        }
    }

    pub fn is_available(&self) -> bool {
        match self {
            Self::Vector(store) => store.is_available(),
            Self::Graph(store) => store.is_available(),
        }
    }

    pub async fn health_check(&self) -> Result<bool> {
        match self {
            Self::Vector(store) => store.health_check().await,
            Self::Graph(store) => store.health_check().await,
        }
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        match self {
            Self::Vector(store) => store.capabilities(),
            Self::Graph(store) => store.capabilities(),
        }
    }

    pub fn describe(&self) -> HashMap<String, Value> {
        match self {
            Self::Vector(store) => store.describe(),
            Self::Graph(store) => store.describe(),
        }
    }

    pub fn as_vector(&self) -> Option<&Arc<dyn VectorStore>> {
        match self {
            Self::Vector(store) => Some(store),
            Self::Graph(_) => None,
        }
    }

    pub fn as_graph(&self) -> Option<&Arc<dyn GraphStore>> {
        match self {
            Self::Graph(store) => Some(store),
            Self::Vector(_) => None,
        }
    }
}

impl std::fmt::Debug for MemoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MemoryProvider")
            .field(&self.provider_type())
            .finish()
    }
}

/// Point-in-time view of one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCapability {
    pub provider_type: ProviderType,
    pub available: bool,
    pub healthy: bool,
    pub capabilities: Vec<Capability>,
    pub metadata: HashMap<String, Value>,
}

/// Diagnostic record for one backend. Always produced, even on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub provider_type: ProviderType,
    pub available: bool,
    pub healthy: bool,
    pub capabilities: Vec<Capability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Features dependents can switch on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub semantic_search: bool,
    pub graph_traversal: bool,
    pub persistent_memory: bool,
    pub cross_thread_memory: bool,
}

impl FeatureFlags {
    pub fn from_health(vector_healthy: bool, graph_healthy: bool) -> Self {
        Self {
            semantic_search: vector_healthy,
            graph_traversal: graph_healthy,
            persistent_memory: vector_healthy || graph_healthy,
            cross_thread_memory: vector_healthy && graph_healthy,
        }
    }
}

/// Boot-time detection snapshot, shared as `Arc<DetectionResult>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub providers: Vec<ProviderCapability>,
    pub config: MemoryConfig,
    pub features: FeatureFlags,
    pub has_providers: bool,
    pub detected_at: DateTime<Utc>,
}

impl DetectionResult {
    pub fn is_healthy(&self, provider_type: ProviderType) -> bool {
        self.providers
            .iter()
            .any(|p| p.provider_type == provider_type && p.healthy)
    }

    pub fn healthy_providers(&self) -> Vec<ProviderType> {
        self.providers
            .iter()
            .filter(|p| p.healthy)
            .map(|p| p.provider_type)
            .collect()
    }
}
