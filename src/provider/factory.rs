//! Provider enumeration, health gating and capability detection.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use super::types::{
    DetectionResult, FeatureFlags, MemoryProvider, ProviderCapability, ProviderStatus,
};
use crate::config::{ConfigPreferences, GraphSection, MemoryConfig, VectorSection};
use crate::error::{Error, ErrorContext, Result};
use crate::store::{GraphStore, ProviderType, VectorStore};

/// Default per-backend health-check timeout.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of probing one backend.
#[derive(Debug, Clone)]
struct Probe {
    provider: MemoryProvider,
    available: bool,
    healthy: bool,
    error: Option<String>,
}

/// Knows every backend and decides which of them are usable right now.
#[derive(Clone)]
pub struct ProviderFactory {
    vector: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    health_timeout: Duration,
}

impl ProviderFactory {
    pub fn new(vector: Arc<dyn VectorStore>, graph: Arc<dyn GraphStore>) -> Self {
        Self {
            vector,
            graph,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
        }
    }

    /// Bound each health check by `timeout`.
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// Handle for a backend, without any health gate.
    pub fn provider(&self, provider_type: ProviderType) -> MemoryProvider {
        match provider_type {
            ProviderType::Vector => MemoryProvider::Vector(Arc::clone(&self.vector)),
            ProviderType::Graph => MemoryProvider::Graph(Arc::clone(&self.graph)),
        }
    }

    pub fn vector_store(&self) -> Arc<dyn VectorStore> {
        Arc::clone(&self.vector)
    }

    pub fn graph_store(&self) -> Arc<dyn GraphStore> {
        Arc::clone(&self.graph)
    }

    // ==================== Health Gate ====================

    async fn check(&self, provider: &MemoryProvider) -> Result<bool> {
        let timeout_ms = self.health_timeout.as_millis() as u64;
        match tokio::time::timeout(self.health_timeout, provider.health_check()).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(timeout_ms).with_context(
                ErrorContext::operation("health_check").with_provider(provider.provider_type()),
            )),
        }
    }

    async fn probe(&self, provider_type: ProviderType) -> Probe {
        let provider = self.provider(provider_type);
        if !provider.is_available() {
            return Probe {
                provider,
                available: false,
                healthy: false,
                error: Some(format!("{} backend not available", provider_type)),
            };
        }

        let (healthy, error) = match self.check(&provider).await {
            Ok(true) => (true, None),
            Ok(false) => (
                false,
                Some(format!("{} backend failed health check", provider_type)),
            ),
            Err(e) => {
                warn!(
                    provider = %provider_type,
                    error = %e,
                    "health check errored, excluding backend"
                );
                (false, Some(e.to_string()))
            }
        };
        debug!(provider = %provider_type, healthy, "probed backend");

        Probe {
            provider,
            available: true,
            healthy,
            error,
        }
    }

    async fn probe_all(&self) -> Vec<Probe> {
        join_all(ProviderType::ALL.iter().map(|t| self.probe(*t))).await
    }

    // ==================== Lookup ====================

    /// Healthy backends only.
    pub async fn get_available_providers(&self) -> Vec<MemoryProvider> {
        self.probe_all()
            .await
            .into_iter()
            .filter(|p| p.healthy)
            .map(|p| p.provider)
            .collect()
    }

    /// A backend if it is available and healthy.
    pub async fn get_provider(&self, provider_type: ProviderType) -> Option<MemoryProvider> {
        let probe = self.probe(provider_type).await;
        probe.healthy.then_some(probe.provider)
    }

    pub async fn is_provider_available(&self, provider_type: ProviderType) -> bool {
        self.probe(provider_type).await.healthy
    }

    /// One status record per known backend. Never fails.
    pub async fn get_providers_status(&self) -> Vec<ProviderStatus> {
        let checked_at = Utc::now();
        self.probe_all()
            .await
            .into_iter()
            .map(|p| ProviderStatus {
                provider_type: p.provider.provider_type(),
                available: p.available,
                healthy: p.healthy,
                capabilities: if p.available {
                    p.provider.capabilities()
                } else {
                    Vec::new()
                },
                error: p.error,
                checked_at,
            })
            .collect()
    }

    // ==================== Detection ====================

    /// Configuration with a section for each healthy backend.
    pub async fn create_memory_config(&self, preferences: &ConfigPreferences) -> MemoryConfig {
        let probes = self.probe_all().await;
        build_config(
            healthy(&probes, ProviderType::Vector),
            healthy(&probes, ProviderType::Graph),
            preferences,
        )
    }

    /// Probe every backend once and derive the detection snapshot.
    pub async fn detect_memory_capabilities(
        &self,
        preferences: &ConfigPreferences,
    ) -> DetectionResult {
        let probes = self.probe_all().await;
        let vector_healthy = healthy(&probes, ProviderType::Vector);
        let graph_healthy = healthy(&probes, ProviderType::Graph);

        let providers: Vec<ProviderCapability> = probes
            .iter()
            .map(|p| ProviderCapability {
                provider_type: p.provider.provider_type(),
                available: p.available,
                healthy: p.healthy,
                capabilities: if p.healthy {
                    p.provider.capabilities()
                } else {
                    Vec::new()
                },
                metadata: p.provider.describe(),
            })
            .collect();

        let features = FeatureFlags::from_health(vector_healthy, graph_healthy);
        let result = DetectionResult {
            has_providers: vector_healthy || graph_healthy,
            config: build_config(vector_healthy, graph_healthy, preferences),
            providers,
            features,
            detected_at: Utc::now(),
        };

        info!(
            vector = vector_healthy,
            graph = graph_healthy,
            semantic_search = features.semantic_search,
            cross_thread_memory = features.cross_thread_memory,
            "memory capabilities detected"
        );
        result
    }
}

fn healthy(probes: &[Probe], provider_type: ProviderType) -> bool {
    probes
        .iter()
        .any(|p| p.healthy && p.provider.provider_type() == provider_type)
}

fn build_config(
    vector_healthy: bool,
    graph_healthy: bool,
    preferences: &ConfigPreferences,
) -> MemoryConfig {
    let defaults = MemoryConfig::default();
    MemoryConfig {
        vector: vector_healthy.then(|| VectorSection {
            collection: preferences
                .collection
                .clone()
                .unwrap_or_else(|| VectorSection::default().collection),
        }),
        graph: graph_healthy.then(|| GraphSection {
            database: preferences
                .database
                .clone()
                .unwrap_or_else(|| GraphSection::default().database),
        }),
        retention: preferences.retention.clone().unwrap_or(defaults.retention),
        metrics: preferences.metrics.clone().unwrap_or(defaults.metrics),
        search: preferences.search.clone().unwrap_or(defaults.search),
        relationships: preferences
            .relationships
            .clone()
            .unwrap_or(defaults.relationships),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{GraphAdapter, VectorAdapter};
    use crate::config::{DEFAULT_COLLECTION, DEFAULT_DATABASE};
    use crate::engine::{SqliteGraphEngine, SqliteVectorEngine};
    use crate::memory::RetentionPolicy;

    fn factory(vector: bool, graph: bool) -> ProviderFactory {
        let vector = if vector {
            VectorAdapter::bound(SqliteVectorEngine::in_memory().unwrap())
        } else {
            VectorAdapter::unbound()
        };
        let graph = if graph {
            GraphAdapter::bound(SqliteGraphEngine::in_memory().unwrap())
        } else {
            GraphAdapter::unbound()
        };
        ProviderFactory::new(Arc::new(vector), Arc::new(graph))
    }

    #[tokio::test]
    async fn test_available_providers_are_health_gated() {
        let both = factory(true, true);
        assert_eq!(both.get_available_providers().await.len(), 2);
        assert!(both.get_provider(ProviderType::Graph).await.is_some());

        let vector_only = factory(true, false);
        let available = vector_only.get_available_providers().await;
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].provider_type(), ProviderType::Vector);
        assert!(!vector_only.is_provider_available(ProviderType::Graph).await);
        assert!(vector_only.get_provider(ProviderType::Graph).await.is_none());
    }

    #[tokio::test]
    async fn test_status_covers_every_provider() {
        let statuses = factory(false, false).get_providers_status().await;
        assert_eq!(statuses.len(), ProviderType::ALL.len());
        for status in &statuses {
            assert!(!status.available);
            assert!(status.capabilities.is_empty());
            assert!(status
                .error
                .as_deref()
                .unwrap()
                .contains("backend not available"));
        }

        let statuses = factory(true, true).get_providers_status().await;
        assert!(statuses.iter().all(|s| s.healthy && s.error.is_none()));
        assert!(statuses.iter().all(|s| !s.capabilities.is_empty()));
    }

    #[tokio::test]
    async fn test_config_omits_unhealthy_sections() {
        let prefs = ConfigPreferences {
            collection: Some("notes".into()),
            retention: Some(RetentionPolicy::keep_top(5)),
            ..ConfigPreferences::default()
        };
        let config = factory(true, false).create_memory_config(&prefs).await;
        assert_eq!(config.vector.unwrap().collection, "notes");
        assert!(config.graph.is_none());
        assert_eq!(config.retention, RetentionPolicy::keep_top(5));

        let config = factory(true, true)
            .create_memory_config(&ConfigPreferences::default())
            .await;
        assert_eq!(config.vector.unwrap().collection, DEFAULT_COLLECTION);
        assert_eq!(config.graph.unwrap().database, DEFAULT_DATABASE);
    }

    #[tokio::test]
    async fn test_detection_flags() {
        let prefs = ConfigPreferences::default();

        let vector_only = factory(true, false).detect_memory_capabilities(&prefs).await;
        assert_eq!(vector_only.features, FeatureFlags::from_health(true, false));
        assert!(vector_only.has_providers);
        assert!(vector_only.is_healthy(ProviderType::Vector));
        assert_eq!(vector_only.healthy_providers(), vec![ProviderType::Vector]);

        let none = factory(false, false).detect_memory_capabilities(&prefs).await;
        assert_eq!(none.features, FeatureFlags::default());
        assert!(!none.has_providers);
        assert!(none.config.vector.is_none() && none.config.graph.is_none());
    }
}
