//! Wiring the memory system together at startup.
//!
//! Engines are opened from [`MemorySettings`]. An engine that is disabled or
//! fails to open leaves its adapter unbound, which the rest of the system
//! treats as an absent backend. Detection runs once here; the resulting
//! snapshot is immutable for the life of the process, so a backend that
//! appears or disappears later is only picked up after a restart.
//! [`MemorySystem::providers_status`] still reports live health.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::adapters::{GraphAdapter, VectorAdapter};
use crate::config::{EngineSettings, MemorySettings};
use crate::engine::{Embedder, HashingEmbedder, SqliteGraphEngine, SqliteVectorEngine};
use crate::error::Result;
use crate::orchestrator::MemoryOrchestrator;
use crate::provider::{DetectionResult, FeatureFlags, ProviderFactory, ProviderStatus};

/// A fully wired memory system.
pub struct MemorySystem {
    orchestrator: Arc<MemoryOrchestrator>,
    factory: ProviderFactory,
    detection: Arc<DetectionResult>,
}

impl MemorySystem {
    /// Open engines, detect capabilities and build the orchestrator.
    pub async fn bootstrap(settings: MemorySettings) -> Result<Self> {
        let embedder: Arc<dyn Embedder> =
            Arc::new(HashingEmbedder::new(settings.embedding_dimension)?);

        let vector = open_vector(&settings.vector, embedder);
        let graph = open_graph(&settings.graph, settings.preferences.database.as_deref());

        let factory = ProviderFactory::new(Arc::new(vector), Arc::new(graph))
            .with_health_timeout(Duration::from_millis(settings.health_timeout_ms));
        let detection = Arc::new(
            factory
                .detect_memory_capabilities(&settings.preferences)
                .await,
        );
        if !detection.has_providers {
            warn!("no memory backend is healthy, every write will fail");
        }

        let orchestrator = MemoryOrchestrator::builder()
            .vector(factory.vector_store())
            .graph(factory.graph_store())
            .config(detection.config.clone())
            .build()?;

        info!(
            providers = ?detection.healthy_providers(),
            collection = orchestrator.config().collection(),
            "memory system ready"
        );

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            factory,
            detection,
        })
    }

    /// Bootstrap from `RECALL_*` environment variables.
    pub async fn from_env() -> Result<Self> {
        Self::bootstrap(MemorySettings::from_env()).await
    }

    pub fn orchestrator(&self) -> Arc<MemoryOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// The boot-time detection snapshot.
    pub fn detection(&self) -> Arc<DetectionResult> {
        Arc::clone(&self.detection)
    }

    pub fn features(&self) -> FeatureFlags {
        self.detection.features
    }

    pub fn factory(&self) -> &ProviderFactory {
        &self.factory
    }

    /// Current health of every backend, probed now.
    pub async fn providers_status(&self) -> Vec<ProviderStatus> {
        self.factory.get_providers_status().await
    }
}

fn open_vector(settings: &EngineSettings, embedder: Arc<dyn Embedder>) -> VectorAdapter {
    if !settings.enabled {
        info!("vector backend disabled");
        return VectorAdapter::unbound();
    }
    let opened = match settings.resolved_path() {
        Some(path) => SqliteVectorEngine::open(path, embedder),
        None => SqliteVectorEngine::in_memory_with(embedder),
    };
    match opened {
        Ok(engine) => VectorAdapter::bound(engine),
        Err(e) => {
            warn!(error = %e, "vector engine failed to open, continuing without it");
            VectorAdapter::unbound()
        }
    }
}

fn open_graph(settings: &EngineSettings, database: Option<&str>) -> GraphAdapter {
    if !settings.enabled {
        info!("graph backend disabled");
        return GraphAdapter::unbound();
    }
    let opened = match settings.resolved_path() {
        Some(path) => SqliteGraphEngine::open(path),
        None => SqliteGraphEngine::in_memory(),
    };
    match opened {
        Ok(engine) => match database {
            Some(name) => GraphAdapter::bound(engine.with_database(name)),
            None => GraphAdapter::bound(engine),
        },
        Err(e) => {
            warn!(error = %e, "graph engine failed to open, continuing without it");
            GraphAdapter::unbound()
        }
    }
}
