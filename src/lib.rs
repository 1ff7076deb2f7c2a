//! # recall-core
//!
//! Persistent memory for conversational agents over a vector store and a
//! graph store, with graceful degradation when either is missing.
//!
//! ## Core Components
//!
//! - **Store**: the vector and graph store contracts every backend implements
//! - **Engine**: bundled SQLite engines behind those contracts
//! - **Provider**: health-gated backend discovery and feature detection
//! - **Orchestrator**: the single entry point for storing and recalling memories
//! - **Stats**: per-operation metrics and derived health
//!
//! ## Example
//!
//! ```rust,ignore
//! use recall_core::{MemoryMetadata, MemorySettings, MemorySystem, MemoryType, SearchQuery};
//!
//! let system = MemorySystem::bootstrap(MemorySettings::from_env()).await?;
//! let memory = system.orchestrator();
//!
//! memory
//!     .store("thread-1", "User prefers dark mode", MemoryMetadata::new(MemoryType::Preference))
//!     .await?;
//! let hits = memory.search(SearchQuery::new("theme")).await?;
//! ```

pub mod adapters;
pub mod bootstrap;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod provider;
pub mod relationships;
pub mod stats;
pub mod store;
pub mod summarize;

// Re-exports for convenience
pub use adapters::{GraphAdapter, VectorAdapter};
pub use bootstrap::MemorySystem;
pub use config::{
    ConfigPreferences, EngineSettings, MemoryConfig, MemorySettings, MetricsConfig,
    RelationshipConfig, SearchConfig,
};
pub use engine::{Embedder, HashingEmbedder, SqliteGraphEngine, SqliteVectorEngine};
pub use error::{Error, ErrorContext, ErrorKind, Result};
pub use memory::{
    EvictionStrategy, MemoryEntry, MemoryId, MemoryMetadata, MemoryType, NewMemory,
    RetentionPolicy,
};
pub use orchestrator::{
    CleanupReport, ContextOptions, ContextSearchResult, ConversationFlowStep, MemoryOrchestrator,
    MemoryOrchestratorBuilder, MemoryStats, RetrieveOptions, SearchQuery, SummarizeOptions,
    UserPatterns,
};
pub use provider::{
    DetectionResult, FeatureFlags, MemoryProvider, ProviderFactory, ProviderStatus,
};
pub use relationships::RelationshipSummary;
pub use stats::{HealthStatus, MetricsCollector, MetricsSnapshot, OperationKind};
pub use store::{Capability, GraphStore, MemoryBackend, ProviderType, VectorStore};
pub use summarize::{ExtractiveSummarizer, Summarizer};
