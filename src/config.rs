//! Configuration.
//!
//! Two layers:
//!
//! - [`MemoryConfig`]: what the orchestrator runs with. Backend sections are
//!   present only for backends that passed detection.
//! - [`MemorySettings`]: how the system boots. Engine paths, enablement and
//!   the health-check timeout, loadable from JSON or `RECALL_*` variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorContext, Result};
use crate::memory::RetentionPolicy;

/// Default vector collection name.
pub const DEFAULT_COLLECTION: &str = "agent_memories";

/// Default graph database name.
pub const DEFAULT_DATABASE: &str = "memory_graph";

/// Vector backend section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSection {
    pub collection: String,
}

impl Default for VectorSection {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

/// Graph backend section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSection {
    pub database: String,
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
        }
    }
}

/// Thresholds for derived health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Error rate in (0, 1] above which health degrades
    pub error_rate_threshold: f64,
    /// Average latency above which health degrades
    pub latency_threshold_ms: f64,
    /// Recent operations kept for inspection
    pub history_size: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            error_rate_threshold: 0.1,
            latency_threshold_ms: 1_000.0,
            history_size: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub min_relevance: f64,
    /// Bump access bookkeeping on reads
    pub track_access: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            min_relevance: 0.0,
            track_access: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipConfig {
    /// Shared tags needed for a SIMILAR_TO edge
    pub min_shared_tags: usize,
    /// Importance needed on both ends of an IMPORTANT_WITH edge
    pub importance_threshold: f64,
}

impl Default for RelationshipConfig {
    fn default() -> Self {
        Self {
            min_shared_tags: 1,
            importance_threshold: 0.7,
        }
    }
}

/// Runtime configuration for the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<VectorSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphSection>,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub relationships: RelationshipConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            vector: Some(VectorSection::default()),
            graph: Some(GraphSection::default()),
            retention: RetentionPolicy::default(),
            metrics: MetricsConfig::default(),
            search: SearchConfig::default(),
            relationships: RelationshipConfig::default(),
        }
    }
}

impl MemoryConfig {
    /// Collection the orchestrator writes to.
    pub fn collection(&self) -> &str {
        self.vector
            .as_ref()
            .map(|v| v.collection.as_str())
            .unwrap_or(DEFAULT_COLLECTION)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| {
            Err(Error::configuration(message)
                .with_context(ErrorContext::operation("validate_config")))
        };

        if let Some(ref vector) = self.vector {
            if vector.collection.trim().is_empty() {
                return fail("vector collection name must not be empty".into());
            }
        }
        if let Some(ref graph) = self.graph {
            if graph.database.trim().is_empty() {
                return fail("graph database name must not be empty".into());
            }
        }
        let rate = self.metrics.error_rate_threshold;
        if !(rate > 0.0 && rate <= 1.0) {
            return fail(format!("error_rate_threshold must be within (0, 1], got {}", rate));
        }
        if !(self.metrics.latency_threshold_ms > 0.0) {
            return fail("latency_threshold_ms must be positive".into());
        }
        if self.search.default_limit == 0 {
            return fail("search default_limit must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.search.min_relevance) {
            return fail("search min_relevance must be within [0, 1]".into());
        }
        if !(0.0..=1.0).contains(&self.relationships.importance_threshold) {
            return fail("importance_threshold must be within [0, 1]".into());
        }
        if self.relationships.min_shared_tags == 0 {
            return fail("min_shared_tags must be at least 1".into());
        }
        self.retention
            .validate()
            .map_err(|e| e.with_context(ErrorContext::operation("validate_config")))
    }
}

/// Caller overrides applied on top of detected defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPreferences {
    pub collection: Option<String>,
    pub database: Option<String>,
    pub retention: Option<RetentionPolicy>,
    pub metrics: Option<MetricsConfig>,
    pub search: Option<SearchConfig>,
    pub relationships: Option<RelationshipConfig>,
}

/// Settings for one bundled engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub enabled: bool,
    /// Database file; in-memory when unset
    pub path: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl EngineSettings {
    /// `path` with `~` expanded.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
    }
}

/// Boot-time settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    pub vector: EngineSettings,
    pub graph: EngineSettings,
    /// Dimension of the bundled hashing embedder
    pub embedding_dimension: usize,
    /// Per-backend health-check timeout
    pub health_timeout_ms: u64,
    pub preferences: ConfigPreferences,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            vector: EngineSettings::default(),
            graph: EngineSettings::default(),
            embedding_dimension: 256,
            health_timeout_ms: 5_000,
            preferences: ConfigPreferences::default(),
        }
    }
}

impl MemorySettings {
    /// Load settings from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let expanded = shellexpand::tilde(&path.to_string_lossy()).to_string();
        let context = || {
            ErrorContext::operation("load_settings").with_metadata("path", expanded.clone())
        };

        let raw = std::fs::read_to_string(&expanded).map_err(|e| {
            Error::configuration(format!("cannot read settings file: {}", e))
                .with_context(context())
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            Error::configuration(format!("invalid settings file: {}", e)).with_context(context())
        })
    }

    /// Defaults overlaid with `RECALL_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay variables from `lookup` onto these settings.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |s: String| s != "0" && s.to_lowercase() != "false";

        if let Some(path) = lookup("RECALL_VECTOR_PATH") {
            self.vector.path = Some(path);
        }
        if let Some(path) = lookup("RECALL_GRAPH_PATH") {
            self.graph.path = Some(path);
        }
        if let Some(enabled) = lookup("RECALL_VECTOR_ENABLED") {
            self.vector.enabled = flag(enabled);
        }
        if let Some(enabled) = lookup("RECALL_GRAPH_ENABLED") {
            self.graph.enabled = flag(enabled);
        }
        if let Some(collection) = lookup("RECALL_COLLECTION") {
            self.preferences.collection = Some(collection);
        }
        if let Some(database) = lookup("RECALL_GRAPH_DATABASE") {
            self.preferences.database = Some(database);
        }
        if let Some(timeout) = lookup("RECALL_HEALTH_TIMEOUT_MS").and_then(|s| s.parse().ok()) {
            self.health_timeout_ms = timeout;
        }
        self
    }
}
