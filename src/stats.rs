//! Operation metrics and derived health.
//!
//! Every orchestrator call brackets itself with [`MetricsCollector::start`] and
//! [`MetricsCollector::finish`]. Health is computed from the aggregates on
//! read and never stored.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::config::MetricsConfig;
use crate::store::Metadata;

/// Orchestrator operations that are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Store,
    StoreBatch,
    Retrieve,
    Search,
    SearchForContext,
    Summarize,
    Delete,
    Clear,
    Cleanup,
    BuildRelationships,
    UserPatterns,
    ConversationFlow,
    GetStats,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::StoreBatch => "store_batch",
            Self::Retrieve => "retrieve",
            Self::Search => "search",
            Self::SearchForContext => "search_for_context",
            Self::Summarize => "summarize",
            Self::Delete => "delete",
            Self::Clear => "clear",
            Self::Cleanup => "cleanup",
            Self::BuildRelationships => "build_relationships",
            Self::UserPatterns => "user_patterns",
            Self::ConversationFlow => "conversation_flow",
            Self::GetStats => "get_stats",
        }
    }

    pub fn category(&self) -> OperationCategory {
        match self {
            Self::Store | Self::StoreBatch | Self::Summarize => OperationCategory::Write,
            Self::Retrieve
            | Self::Search
            | Self::SearchForContext
            | Self::UserPatterns
            | Self::ConversationFlow
            | Self::GetStats => OperationCategory::Read,
            Self::Delete | Self::Clear => OperationCategory::Delete,
            Self::Cleanup | Self::BuildRelationships => OperationCategory::Maintenance,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
    Write,
    Read,
    Delete,
    Maintenance,
}

/// Handle returned by [`MetricsCollector::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Aggregates for one operation kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationStats {
    pub count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub total_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
}

impl OperationStats {
    pub fn avg_latency_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_latency_ms / self.count as f64
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.count == 0 {
            1.0
        } else {
            self.success_count as f64 / self.count as f64
        }
    }

    fn record(&mut self, success: bool, latency_ms: f64) {
        if self.count == 0 {
            self.min_latency_ms = latency_ms;
            self.max_latency_ms = latency_ms;
        } else {
            self.min_latency_ms = self.min_latency_ms.min(latency_ms);
            self.max_latency_ms = self.max_latency_ms.max(latency_ms);
        }
        self.count += 1;
        self.total_latency_ms += latency_ms;
        if success {
            self.success_count += 1;
        } else {
            self.error_count += 1;
        }
    }
}

/// A completed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: OperationId,
    pub kind: OperationKind,
    pub success: bool,
    pub latency_ms: f64,
    pub finished_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Classify `value` against `threshold`: above it degrades, above twice it fails.
    fn classify(value: f64, threshold: f64) -> Self {
        if value > threshold * 2.0 {
            Self::Unhealthy
        } else if value > threshold {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        };
        write!(f, "{}", s)
    }
}

/// Point-in-time copy of all metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub operations: HashMap<OperationKind, OperationStats>,
    pub totals_by_category: HashMap<OperationCategory, u64>,
    pub total_operations: u64,
    pub total_errors: u64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    pub in_flight: usize,
    pub recent: Vec<OperationRecord>,
    pub health: HealthStatus,
}

#[derive(Debug, Default)]
struct MetricsState {
    pending: HashMap<OperationId, (OperationKind, Instant)>,
    operations: HashMap<OperationKind, OperationStats>,
    totals_by_category: HashMap<OperationCategory, u64>,
    total_operations: u64,
    total_errors: u64,
    total_latency_ms: f64,
    recent: VecDeque<OperationRecord>,
}

impl MetricsState {
    fn error_rate(&self) -> f64 {
        if self.total_operations == 0 {
            0.0
        } else {
            self.total_errors as f64 / self.total_operations as f64
        }
    }

    fn avg_latency_ms(&self) -> f64 {
        if self.total_operations == 0 {
            0.0
        } else {
            self.total_latency_ms / self.total_operations as f64
        }
    }
}

/// In-process metrics store.
#[derive(Debug)]
pub struct MetricsCollector {
    config: MetricsConfig,
    state: RwLock<MetricsState>,
}

impl MetricsCollector {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            state: RwLock::new(MetricsState::default()),
        }
    }

    /// Begin timing an operation.
    pub async fn start(&self, kind: OperationKind) -> OperationId {
        let id = OperationId(Uuid::new_v4());
        self.state
            .write()
            .await
            .pending
            .insert(id, (kind, Instant::now()));
        id
    }

    /// Complete an operation. Unknown ids are ignored.
    pub async fn finish(&self, id: OperationId, success: bool, metadata: Metadata) {
        let mut state = self.state.write().await;
        let Some((kind, started)) = state.pending.remove(&id) else {
            debug!(operation_id = %id, "finish called for unknown operation");
            return;
        };
        let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
        self.record(&mut state, id, kind, success, latency_ms, metadata);
    }

    fn record(
        &self,
        state: &mut MetricsState,
        id: OperationId,
        kind: OperationKind,
        success: bool,
        latency_ms: f64,
        metadata: Metadata,
    ) {
        state
            .operations
            .entry(kind)
            .or_default()
            .record(success, latency_ms);
        *state.totals_by_category.entry(kind.category()).or_insert(0) += 1;
        state.total_operations += 1;
        state.total_latency_ms += latency_ms;
        if !success {
            state.total_errors += 1;
        }

        if self.config.history_size > 0 {
            if state.recent.len() == self.config.history_size {
                state.recent.pop_front();
            }
            state.recent.push_back(OperationRecord {
                id,
                kind,
                success,
                latency_ms,
                finished_at: Utc::now(),
                metadata,
            });
        }
    }

    #[cfg(test)]
    async fn record_completed(&self, kind: OperationKind, success: bool, latency_ms: f64) {
        let mut state = self.state.write().await;
        let id = OperationId(Uuid::new_v4());
        self.record(&mut state, id, kind, success, latency_ms, Metadata::new());
    }

    /// Worst of the error-rate and latency classifications.
    pub async fn health(&self) -> HealthStatus {
        let state = self.state.read().await;
        self.derive_health(&state)
    }

    fn derive_health(&self, state: &MetricsState) -> HealthStatus {
        if state.total_operations == 0 {
            return HealthStatus::Healthy;
        }
        let by_errors =
            HealthStatus::classify(state.error_rate(), self.config.error_rate_threshold);
        let by_latency =
            HealthStatus::classify(state.avg_latency_ms(), self.config.latency_threshold_ms);
        by_errors.max(by_latency)
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.read().await;
        MetricsSnapshot {
            operations: state.operations.clone(),
            totals_by_category: state.totals_by_category.clone(),
            total_operations: state.total_operations,
            total_errors: state.total_errors,
            error_rate: state.error_rate(),
            avg_latency_ms: state.avg_latency_ms(),
            in_flight: state.pending.len(),
            recent: state.recent.iter().cloned().collect(),
            health: self.derive_health(&state),
        }
    }

    /// Drop every aggregate, keeping in-flight operations.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        let pending = std::mem::take(&mut state.pending);
        *state = MetricsState {
            pending,
            ..MetricsState::default()
        };
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}
