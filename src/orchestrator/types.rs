//! Request and result types for [`MemoryOrchestrator`](super::MemoryOrchestrator).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::{EvictionStrategy, MemoryEntry, MemoryId, MemoryType};
use crate::stats::{HealthStatus, MetricsSnapshot};

/// Options for `retrieve`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieveOptions {
    /// Keep only the most recent `limit` entries
    pub limit: Option<usize>,
    /// Keep only these types; empty keeps all
    pub memory_types: Vec<MemoryType>,
}

impl RetrieveOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_types(mut self, types: impl IntoIterator<Item = MemoryType>) -> Self {
        self.memory_types = types.into_iter().collect();
        self
    }
}

/// A similarity search over stored entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub query: String,
    pub thread_id: Option<String>,
    /// Any of these types; empty matches all
    pub memory_types: Vec<MemoryType>,
    /// All of these tags must be present
    pub tags: Vec<String>,
    pub user_id: Option<String>,
    pub limit: Option<usize>,
    pub min_relevance: Option<f64>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn in_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_types(mut self, types: impl IntoIterator<Item = MemoryType>) -> Self {
        self.memory_types = types.into_iter().collect();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_min_relevance(mut self, min_relevance: f64) -> Self {
        self.min_relevance = Some(min_relevance);
        self
    }
}

/// Options for `search_for_context`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOptions {
    pub thread_id: Option<String>,
    /// When set, the result also carries this user's patterns
    pub user_id: Option<String>,
    pub limit: Option<usize>,
    pub min_relevance: Option<f64>,
}

/// Search results plus a confidence estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSearchResult {
    pub memories: Vec<MemoryEntry>,
    /// Relevance of the top hit in [0, 1]; 0 with no hits
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_patterns: Option<UserPatterns>,
}

/// Options for `summarize`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizeOptions {
    /// Summarize only the most recent `max_entries` entries
    pub max_entries: Option<usize>,
    /// Importance of the summary entry; 0.8 when unset
    pub importance: Option<f64>,
    /// Tags added on top of the union of source tags
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicCount {
    pub topic: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCount {
    pub memory_type: MemoryType,
    pub count: usize,
}

/// Aggregated view of one user's entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPatterns {
    pub user_id: String,
    pub total_memories: usize,
    /// Tag frequency, most common first
    pub topics: Vec<TopicCount>,
    /// Entry types, most common first
    pub preferred_types: Vec<TypeCount>,
    /// Activity bursts, split per thread on gaps over 30 minutes
    pub estimated_sessions: usize,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// One entry of a conversation flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationFlowStep {
    pub entry: MemoryEntry,
    pub previous: Option<MemoryId>,
    pub next: Option<MemoryId>,
    /// Up to two entries sharing the most tags
    pub similar: Vec<MemoryId>,
}

/// What `cleanup` removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub strategy: EvictionStrategy,
    pub examined: usize,
    pub evicted: usize,
    pub evicted_ids: Vec<MemoryId>,
    pub threads_affected: usize,
}

/// Store totals plus metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_memories: usize,
    pub by_type: HashMap<MemoryType, usize>,
    pub thread_count: usize,
    pub graph_available: bool,
    pub metrics: MetricsSnapshot,
    pub health: HealthStatus,
}
