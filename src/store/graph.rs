//! Graph store contract.
//!
//! Graph work is expressed as [`GraphStatement`] values rather than a query
//! dialect, so engines are free to translate them however they like.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::vector::Metadata;
use super::MemoryBackend;
use crate::error::Result;

/// A row returned by a graph statement.
pub type Record = Metadata;

/// Node families stored in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Thread,
    Memory,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thread => "thread",
            Self::Memory => "memory",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "thread" => Some(Self::Thread),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Reference to a node by kind and id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub kind: NodeKind,
    pub id: String,
}

impl NodeRef {
    pub fn thread(id: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Thread,
            id: id.into(),
        }
    }

    pub fn memory(id: impl ToString) -> Self {
        Self {
            kind: NodeKind::Memory,
            id: id.to_string(),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Descriptive labels attached to memory nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    Summary,
    Fact,
    Context,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "Summary",
            Self::Fact => "Fact",
            Self::Context => "Context",
        }
    }
}

/// Typed, directed relationship kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    /// Temporal order within a thread
    FollowedBy,
    Summarizes,
    SimilarTo,
    ImportantWith,
    HasPreference,
    HasMemory,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FollowedBy => "FOLLOWED_BY",
            Self::Summarizes => "SUMMARIZES",
            Self::SimilarTo => "SIMILAR_TO",
            Self::ImportantWith => "IMPORTANT_WITH",
            Self::HasPreference => "HAS_PREFERENCE",
            Self::HasMemory => "HAS_MEMORY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FOLLOWED_BY" => Some(Self::FollowedBy),
            "SUMMARIZES" => Some(Self::Summarizes),
            "SIMILAR_TO" => Some(Self::SimilarTo),
            "IMPORTANT_WITH" => Some(Self::ImportantWith),
            "HAS_PREFERENCE" => Some(Self::HasPreference),
            "HAS_MEMORY" => Some(Self::HasMemory),
            _ => None,
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameterized graph operations.
///
/// Every write is an upsert or a delete, so replaying a statement never
/// duplicates data.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphStatement {
    /// Create the node or merge `properties` into it.
    MergeNode {
        node: NodeRef,
        thread_id: Option<String>,
        created_at: Option<DateTime<Utc>>,
        properties: Metadata,
    },
    /// Attach a label if not already present.
    AddLabel { node: NodeRef, label: NodeLabel },
    /// Create the edge or merge `properties` into it. A no-op when either
    /// endpoint is missing.
    MergeEdge {
        from: NodeRef,
        to: NodeRef,
        kind: RelationKind,
        properties: Metadata,
    },
    /// Most recently created memory in a thread at or before `before`,
    /// excluding `exclude`. Yields `id` and `created_at`.
    LatestMemoryInThread {
        thread_id: String,
        before: DateTime<Utc>,
        exclude: String,
    },
    /// Memories of a thread in creation order, optionally only those created
    /// strictly before `before` and lacking `without_label`. Yields `id`,
    /// `created_at` and `labels`.
    MemoriesInThread {
        thread_id: String,
        before: Option<DateTime<Utc>>,
        without_label: Option<NodeLabel>,
    },
    /// Remove nodes together with every edge touching them.
    DetachDelete { nodes: Vec<NodeRef> },
    /// Remove thread nodes that have no edges left.
    DeleteOrphanThreads,
    /// List edges, optionally touching `node` and/or of `kind`. Yields
    /// `from_kind`, `from_id`, `to_kind`, `to_id`, `kind`, `properties`.
    Edges {
        node: Option<NodeRef>,
        kind: Option<RelationKind>,
    },
    /// Count edges, optionally of one kind. Yields `count`.
    CountEdges { kind: Option<RelationKind> },
    /// Look up a node. Yields `kind`, `id`, `thread_id`, `created_at`,
    /// `labels` and `properties` when present.
    GetNode { node: NodeRef },
}

impl GraphStatement {
    /// Whether the statement mutates the graph.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::MergeNode { .. }
                | Self::AddLabel { .. }
                | Self::MergeEdge { .. }
                | Self::DetachDelete { .. }
                | Self::DeleteOrphanThreads
        )
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MergeNode { .. } => "merge_node",
            Self::AddLabel { .. } => "add_label",
            Self::MergeEdge { .. } => "merge_edge",
            Self::LatestMemoryInThread { .. } => "latest_memory_in_thread",
            Self::MemoriesInThread { .. } => "memories_in_thread",
            Self::DetachDelete { .. } => "detach_delete",
            Self::DeleteOrphanThreads => "delete_orphan_threads",
            Self::Edges { .. } => "edges",
            Self::CountEdges { .. } => "count_edges",
            Self::GetNode { .. } => "get_node",
        }
    }
}

/// Summary of what a statement changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub nodes_created: u64,
    pub nodes_deleted: u64,
    pub relationships_created: u64,
    pub relationships_deleted: u64,
    pub properties_set: u64,
    pub labels_added: u64,
}

impl Counters {
    pub fn merge(&mut self, other: &Counters) {
        self.nodes_created += other.nodes_created;
        self.nodes_deleted += other.nodes_deleted;
        self.relationships_created += other.relationships_created;
        self.relationships_deleted += other.relationships_deleted;
        self.properties_set += other.properties_set;
        self.labels_added += other.labels_added;
    }

    pub fn contains_updates(&self) -> bool {
        *self != Counters::default()
    }
}

/// Records plus change counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub records: Vec<Record>,
    pub counters: Counters,
}

impl QueryResult {
    /// First record's string field, if any.
    pub fn first_str(&self, key: &str) -> Option<&str> {
        self.records
            .first()
            .and_then(|r| r.get(key))
            .and_then(|v| v.as_str())
    }

    /// String field of every record.
    pub fn column_str(&self, key: &str) -> Vec<String> {
        self.records
            .iter()
            .filter_map(|r| r.get(key).and_then(|v| v.as_str()).map(String::from))
            .collect()
    }
}

/// Transaction access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    Write,
}

/// A transaction scope. Dropping it without commit rolls back.
#[async_trait]
pub trait GraphTransaction: Send {
    async fn run(&mut self, statement: GraphStatement) -> Result<QueryResult>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Relationship store.
#[async_trait]
pub trait GraphStore: MemoryBackend {
    /// Run a single statement in its own transaction.
    async fn run(&self, statement: GraphStatement) -> Result<QueryResult>;

    /// Open a transaction scope.
    async fn begin(&self, mode: AccessMode) -> Result<Box<dyn GraphTransaction>>;

    /// Check the engine can be reached.
    async fn verify_connectivity(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_kind_round_trip_names() {
        for kind in [
            RelationKind::FollowedBy,
            RelationKind::Summarizes,
            RelationKind::SimilarTo,
            RelationKind::ImportantWith,
            RelationKind::HasPreference,
            RelationKind::HasMemory,
        ] {
            assert_eq!(RelationKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(RelationKind::parse("KNOWS"), None);
    }

    #[test]
    fn test_write_classification() {
        assert!(GraphStatement::DeleteOrphanThreads.is_write());
        assert!(!GraphStatement::CountEdges { kind: None }.is_write());
        assert!(!GraphStatement::GetNode {
            node: NodeRef::thread("t1")
        }
        .is_write());
    }

    #[test]
    fn test_counters_merge() {
        let mut total = Counters::default();
        assert!(!total.contains_updates());
        total.merge(&Counters {
            nodes_created: 2,
            relationships_created: 1,
            ..Counters::default()
        });
        total.merge(&Counters {
            nodes_created: 1,
            ..Counters::default()
        });
        assert_eq!(total.nodes_created, 3);
        assert_eq!(total.relationships_created, 1);
        assert!(total.contains_updates());
    }
}
