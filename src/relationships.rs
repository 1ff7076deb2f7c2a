//! Graph relationship maintenance.
//!
//! Relationships are derived from stored entries and can be rebuilt at any
//! time. Every write is an upsert, so delivering the same entry twice leaves
//! the graph unchanged.
//!
//! Per tracked entry:
//!
//! - (Thread)-[HAS_MEMORY]->(entry), refreshing the thread's `last_active_at`
//! - (previous entry)-[FOLLOWED_BY]->(entry) when the thread already has one
//! - one type rule:
//!   - `summary`: `Summary` label, plus (entry)-[SUMMARIZES]->(each earlier non-summary entry)
//!   - `fact` / `context`: the matching label
//!   - `preference`: (Thread)-[HAS_PREFERENCE]->(entry)
//!   - anything else: the temporal edge only

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::RelationshipConfig;
use crate::error::Result;
use crate::memory::{MemoryEntry, MemoryId, MemoryType};
use crate::store::{
    AccessMode, Counters, GraphStatement, GraphStore, GraphTransaction, Metadata, NodeLabel,
    NodeRef, RelationKind,
};

/// Outcome of a semantic relationship pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipSummary {
    pub pairs_examined: usize,
    pub similar_pairs: usize,
    pub important_pairs: usize,
    /// Edges that did not exist before this pass
    pub relationships_created: u64,
}

/// Writes derived relationships into a [`GraphStore`].
#[derive(Clone)]
pub struct RelationshipBuilder {
    graph: Arc<dyn GraphStore>,
}

impl RelationshipBuilder {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self { graph }
    }

    pub fn is_available(&self) -> bool {
        self.graph.is_available()
    }

    /// Track one stored entry.
    pub async fn track(&self, entry: &MemoryEntry) -> Result<Counters> {
        self.track_batch(std::slice::from_ref(entry)).await
    }

    /// Track entries in order inside a single write transaction.
    pub async fn track_batch(&self, entries: &[MemoryEntry]) -> Result<Counters> {
        let mut tx = self.graph.begin(AccessMode::Write).await?;
        let mut counters = Counters::default();
        for entry in entries {
            // Dropping the transaction on error rolls it back
            counters.merge(&apply_rules(tx.as_mut(), entry).await?);
        }
        tx.commit().await?;
        debug!(
            entries = entries.len(),
            relationships_created = counters.relationships_created,
            "tracked entries in graph"
        );
        Ok(counters)
    }

    /// Remove entry nodes with their edges, then any thread left without edges.
    pub async fn remove(&self, ids: &[MemoryId]) -> Result<Counters> {
        if ids.is_empty() {
            return Ok(Counters::default());
        }
        let mut tx = self.graph.begin(AccessMode::Write).await?;
        let mut counters = tx
            .run(GraphStatement::DetachDelete {
                nodes: ids.iter().map(NodeRef::memory).collect(),
            })
            .await?
            .counters;
        counters.merge(&tx.run(GraphStatement::DeleteOrphanThreads).await?.counters);
        tx.commit().await?;
        debug!(
            removed = ids.len(),
            nodes_deleted = counters.nodes_deleted,
            "removed entries from graph"
        );
        Ok(counters)
    }

    /// Upsert SIMILAR_TO and IMPORTANT_WITH edges across `entries`.
    ///
    /// Pairs are linked from the lower id to the higher id so each pair maps
    /// to exactly one edge per kind.
    pub async fn build_semantic(
        &self,
        entries: &[MemoryEntry],
        config: &RelationshipConfig,
    ) -> Result<RelationshipSummary> {
        let mut summary = RelationshipSummary::default();
        let mut tx = self.graph.begin(AccessMode::Write).await?;

        for (i, a) in entries.iter().enumerate() {
            for b in &entries[i + 1..] {
                summary.pairs_examined += 1;
                let (from, to) = if a.id < b.id { (a, b) } else { (b, a) };

                let shared = a.shared_tags(b);
                if shared >= config.min_shared_tags {
                    let counters = tx
                        .run(GraphStatement::MergeEdge {
                            from: NodeRef::memory(from.id),
                            to: NodeRef::memory(to.id),
                            kind: RelationKind::SimilarTo,
                            properties: props([
                                ("weight", json!(jaccard(a, b))),
                                ("shared_tags", json!(shared)),
                            ]),
                        })
                        .await?
                        .counters;
                    summary.similar_pairs += 1;
                    summary.relationships_created += counters.relationships_created;
                }

                let threshold = config.importance_threshold;
                if a.thread_id == b.thread_id
                    && a.importance() >= threshold
                    && b.importance() >= threshold
                {
                    let counters = tx
                        .run(GraphStatement::MergeEdge {
                            from: NodeRef::memory(from.id),
                            to: NodeRef::memory(to.id),
                            kind: RelationKind::ImportantWith,
                            properties: props([(
                                "combined_importance",
                                json!((a.importance() + b.importance()) / 2.0),
                            )]),
                        })
                        .await?
                        .counters;
                    summary.important_pairs += 1;
                    summary.relationships_created += counters.relationships_created;
                }
            }
        }

        tx.commit().await?;
        debug!(?summary, "semantic relationships built");
        Ok(summary)
    }
}

async fn apply_rules(tx: &mut dyn GraphTransaction, entry: &MemoryEntry) -> Result<Counters> {
    let mut counters = Counters::default();
    let thread = NodeRef::thread(&entry.thread_id);
    let node = NodeRef::memory(entry.id);
    let id = entry.id.to_string();

    let mut run = Vec::new();
    run.push(GraphStatement::MergeNode {
        node: thread.clone(),
        thread_id: None,
        created_at: None,
        properties: props([("last_active_at", json!(entry.created_at.to_rfc3339()))]),
    });
    run.push(GraphStatement::MergeNode {
        node: node.clone(),
        thread_id: Some(entry.thread_id.clone()),
        created_at: Some(entry.created_at),
        properties: props([
            ("memory_type", json!(entry.memory_type().as_str())),
            ("importance", json!(entry.importance())),
            ("tags", json!(entry.metadata.tags)),
        ]),
    });
    run.push(GraphStatement::MergeEdge {
        from: thread.clone(),
        to: node.clone(),
        kind: RelationKind::HasMemory,
        properties: Metadata::new(),
    });
    for statement in run {
        counters.merge(&tx.run(statement).await?.counters);
    }

    let previous = tx
        .run(GraphStatement::LatestMemoryInThread {
            thread_id: entry.thread_id.clone(),
            before: entry.created_at,
            exclude: id.clone(),
        })
        .await?;
    if let Some(previous_id) = previous.first_str("id") {
        let statement = GraphStatement::MergeEdge {
            from: NodeRef::memory(previous_id),
            to: node.clone(),
            kind: RelationKind::FollowedBy,
            properties: Metadata::new(),
        };
        counters.merge(&tx.run(statement).await?.counters);
    }

    match entry.memory_type() {
        MemoryType::Summary => {
            counters.merge(
                &tx.run(GraphStatement::AddLabel {
                    node: node.clone(),
                    label: NodeLabel::Summary,
                })
                .await?
                .counters,
            );
            let sources = tx
                .run(GraphStatement::MemoriesInThread {
                    thread_id: entry.thread_id.clone(),
                    before: Some(entry.created_at),
                    without_label: Some(NodeLabel::Summary),
                })
                .await?
                .column_str("id");
            for source in sources.into_iter().filter(|s| *s != id) {
                let statement = GraphStatement::MergeEdge {
                    from: node.clone(),
                    to: NodeRef::memory(source),
                    kind: RelationKind::Summarizes,
                    properties: Metadata::new(),
                };
                counters.merge(&tx.run(statement).await?.counters);
            }
        }
        MemoryType::Fact | MemoryType::Context => {
            let label = if entry.memory_type() == MemoryType::Fact {
                NodeLabel::Fact
            } else {
                NodeLabel::Context
            };
            counters.merge(&tx.run(GraphStatement::AddLabel { node, label }).await?.counters);
        }
        MemoryType::Preference => {
            let statement = GraphStatement::MergeEdge {
                from: thread,
                to: node,
                kind: RelationKind::HasPreference,
                properties: Metadata::new(),
            };
            counters.merge(&tx.run(statement).await?.counters);
        }
        MemoryType::Conversation | MemoryType::Custom => {}
    }

    Ok(counters)
}

fn props<const N: usize>(pairs: [(&str, Value); N]) -> Metadata {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Tag-set Jaccard similarity.
fn jaccard(a: &MemoryEntry, b: &MemoryEntry) -> f64 {
    let left: HashSet<&String> = a.metadata.tags.iter().collect();
    let right: HashSet<&String> = b.metadata.tags.iter().collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}
