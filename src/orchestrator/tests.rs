use super::*;
use crate::adapters::VectorAdapter;
use crate::engine::{SqliteGraphEngine, SqliteVectorEngine};
use crate::memory::RetentionPolicy;
use crate::store::{GraphStatement, NodeRef, RelationKind};
use pretty_assertions::assert_eq;

struct Harness {
    memory: MemoryOrchestrator,
    graph: Arc<dyn GraphStore>,
}

fn harness_with(config: MemoryConfig, with_graph: bool) -> Harness {
    let vector: Arc<dyn VectorStore> =
        Arc::new(VectorAdapter::bound(SqliteVectorEngine::in_memory().unwrap()));
    let graph: Arc<dyn GraphStore> = if with_graph {
        Arc::new(GraphAdapter::bound(SqliteGraphEngine::in_memory().unwrap()))
    } else {
        Arc::new(GraphAdapter::unbound())
    };
    let memory = MemoryOrchestrator::builder()
        .vector(vector)
        .graph(Arc::clone(&graph))
        .config(config)
        .build()
        .unwrap();
    Harness { memory, graph }
}

fn harness() -> Harness {
    harness_with(MemoryConfig::default(), true)
}

fn tagged(memory_type: MemoryType, tags: &[&str]) -> MemoryMetadata {
    MemoryMetadata::new(memory_type).with_tags(tags.iter().copied())
}

#[tokio::test]
async fn test_builder_requires_vector_store() {
    let err = MemoryOrchestrator::builder().build().err().unwrap();
    assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
}

#[tokio::test]
async fn test_store_and_retrieve_in_creation_order() {
    let h = harness();
    let first = h
        .memory
        .store("t1", "hello", MemoryMetadata::default())
        .await
        .unwrap();
    let second = h
        .memory
        .store("t1", "world", MemoryMetadata::new(MemoryType::Fact))
        .await
        .unwrap();
    h.memory
        .store("t2", "elsewhere", MemoryMetadata::default())
        .await
        .unwrap();

    let entries = h
        .memory
        .retrieve("t1", RetrieveOptions::default())
        .await
        .unwrap();
    let ids: Vec<MemoryId> = entries.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);
    assert!(entries.iter().all(|e| e.access_count == 1));

    let facts = h
        .memory
        .retrieve("t1", RetrieveOptions::default().with_types([MemoryType::Fact]))
        .await
        .unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].content, "world");

    let latest = h
        .memory
        .retrieve("t1", RetrieveOptions::default().with_limit(1))
        .await
        .unwrap();
    assert_eq!(latest[0].id, second.id);
    assert_eq!(latest[0].access_count, 3);
}

#[tokio::test]
async fn test_store_rejects_blank_input() {
    let h = harness();
    assert!(h.memory.store("", "x", MemoryMetadata::default()).await.is_err());
    assert!(h.memory.store("t1", "  ", MemoryMetadata::default()).await.is_err());
    assert!(h
        .memory
        .store_batch("t1", vec![NewMemory::new("ok"), NewMemory::new("")])
        .await
        .is_err());
    assert_eq!(
        h.memory
            .retrieve("t1", RetrieveOptions::default())
            .await
            .unwrap()
            .len(),
        0
    );
}

#[tokio::test]
async fn test_store_links_temporal_chain() {
    let h = harness();
    let hello = h
        .memory
        .store("t1", "hello", MemoryMetadata::default())
        .await
        .unwrap();
    let world = h
        .memory
        .store("t1", "world", MemoryMetadata::default())
        .await
        .unwrap();

    let followed = h
        .graph
        .run(GraphStatement::Edges {
            node: Some(NodeRef::memory(hello.id)),
            kind: Some(RelationKind::FollowedBy),
        })
        .await
        .unwrap();
    assert_eq!(followed.column_str("to_id"), vec![world.id.to_string()]);

    let thread_edges = h
        .graph
        .run(GraphStatement::Edges {
            node: Some(NodeRef::thread("t1")),
            kind: Some(RelationKind::HasMemory),
        })
        .await
        .unwrap();
    assert_eq!(thread_edges.records.len(), 2);
}

#[tokio::test]
async fn test_store_batch_preserves_order() {
    let h = harness();
    let items = vec![
        NewMemory::new("one"),
        NewMemory::new("two"),
        NewMemory::new("three").with_metadata(MemoryMetadata::new(MemoryType::Context)),
    ];
    let stored = h.memory.store_batch("t1", items).await.unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.windows(2).all(|w| w[0].created_at < w[1].created_at));

    let contents: Vec<String> = h
        .memory
        .retrieve("t1", RetrieveOptions::default())
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.content)
        .collect();
    assert_eq!(contents, vec!["one", "two", "three"]);

    let chain = h
        .graph
        .run(GraphStatement::CountEdges {
            kind: Some(RelationKind::FollowedBy),
        })
        .await
        .unwrap();
    assert_eq!(chain.records[0]["count"], json!(2));

    assert!(h.memory.store_batch("t1", Vec::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_wrong_dimension_batch_is_rejected() {
    let h = harness();
    h.memory
        .store("t1", "rust async runtime", MemoryMetadata::default())
        .await
        .unwrap();

    let err = h
        .memory
        .store_batch(
            "t1",
            vec![NewMemory::new("bad dim").with_embedding(vec![1.0, 0.0, 0.0])],
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::Embedding);

    for _ in 0..2 {
        let hits = h.memory.search(SearchQuery::new("rust")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "rust async runtime");
    }
    assert_eq!(h.memory.get_stats().await.unwrap().total_memories, 1);
}

#[tokio::test]
async fn test_search_filters_and_scores() {
    let h = harness();
    h.memory
        .store(
            "t1",
            "rust async runtime tokio",
            tagged(MemoryType::Fact, &["rust"]).with_user("u1"),
        )
        .await
        .unwrap();
    h.memory
        .store("t1", "python web framework", tagged(MemoryType::Fact, &["python"]))
        .await
        .unwrap();
    h.memory
        .store("t2", "rust borrow checker", tagged(MemoryType::Conversation, &["rust"]))
        .await
        .unwrap();

    let hits = h
        .memory
        .search(SearchQuery::new("rust async").with_tags(["rust"]))
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].content, "rust async runtime tokio");
    assert!(hits
        .iter()
        .all(|h| (0.0..=1.0).contains(&h.relevance_score.unwrap())));

    let scoped = h
        .memory
        .search(SearchQuery::new("rust").in_thread("t2"))
        .await
        .unwrap();
    assert_eq!(scoped.len(), 1);

    let by_user = h
        .memory
        .search(SearchQuery::new("rust").for_user("u1"))
        .await
        .unwrap();
    assert_eq!(by_user.len(), 1);

    let strict = h
        .memory
        .search(SearchQuery::new("rust async").with_min_relevance(1.0))
        .await
        .unwrap();
    assert!(strict.len() <= 1);
}

#[tokio::test]
async fn test_search_for_context_confidence_and_patterns() {
    let h = harness();
    h.memory
        .store(
            "t1",
            "deploy pipeline uses github actions",
            tagged(MemoryType::Fact, &["ci", "deploy"]).with_user("u1"),
        )
        .await
        .unwrap();
    h.memory
        .store(
            "t2",
            "prefers small pull requests",
            tagged(MemoryType::Preference, &["ci"]).with_user("u1"),
        )
        .await
        .unwrap();

    let result = h
        .memory
        .search_for_context(
            "deploy pipeline",
            ContextOptions {
                user_id: Some("u1".into()),
                ..ContextOptions::default()
            },
        )
        .await
        .unwrap();
    assert!(result.confidence > 0.0 && result.confidence <= 1.0);
    let patterns = result.user_patterns.unwrap();
    assert_eq!(patterns.total_memories, 2);
    assert_eq!(patterns.topics[0].topic, "ci");
    assert_eq!(patterns.topics[0].count, 2);
    assert_eq!(patterns.estimated_sessions, 2);

    let empty = h
        .memory
        .search_for_context("anything", ContextOptions {
            thread_id: Some("nope".into()),
            ..ContextOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(empty.confidence, 0.0);
    assert!(empty.user_patterns.is_none());
}

#[tokio::test]
async fn test_summarize_creates_summary_entry() {
    let h = harness();
    h.memory
        .store("t1", "We picked Postgres.", tagged(MemoryType::Fact, &["db"]))
        .await
        .unwrap();
    h.memory
        .store("t1", "Deploys run nightly.", tagged(MemoryType::Conversation, &["ops"]))
        .await
        .unwrap();

    let summary = h
        .memory
        .summarize("t1", SummarizeOptions::default())
        .await
        .unwrap();
    assert_eq!(summary.memory_type(), MemoryType::Summary);
    assert_eq!(summary.importance(), SUMMARY_IMPORTANCE);
    assert_eq!(summary.metadata.tags, vec!["db".to_string(), "ops".to_string()]);
    assert_eq!(summary.metadata.extra["summarized_count"], json!(2));

    let summarizes = h
        .graph
        .run(GraphStatement::CountEdges {
            kind: Some(RelationKind::Summarizes),
        })
        .await
        .unwrap();
    assert_eq!(summarizes.records[0]["count"], json!(2));

    let err = h
        .memory
        .summarize("empty", SummarizeOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::Summarization);
}

#[tokio::test]
async fn test_delete_only_touches_thread() {
    let h = harness();
    let keep = h
        .memory
        .store("t1", "keep", MemoryMetadata::default())
        .await
        .unwrap();
    let gone = h
        .memory
        .store("t1", "gone", MemoryMetadata::default())
        .await
        .unwrap();
    let other = h
        .memory
        .store("t2", "other thread", MemoryMetadata::default())
        .await
        .unwrap();

    let removed = h.memory.delete("t1", &[gone.id, other.id]).await.unwrap();
    assert_eq!(removed, 1);

    let remaining: Vec<MemoryId> = h
        .memory
        .retrieve("t1", RetrieveOptions::default())
        .await
        .unwrap()
        .iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(remaining, vec![keep.id]);
    assert_eq!(
        h.memory
            .retrieve("t2", RetrieveOptions::default())
            .await
            .unwrap()
            .len(),
        1
    );

    let node = h
        .graph
        .run(GraphStatement::GetNode {
            node: NodeRef::memory(gone.id),
        })
        .await
        .unwrap();
    assert!(node.records.is_empty());
}

#[tokio::test]
async fn test_clear_removes_orphan_threads() {
    let h = harness();
    h.memory
        .store("t1", "a", MemoryMetadata::default())
        .await
        .unwrap();
    h.memory
        .store("t2", "b", MemoryMetadata::default())
        .await
        .unwrap();

    assert_eq!(h.memory.clear(Some("t1")).await.unwrap(), 1);
    let thread = h
        .graph
        .run(GraphStatement::GetNode {
            node: NodeRef::thread("t1"),
        })
        .await
        .unwrap();
    assert!(thread.records.is_empty());

    assert_eq!(h.memory.clear(None).await.unwrap(), 1);
    assert_eq!(h.memory.get_stats().await.unwrap().total_memories, 0);
}

#[tokio::test]
async fn test_cleanup_keeps_most_important() {
    let config = MemoryConfig {
        retention: RetentionPolicy::keep_top(1),
        ..MemoryConfig::default()
    };
    let h = harness_with(config, true);
    for importance in [0.2, 0.9, 0.5] {
        h.memory
            .store(
                "t1",
                format!("importance {}", importance),
                MemoryMetadata::default().with_importance(importance),
            )
            .await
            .unwrap();
    }

    let report = h.memory.cleanup().await.unwrap();
    assert_eq!(report.examined, 3);
    assert_eq!(report.evicted, 2);
    assert_eq!(report.threads_affected, 1);

    let remaining = h
        .memory
        .retrieve("t1", RetrieveOptions::default())
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].importance(), 0.9);
}

#[tokio::test]
async fn test_build_semantic_relationships() {
    let h = harness();
    h.memory
        .store("t1", "a", tagged(MemoryType::Fact, &["rust"]))
        .await
        .unwrap();
    h.memory
        .store("t1", "b", tagged(MemoryType::Fact, &["rust", "tokio"]))
        .await
        .unwrap();

    let first = h.memory.build_semantic_relationships().await.unwrap();
    assert_eq!(first.similar_pairs, 1);
    assert_eq!(first.relationships_created, 1);
    let second = h.memory.build_semantic_relationships().await.unwrap();
    assert_eq!(second.relationships_created, 0);

    let without_graph = harness_with(MemoryConfig::default(), false);
    let skipped = without_graph
        .memory
        .build_semantic_relationships()
        .await
        .unwrap();
    assert_eq!(skipped, RelationshipSummary::default());
}

#[tokio::test]
async fn test_conversation_flow() {
    let h = harness();
    let a = h
        .memory
        .store("t1", "a", tagged(MemoryType::Conversation, &["x"]))
        .await
        .unwrap();
    let b = h
        .memory
        .store("t1", "b", tagged(MemoryType::Conversation, &["y"]))
        .await
        .unwrap();
    let c = h
        .memory
        .store("t1", "c", tagged(MemoryType::Conversation, &["x", "y"]))
        .await
        .unwrap();

    let flow = h.memory.get_conversation_flow("t1").await.unwrap();
    assert_eq!(flow.len(), 3);
    assert_eq!(flow[0].previous, None);
    assert_eq!(flow[0].next, Some(b.id));
    assert_eq!(flow[1].previous, Some(a.id));
    assert_eq!(flow[2].next, None);
    assert_eq!(flow[0].similar, vec![c.id]);
    assert_eq!(flow[2].similar, vec![b.id, a.id]);
}

#[tokio::test]
async fn test_stats_and_metrics() {
    let h = harness_with(MemoryConfig::default(), false);
    h.memory
        .store("t1", "a", MemoryMetadata::new(MemoryType::Fact))
        .await
        .unwrap();
    h.memory
        .store("t2", "b", MemoryMetadata::default())
        .await
        .unwrap();
    let _ = h.memory.store("", "bad", MemoryMetadata::default()).await;

    let stats = h.memory.get_stats().await.unwrap();
    assert_eq!(stats.total_memories, 2);
    assert_eq!(stats.thread_count, 2);
    assert_eq!(stats.by_type[&MemoryType::Fact], 1);
    assert!(!stats.graph_available);

    let store_stats = &stats.metrics.operations[&OperationKind::Store];
    assert_eq!(store_stats.count, 3);
    assert_eq!(store_stats.error_count, 1);
    assert!(!stats.metrics.operations.contains_key(&OperationKind::GetStats));

    let again = h.memory.get_stats().await.unwrap();
    let stats_calls = &again.metrics.operations[&OperationKind::GetStats];
    assert_eq!(stats_calls.count, 1);
    assert_eq!(stats_calls.error_count, 0);
}

#[test]
fn test_aggregate_patterns_splits_sessions_on_gaps() {
    let now = Utc::now();
    let at = |minutes: i64, tags: &[&str]| {
        MemoryEntry::new("t1", "x", tagged(MemoryType::Fact, tags))
            .with_created_at(now + Duration::minutes(minutes))
    };
    let entries = vec![at(0, &["a"]), at(10, &["a", "b"]), at(120, &["b"]), at(125, &["b"])];

    let patterns = aggregate_patterns("u1", &entries);
    assert_eq!(patterns.estimated_sessions, 2);
    assert_eq!(patterns.topics[0].topic, "b");
    assert_eq!(patterns.topics[0].count, 3);
    assert_eq!(patterns.preferred_types[0].memory_type, MemoryType::Fact);
    assert_eq!(patterns.first_seen, Some(entries[0].created_at));
    assert_eq!(patterns.last_seen, Some(entries[3].created_at));
}
