//! The memory orchestrator.
//!
//! [`MemoryOrchestrator`] is the single entry point workflows use. It writes
//! entries to the vector store, which is the system of record, and mirrors
//! them into the graph store as derived relationships.
//!
//! Failures are asymmetric:
//!
//! - vector calls go through `critical`: logged with context, then returned
//! - graph calls go through `best_effort`: logged with context, then dropped
//!
//! A write that reached the vector store therefore succeeds whatever the graph
//! does, and a graph that is absent altogether is simply skipped.
//!
//! ## Example
//!
//! ```rust,ignore
//! use recall_core::{MemoryOrchestrator, MemoryMetadata, MemoryType, SearchQuery};
//!
//! let memory = MemoryOrchestrator::builder()
//!     .vector(vector_store)
//!     .graph(graph_store)
//!     .build()?;
//!
//! memory.store("thread-1", "User prefers dark mode", MemoryMetadata::new(MemoryType::Preference)).await?;
//! let hits = memory.search(SearchQuery::new("theme").in_thread("thread-1")).await?;
//! ```

mod types;

pub use types::{
    CleanupReport, ConversationFlowStep, ContextOptions, ContextSearchResult, MemoryStats,
    RetrieveOptions, SearchQuery, SummarizeOptions, TopicCount, TypeCount, UserPatterns,
};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::adapters::GraphAdapter;
use crate::config::MemoryConfig;
use crate::error::{Error, ErrorContext, Result};
use crate::memory::{
    keys, select_for_eviction, MemoryEntry, MemoryId, MemoryMetadata, MemoryType, NewMemory,
};
use crate::relationships::{RelationshipBuilder, RelationshipSummary};
use crate::stats::{MetricsCollector, OperationKind};
use crate::store::{
    DeleteRequest, Document, GetRequest, GraphStore, Metadata, MetadataFilter, ProviderType,
    VectorQuery, VectorStore,
};
use crate::summarize::{ExtractiveSummarizer, Summarizer};

/// Importance given to summary entries unless overridden.
pub const SUMMARY_IMPORTANCE: f64 = 0.8;

/// Gap that splits a thread's activity into separate sessions.
const SESSION_GAP_MINUTES: i64 = 30;

/// Tag-similar connections listed per conversation flow step.
const FLOW_SIMILAR_LIMIT: usize = 2;

/// Builder for [`MemoryOrchestrator`].
#[derive(Default)]
pub struct MemoryOrchestratorBuilder {
    vector: Option<Arc<dyn VectorStore>>,
    graph: Option<Arc<dyn GraphStore>>,
    config: MemoryConfig,
    summarizer: Option<Arc<dyn Summarizer>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl MemoryOrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the vector store. Required.
    pub fn vector(mut self, vector: Arc<dyn VectorStore>) -> Self {
        self.vector = Some(vector);
        self
    }

    /// Set the graph store. Defaults to an unbound adapter.
    pub fn graph(mut self, graph: Arc<dyn GraphStore>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn config(mut self, config: MemoryConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the summarization strategy. Defaults to [`ExtractiveSummarizer`].
    pub fn summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Share a metrics collector. Defaults to a fresh one from the config.
    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<MemoryOrchestrator> {
        let vector = self.vector.ok_or_else(|| {
            Error::configuration("a vector store is required")
                .with_context(ErrorContext::operation("build_orchestrator"))
        })?;
        self.config.validate()?;

        let graph = self
            .graph
            .unwrap_or_else(|| Arc::new(GraphAdapter::unbound()));
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(MetricsCollector::new(self.config.metrics.clone())));

        Ok(MemoryOrchestrator {
            vector,
            relationships: RelationshipBuilder::new(graph),
            summarizer: self
                .summarizer
                .unwrap_or_else(|| Arc::new(ExtractiveSummarizer::default())),
            metrics,
            config: self.config,
            collection_ready: OnceCell::new(),
        })
    }
}

/// Façade over the vector store, graph relationships and metrics.
pub struct MemoryOrchestrator {
    vector: Arc<dyn VectorStore>,
    relationships: RelationshipBuilder,
    summarizer: Arc<dyn Summarizer>,
    metrics: Arc<MetricsCollector>,
    config: MemoryConfig,
    collection_ready: OnceCell<()>,
}

impl MemoryOrchestrator {
    pub fn builder() -> MemoryOrchestratorBuilder {
        MemoryOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn is_graph_available(&self) -> bool {
        self.relationships.is_available()
    }

    fn collection(&self) -> &str {
        self.config.collection()
    }

    // ==================== Write Operations ====================

    /// Store one entry.
    pub async fn store(
        &self,
        thread_id: &str,
        content: impl Into<String>,
        metadata: MemoryMetadata,
    ) -> Result<MemoryEntry> {
        let content = content.into();
        self.measured(OperationKind::Store, self.store_entry(thread_id, content, metadata))
            .await
    }

    /// Store entries with one vector write and one graph transaction.
    ///
    /// Entries come back in call order with strictly increasing creation
    /// times, so the thread's temporal chain follows the input order.
    pub async fn store_batch(
        &self,
        thread_id: &str,
        items: Vec<NewMemory>,
    ) -> Result<Vec<MemoryEntry>> {
        self.measured(OperationKind::StoreBatch, self.store_entries(thread_id, items))
            .await
    }

    /// Summarize a thread's non-summary entries into a new summary entry.
    pub async fn summarize(
        &self,
        thread_id: &str,
        options: SummarizeOptions,
    ) -> Result<MemoryEntry> {
        self.measured(OperationKind::Summarize, async {
            let context = ErrorContext::operation("summarize").with_thread(thread_id);
            let mut sources: Vec<MemoryEntry> = self
                .thread_entries(thread_id, &[], "summarize")
                .await?
                .into_iter()
                .filter(|e| e.memory_type() != MemoryType::Summary)
                .collect();
            if let Some(max) = options.max_entries {
                let skip = sources.len().saturating_sub(max);
                sources.drain(..skip);
            }
            if sources.is_empty() {
                return Err(Error::summarization("no entries to summarize").with_context(context));
            }

            let text = self
                .summarizer
                .summarize(&sources)
                .await
                .map_err(|e| e.with_context(context.clone().with_batch_size(sources.len())))?;

            let mut tags: Vec<String> = Vec::new();
            for tag in sources
                .iter()
                .flat_map(|e| e.metadata.tags.iter())
                .chain(options.tags.iter())
            {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
            let source_ids: Vec<String> = sources.iter().map(|e| e.id.to_string()).collect();
            let metadata = MemoryMetadata::new(MemoryType::Summary)
                .with_source("summarizer")
                .with_tags(tags)
                .with_importance(options.importance.unwrap_or(SUMMARY_IMPORTANCE))
                .with_extra("summarized_count", sources.len())
                .with_extra("summarized_ids", source_ids);

            self.store_entry(thread_id, text, metadata).await
        })
        .await
    }

    async fn store_entry(
        &self,
        thread_id: &str,
        content: String,
        metadata: MemoryMetadata,
    ) -> Result<MemoryEntry> {
        validate_thread(thread_id, "store")?;
        if content.trim().is_empty() {
            return Err(Error::memory("content must not be empty")
                .with_context(ErrorContext::operation("store").with_thread(thread_id)));
        }

        let entry = MemoryEntry::new(thread_id, content, metadata);
        let context = ErrorContext::operation("store")
            .with_thread(thread_id)
            .with_memory(entry.id);

        self.critical(context.clone(), self.write(vec![entry.to_document()]))
            .await?;
        self.best_effort(context, self.relationships.track(&entry))
            .await;

        debug!(
            thread_id,
            memory_id = %entry.id,
            memory_type = %entry.memory_type(),
            "stored memory"
        );
        Ok(entry)
    }

    async fn store_entries(
        &self,
        thread_id: &str,
        items: Vec<NewMemory>,
    ) -> Result<Vec<MemoryEntry>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let context = ErrorContext::operation("store_batch")
            .with_thread(thread_id)
            .with_batch_size(items.len());
        validate_thread(thread_id, "store_batch")?;
        if let Some(index) = items.iter().position(|m| m.content.trim().is_empty()) {
            return Err(Error::memory(format!("batch item {} has empty content", index))
                .with_context(context));
        }

        let base = Utc::now();
        let entries: Vec<MemoryEntry> = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                MemoryEntry::new(thread_id, item.content, item.metadata)
                    .with_embedding(item.embedding)
                    .with_created_at(base + Duration::microseconds(i as i64))
            })
            .collect();
        let documents = entries.iter().map(MemoryEntry::to_document).collect();

        self.critical(context.clone(), self.write(documents)).await?;
        self.best_effort(context, self.relationships.track_batch(&entries))
            .await;

        debug!(thread_id, count = entries.len(), "stored memory batch");
        Ok(entries)
    }

    // ==================== Read Operations ====================

    /// Entries of a thread in creation order.
    pub async fn retrieve(
        &self,
        thread_id: &str,
        options: RetrieveOptions,
    ) -> Result<Vec<MemoryEntry>> {
        self.measured(OperationKind::Retrieve, async {
            let mut entries = self
                .thread_entries(thread_id, &options.memory_types, "retrieve")
                .await?;
            if let Some(limit) = options.limit {
                let skip = entries.len().saturating_sub(limit);
                entries.drain(..skip);
            }
            self.track_access(&mut entries).await;
            Ok(entries)
        })
        .await
    }

    /// Similarity search. Reads the vector store only.
    pub async fn search(&self, query: SearchQuery) -> Result<Vec<MemoryEntry>> {
        self.measured(OperationKind::Search, async {
            let mut results = self.find(&query).await?;
            self.track_access(&mut results).await;
            Ok(results)
        })
        .await
    }

    /// Search plus a confidence score and, for a known user, their patterns.
    pub async fn search_for_context(
        &self,
        query: impl Into<String>,
        options: ContextOptions,
    ) -> Result<ContextSearchResult> {
        let query = SearchQuery {
            query: query.into(),
            thread_id: options.thread_id.clone(),
            limit: options.limit,
            min_relevance: options.min_relevance,
            ..SearchQuery::default()
        };

        self.measured(OperationKind::SearchForContext, async {
            let mut memories = self.find(&query).await?;
            let confidence = memories
                .iter()
                .filter_map(|m| m.relevance_score)
                .fold(0.0_f64, f64::max)
                .clamp(0.0, 1.0);
            let user_patterns = match options.user_id {
                Some(ref user_id) => Some(self.patterns_for(user_id).await?),
                None => None,
            };
            self.track_access(&mut memories).await;

            Ok(ContextSearchResult {
                memories,
                confidence,
                user_patterns,
            })
        })
        .await
    }

    /// Aggregate a user's entries. Read-only.
    pub async fn get_user_patterns(&self, user_id: &str) -> Result<UserPatterns> {
        self.measured(OperationKind::UserPatterns, self.patterns_for(user_id))
            .await
    }

    /// A thread's entries with their neighbours and tag-similar entries.
    pub async fn get_conversation_flow(
        &self,
        thread_id: &str,
    ) -> Result<Vec<ConversationFlowStep>> {
        self.measured(OperationKind::ConversationFlow, async {
            let entries = self
                .thread_entries(thread_id, &[], "conversation_flow")
                .await?;
            Ok(build_flow(entries))
        })
        .await
    }

    async fn find(&self, query: &SearchQuery) -> Result<Vec<MemoryEntry>> {
        let mut filter = query
            .thread_id
            .as_deref()
            .map(|t| MetadataFilter::eq(keys::THREAD_ID, t));
        filter = MetadataFilter::combine(filter, types_filter(&query.memory_types));
        for tag in &query.tags {
            filter = MetadataFilter::combine(
                filter,
                Some(MetadataFilter::contains(keys::TAGS, tag.as_str())),
            );
        }
        if let Some(ref user_id) = query.user_id {
            filter = MetadataFilter::combine(
                filter,
                Some(MetadataFilter::eq(keys::USER_ID, user_id.as_str())),
            );
        }

        let limit = query.limit.unwrap_or(self.config.search.default_limit);
        let min_relevance = query
            .min_relevance
            .unwrap_or(self.config.search.min_relevance);

        let mut context =
            ErrorContext::operation("search").with_metadata("query", query.query.as_str());
        if let Some(ref thread_id) = query.thread_id {
            context = context.with_thread(thread_id.as_str());
        }
        if let Some(ref user_id) = query.user_id {
            context = context.with_user(user_id.as_str());
        }

        let request = VectorQuery::text(query.query.as_str(), limit).with_filter(filter);
        let hits = self
            .critical(context, async {
                self.ensure_collection().await?;
                self.vector.query(self.collection(), request).await
            })
            .await?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let relevance = hit.relevance();
            if relevance < min_relevance {
                continue;
            }
            let mut entry = MemoryEntry::from_document(hit.document)?;
            entry.relevance_score = Some(relevance);
            results.push(entry);
        }
        debug!(query = %query.query, hits = results.len(), "search complete");
        Ok(results)
    }

    async fn patterns_for(&self, user_id: &str) -> Result<UserPatterns> {
        let entries = self
            .load(
                Some(MetadataFilter::eq(keys::USER_ID, user_id)),
                ErrorContext::operation("user_patterns").with_user(user_id),
            )
            .await?;
        Ok(aggregate_patterns(user_id, &entries))
    }

    // ==================== Delete Operations ====================

    /// Delete entries of a thread. Ids from other threads are ignored.
    pub async fn delete(&self, thread_id: &str, ids: &[MemoryId]) -> Result<usize> {
        self.measured(OperationKind::Delete, async {
            validate_thread(thread_id, "delete")?;
            if ids.is_empty() {
                return Ok(0);
            }
            let context = ErrorContext::operation("delete").with_thread(thread_id);
            let request = GetRequest::ids(ids.iter().map(ToString::to_string).collect())
                .with_filter(MetadataFilter::eq(keys::THREAD_ID, thread_id));
            let owned = self.critical(context.clone(), self.fetch(request)).await?;
            self.remove(document_ids(&owned)?, context).await
        })
        .await
    }

    /// Delete every entry of a thread, or of all threads.
    pub async fn clear(&self, thread_id: Option<&str>) -> Result<usize> {
        self.measured(OperationKind::Clear, async {
            let mut context = ErrorContext::operation("clear");
            let mut request = GetRequest::all();
            if let Some(thread_id) = thread_id {
                validate_thread(thread_id, "clear")?;
                context = context.with_thread(thread_id);
                request = request.with_filter(MetadataFilter::eq(keys::THREAD_ID, thread_id));
            }
            let documents = self.critical(context.clone(), self.fetch(request)).await?;
            let removed = self.remove(document_ids(&documents)?, context).await?;
            info!(thread_id = thread_id.unwrap_or("*"), removed, "cleared memories");
            Ok(removed)
        })
        .await
    }

    /// Vector delete, then best-effort graph cascade and orphan pruning.
    async fn remove(&self, ids: Vec<MemoryId>, context: ErrorContext) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let context = context.with_batch_size(ids.len());
        let request = DeleteRequest::ids(ids.iter().map(ToString::to_string).collect());
        let removed = self
            .critical(context.clone(), async {
                self.ensure_collection().await?;
                self.vector.delete(self.collection(), request).await
            })
            .await?;
        self.best_effort(context, self.relationships.remove(&ids))
            .await;
        Ok(removed)
    }

    // ==================== Maintenance ====================

    /// Totals from the vector store plus a metrics snapshot.
    ///
    /// The snapshot is taken while this call is still in flight, so it
    /// counts earlier `get_stats` calls but not the current one.
    pub async fn get_stats(&self) -> Result<MemoryStats> {
        self.measured(OperationKind::GetStats, async {
            let entries = self
                .load(None, ErrorContext::operation("get_stats"))
                .await?;

            let mut by_type: HashMap<MemoryType, usize> = HashMap::new();
            let mut threads: HashSet<&str> = HashSet::new();
            for entry in &entries {
                *by_type.entry(entry.memory_type()).or_insert(0) += 1;
                threads.insert(entry.thread_id.as_str());
            }
            let metrics = self.metrics.snapshot().await;

            Ok(MemoryStats {
                total_memories: entries.len(),
                by_type,
                thread_count: threads.len(),
                graph_available: self.relationships.is_available(),
                health: metrics.health,
                metrics,
            })
        })
        .await
    }

    /// Apply the retention policy and delete what it selects.
    pub async fn cleanup(&self) -> Result<CleanupReport> {
        self.measured(OperationKind::Cleanup, async {
            let entries = self
                .load(None, ErrorContext::operation("cleanup"))
                .await?;
            let policy = &self.config.retention;
            let selected = select_for_eviction(&entries, policy, Utc::now());

            let thread_of: HashMap<MemoryId, &str> = entries
                .iter()
                .map(|e| (e.id, e.thread_id.as_str()))
                .collect();
            let mut by_thread: BTreeMap<&str, Vec<MemoryId>> = BTreeMap::new();
            for id in &selected {
                if let Some(thread_id) = thread_of.get(id) {
                    by_thread.entry(*thread_id).or_default().push(*id);
                }
            }

            let mut evicted = 0;
            for (thread_id, ids) in &by_thread {
                let context = ErrorContext::operation("cleanup").with_thread(*thread_id);
                evicted += self.remove(ids.clone(), context).await?;
            }

            info!(
                examined = entries.len(),
                evicted,
                threads = by_thread.len(),
                "retention cleanup complete"
            );
            Ok(CleanupReport {
                strategy: policy.strategy.clone(),
                examined: entries.len(),
                evicted,
                evicted_ids: selected,
                threads_affected: by_thread.len(),
            })
        })
        .await
    }

    /// Upsert SIMILAR_TO and IMPORTANT_WITH edges over every entry.
    ///
    /// Skipped when the graph is unavailable; graph failures yield an empty
    /// summary.
    pub async fn build_semantic_relationships(&self) -> Result<RelationshipSummary> {
        self.measured(OperationKind::BuildRelationships, async {
            if !self.relationships.is_available() {
                debug!("graph backend unavailable, skipping semantic relationships");
                return Ok(RelationshipSummary::default());
            }
            let context = ErrorContext::operation("build_semantic_relationships");
            let entries = self.load(None, context.clone()).await?;
            let summary = self
                .best_effort(
                    context.with_batch_size(entries.len()),
                    self.relationships
                        .build_semantic(&entries, &self.config.relationships),
                )
                .await
                .unwrap_or_default();
            Ok(summary)
        })
        .await
    }

    // ==================== Plumbing ====================

    /// Run a vector-store call. Failures are logged and returned.
    async fn critical<T>(
        &self,
        context: ErrorContext,
        operation: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        operation.await.map_err(|e| {
            let e = e.with_context(context.with_provider(ProviderType::Vector));
            error!(error = %e, "vector operation failed");
            e
        })
    }

    /// Run a graph call. Failures are logged and dropped; an unavailable
    /// graph is skipped without polling `operation`.
    async fn best_effort<T>(
        &self,
        context: ErrorContext,
        operation: impl Future<Output = Result<T>>,
    ) -> Option<T> {
        if !self.relationships.is_available() {
            debug!(context = %context, "graph backend unavailable, skipping");
            return None;
        }
        match operation.await {
            Ok(value) => Some(value),
            Err(e) => {
                let e = e.with_context(context.with_provider(ProviderType::Graph));
                warn!(error = %e, "graph operation failed, continuing without it");
                None
            }
        }
    }

    /// Bracket an operation with metrics.
    async fn measured<T>(
        &self,
        kind: OperationKind,
        operation: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let id = self.metrics.start(kind).await;
        let result = operation.await;
        let mut metadata = Metadata::new();
        if let Err(ref e) = result {
            metadata.insert("error".into(), json!(e.to_string()));
        }
        self.metrics.finish(id, result.is_ok(), metadata).await;
        result
    }

    async fn ensure_collection(&self) -> Result<()> {
        self.collection_ready
            .get_or_try_init(|| async {
                self.vector
                    .get_or_create_collection(self.collection(), Metadata::new())
                    .await
                    .map(|info| debug!(collection = %info.name, "collection ready"))
            })
            .await
            .map(|_| ())
    }

    async fn write(&self, documents: Vec<Document>) -> Result<()> {
        self.ensure_collection().await?;
        self.vector.add(self.collection(), documents).await
    }

    async fn fetch(&self, request: GetRequest) -> Result<Vec<Document>> {
        self.ensure_collection().await?;
        self.vector.get(self.collection(), request).await
    }

    /// Decoded entries in creation order.
    async fn load(
        &self,
        filter: Option<MetadataFilter>,
        context: ErrorContext,
    ) -> Result<Vec<MemoryEntry>> {
        let request = match filter {
            Some(filter) => GetRequest::filter(filter),
            None => GetRequest::all(),
        };
        let documents = self.critical(context.clone(), self.fetch(request)).await?;
        let mut entries = documents
            .into_iter()
            .map(MemoryEntry::from_document)
            .collect::<Result<Vec<_>>>()
            .map_err(|e| e.with_context(context))?;
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(entries)
    }

    async fn thread_entries(
        &self,
        thread_id: &str,
        types: &[MemoryType],
        operation: &str,
    ) -> Result<Vec<MemoryEntry>> {
        validate_thread(thread_id, operation)?;
        let filter = MetadataFilter::combine(
            Some(MetadataFilter::eq(keys::THREAD_ID, thread_id)),
            types_filter(types),
        );
        self.load(filter, ErrorContext::operation(operation).with_thread(thread_id))
            .await
    }

    /// Bump access bookkeeping. A failed write is logged, never returned.
    async fn track_access(&self, entries: &mut [MemoryEntry]) {
        if !self.config.search.track_access || entries.is_empty() {
            return;
        }
        let now = Utc::now();
        for entry in entries.iter_mut() {
            entry.record_access(now);
        }
        let documents = entries.iter().map(MemoryEntry::to_document).collect();
        if let Err(e) = self.vector.update(self.collection(), documents).await {
            warn!(error = %e, count = entries.len(), "failed to record memory access");
        }
    }
}

fn validate_thread(thread_id: &str, operation: &str) -> Result<()> {
    if thread_id.trim().is_empty() {
        return Err(Error::memory("thread_id must not be empty")
            .with_context(ErrorContext::operation(operation)));
    }
    Ok(())
}

fn types_filter(types: &[MemoryType]) -> Option<MetadataFilter> {
    if types.is_empty() {
        return None;
    }
    let values: Vec<Value> = types.iter().map(|t| json!(t.as_str())).collect();
    Some(MetadataFilter::one_of(keys::MEMORY_TYPE, values))
}

fn document_ids(documents: &[Document]) -> Result<Vec<MemoryId>> {
    documents.iter().map(|d| MemoryId::parse(&d.id)).collect()
}

fn aggregate_patterns(user_id: &str, entries: &[MemoryEntry]) -> UserPatterns {
    let mut topic_counts: HashMap<&str, usize> = HashMap::new();
    let mut type_counts: HashMap<MemoryType, usize> = HashMap::new();
    let mut by_thread: BTreeMap<&str, Vec<&MemoryEntry>> = BTreeMap::new();

    for entry in entries {
        for tag in &entry.metadata.tags {
            *topic_counts.entry(tag.as_str()).or_insert(0) += 1;
        }
        *type_counts.entry(entry.memory_type()).or_insert(0) += 1;
        by_thread.entry(entry.thread_id.as_str()).or_default().push(entry);
    }

    let mut topics: Vec<TopicCount> = topic_counts
        .into_iter()
        .map(|(topic, count)| TopicCount {
            topic: topic.to_string(),
            count,
        })
        .collect();
    topics.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.topic.cmp(&b.topic)));

    let mut preferred_types: Vec<TypeCount> = MemoryType::ALL
        .iter()
        .filter_map(|t| {
            type_counts.get(t).map(|&count| TypeCount {
                memory_type: *t,
                count,
            })
        })
        .collect();
    preferred_types.sort_by(|a, b| b.count.cmp(&a.count));

    let gap = Duration::minutes(SESSION_GAP_MINUTES);
    let estimated_sessions = by_thread
        .values_mut()
        .map(|thread| {
            thread.sort_by_key(|e| e.created_at);
            1 + thread
                .windows(2)
                .filter(|pair| pair[1].created_at - pair[0].created_at > gap)
                .count()
        })
        .sum();

    UserPatterns {
        user_id: user_id.to_string(),
        total_memories: entries.len(),
        topics,
        preferred_types,
        estimated_sessions,
        first_seen: entries.iter().map(|e| e.created_at).min(),
        last_seen: entries.iter().map(|e| e.created_at).max(),
    }
}

fn build_flow(entries: Vec<MemoryEntry>) -> Vec<ConversationFlowStep> {
    let ids: Vec<MemoryId> = entries.iter().map(|e| e.id).collect();
    let similar: Vec<Vec<MemoryId>> = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let mut candidates: Vec<(usize, usize)> = entries
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(j, other)| (entry.shared_tags(other), j))
                .filter(|(shared, _)| *shared > 0)
                .collect();
            // Most shared tags first; nearer entries win ties
            candidates.sort_by(|a, b| {
                b.0.cmp(&a.0)
                    .then_with(|| i.abs_diff(a.1).cmp(&i.abs_diff(b.1)))
            });
            candidates
                .into_iter()
                .take(FLOW_SIMILAR_LIMIT)
                .map(|(_, j)| ids[j])
                .collect()
        })
        .collect();

    entries
        .into_iter()
        .zip(similar)
        .enumerate()
        .map(|(i, (entry, similar))| ConversationFlowStep {
            entry,
            previous: i.checked_sub(1).map(|p| ids[p]),
            next: ids.get(i + 1).copied(),
            similar,
        })
        .collect()
}

#[cfg(test)]
mod tests;
