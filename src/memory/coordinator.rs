//! Store and query workflows across the structured, vector and graph tiers.
//!
//! The structured store is authoritative: a write fails only if embedding or
//! the structured insert fails. Vector indexing and the graph write run
//! concurrently afterwards and are reported per store as [`WriteStatus`], so a
//! degraded secondary store never loses the memory.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::concepts::extract_concepts;
use super::stats::StoreStats;
use super::tools::{ToolMatch, ToolRegistry};
use super::types::{
    now_timestamp, GraphEdge, Memory, MemoryId, Metadata, Neighbor, NewTool, NodeLabel, NodeRef,
    OperationalMode, RegisteredTool, RelType, Subgraph, ToolId, VectorHit, VectorPayload,
    VectorRecord, WriteStatus,
};
use super::{map_storage, with_timeout};
use crate::cache::{CacheKind, CacheLayer, CacheStats};
use crate::config::{MemosConfig, TimeoutConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{MemosError, Result};
use crate::store::{GraphStore, MemoryStore, ToolStore, VectorStore};

/// Deepest neighbourhood [`MemoryCoordinator::subgraph`] will expand.
pub const MAX_SUBGRAPH_DEPTH: u32 = 5;

/// Longest path [`MemoryCoordinator::shortest_path`] will search for.
pub const MAX_PATH_DEPTH: u32 = 10;

/// The four adapters the coordinator fans out to.
#[derive(Clone)]
pub struct Stores {
    pub memories: Arc<dyn MemoryStore>,
    pub tools: Arc<dyn ToolStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub graph: Arc<dyn GraphStore>,
}

/// Per-step deadlines for one request.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub embedding: Duration,
    pub structured: Duration,
    pub vector: Duration,
    pub graph: Duration,
}

impl Timeouts {
    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self {
            embedding: Duration::from_millis(config.embedding_ms),
            structured: Duration::from_millis(config.structured_ms),
            vector: Duration::from_millis(config.vector_ms),
            graph: Duration::from_millis(config.graph_ms),
        }
    }

    pub fn uniform(limit: Duration) -> Self {
        Self {
            embedding: limit,
            structured: limit,
            vector: limit,
            graph: limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMemoryResponse {
    pub memory_id: MemoryId,
    pub point_id: Option<String>,
    pub embedding_status: WriteStatus,
    pub graph_status: WriteStatus,
    pub concepts: Vec<String>,
    pub operational_mode: OperationalMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHit {
    pub id: MemoryId,
    pub content: String,
    pub metadata: Metadata,
    pub score: f32,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSummary {
    pub id: ToolId,
    pub name: String,
    pub description: String,
}

impl From<ToolMatch> for ToolSummary {
    fn from(m: ToolMatch) -> Self {
        Self {
            id: m.tool.id,
            name: m.tool.name,
            description: m.tool.description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMemoryResponse {
    pub memories: Vec<MemoryHit>,
    pub tools: Vec<ToolSummary>,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierStoreResponse {
    pub tier: u8,
    pub memory_id: Option<MemoryId>,
    /// Cache key (tier 1), memory id (tier 2) or graph node key (tier 3).
    pub key: String,
    pub embedding_status: WriteStatus,
    pub graph_status: WriteStatus,
    pub concepts: Vec<String>,
}

/// Tier-1 payload as held in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingMemory {
    pub content: String,
    pub metadata: Metadata,
    pub stored_at: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub scanned: usize,
    pub indexed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreHealth {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StoreHealth {
    fn from_result(result: anyhow::Result<()>) -> Self {
        match result {
            Ok(()) => Self { ok: true, error: None },
            Err(e) => Self {
                ok: false,
                error: Some(format!("{e:#}")),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub structured: StoreHealth,
    pub vector: StoreHealth,
    pub graph: StoreHealth,
    pub cache: StoreHealth,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub operational_mode: OperationalMode,
}

pub struct MemoryCoordinator {
    stores: Stores,
    embedding: Arc<dyn EmbeddingProvider>,
    cache: Arc<CacheLayer>,
    registry: ToolRegistry,
    config: Arc<MemosConfig>,
}

impl MemoryCoordinator {
    pub fn new(
        stores: Stores,
        embedding: Arc<dyn EmbeddingProvider>,
        cache: Arc<CacheLayer>,
        config: Arc<MemosConfig>,
    ) -> Self {
        let registry = ToolRegistry::new(
            Arc::clone(&stores.tools),
            Arc::clone(&stores.graph),
            Arc::clone(&cache),
            &config,
        );
        Self {
            stores,
            embedding,
            cache,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &MemosConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    fn timeouts(&self, override_limit: Option<Duration>) -> Timeouts {
        match override_limit {
            Some(limit) => Timeouts::uniform(limit),
            None => Timeouts::from_config(&self.config.timeouts),
        }
    }

    // ── Write path ──────────────────────────────────────────────────────────

    /// Validate, embed, persist, then index in the vector and graph stores.
    pub async fn store_memory(
        &self,
        content: &str,
        metadata: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<StoreMemoryResponse> {
        let metadata = self.validate_memory(content, metadata)?;
        let t = self.timeouts(timeout);

        let embedding = self.embed(content, t.embedding).await?;

        let memory = with_timeout(
            "structured store",
            t.structured,
            self.stores.memories.put(content, &metadata),
        )
        .await
        .map_err(map_storage)?;

        let concepts = extract_concepts(content);
        let mut memory_props = Metadata::new();
        memory_props.insert("memory_id".into(), memory.id.into());
        memory_props.insert("created_at".into(), memory.created_at.clone().into());
        let memory_node = NodeRef::new(NodeLabel::Memory, memory.id.to_string());

        let ((point_id, embedding_status), graph_status) = tokio::join!(
            self.index_vector(&memory, embedding, t),
            self.write_concepts(memory_node, memory_props, &concepts, t.graph),
        );

        self.cache.invalidate(CacheKind::Query);

        let operational_mode = if embedding_status.is_failed() || graph_status.is_failed() {
            OperationalMode::Degraded
        } else {
            OperationalMode::Full
        };

        tracing::info!(
            memory_id = memory.id,
            vector = ?embedding_status,
            graph = ?graph_status,
            concepts = concepts.len(),
            "memory stored"
        );

        Ok(StoreMemoryResponse {
            memory_id: memory.id,
            point_id,
            embedding_status,
            graph_status,
            concepts,
            operational_mode,
        })
    }

    /// Route a write to working memory (1), the full pipeline (2) or the graph (3).
    pub async fn store_memory_tier(
        &self,
        tier: u8,
        content: &str,
        metadata: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<TierStoreResponse> {
        match tier {
            1 => {
                let metadata = self.validate_memory(content, metadata)?;
                let key = self.cache.key(CacheKind::Working, &[content]);
                let payload = WorkingMemory {
                    content: content.to_string(),
                    metadata,
                    stored_at: now_timestamp(),
                };
                let raw = serde_json::to_string(&payload)
                    .map_err(|e| MemosError::Storage(e.to_string()))?;
                self.cache
                    .try_set(&key, raw, self.config.cache.working_memory_ttl())
                    .map_err(|e| MemosError::Storage(format!("working memory write failed: {e:#}")))?;

                tracing::info!(key = %key, "working memory stored");
                Ok(TierStoreResponse {
                    tier,
                    memory_id: None,
                    key,
                    embedding_status: WriteStatus::Skipped,
                    graph_status: WriteStatus::Skipped,
                    concepts: Vec::new(),
                })
            }
            2 => {
                let stored = self.store_memory(content, metadata, timeout).await?;
                Ok(TierStoreResponse {
                    tier,
                    memory_id: Some(stored.memory_id),
                    key: stored.memory_id.to_string(),
                    embedding_status: stored.embedding_status,
                    graph_status: stored.graph_status,
                    concepts: stored.concepts,
                })
            }
            3 => {
                let metadata = self.validate_memory(content, metadata)?;
                let t = self.timeouts(timeout);
                let key = Uuid::now_v7().to_string();
                let concepts = extract_concepts(content);

                let mut props = Metadata::new();
                props.insert("content".into(), content.into());
                props.insert("metadata".into(), Value::Object(metadata));
                props.insert("created_at".into(), now_timestamp().into());

                let node = NodeRef::new(NodeLabel::Memory, key.clone());
                let edges = mention_edges(&node, &concepts);
                let nodes = concept_nodes(node, props, &concepts);
                with_timeout("graph", t.graph, self.stores.graph.merge(&nodes, &edges))
                    .await
                    .map_err(map_storage)?;

                tracing::info!(key = %key, concepts = concepts.len(), "graph memory stored");
                Ok(TierStoreResponse {
                    tier,
                    memory_id: None,
                    key,
                    embedding_status: WriteStatus::Skipped,
                    graph_status: WriteStatus::Stored,
                    concepts,
                })
            }
            other => Err(MemosError::Validation(format!(
                "tier must be 1, 2 or 3, got {other}"
            ))),
        }
    }

    /// Embed and index one memory that has no vector yet.
    pub async fn index_memory(&self, memory: &Memory) -> WriteStatus {
        let t = self.timeouts(None);
        match self.embed(&memory.content, t.embedding).await {
            Ok(embedding) => self.index_vector(memory, embedding, t).await.1,
            Err(e) => WriteStatus::Failed(e.to_string()),
        }
    }

    /// Memories without an `embedding_ref`, oldest first.
    pub async fn unindexed(&self, limit: usize) -> Result<Vec<Memory>> {
        with_timeout(
            "structured store",
            self.timeouts(None).structured,
            self.stores.memories.list_unindexed(limit),
        )
        .await
        .map_err(map_storage)
    }

    /// Repair pass: index up to `limit` memories that were stored without a vector.
    pub async fn backfill(&self, limit: usize) -> Result<BackfillReport> {
        self.backfill_with(limit, |_, _, _| {}).await
    }

    /// [`backfill`](Self::backfill), calling `on_progress` after each memory
    /// with the running report (`scanned` is the total to process).
    pub async fn backfill_with<F>(&self, limit: usize, mut on_progress: F) -> Result<BackfillReport>
    where
        F: FnMut(&BackfillReport, &Memory, &WriteStatus),
    {
        let pending = self.unindexed(limit).await?;
        let mut report = BackfillReport {
            scanned: pending.len(),
            ..Default::default()
        };
        for memory in &pending {
            let status = self.index_memory(memory).await;
            match &status {
                WriteStatus::Stored => report.indexed += 1,
                WriteStatus::Failed(reason) => {
                    tracing::warn!(memory_id = memory.id, error = %reason, "backfill failed");
                    report.failed += 1;
                }
                WriteStatus::Skipped => report.failed += 1,
            }
            on_progress(&report, memory, &status);
        }
        tracing::info!(
            scanned = report.scanned,
            indexed = report.indexed,
            failed = report.failed,
            "backfill finished"
        );
        Ok(report)
    }

    async fn index_vector(
        &self,
        memory: &Memory,
        embedding: Vec<f32>,
        t: Timeouts,
    ) -> (Option<String>, WriteStatus) {
        let point_id = Uuid::new_v4().to_string();
        let record = VectorRecord {
            point_id: point_id.clone(),
            vector: embedding,
            payload: VectorPayload {
                memory_id: memory.id,
                metadata: memory.metadata.clone(),
            },
        };

        if let Err(e) = with_timeout("vector store", t.vector, self.stores.vectors.put(&record)).await {
            tracing::warn!(memory_id = memory.id, error = %e, "vector write failed, memory kept without embedding");
            self.discard_point(&point_id, t.vector).await;
            return (None, WriteStatus::Failed(format!("{e:#}")));
        }

        let linked = with_timeout(
            "structured store",
            t.structured,
            self.stores.memories.set_embedding_ref(memory.id, &point_id),
        )
        .await;
        if let Err(e) = linked {
            tracing::warn!(memory_id = memory.id, error = %e, "embedding_ref link failed");
            self.discard_point(&point_id, t.vector).await;
            return (None, WriteStatus::Failed(format!("{e:#}")));
        }

        (Some(point_id), WriteStatus::Stored)
    }

    /// Best-effort removal of a point whose memory will not reference it.
    async fn discard_point(&self, point_id: &str, limit: Duration) {
        if let Err(e) = with_timeout("vector store", limit, self.stores.vectors.delete(point_id)).await {
            tracing::debug!(point_id = %point_id, error = %e, "unlinked vector left behind");
        }
    }

    async fn write_concepts(
        &self,
        node: NodeRef,
        props: Metadata,
        concepts: &[String],
        limit: Duration,
    ) -> WriteStatus {
        let edges = mention_edges(&node, concepts);
        let nodes = concept_nodes(node, props, concepts);
        match with_timeout("graph", limit, self.stores.graph.merge(&nodes, &edges)).await {
            Ok(()) => WriteStatus::Stored,
            Err(e) => {
                tracing::warn!(error = %e, "graph write failed");
                WriteStatus::Failed(format!("{e:#}"))
            }
        }
    }

    // ── Read path ───────────────────────────────────────────────────────────

    /// Similarity search over memories plus tool suggestions for the same text.
    pub async fn query_memory(
        &self,
        query: &str,
        top_k: Option<usize>,
        timeout: Option<Duration>,
    ) -> Result<QueryMemoryResponse> {
        if query.trim().is_empty() {
            return Err(MemosError::Validation("query must not be empty".into()));
        }
        let max_top_k = self.config.retrieval.max_top_k;
        let top_k = match top_k {
            None => self.config.retrieval.default_top_k.clamp(1, max_top_k.max(1)),
            Some(0) => return Err(MemosError::Validation("top_k must be at least 1".into())),
            Some(k) => k.min(max_top_k),
        };
        let t = self.timeouts(timeout);

        let key = self.cache.key(CacheKind::Query, &[query, &top_k.to_string()]);
        if let Some(mut cached) = self.cache.get_json::<QueryMemoryResponse>(&key) {
            tracing::debug!(top_k, "query served from cache");
            cached.cached = true;
            return Ok(cached);
        }
        let generation = self.cache.generation(CacheKind::Query);

        let embedding = self.embed(query, t.embedding).await?;

        let (hits, tools) = tokio::join!(
            with_timeout(
                "vector store",
                t.vector,
                self.stores.vectors.search(&embedding, top_k, self.config.retrieval.score_threshold),
            ),
            self.registry
                .search_within(query, Some(self.config.retrieval.tool_limit), t.structured),
        );

        let mut complete = true;
        let hits = match hits {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "vector search failed, returning no memories");
                complete = false;
                Vec::new()
            }
        };
        let tools = match tools {
            Ok(tools) => tools,
            Err(e) => {
                tracing::warn!(error = %e, "tool discovery failed, returning no tools");
                complete = false;
                Vec::new()
            }
        };

        let memories = self.resolve_hits(hits, t.structured).await;
        let response = QueryMemoryResponse {
            memories,
            tools: tools.into_iter().map(ToolSummary::from).collect(),
            cached: false,
        };

        if complete {
            self.cache.set_json_if_current(
                &key,
                &response,
                self.config.cache.query_ttl(),
                CacheKind::Query,
                generation,
            );
        }

        tracing::info!(
            top_k,
            memories = response.memories.len(),
            tools = response.tools.len(),
            "query served"
        );
        Ok(response)
    }

    /// Hydrate vector hits from the structured store, in score order, skipping
    /// duplicates and orphans.
    async fn resolve_hits(&self, hits: Vec<VectorHit>, limit: Duration) -> Vec<MemoryHit> {
        let mut seen = HashSet::new();
        let hits: Vec<VectorHit> = hits
            .into_iter()
            .filter(|h| seen.insert(h.payload.memory_id))
            .collect();
        if hits.is_empty() {
            return Vec::new();
        }
        let ids: Vec<MemoryId> = hits.iter().map(|h| h.payload.memory_id).collect();

        let mut found: HashMap<MemoryId, Memory> =
            match with_timeout("structured store", limit, self.stores.memories.get_many(&ids)).await {
                Ok(memories) => memories.into_iter().map(|m| (m.id, m)).collect(),
                Err(e) => {
                    tracing::warn!(error = %e, "batch lookup failed, falling back to single lookups");
                    let mut map = HashMap::new();
                    for id in &ids {
                        match with_timeout("structured store", limit, self.stores.memories.get(*id)).await {
                            Ok(Some(memory)) => {
                                map.insert(memory.id, memory);
                            }
                            Ok(None) => {}
                            Err(e) => tracing::debug!(memory_id = id, error = %e, "lookup failed, skipping"),
                        }
                    }
                    map
                }
            };

        hits.into_iter()
            .filter_map(|hit| match found.remove(&hit.payload.memory_id) {
                Some(memory) => Some(MemoryHit {
                    id: memory.id,
                    content: memory.content,
                    metadata: memory.metadata,
                    score: hit.score,
                    created_at: memory.created_at,
                }),
                None => {
                    tracing::debug!(
                        memory_id = hit.payload.memory_id,
                        point_id = %hit.point_id,
                        "orphaned vector reference skipped"
                    );
                    None
                }
            })
            .collect()
    }

    pub async fn get_memory(&self, id: MemoryId) -> Result<Memory> {
        with_timeout(
            "structured store",
            self.timeouts(None).structured,
            self.stores.memories.get(id),
        )
        .await
        .map_err(map_storage)?
        .ok_or_else(|| MemosError::NotFound(format!("memory {id}")))
    }

    pub fn get_working_memory(&self, key: &str) -> Result<WorkingMemory> {
        let raw = self
            .cache
            .try_get(key)
            .map_err(|e| MemosError::Storage(format!("working memory read failed: {e:#}")))?
            .ok_or_else(|| MemosError::NotFound(format!("working memory {key}")))?;
        serde_json::from_str(&raw).map_err(|e| MemosError::Storage(e.to_string()))
    }

    /// Shallow-merge `patch` into a memory's metadata; `null` removes a key.
    pub async fn patch_metadata(&self, id: MemoryId, patch: Value) -> Result<Memory> {
        let patch = normalize_metadata(Some(patch), self.config.limits.max_metadata_bytes)?;
        let updated = with_timeout(
            "structured store",
            self.timeouts(None).structured,
            self.stores.memories.patch_metadata(id, &patch),
        )
        .await
        .map_err(map_storage)?
        .ok_or_else(|| MemosError::NotFound(format!("memory {id}")))?;

        self.cache.invalidate(CacheKind::Query);
        Ok(updated)
    }

    /// Keyword search over memory content (FTS5), best match first.
    pub async fn search_memories_text(&self, query: &str, limit: Option<usize>) -> Result<Vec<Memory>> {
        if query.trim().is_empty() {
            return Err(MemosError::Validation("query must not be empty".into()));
        }
        let max_top_k = self.config.retrieval.max_top_k;
        let limit = match limit {
            None => self.config.retrieval.default_top_k.clamp(1, max_top_k.max(1)),
            Some(0) => return Err(MemosError::Validation("limit must be at least 1".into())),
            Some(n) => n.min(max_top_k),
        };
        with_timeout(
            "structured store",
            self.timeouts(None).structured,
            self.stores.memories.search(query, limit),
        )
        .await
        .map_err(map_storage)
    }

    /// Graph neighbourhood of one node.
    pub async fn related_nodes(
        &self,
        label: NodeLabel,
        key: &str,
        rel_type: Option<RelType>,
    ) -> Result<Vec<Neighbor>> {
        let node = node_ref(label, key);
        with_timeout(
            "graph",
            self.timeouts(None).graph,
            self.stores.graph.search(&node, rel_type),
        )
        .await
        .map_err(map_storage)
    }

    /// Nodes within `depth` hops of one node and the edges among them.
    pub async fn subgraph(&self, label: NodeLabel, key: &str, depth: u32) -> Result<Subgraph> {
        if depth > MAX_SUBGRAPH_DEPTH {
            return Err(MemosError::Validation(format!(
                "depth must be at most {MAX_SUBGRAPH_DEPTH}, got {depth}"
            )));
        }
        let node = node_ref(label, key);
        with_timeout(
            "graph",
            self.timeouts(None).graph,
            self.stores.graph.subgraph(&node, depth),
        )
        .await
        .map_err(map_storage)?
        .ok_or_else(|| MemosError::NotFound(format!("node {}:{}", node.label, node.key)))
    }

    /// Shortest undirected path between two nodes, at most `max_depth` hops
    /// (default and cap [`MAX_PATH_DEPTH`]).
    pub async fn shortest_path(
        &self,
        from: (NodeLabel, &str),
        to: (NodeLabel, &str),
        max_depth: Option<u32>,
    ) -> Result<Subgraph> {
        let max_depth = max_depth.unwrap_or(MAX_PATH_DEPTH);
        if max_depth > MAX_PATH_DEPTH {
            return Err(MemosError::Validation(format!(
                "max_depth must be at most {MAX_PATH_DEPTH}, got {max_depth}"
            )));
        }
        let from = node_ref(from.0, from.1);
        let to = node_ref(to.0, to.1);
        with_timeout(
            "graph",
            self.timeouts(None).graph,
            self.stores.graph.shortest_path(&from, &to, max_depth),
        )
        .await
        .map_err(map_storage)?
        .ok_or_else(|| {
            MemosError::NotFound(format!(
                "path from {}:{} to {}:{}",
                from.label, from.key, to.label, to.key
            ))
        })
    }

    // ── Tools ───────────────────────────────────────────────────────────────

    pub async fn register_tool(&self, tool: NewTool) -> Result<RegisteredTool> {
        self.registry.register(tool).await
    }

    pub async fn search_tools(&self, context: &str, limit: Option<usize>) -> Result<Vec<ToolMatch>> {
        self.registry.search(context, limit).await
    }

    pub async fn get_tool(&self, id: ToolId) -> Result<RegisteredTool> {
        self.registry.get(id).await
    }

    pub async fn list_tools(&self) -> Result<Vec<RegisteredTool>> {
        self.registry.list().await
    }

    // ── Cache & health ──────────────────────────────────────────────────────

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache_clear(&self) -> bool {
        let cleared = self.cache.clear();
        tracing::info!(cleared, "cache cleared");
        cleared
    }

    /// Ping every store; `full` only when all answer.
    pub async fn health(&self) -> HealthStatus {
        let t = self.timeouts(None);
        let (structured, vector, graph) = tokio::join!(
            with_timeout("structured store", t.structured, self.stores.memories.ping()),
            with_timeout("vector store", t.vector, self.stores.vectors.ping()),
            with_timeout("graph", t.graph, self.stores.graph.ping()),
        );
        let structured = StoreHealth::from_result(structured);
        let vector = StoreHealth::from_result(vector);
        let graph = StoreHealth::from_result(graph);
        let cache = StoreHealth::from_result(self.cache.ping());

        let operational_mode = if structured.ok && vector.ok && graph.ok && cache.ok {
            OperationalMode::Full
        } else {
            OperationalMode::Degraded
        };

        HealthStatus {
            structured,
            vector,
            graph,
            cache,
            embedding_model: self.embedding.model().to_string(),
            embedding_dimensions: self.embedding.dimensions(),
            operational_mode,
        }
    }

    /// Row counts across the stores plus cache statistics.
    pub async fn stats(&self) -> Result<StoreStats> {
        let t = self.timeouts(None);
        let (memories, tools, vectors, graph) = tokio::join!(
            with_timeout("structured store", t.structured, self.stores.memories.count()),
            with_timeout("structured store", t.structured, self.stores.tools.count()),
            with_timeout("vector store", t.vector, self.stores.vectors.count()),
            with_timeout("graph", t.graph, self.stores.graph.count()),
        );
        let (graph_nodes, graph_edges) = graph.map_err(map_storage)?;
        Ok(StoreStats {
            memories: memories.map_err(map_storage)?,
            tools: tools.map_err(map_storage)?,
            vectors: vectors.map_err(map_storage)?,
            graph_nodes,
            graph_edges,
            cache: self.cache.stats(),
        })
    }

    // ── Helpers ─────────────────────────────────────────────────────────────

    /// Embedding with cache-aside on `embedding:<model, text>`.
    async fn embed(&self, text: &str, limit: Duration) -> Result<Vec<f32>> {
        let key = self
            .cache
            .key(CacheKind::Embedding, &[self.embedding.model(), text]);
        if let Some(cached) = self.cache.get_json::<Vec<f32>>(&key) {
            if cached.len() == self.embedding.dimensions() {
                return Ok(cached);
            }
        }

        let embedding = with_timeout("embedding", limit, self.embedding.embed(text))
            .await
            .map_err(|e| MemosError::EmbeddingUnavailable(format!("{e:#}")))?;

        self.cache
            .set_json(&key, &embedding, self.config.cache.embedding_ttl());
        Ok(embedding)
    }

    fn validate_memory(&self, content: &str, metadata: Option<Value>) -> Result<Metadata> {
        if content.trim().is_empty() {
            return Err(MemosError::Validation("content must not be empty".into()));
        }
        let max = self.config.limits.max_content_bytes;
        if content.len() > max {
            return Err(MemosError::Validation(format!(
                "content is {} bytes, limit is {max}",
                content.len()
            )));
        }
        normalize_metadata(metadata, self.config.limits.max_metadata_bytes)
    }
}

/// Metadata must be a JSON object with non-empty keys; keys are trimmed.
pub fn normalize_metadata(metadata: Option<Value>, max_bytes: usize) -> Result<Metadata> {
    let map = match metadata {
        None | Some(Value::Null) => return Ok(Metadata::new()),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(MemosError::Validation(format!(
                "metadata must be a JSON object, got {}",
                json_kind(&other)
            )))
        }
    };

    let mut normalized = Metadata::new();
    for (key, value) in map {
        let key = key.trim();
        if key.is_empty() {
            return Err(MemosError::Validation("metadata keys must not be empty".into()));
        }
        normalized.insert(key.to_string(), value);
    }

    let size = serde_json::to_string(&normalized)
        .map(|s| s.len())
        .unwrap_or(usize::MAX);
    if size > max_bytes {
        return Err(MemosError::Validation(format!(
            "metadata is {size} bytes, limit is {max_bytes}"
        )));
    }
    Ok(normalized)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn node_ref(label: NodeLabel, key: &str) -> NodeRef {
    match label {
        NodeLabel::Concept => NodeRef::concept(key),
        other => NodeRef::new(other, key.trim()),
    }
}

fn concept_nodes(node: NodeRef, props: Metadata, concepts: &[String]) -> Vec<(NodeRef, Metadata)> {
    let mut nodes = Vec::with_capacity(concepts.len() + 1);
    nodes.push((node, props));
    for concept in concepts {
        let mut concept_props = Metadata::new();
        concept_props.insert("name".into(), concept.clone().into());
        nodes.push((NodeRef::concept(concept), concept_props));
    }
    nodes
}

fn mention_edges(node: &NodeRef, concepts: &[String]) -> Vec<GraphEdge> {
    concepts
        .iter()
        .map(|concept| GraphEdge {
            from: node.clone(),
            rel_type: RelType::Mentions,
            to: NodeRef::concept(concept),
        })
        .collect()
}
