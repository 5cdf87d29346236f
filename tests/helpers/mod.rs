#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use memos::cache::{CacheBackend, CacheLayer, MokaBackend};
use memos::config::MemosConfig;
use memos::db::{self, SharedConnection};
use memos::embedding::hashing::HashingEmbeddingProvider;
use memos::embedding::EmbeddingProvider;
use memos::memory::coordinator::{MemoryCoordinator, Stores};
use memos::memory::types::{
    GraphEdge, GraphNode, Memory, MemoryId, Metadata, Neighbor, NodeRef, RelType, Subgraph,
    VectorHit, VectorRecord,
};
use memos::store::graph::SqliteGraphStore;
use memos::store::structured::{SqliteMemoryStore, SqliteToolStore};
use memos::store::vector::SqliteVectorStore;
use memos::store::{GraphStore, MemoryStore, VectorStore};

pub const DIMS: usize = 384;

/// SQLite-backed stores over fresh in-memory databases.
pub fn sqlite_stores() -> Stores {
    sqlite_stores_with_vector_db().0
}

/// Like [`sqlite_stores`], also handing back the `vectors.db` connection so a
/// test can hold its lock.
pub fn sqlite_stores_with_vector_db() -> (Stores, SharedConnection) {
    let structured = db::shared(db::open_memory_database().unwrap());
    let vectors = db::shared(db::open_memory_database().unwrap());
    let stores = Stores {
        memories: Arc::new(SqliteMemoryStore::new(Arc::clone(&structured)).unwrap()),
        tools: Arc::new(SqliteToolStore::new(structured).unwrap()),
        vectors: Arc::new(SqliteVectorStore::new(Arc::clone(&vectors), DIMS).unwrap()),
        graph: Arc::new(SqliteGraphStore::new(db::shared(db::open_memory_database().unwrap())).unwrap()),
    };
    (stores, vectors)
}

/// Hold `db`'s lock on a plain thread for `hold`. Returns once the lock is taken.
pub fn hold_lock(db: &SharedConnection, hold: Duration) -> std::thread::JoinHandle<()> {
    let db = Arc::clone(db);
    let (locked_tx, locked_rx) = std::sync::mpsc::channel();
    let holder = std::thread::spawn(move || {
        let _guard = db.lock().unwrap();
        locked_tx.send(()).unwrap();
        std::thread::sleep(hold);
    });
    locked_rx.recv().unwrap();
    holder
}

pub fn test_cache() -> Arc<CacheLayer> {
    Arc::new(CacheLayer::new(Arc::new(MokaBackend::new(1000)), "memos"))
}

pub fn hashing_provider() -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashingEmbeddingProvider::new("feature-hash-v1", DIMS))
}

pub fn build(
    stores: Stores,
    embedding: Arc<dyn EmbeddingProvider>,
    cache: Arc<CacheLayer>,
) -> MemoryCoordinator {
    MemoryCoordinator::new(stores, embedding, cache, Arc::new(MemosConfig::default()))
}

/// Coordinator over in-memory SQLite, the hashing embedder and a moka cache.
/// The stores are returned too so tests can inspect or tamper with them.
pub fn test_coordinator() -> (MemoryCoordinator, Stores) {
    let stores = sqlite_stores();
    let coordinator = build(stores.clone(), hashing_provider(), test_cache());
    (coordinator, stores)
}

// ── Failing fakes ───────────────────────────────────────────────────────────

pub struct UnreachableVectorStore;

#[async_trait]
impl VectorStore for UnreachableVectorStore {
    async fn put(&self, _record: &VectorRecord) -> Result<()> {
        bail!("vector store unreachable")
    }
    async fn get(&self, _point_id: &str) -> Result<Option<VectorRecord>> {
        bail!("vector store unreachable")
    }
    async fn get_many(&self, _point_ids: &[String]) -> Result<Vec<VectorRecord>> {
        bail!("vector store unreachable")
    }
    async fn delete(&self, _point_id: &str) -> Result<bool> {
        bail!("vector store unreachable")
    }
    async fn search(&self, _vector: &[f32], _limit: usize, _threshold: f32) -> Result<Vec<VectorHit>> {
        bail!("vector store unreachable")
    }
    async fn count(&self) -> Result<u64> {
        bail!("vector store unreachable")
    }
    async fn ping(&self) -> Result<()> {
        bail!("vector store unreachable")
    }
}

/// Wraps a real vector store; fails every call while `down` is set and can
/// delay calls to exercise timeouts.
pub struct FlakyVectorStore {
    inner: Arc<dyn VectorStore>,
    pub down: AtomicBool,
    delay: Duration,
}

impl FlakyVectorStore {
    pub fn new(inner: Arc<dyn VectorStore>) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
            delay: Duration::ZERO,
        }
    }

    pub fn slow(inner: Arc<dyn VectorStore>, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(inner)
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    async fn gate(&self) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.down.load(Ordering::SeqCst) {
            bail!("vector store unreachable");
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for FlakyVectorStore {
    async fn put(&self, record: &VectorRecord) -> Result<()> {
        self.gate().await?;
        self.inner.put(record).await
    }
    async fn get(&self, point_id: &str) -> Result<Option<VectorRecord>> {
        self.gate().await?;
        self.inner.get(point_id).await
    }
    async fn get_many(&self, point_ids: &[String]) -> Result<Vec<VectorRecord>> {
        self.gate().await?;
        self.inner.get_many(point_ids).await
    }
    async fn delete(&self, point_id: &str) -> Result<bool> {
        self.gate().await?;
        self.inner.delete(point_id).await
    }
    async fn search(&self, vector: &[f32], limit: usize, threshold: f32) -> Result<Vec<VectorHit>> {
        self.gate().await?;
        self.inner.search(vector, limit, threshold).await
    }
    async fn count(&self) -> Result<u64> {
        self.gate().await?;
        self.inner.count().await
    }
    async fn ping(&self) -> Result<()> {
        self.gate().await?;
        self.inner.ping().await
    }
}

/// Runs searches against a real store, then sleeps before answering, so a
/// concurrent write can land after the search read its snapshot.
pub struct LaggingSearchVectorStore {
    pub inner: Arc<dyn VectorStore>,
    pub lag: Duration,
}

#[async_trait]
impl VectorStore for LaggingSearchVectorStore {
    async fn put(&self, record: &VectorRecord) -> Result<()> {
        self.inner.put(record).await
    }
    async fn get(&self, point_id: &str) -> Result<Option<VectorRecord>> {
        self.inner.get(point_id).await
    }
    async fn get_many(&self, point_ids: &[String]) -> Result<Vec<VectorRecord>> {
        self.inner.get_many(point_ids).await
    }
    async fn delete(&self, point_id: &str) -> Result<bool> {
        self.inner.delete(point_id).await
    }
    async fn search(&self, vector: &[f32], limit: usize, threshold: f32) -> Result<Vec<VectorHit>> {
        let hits = self.inner.search(vector, limit, threshold).await?;
        tokio::time::sleep(self.lag).await;
        Ok(hits)
    }
    async fn count(&self) -> Result<u64> {
        self.inner.count().await
    }
    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}

/// Wraps a real memory store. `get_many` can be switched off, and `put` can
/// be made to fail.
pub struct PatchyMemoryStore {
    inner: Arc<dyn MemoryStore>,
    pub batch_down: AtomicBool,
    pub writes_down: AtomicBool,
}

impl PatchyMemoryStore {
    pub fn new(inner: Arc<dyn MemoryStore>) -> Self {
        Self {
            inner,
            batch_down: AtomicBool::new(false),
            writes_down: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MemoryStore for PatchyMemoryStore {
    async fn put(&self, content: &str, metadata: &Metadata) -> Result<Memory> {
        if self.writes_down.load(Ordering::SeqCst) {
            bail!("disk I/O error");
        }
        self.inner.put(content, metadata).await
    }
    async fn get(&self, id: MemoryId) -> Result<Option<Memory>> {
        self.inner.get(id).await
    }
    async fn get_many(&self, ids: &[MemoryId]) -> Result<Vec<Memory>> {
        if self.batch_down.load(Ordering::SeqCst) {
            bail!("too many SQL variables");
        }
        self.inner.get_many(ids).await
    }
    async fn delete(&self, id: MemoryId) -> Result<bool> {
        self.inner.delete(id).await
    }
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Memory>> {
        self.inner.search(query, limit).await
    }
    async fn set_embedding_ref(&self, id: MemoryId, point_id: &str) -> Result<()> {
        self.inner.set_embedding_ref(id, point_id).await
    }
    async fn patch_metadata(&self, id: MemoryId, patch: &Metadata) -> Result<Option<Memory>> {
        self.inner.patch_metadata(id, patch).await
    }
    async fn list_unindexed(&self, limit: usize) -> Result<Vec<Memory>> {
        self.inner.list_unindexed(limit).await
    }
    async fn count(&self) -> Result<u64> {
        self.inner.count().await
    }
    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}

pub struct FailingGraphStore;

#[async_trait]
impl GraphStore for FailingGraphStore {
    async fn put_node(&self, _node: &NodeRef, _properties: &Metadata) -> Result<GraphNode> {
        bail!("graph unreachable")
    }
    async fn put_edge(&self, _edge: &GraphEdge) -> Result<bool> {
        bail!("graph unreachable")
    }
    async fn merge(&self, _nodes: &[(NodeRef, Metadata)], _edges: &[GraphEdge]) -> Result<()> {
        bail!("graph unreachable")
    }
    async fn get(&self, _node: &NodeRef) -> Result<Option<GraphNode>> {
        bail!("graph unreachable")
    }
    async fn get_many(&self, _nodes: &[NodeRef]) -> Result<Vec<GraphNode>> {
        bail!("graph unreachable")
    }
    async fn delete(&self, _node: &NodeRef) -> Result<bool> {
        bail!("graph unreachable")
    }
    async fn search(&self, _node: &NodeRef, _rel_type: Option<RelType>) -> Result<Vec<Neighbor>> {
        bail!("graph unreachable")
    }
    async fn subgraph(&self, _node: &NodeRef, _depth: u32) -> Result<Option<Subgraph>> {
        bail!("graph unreachable")
    }
    async fn shortest_path(
        &self,
        _from: &NodeRef,
        _to: &NodeRef,
        _max_depth: u32,
    ) -> Result<Option<Subgraph>> {
        bail!("graph unreachable")
    }
    async fn count(&self) -> Result<(u64, u64)> {
        bail!("graph unreachable")
    }
    async fn ping(&self) -> Result<()> {
        bail!("graph unreachable")
    }
}

pub struct FailingEmbedding;

#[async_trait]
impl EmbeddingProvider for FailingEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("model server down")
    }
    fn dimensions(&self) -> usize {
        DIMS
    }
    fn model(&self) -> &str {
        "failing"
    }
}

pub struct FailingCacheBackend;

impl CacheBackend for FailingCacheBackend {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        bail!("cache unreachable")
    }
    fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<()> {
        bail!("cache unreachable")
    }
    fn invalidate_prefix(&self, _prefix: &str) -> Result<u64> {
        bail!("cache unreachable")
    }
    fn clear(&self) -> Result<()> {
        bail!("cache unreachable")
    }
    fn len(&self) -> Result<u64> {
        bail!("cache unreachable")
    }
}
