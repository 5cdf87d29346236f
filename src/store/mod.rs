//! Storage adapters.
//!
//! The coordinator only sees the async traits defined here; the SQLite
//! implementations live in [`structured`], [`vector`] and [`graph`], each
//! owning the tables of its own database file.

pub mod graph;
pub mod structured;
pub mod vector;

use anyhow::Result;
use async_trait::async_trait;

use crate::memory::types::{
    GraphEdge, GraphNode, Memory, MemoryId, Metadata, Neighbor, NewTool, NodeRef,
    RegisteredTool, RelType, Subgraph, ToolId, VectorHit, VectorRecord,
};

/// Authoritative store for memory records.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Insert a new memory and return it with its assigned id.
    async fn put(&self, content: &str, metadata: &Metadata) -> Result<Memory>;

    async fn get(&self, id: MemoryId) -> Result<Option<Memory>>;

    /// Fetch several memories at once. Missing ids are omitted; order is unspecified.
    async fn get_many(&self, ids: &[MemoryId]) -> Result<Vec<Memory>>;

    async fn delete(&self, id: MemoryId) -> Result<bool>;

    /// Full-text search over memory content, best match first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Memory>>;

    /// Record the vector point id for a memory. Errors if the memory is gone.
    async fn set_embedding_ref(&self, id: MemoryId, point_id: &str) -> Result<()>;

    /// Shallow-merge `patch` into the metadata; `null` values remove keys.
    async fn patch_metadata(&self, id: MemoryId, patch: &Metadata) -> Result<Option<Memory>>;

    /// Memories that have no vector yet, oldest first.
    async fn list_unindexed(&self, limit: usize) -> Result<Vec<Memory>>;

    async fn count(&self) -> Result<u64>;

    async fn ping(&self) -> Result<()>;
}

/// Registry of discoverable tools, unique by name.
#[async_trait]
pub trait ToolStore: Send + Sync {
    /// Insert or replace by name. An existing tool keeps its id and `created_at`.
    async fn put(&self, tool: &NewTool) -> Result<RegisteredTool>;

    async fn get(&self, id: ToolId) -> Result<Option<RegisteredTool>>;

    async fn get_many(&self, ids: &[ToolId]) -> Result<Vec<RegisteredTool>>;

    async fn delete(&self, id: ToolId) -> Result<bool>;

    /// One page of candidate tools whose name, description, usage or tags
    /// contain any of `patterns` (case-insensitive), in id order after `after`.
    async fn search(
        &self,
        patterns: &[String],
        after: ToolId,
        limit: usize,
    ) -> Result<Vec<RegisteredTool>>;

    async fn list(&self) -> Result<Vec<RegisteredTool>>;

    async fn count(&self) -> Result<u64>;

    async fn ping(&self) -> Result<()>;
}

/// Similarity index over memory embeddings.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace a point.
    async fn put(&self, record: &VectorRecord) -> Result<()>;

    async fn get(&self, point_id: &str) -> Result<Option<VectorRecord>>;

    async fn get_many(&self, point_ids: &[String]) -> Result<Vec<VectorRecord>>;

    async fn delete(&self, point_id: &str) -> Result<bool>;

    /// Nearest points by cosine similarity, best first, dropping scores below
    /// `score_threshold`.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<VectorHit>>;

    async fn count(&self) -> Result<u64>;

    async fn ping(&self) -> Result<()>;
}

/// Property graph of memories, concepts, tools and agents.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Merge a node by `(label, key)`; new properties overwrite existing keys.
    async fn put_node(&self, node: &NodeRef, properties: &Metadata) -> Result<GraphNode>;

    /// Merge an edge. Returns `true` if it did not exist before.
    async fn put_edge(&self, edge: &GraphEdge) -> Result<bool>;

    /// Merge several nodes and edges in one transaction.
    async fn merge(&self, nodes: &[(NodeRef, Metadata)], edges: &[GraphEdge]) -> Result<()>;

    async fn get(&self, node: &NodeRef) -> Result<Option<GraphNode>>;

    async fn get_many(&self, nodes: &[NodeRef]) -> Result<Vec<GraphNode>>;

    /// Delete a node and, by cascade, its edges.
    async fn delete(&self, node: &NodeRef) -> Result<bool>;

    /// Nodes adjacent to `node`, optionally restricted to one relationship type.
    async fn search(&self, node: &NodeRef, rel_type: Option<RelType>) -> Result<Vec<Neighbor>>;

    /// Every node within `depth` hops of `node`, ignoring edge direction, and
    /// the edges among them. `None` if `node` does not exist.
    async fn subgraph(&self, node: &NodeRef, depth: u32) -> Result<Option<Subgraph>>;

    /// A shortest undirected path of at most `max_depth` hops. `None` if
    /// either node is missing or no such path exists.
    async fn shortest_path(
        &self,
        from: &NodeRef,
        to: &NodeRef,
        max_depth: u32,
    ) -> Result<Option<Subgraph>>;

    /// `(nodes, edges)` totals.
    async fn count(&self) -> Result<(u64, u64)>;

    async fn ping(&self) -> Result<()>;
}
