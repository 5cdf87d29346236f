use serde::Serialize;

use crate::cache::CacheStats;

/// Row counts across the three stores plus cache counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub memories: u64,
    pub tools: u64,
    pub vectors: u64,
    pub graph_nodes: u64,
    pub graph_edges: u64,
    pub cache: CacheStats,
}

impl StoreStats {
    /// Memories that have no vector point, assuming one point per memory.
    pub fn unindexed_estimate(&self) -> u64 {
        self.memories.saturating_sub(self.vectors)
    }
}
