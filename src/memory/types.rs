//! Record types shared by the coordinator and the store adapters.
//!
//! Defines [`Memory`] (the structured record), [`RegisteredTool`],
//! [`VectorRecord`] (the vector-store point), the graph vocabulary
//! ([`NodeLabel`], [`RelType`], [`GraphNode`]) and [`WriteStatus`], which
//! reports the outcome of each secondary write.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub type MemoryId = i64;
pub type ToolId = i64;
pub type NodeId = i64;

/// Metadata attached to a memory: always a JSON object.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Current time as an RFC 3339 string with microsecond precision.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// A memory record, matching the `memories` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Autoincrement id, starting at 1. Never reused or changed.
    pub id: MemoryId,
    pub content: String,
    pub metadata: Metadata,
    /// Point id in the vector store, set only once a vector was stored.
    pub embedding_ref: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A discoverable tool, matching the `registered_tools` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredTool {
    pub id: ToolId,
    pub name: String,
    pub description: String,
    pub usage: String,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Registration input for a tool.
#[derive(Debug, Clone, Default)]
pub struct NewTool {
    pub name: String,
    pub description: String,
    pub usage: String,
    pub tags: Vec<String>,
}

/// Trim, lower-case and deduplicate tags, keeping first-seen order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Payload stored next to each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPayload {
    pub memory_id: MemoryId,
    pub metadata: Metadata,
}

#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// UUID v4 string.
    pub point_id: String,
    pub vector: Vec<f32>,
    pub payload: VectorPayload,
}

/// One similarity-search result.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub point_id: String,
    pub score: f32,
    pub payload: VectorPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    Memory,
    Concept,
    Tool,
    Agent,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "Memory",
            Self::Concept => "Concept",
            Self::Tool => "Tool",
            Self::Agent => "Agent",
        }
    }
}

impl std::fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Memory" | "memory" => Ok(Self::Memory),
            "Concept" | "concept" => Ok(Self::Concept),
            "Tool" | "tool" => Ok(Self::Tool),
            "Agent" | "agent" => Ok(Self::Agent),
            _ => Err(format!("unknown node label: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelType {
    Mentions,
    RelatedTo,
    Uses,
    CreatedBy,
}

impl RelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mentions => "MENTIONS",
            Self::RelatedTo => "RELATED_TO",
            Self::Uses => "USES",
            Self::CreatedBy => "CREATED_BY",
        }
    }
}

impl std::fmt::Display for RelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MENTIONS" => Ok(Self::Mentions),
            "RELATED_TO" => Ok(Self::RelatedTo),
            "USES" => Ok(Self::Uses),
            "CREATED_BY" => Ok(Self::CreatedBy),
            _ => Err(format!("unknown relationship type: {s}")),
        }
    }
}

/// Identifies a node by its natural key rather than its row id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub label: NodeLabel,
    pub key: String,
}

impl NodeRef {
    pub fn new(label: NodeLabel, key: impl Into<String>) -> Self {
        Self {
            label,
            key: key.into(),
        }
    }

    /// Concept nodes are keyed by their lower-cased, trimmed form.
    pub fn concept(name: &str) -> Self {
        Self::new(NodeLabel::Concept, name.trim().to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub label: NodeLabel,
    pub key: String,
    pub properties: Metadata,
    pub created_at: String,
}

/// Edge to be written between two nodes addressed by natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub from: NodeRef,
    pub rel_type: RelType,
    pub to: NodeRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// A stored edge, addressed by node row id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphLink {
    pub from_id: NodeId,
    pub rel_type: RelType,
    pub to_id: NodeId,
}

/// A set of nodes and the edges among them. For a path, both are in walk
/// order from the start node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphLink>,
}

/// A node adjacent to the queried node, with the connecting edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub rel_type: RelType,
    pub direction: Direction,
    pub node: GraphNode,
}

/// Outcome of a secondary (non-fatal) write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum WriteStatus {
    Stored,
    Failed(String),
    /// The tier does not touch this store.
    Skipped,
}

impl WriteStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationalMode {
    Full,
    Degraded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_normalized() {
        let tags = normalize_tags([" Web ", "search", "WEB", "", "  "]);
        assert_eq!(tags, vec!["web".to_string(), "search".to_string()]);
    }

    #[test]
    fn write_status_serializes_with_tag() {
        let stored = serde_json::to_value(WriteStatus::Stored).unwrap();
        assert_eq!(stored, serde_json::json!({"status": "stored"}));

        let failed = serde_json::to_value(WriteStatus::Failed("timeout".into())).unwrap();
        assert_eq!(
            failed,
            serde_json::json!({"status": "failed", "error": "timeout"})
        );
    }

    #[test]
    fn rel_type_round_trips_through_str() {
        for rel in [RelType::Mentions, RelType::RelatedTo, RelType::Uses, RelType::CreatedBy] {
            assert_eq!(rel.as_str().parse::<RelType>().unwrap(), rel);
        }
        assert!("KNOWS".parse::<RelType>().is_err());
    }

    #[test]
    fn concept_ref_is_lowercased() {
        let r = NodeRef::concept(" Quick ");
        assert_eq!(r.label, NodeLabel::Concept);
        assert_eq!(r.key, "quick");
    }
}
