pub mod get_memory;
pub mod get_tool;
pub mod get_working_memory;
pub mod graph;
pub mod patch_memory_metadata;
pub mod query_memory;
pub mod register_tool;
pub mod search_memory_text;
pub mod search_tools;
pub mod store_memory;

use std::sync::Arc;
use std::time::Duration;

use get_memory::GetMemoryParams;
use get_tool::GetToolParams;
use get_working_memory::GetWorkingMemoryParams;
use graph::{RelatedNodesParams, ShortestPathParams, SubgraphParams};
use patch_memory_metadata::PatchMemoryMetadataParams;
use query_memory::QueryMemoryParams;
use register_tool::RegisterToolParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use search_memory_text::SearchMemoryTextParams;
use search_tools::SearchToolsParams;
use serde::Serialize;
use store_memory::StoreMemoryParams;

use crate::error::MemosError;
use crate::memory::coordinator::MemoryCoordinator;
use crate::memory::types::{NewTool, NodeLabel, RelType};

/// The memos MCP tool handler. Every tool delegates to the shared
/// [`MemoryCoordinator`]; domain errors come back as tool errors carrying
/// their kind prefix.
#[derive(Clone)]
pub struct MemosTools {
    tool_router: ToolRouter<Self>,
    coordinator: Arc<MemoryCoordinator>,
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}

fn parse_label(raw: &str) -> Result<NodeLabel, String> {
    raw.trim()
        .parse()
        .map_err(|e: String| MemosError::Validation(e).to_string())
}

fn parse_rel(raw: &str) -> Result<RelType, String> {
    raw.trim()
        .to_uppercase()
        .parse()
        .map_err(|e: String| MemosError::Validation(e).to_string())
}

#[tool_router]
impl MemosTools {
    pub fn new(coordinator: Arc<MemoryCoordinator>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            coordinator,
        }
    }

    #[tool(description = "Store a memory. Tier 2 (default) embeds the content, persists it, indexes the vector and links extracted concepts in the graph. Tier 1 keeps it in short-lived working memory; tier 3 writes only to the knowledge graph.")]
    async fn store_memory(
        &self,
        Parameters(params): Parameters<StoreMemoryParams>,
    ) -> Result<String, String> {
        tracing::info!(
            content_len = params.content.len(),
            tier = ?params.tier,
            "store_memory called"
        );
        let timeout = params.timeout_ms.map(Duration::from_millis);

        match params.tier {
            None | Some(2) => {
                let response = self
                    .coordinator
                    .store_memory(&params.content, params.metadata, timeout)
                    .await
                    .map_err(|e| e.to_string())?;
                to_json(&response)
            }
            Some(tier) => {
                let response = self
                    .coordinator
                    .store_memory_tier(tier, &params.content, params.metadata, timeout)
                    .await
                    .map_err(|e| e.to_string())?;
                to_json(&response)
            }
        }
    }

    #[tool(description = "Search memories by natural language query. Returns the most similar memories plus tools relevant to the same query.")]
    async fn query_memory(
        &self,
        Parameters(params): Parameters<QueryMemoryParams>,
    ) -> Result<String, String> {
        tracing::info!(query = %params.query, top_k = ?params.top_k, "query_memory called");
        let response = self
            .coordinator
            .query_memory(
                &params.query,
                params.top_k,
                params.timeout_ms.map(Duration::from_millis),
            )
            .await
            .map_err(|e| e.to_string())?;
        to_json(&response)
    }

    #[tool(description = "Fetch a stored memory by its numeric ID.")]
    async fn get_memory(
        &self,
        Parameters(params): Parameters<GetMemoryParams>,
    ) -> Result<String, String> {
        let memory = self
            .coordinator
            .get_memory(params.id)
            .await
            .map_err(|e| e.to_string())?;
        to_json(&memory)
    }

    #[tool(description = "Fetch a tier-1 working memory by the key store_memory returned. Working memories expire after a few minutes.")]
    async fn get_working_memory(
        &self,
        Parameters(params): Parameters<GetWorkingMemoryParams>,
    ) -> Result<String, String> {
        let memory = self
            .coordinator
            .get_working_memory(&params.key)
            .map_err(|e| e.to_string())?;
        to_json(&memory)
    }

    #[tool(description = "Merge keys into a memory's metadata. A null value removes the key.")]
    async fn patch_memory_metadata(
        &self,
        Parameters(params): Parameters<PatchMemoryMetadataParams>,
    ) -> Result<String, String> {
        tracing::info!(id = params.id, "patch_memory_metadata called");
        let memory = self
            .coordinator
            .patch_metadata(params.id, params.patch)
            .await
            .map_err(|e| e.to_string())?;
        to_json(&memory)
    }

    #[tool(description = "Keyword search over memory content. Every word must appear; results are ordered by text relevance.")]
    async fn search_memory_text(
        &self,
        Parameters(params): Parameters<SearchMemoryTextParams>,
    ) -> Result<String, String> {
        tracing::info!(query = %params.query, "search_memory_text called");
        let memories = self
            .coordinator
            .search_memories_text(&params.query, params.limit)
            .await
            .map_err(|e| e.to_string())?;
        to_json(&memories)
    }

    #[tool(description = "Nodes directly connected to a graph node, with the relationship type and direction of each edge.")]
    async fn related_nodes(
        &self,
        Parameters(params): Parameters<RelatedNodesParams>,
    ) -> Result<String, String> {
        let label = parse_label(&params.label)?;
        let rel_type = params.rel_type.as_deref().map(parse_rel).transpose()?;
        let neighbors = self
            .coordinator
            .related_nodes(label, &params.key, rel_type)
            .await
            .map_err(|e| e.to_string())?;
        to_json(&neighbors)
    }

    #[tool(description = "The neighbourhood of a graph node: every node within the given number of hops and the edges among them.")]
    async fn graph_subgraph(
        &self,
        Parameters(params): Parameters<SubgraphParams>,
    ) -> Result<String, String> {
        let label = parse_label(&params.label)?;
        let subgraph = self
            .coordinator
            .subgraph(label, &params.key, params.depth.unwrap_or(1))
            .await
            .map_err(|e| e.to_string())?;
        to_json(&subgraph)
    }

    #[tool(description = "Shortest path between two graph nodes, following edges in either direction. Returns the nodes and edges in walk order.")]
    async fn shortest_path(
        &self,
        Parameters(params): Parameters<ShortestPathParams>,
    ) -> Result<String, String> {
        let from = parse_label(&params.from_label)?;
        let to = parse_label(&params.to_label)?;
        let path = self
            .coordinator
            .shortest_path(
                (from, &params.from_key),
                (to, &params.to_key),
                params.max_depth,
            )
            .await
            .map_err(|e| e.to_string())?;
        to_json(&path)
    }

    #[tool(description = "Register a tool so it can be discovered later. Registering an existing name updates it in place and keeps its ID.")]
    async fn register_tool(
        &self,
        Parameters(params): Parameters<RegisterToolParams>,
    ) -> Result<String, String> {
        tracing::info!(name = %params.name, "register_tool called");
        let tool = self
            .coordinator
            .register_tool(NewTool {
                name: params.name,
                description: params.description,
                usage: params.usage,
                tags: params.tags.unwrap_or_default(),
            })
            .await
            .map_err(|e| e.to_string())?;
        Ok(serde_json::json!({ "tool_id": tool.id }).to_string())
    }

    #[tool(description = "Find registered tools relevant to a task description, best match first.")]
    async fn search_tools(
        &self,
        Parameters(params): Parameters<SearchToolsParams>,
    ) -> Result<String, String> {
        tracing::info!(context = %params.context, "search_tools called");
        let matches = self
            .coordinator
            .search_tools(&params.context, params.limit)
            .await
            .map_err(|e| e.to_string())?;

        let tools: Vec<serde_json::Value> = matches
            .into_iter()
            .map(|m| {
                serde_json::json!({
                    "id": m.tool.id,
                    "name": m.tool.name,
                    "description": m.tool.description,
                    "usage": m.tool.usage,
                    "tags": m.tool.tags,
                    "score": m.score,
                })
            })
            .collect();
        to_json(&tools)
    }

    #[tool(description = "Fetch a registered tool by its numeric ID.")]
    async fn get_tool(
        &self,
        Parameters(params): Parameters<GetToolParams>,
    ) -> Result<String, String> {
        let tool = self
            .coordinator
            .get_tool(params.id)
            .await
            .map_err(|e| e.to_string())?;
        to_json(&tool)
    }

    #[tool(description = "Every registered tool, ordered by name.")]
    async fn list_registered_tools(&self) -> Result<String, String> {
        let tools = self
            .coordinator
            .list_tools()
            .await
            .map_err(|e| e.to_string())?;
        to_json(&tools)
    }

    #[tool(description = "Cache hit/miss counters and current entry count.")]
    async fn cache_stats(&self) -> Result<String, String> {
        to_json(&self.coordinator.cache_stats())
    }

    #[tool(description = "Drop every cache entry and reset the hit/miss counters.")]
    async fn cache_clear(&self) -> Result<String, String> {
        let cleared = self.coordinator.cache_clear();
        Ok(serde_json::json!({ "cleared": cleared }).to_string())
    }

    #[tool(description = "Reachability of the structured, vector and graph stores and the cache, plus the active embedding model.")]
    async fn health(&self) -> Result<String, String> {
        to_json(&self.coordinator.health().await)
    }
}

#[tool_handler]
impl ServerHandler for MemosTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "memos is a multi-tier memory server. Use store_memory to save memories, \
                 query_memory to recall them by meaning or search_memory_text by keyword, \
                 related_nodes / graph_subgraph / shortest_path to explore the concept graph, \
                 and register_tool / search_tools to publish and discover tools."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
