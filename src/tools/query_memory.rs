//! MCP `query_memory` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `query_memory` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct QueryMemoryParams {
    /// Natural language query.
    #[schemars(description = "Natural language query to search memories and suggest tools")]
    pub query: String,

    /// Maximum memories to return. Defaults to 5, capped at 100.
    #[schemars(description = "Maximum number of memories to return (1-100). Defaults to 5.")]
    pub top_k: Option<usize>,

    #[schemars(description = "Optional per-step timeout in milliseconds for this request")]
    pub timeout_ms: Option<u64>,
}
