use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StoreMemoryParams {
    #[schemars(description = "The natural language content of the memory")]
    pub content: String,

    #[schemars(description = "Optional JSON object of metadata attached to the memory")]
    pub metadata: Option<serde_json::Value>,

    #[schemars(
        description = "Storage tier: 1 (working memory, cache only, expires after a few minutes), 2 (full pipeline: structured + vector + graph), 3 (graph only). Defaults to 2."
    )]
    pub tier: Option<u8>,

    #[schemars(description = "Optional per-step timeout in milliseconds for this request")]
    pub timeout_ms: Option<u64>,
}
