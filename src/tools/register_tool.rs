use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RegisterToolParams {
    #[schemars(description = "Unique tool name. Registering an existing name updates that tool.")]
    pub name: String,

    #[schemars(description = "What the tool does")]
    pub description: String,

    #[schemars(description = "How to call the tool")]
    pub usage: String,

    #[schemars(description = "Optional tags used for discovery, e.g. ['search', 'web']")]
    pub tags: Option<Vec<String>>,
}
