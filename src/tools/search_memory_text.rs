use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchMemoryTextParams {
    #[schemars(description = "Keywords that must all appear in the memory content")]
    pub query: String,

    #[schemars(description = "Maximum number of memories to return. Defaults to 5.")]
    pub limit: Option<usize>,
}
