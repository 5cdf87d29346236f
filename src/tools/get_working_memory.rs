use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetWorkingMemoryParams {
    #[schemars(description = "Key returned by store_memory with tier 1")]
    pub key: String,
}
