use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PatchMemoryMetadataParams {
    #[schemars(description = "Numeric ID of the memory to update")]
    pub id: i64,

    #[schemars(
        description = "JSON object merged into the existing metadata. A null value removes that key."
    )]
    pub patch: serde_json::Value,
}
