use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetToolParams {
    #[schemars(description = "Numeric ID returned by register_tool")]
    pub id: i64,
}
