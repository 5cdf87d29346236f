use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchToolsParams {
    #[schemars(description = "Description of the task or need, e.g. 'I need to search online'")]
    pub context: String,

    #[schemars(description = "Maximum number of tools to return. Defaults to 5.")]
    pub limit: Option<usize>,
}
