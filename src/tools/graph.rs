//! Params for the graph tools. Nodes are addressed by label and natural key:
//! a memory's key is its numeric ID, a concept's key is the concept name and a
//! tool's key is its name.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RelatedNodesParams {
    #[schemars(description = "Node label: memory, concept, tool or agent")]
    pub label: String,

    #[schemars(description = "Node key, e.g. a memory ID or a concept name")]
    pub key: String,

    #[schemars(description = "Only follow this relationship: MENTIONS, RELATED_TO, USES or CREATED_BY")]
    pub rel_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SubgraphParams {
    #[schemars(description = "Label of the central node: memory, concept, tool or agent")]
    pub label: String,

    #[schemars(description = "Key of the central node")]
    pub key: String,

    #[schemars(description = "Hops to expand from the central node, 0 to 5. Defaults to 1.")]
    pub depth: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ShortestPathParams {
    #[schemars(description = "Label of the start node")]
    pub from_label: String,

    #[schemars(description = "Key of the start node")]
    pub from_key: String,

    #[schemars(description = "Label of the end node")]
    pub to_label: String,

    #[schemars(description = "Key of the end node")]
    pub to_key: String,

    #[schemars(description = "Longest path to consider, in hops. Defaults to and is capped at 10.")]
    pub max_depth: Option<u32>,
}
