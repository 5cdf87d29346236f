//! Tool registry and lexical tool discovery.
//!
//! Registration upserts by name. Discovery walks every candidate the tool
//! store's `LIKE` prefilter matches, page by page, and ranks them in process
//! with [`rank_tools`], keeping the best `limit` seen so far.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{map_storage, with_timeout};
use crate::cache::{CacheKind, CacheLayer};
use crate::error::{MemosError, Result};
use crate::memory::types::{
    normalize_tags, Metadata, NewTool, NodeLabel, NodeRef, RegisteredTool, ToolId,
};
use crate::store::{GraphStore, ToolStore};

/// Candidates pulled from the store per round trip while ranking.
const CANDIDATE_PAGE: usize = 500;

const TAG_WEIGHT: f32 = 3.0;
const NAME_WEIGHT: f32 = 2.0;
const DESCRIPTION_WEIGHT: f32 = 1.0;
const USAGE_WEIGHT: f32 = 0.5;
const PHRASE_WEIGHT: f32 = 2.0;

/// A ranked discovery result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMatch {
    pub tool: RegisteredTool,
    pub score: f32,
}

/// Lower-cased alphanumeric tokens of at least three characters, deduplicated.
pub fn context_terms(context: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for token in context
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
    {
        if !terms.iter().any(|t| t == token) {
            terms.push(token.to_string());
        }
    }
    terms
}

pub fn score_tool(tool: &RegisteredTool, terms: &[String], phrase: &str) -> f32 {
    let name = tool.name.to_lowercase();
    let name_tokens: Vec<&str> = name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let description = tool.description.to_lowercase();
    let usage = tool.usage.to_lowercase();

    let mut score = 0.0;
    for term in terms {
        if tool.tags.iter().any(|tag| tag == term) {
            score += TAG_WEIGHT;
        }
        if name_tokens.contains(&term.as_str()) {
            score += NAME_WEIGHT;
        }
        if description.contains(term.as_str()) {
            score += DESCRIPTION_WEIGHT;
        }
        if usage.contains(term.as_str()) {
            score += USAGE_WEIGHT;
        }
    }
    if !phrase.is_empty() && (description.contains(phrase) || usage.contains(phrase)) {
        score += PHRASE_WEIGHT;
    }
    score
}

/// Score, drop zero scores, order by score then recency then id, truncate.
pub fn rank_tools(context: &str, tools: Vec<RegisteredTool>, limit: usize) -> Vec<ToolMatch> {
    let terms = context_terms(context);
    let phrase = context.trim().to_lowercase();

    let mut ranked: Vec<ToolMatch> = tools
        .into_iter()
        .map(|tool| {
            let score = score_tool(&tool, &terms, &phrase);
            ToolMatch { tool, score }
        })
        .filter(|m| m.score > 0.0)
        .collect();

    sort_and_truncate(&mut ranked, limit);
    ranked
}

fn sort_and_truncate(ranked: &mut Vec<ToolMatch>, limit: usize) {
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.tool.updated_at.cmp(&a.tool.updated_at))
            .then_with(|| b.tool.id.cmp(&a.tool.id))
    });
    ranked.truncate(limit);
}

pub struct ToolRegistry {
    store: Arc<dyn ToolStore>,
    graph: Arc<dyn GraphStore>,
    cache: Arc<CacheLayer>,
    search_ttl: Duration,
    default_limit: usize,
    max_limit: usize,
    store_timeout: Duration,
    graph_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(
        store: Arc<dyn ToolStore>,
        graph: Arc<dyn GraphStore>,
        cache: Arc<CacheLayer>,
        config: &crate::config::MemosConfig,
    ) -> Self {
        Self {
            store,
            graph,
            cache,
            search_ttl: config.cache.tool_search_ttl(),
            default_limit: config.retrieval.tool_limit,
            max_limit: config.retrieval.max_top_k,
            store_timeout: Duration::from_millis(config.timeouts.structured_ms),
            graph_timeout: Duration::from_millis(config.timeouts.graph_ms),
        }
    }

    /// Register or update a tool by name.
    pub async fn register(&self, tool: NewTool) -> Result<RegisteredTool> {
        let name = tool.name.trim().to_string();
        if name.is_empty() {
            return Err(MemosError::Validation("tool name must not be empty".into()));
        }
        let tool = NewTool {
            name,
            tags: normalize_tags(&tool.tags),
            ..tool
        };

        let stored = with_timeout("tool store", self.store_timeout, self.store.put(&tool))
            .await
            .map_err(|e| map_tool_write_error(&tool.name, e))?;

        self.cache.invalidate(CacheKind::ToolSearch);
        self.cache.invalidate(CacheKind::Query);

        let mut properties = Metadata::new();
        properties.insert("name".into(), stored.name.clone().into());
        properties.insert("tool_id".into(), stored.id.into());
        let node = NodeRef::new(NodeLabel::Tool, stored.name.clone());
        if let Err(e) = with_timeout("graph", self.graph_timeout, self.graph.put_node(&node, &properties)).await {
            tracing::warn!(tool = %stored.name, error = %e, "tool graph mirror failed");
        }

        tracing::info!(tool_id = stored.id, name = %stored.name, "tool registered");
        Ok(stored)
    }

    /// Ranked discovery with cache-aside on `tools:<context, limit>`.
    pub async fn search(&self, context: &str, limit: Option<usize>) -> Result<Vec<ToolMatch>> {
        self.search_within(context, limit, self.store_timeout).await
    }

    /// [`search`](Self::search) with an explicit store timeout.
    pub async fn search_within(
        &self,
        context: &str,
        limit: Option<usize>,
        store_timeout: Duration,
    ) -> Result<Vec<ToolMatch>> {
        if context.trim().is_empty() {
            return Err(MemosError::Validation("context must not be empty".into()));
        }
        let limit = limit.unwrap_or(self.default_limit).min(self.max_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let key = self
            .cache
            .key(CacheKind::ToolSearch, &[context, &limit.to_string()]);
        if let Some(cached) = self.cache.get_json::<Vec<ToolMatch>>(&key) {
            return Ok(cached);
        }

        let generation = self.cache.generation(CacheKind::ToolSearch);
        let ranked = with_timeout(
            "tool store",
            store_timeout,
            self.rank_all_candidates(context, limit),
        )
        .await
        .map_err(map_storage)?;

        self.cache.set_json_if_current(
            &key,
            &ranked,
            self.search_ttl,
            CacheKind::ToolSearch,
            generation,
        );
        Ok(ranked)
    }

    async fn rank_all_candidates(&self, context: &str, limit: usize) -> anyhow::Result<Vec<ToolMatch>> {
        let mut patterns = context_terms(context);
        patterns.push(context.trim().to_lowercase());

        let mut best: Vec<ToolMatch> = Vec::new();
        let mut after: ToolId = 0;
        loop {
            let page = self.store.search(&patterns, after, CANDIDATE_PAGE).await?;
            let Some(last) = page.last() else { break };
            after = last.id;
            let full_page = page.len() == CANDIDATE_PAGE;

            best.extend(rank_tools(context, page, limit));
            sort_and_truncate(&mut best, limit);
            if !full_page {
                break;
            }
        }
        Ok(best)
    }

    pub async fn get(&self, id: ToolId) -> Result<RegisteredTool> {
        with_timeout("tool store", self.store_timeout, self.store.get(id))
            .await
            .map_err(map_storage)?
            .ok_or_else(|| MemosError::NotFound(format!("tool {id}")))
    }

    pub async fn list(&self) -> Result<Vec<RegisteredTool>> {
        with_timeout("tool store", self.store_timeout, self.store.list())
            .await
            .map_err(map_storage)
    }
}

/// A UNIQUE violation that survives the upsert means a concurrent writer won
/// the race for this name.
fn map_tool_write_error(name: &str, err: anyhow::Error) -> MemosError {
    let unique_violation = err
        .downcast_ref::<rusqlite::Error>()
        .and_then(|e| e.sqlite_error_code())
        .is_some_and(|code| code == rusqlite::ErrorCode::ConstraintViolation);
    if unique_violation {
        MemosError::DuplicateName(name.to_string())
    } else {
        map_storage(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(id: ToolId, name: &str, description: &str, usage: &str, tags: &[&str]) -> RegisteredTool {
        RegisteredTool {
            id,
            name: name.into(),
            description: description.into(),
            usage: usage.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            created_at: "2026-01-01T00:00:00.000000Z".into(),
            updated_at: "2026-01-01T00:00:00.000000Z".into(),
        }
    }

    #[test]
    fn context_terms_skip_short_tokens() {
        assert_eq!(
            context_terms("I need to search online, search!"),
            vec!["need", "search", "online"]
        );
    }

    #[test]
    fn web_search_scores_tag_name_and_description() {
        let web = tool(1, "web_search", "Searches the web", "call with a query string", &["search", "web"]);
        let terms = context_terms("I need to search online");
        assert_eq!(score_tool(&web, &terms, "i need to search online"), 6.0);
    }

    #[test]
    fn ranking_puts_best_match_first() {
        let tools = vec![
            tool(1, "calculator", "Evaluate arithmetic", "calc(expr)", &["math"]),
            tool(2, "web_search", "Searches the web", "call with a query string", &["search", "web"]),
            tool(3, "file_search", "Find files on disk", "file_search(glob)", &["files"]),
        ];
        let ranked = rank_tools("I need to search online", tools, 3);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].tool.name, "web_search");
        assert_eq!(ranked[1].tool.name, "file_search");
    }

    #[test]
    fn phrase_match_adds_bonus() {
        let t = tool(1, "translator", "Translate text to french", "", &[]);
        let with_phrase = score_tool(&t, &context_terms("to french"), "to french");
        let without = score_tool(&t, &context_terms("french to"), "french to");
        assert_eq!(with_phrase - without, PHRASE_WEIGHT);
    }

    #[test]
    fn ties_break_on_recency_then_id() {
        let mut older = tool(1, "alpha", "search things", "", &[]);
        older.updated_at = "2026-01-01T00:00:00.000000Z".into();
        let mut newer = tool(2, "beta", "search things", "", &[]);
        newer.updated_at = "2026-02-01T00:00:00.000000Z".into();
        let same_time = tool(3, "gamma", "search things", "", &[]);

        let ranked = rank_tools("search", vec![older, same_time, newer], 10);
        let names: Vec<&str> = ranked.iter().map(|m| m.tool.name.as_str()).collect();
        assert_eq!(names, vec!["beta", "gamma", "alpha"]);
    }

    #[test]
    fn limit_truncates() {
        let tools = (1..=5)
            .map(|i| tool(i, &format!("search_{i}"), "search", "", &[]))
            .collect();
        assert_eq!(rank_tools("search", tools, 2).len(), 2);
    }
}
