//! `registered_tools` table.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{json_column, placeholders};
use crate::db::{self, schema, SharedConnection};
use crate::memory::types::{normalize_tags, now_timestamp, NewTool, RegisteredTool, ToolId};
use crate::store::ToolStore;

const TOOL_COLUMNS: &str = "id, name, description, usage, tags, created_at, updated_at";

pub struct SqliteToolStore {
    db: SharedConnection,
}

impl SqliteToolStore {
    pub fn new(db: SharedConnection) -> Result<Self> {
        {
            let conn = db.lock().map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            schema::init_structured(&conn).context("failed to initialize structured schema")?;
        }
        Ok(Self { db })
    }
}

fn row_to_tool(row: &Row<'_>) -> rusqlite::Result<RegisteredTool> {
    let tags: String = row.get(4)?;
    Ok(RegisteredTool {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        usage: row.get(3)?,
        tags: json_column(4, &tags)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Insert or update by name. The id and `created_at` of an existing row survive.
pub fn upsert_tool(conn: &Connection, tool: &NewTool) -> Result<RegisteredTool> {
    let now = now_timestamp();
    let tags = serde_json::to_string(&normalize_tags(&tool.tags))?;

    let stored = conn.query_row(
        &format!(
            "INSERT INTO registered_tools (name, description, usage, tags, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(name) DO UPDATE SET
                 description = excluded.description,
                 usage = excluded.usage,
                 tags = excluded.tags,
                 updated_at = excluded.updated_at
             RETURNING {TOOL_COLUMNS}"
        ),
        params![tool.name.trim(), tool.description, tool.usage, tags, now],
        row_to_tool,
    )?;
    Ok(stored)
}

pub fn get_tool(conn: &Connection, id: ToolId) -> Result<Option<RegisteredTool>> {
    let tool = conn
        .query_row(
            &format!("SELECT {TOOL_COLUMNS} FROM registered_tools WHERE id = ?1"),
            [id],
            row_to_tool,
        )
        .optional()?;
    Ok(tool)
}

pub fn get_tools(conn: &Connection, ids: &[ToolId]) -> Result<Vec<RegisteredTool>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {TOOL_COLUMNS} FROM registered_tools WHERE id IN ({})",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let tools = stmt
        .query_map(params_from_iter(ids.iter()), row_to_tool)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tools)
}

pub fn delete_tool(conn: &Connection, id: ToolId) -> Result<bool> {
    Ok(conn.execute("DELETE FROM registered_tools WHERE id = ?1", [id])? > 0)
}

/// Candidate retrieval for ranking: any pattern appearing in name, description,
/// usage or the tag list. Keyset-paged on id so callers can walk every match.
pub fn search_tools(
    conn: &Connection,
    patterns: &[String],
    after: ToolId,
    limit: usize,
) -> Result<Vec<RegisteredTool>> {
    let likes: Vec<String> = patterns
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .map(|p| format!("%{}%", escape_like(&p)))
        .collect();
    if likes.is_empty() {
        return Ok(Vec::new());
    }

    let clauses = (1..=likes.len())
        .map(|i| {
            format!(
                "(lower(name) LIKE ?{i} ESCAPE '\\' OR lower(description) LIKE ?{i} ESCAPE '\\' \
                 OR lower(usage) LIKE ?{i} ESCAPE '\\' OR tags LIKE ?{i} ESCAPE '\\')"
            )
        })
        .collect::<Vec<_>>()
        .join(" OR ");
    let after_idx = likes.len() + 1;
    let sql = format!(
        "SELECT {TOOL_COLUMNS} FROM registered_tools WHERE id > ?{after_idx} AND ({clauses})
         ORDER BY id LIMIT {}",
        limit.min(i64::MAX as usize)
    );

    let mut values: Vec<rusqlite::types::Value> = likes.into_iter().map(Into::into).collect();
    values.push(after.into());

    let mut stmt = conn.prepare(&sql)?;
    let tools = stmt
        .query_map(params_from_iter(values.iter()), row_to_tool)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tools)
}

pub fn list_tools(conn: &Connection) -> Result<Vec<RegisteredTool>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TOOL_COLUMNS} FROM registered_tools ORDER BY name"
    ))?;
    let tools = stmt
        .query_map([], row_to_tool)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tools)
}

pub fn count_tools(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM registered_tools", [], |r| r.get(0))?;
    Ok(count as u64)
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[async_trait]
impl ToolStore for SqliteToolStore {
    async fn put(&self, tool: &NewTool) -> Result<RegisteredTool> {
        let tool = tool.clone();
        db::with_conn(&self.db, move |conn| upsert_tool(conn, &tool)).await
    }

    async fn get(&self, id: ToolId) -> Result<Option<RegisteredTool>> {
        db::with_conn(&self.db, move |conn| get_tool(conn, id)).await
    }

    async fn get_many(&self, ids: &[ToolId]) -> Result<Vec<RegisteredTool>> {
        let ids = ids.to_vec();
        db::with_conn(&self.db, move |conn| get_tools(conn, &ids)).await
    }

    async fn delete(&self, id: ToolId) -> Result<bool> {
        db::with_conn(&self.db, move |conn| delete_tool(conn, id)).await
    }

    async fn search(
        &self,
        patterns: &[String],
        after: ToolId,
        limit: usize,
    ) -> Result<Vec<RegisteredTool>> {
        let patterns = patterns.to_vec();
        db::with_conn(&self.db, move |conn| search_tools(conn, &patterns, after, limit)).await
    }

    async fn list(&self) -> Result<Vec<RegisteredTool>> {
        db::with_conn(&self.db, |conn| list_tools(conn)).await
    }

    async fn count(&self) -> Result<u64> {
        db::with_conn(&self.db, |conn| count_tools(conn)).await
    }

    async fn ping(&self) -> Result<()> {
        db::with_conn(&self.db, |conn| {
            conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}
