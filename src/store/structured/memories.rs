//! `memories` table and its FTS5 index.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{json_column, placeholders};
use crate::db::{self, schema, SharedConnection};
use crate::memory::types::{now_timestamp, Memory, MemoryId, Metadata};
use crate::store::MemoryStore;

const MEMORY_COLUMNS: &str = "id, content, metadata, embedding_ref, created_at, updated_at";

pub struct SqliteMemoryStore {
    db: SharedConnection,
}

impl SqliteMemoryStore {
    /// Wrap a `memos.db` connection, creating the tables if needed.
    pub fn new(db: SharedConnection) -> Result<Self> {
        {
            let conn = db.lock().map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            schema::init_structured(&conn).context("failed to initialize structured schema")?;
        }
        Ok(Self { db })
    }
}

fn row_to_memory(row: &Row<'_>) -> rusqlite::Result<Memory> {
    let metadata: String = row.get(2)?;
    Ok(Memory {
        id: row.get(0)?,
        content: row.get(1)?,
        metadata: json_column(2, &metadata)?,
        embedding_ref: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn insert_memory(conn: &mut Connection, content: &str, metadata: &Metadata) -> Result<Memory> {
    let now = now_timestamp();
    let metadata_json = serde_json::to_string(metadata)?;

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO memories (content, metadata, embedding_ref, created_at, updated_at)
         VALUES (?1, ?2, NULL, ?3, ?3)",
        params![content, metadata_json, now],
    )?;
    let id = tx.last_insert_rowid();
    tx.execute(
        "INSERT INTO memories_fts (content, memory_id) VALUES (?1, ?2)",
        params![content, id],
    )?;
    tx.commit()?;

    Ok(Memory {
        id,
        content: content.to_string(),
        metadata: metadata.clone(),
        embedding_ref: None,
        created_at: now.clone(),
        updated_at: now,
    })
}

pub fn get_memory(conn: &Connection, id: MemoryId) -> Result<Option<Memory>> {
    let memory = conn
        .query_row(
            &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"),
            [id],
            row_to_memory,
        )
        .optional()?;
    Ok(memory)
}

pub fn get_memories(conn: &Connection, ids: &[MemoryId]) -> Result<Vec<Memory>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories WHERE id IN ({})",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let memories = stmt
        .query_map(params_from_iter(ids.iter()), row_to_memory)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(memories)
}

pub fn delete_memory(conn: &mut Connection, id: MemoryId) -> Result<bool> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM memories_fts WHERE memory_id = ?1", [id])?;
    let deleted = tx.execute("DELETE FROM memories WHERE id = ?1", [id])?;
    tx.commit()?;
    Ok(deleted > 0)
}

/// FTS5 keyword search, best rank first.
pub fn search_memories(conn: &Connection, query: &str, limit: usize) -> Result<Vec<Memory>> {
    let escaped = escape_fts_query(query);
    if escaped.is_empty() {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT m.id, m.content, m.metadata, m.embedding_ref, m.created_at, m.updated_at
         FROM memories_fts f JOIN memories m ON m.id = f.memory_id
         WHERE memories_fts MATCH ?1 ORDER BY f.rank LIMIT ?2",
    )?;
    let memories = stmt
        .query_map(params![escaped, limit as i64], row_to_memory)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(memories)
}

pub fn set_embedding_ref(conn: &Connection, id: MemoryId, point_id: &str) -> Result<()> {
    let updated = conn.execute(
        "UPDATE memories SET embedding_ref = ?1, updated_at = ?2 WHERE id = ?3",
        params![point_id, now_timestamp(), id],
    )?;
    if updated == 0 {
        bail!("memory {id} not found");
    }
    Ok(())
}

pub fn patch_metadata(
    conn: &mut Connection,
    id: MemoryId,
    patch: &Metadata,
) -> Result<Option<Memory>> {
    let tx = conn.transaction()?;
    let Some(mut memory) = get_memory(&tx, id)? else {
        return Ok(None);
    };

    for (key, value) in patch {
        if value.is_null() {
            memory.metadata.remove(key);
        } else {
            memory.metadata.insert(key.clone(), value.clone());
        }
    }
    memory.updated_at = now_timestamp();

    tx.execute(
        "UPDATE memories SET metadata = ?1, updated_at = ?2 WHERE id = ?3",
        params![
            serde_json::to_string(&memory.metadata)?,
            memory.updated_at,
            id
        ],
    )?;
    tx.commit()?;
    Ok(Some(memory))
}

pub fn list_unindexed(conn: &Connection, limit: usize) -> Result<Vec<Memory>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEMORY_COLUMNS} FROM memories WHERE embedding_ref IS NULL ORDER BY id LIMIT ?1"
    ))?;
    let memories = stmt
        .query_map([limit as i64], row_to_memory)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(memories)
}

pub fn count_memories(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
    Ok(count as u64)
}

/// Escape a user query for FTS5 MATCH syntax.
///
/// Wraps each whitespace-delimited word in double quotes so FTS5 treats them as
/// individual terms (implicit AND). Strips empty tokens.
fn escape_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| format!("\"{}\"", word.replace('"', "")))
        .filter(|w| w != "\"\"")
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn put(&self, content: &str, metadata: &Metadata) -> Result<Memory> {
        let content = content.to_string();
        let metadata = metadata.clone();
        db::with_conn(&self.db, move |conn| insert_memory(conn, &content, &metadata)).await
    }

    async fn get(&self, id: MemoryId) -> Result<Option<Memory>> {
        db::with_conn(&self.db, move |conn| get_memory(conn, id)).await
    }

    async fn get_many(&self, ids: &[MemoryId]) -> Result<Vec<Memory>> {
        let ids = ids.to_vec();
        db::with_conn(&self.db, move |conn| get_memories(conn, &ids)).await
    }

    async fn delete(&self, id: MemoryId) -> Result<bool> {
        db::with_conn(&self.db, move |conn| delete_memory(conn, id)).await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Memory>> {
        let query = query.to_string();
        db::with_conn(&self.db, move |conn| search_memories(conn, &query, limit)).await
    }

    async fn set_embedding_ref(&self, id: MemoryId, point_id: &str) -> Result<()> {
        let point_id = point_id.to_string();
        db::with_conn(&self.db, move |conn| set_embedding_ref(conn, id, &point_id)).await
    }

    async fn patch_metadata(&self, id: MemoryId, patch: &Metadata) -> Result<Option<Memory>> {
        let patch = patch.clone();
        db::with_conn(&self.db, move |conn| patch_metadata(conn, id, &patch)).await
    }

    async fn list_unindexed(&self, limit: usize) -> Result<Vec<Memory>> {
        db::with_conn(&self.db, move |conn| list_unindexed(conn, limit)).await
    }

    async fn count(&self) -> Result<u64> {
        db::with_conn(&self.db, |conn| count_memories(conn)).await
    }

    async fn ping(&self) -> Result<()> {
        db::with_conn(&self.db, |conn| {
            conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}
