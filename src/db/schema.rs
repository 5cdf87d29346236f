//! SQL DDL for the three store files.
//!
//! `memos.db` holds `memories`, `memories_fts` (FTS5) and `registered_tools`;
//! `vectors.db` holds `memory_vectors` (vec0) plus its payload table;
//! `graph.db` holds `graph_nodes` and `graph_edges`. Every file also carries a
//! `schema_meta` key/value table. All DDL uses `IF NOT EXISTS`.

use rusqlite::{Connection, OptionalExtension};

/// Schema version written into `schema_meta` of every store file.
pub const SCHEMA_VERSION: u32 = 1;

const META_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const STRUCTURED_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    embedding_ref TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_embedding_ref ON memories(embedding_ref);

CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    content,
    memory_id UNINDEXED
);

CREATE TABLE IF NOT EXISTS registered_tools (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    usage TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_registered_tools_name ON registered_tools(name);
"#;

const GRAPH_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS graph_nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL CHECK(label IN ('Memory','Concept','Tool','Agent')),
    key TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    UNIQUE(label, key)
);

CREATE TABLE IF NOT EXISTS graph_edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_id INTEGER NOT NULL REFERENCES graph_nodes(id) ON DELETE CASCADE,
    rel_type TEXT NOT NULL CHECK(rel_type IN ('MENTIONS','RELATED_TO','USES','CREATED_BY')),
    to_id INTEGER NOT NULL REFERENCES graph_nodes(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    UNIQUE(from_id, rel_type, to_id)
);

CREATE INDEX IF NOT EXISTS idx_graph_edges_from ON graph_edges(from_id);
CREATE INDEX IF NOT EXISTS idx_graph_edges_to ON graph_edges(to_id);
"#;

/// vec0 virtual table must be created separately (sqlite-vec syntax); its
/// dimension is fixed at creation time.
fn vector_sql(dimensions: usize) -> String {
    format!(
        r#"
CREATE VIRTUAL TABLE IF NOT EXISTS memory_vectors USING vec0(
    point_id TEXT PRIMARY KEY,
    embedding FLOAT[{dimensions}]
);

CREATE TABLE IF NOT EXISTS vector_payloads (
    point_id TEXT PRIMARY KEY,
    memory_id INTEGER NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{{}}'
);

CREATE INDEX IF NOT EXISTS idx_vector_payloads_memory ON vector_payloads(memory_id);
"#
    )
}

/// Create `schema_meta` and record the schema version. Idempotent.
pub fn init_meta(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(META_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

pub fn init_structured(conn: &Connection) -> rusqlite::Result<()> {
    init_meta(conn)?;
    conn.execute_batch(STRUCTURED_SQL)
}

pub fn init_vector(conn: &Connection, dimensions: usize) -> rusqlite::Result<()> {
    init_meta(conn)?;
    conn.execute_batch(&vector_sql(dimensions))?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('dimensions', ?1)",
        [dimensions.to_string()],
    )?;
    Ok(())
}

pub fn init_graph(conn: &Connection) -> rusqlite::Result<()> {
    init_meta(conn)?;
    conn.execute_batch(GRAPH_SQL)
}

pub fn get_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = ?1",
        [key],
        |row| row.get::<_, String>(0),
    )
    .optional()
}

pub fn set_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    Ok(get_meta(conn, "schema_version")?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

/// Model identifier the stored vectors were produced with, if recorded.
pub fn get_embedding_model(conn: &Connection) -> rusqlite::Result<Option<String>> {
    get_meta(conn, "embedding_model")
}

pub fn set_embedding_model(conn: &Connection, model: &str) -> rusqlite::Result<()> {
    set_meta(conn, "embedding_model", model)
}
