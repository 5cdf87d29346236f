//! Vector store: sqlite-vec `vec0` table plus a payload side table in `vectors.db`.
//!
//! Stored vectors are unit length, so cosine similarity is recovered from the
//! L2 distance sqlite-vec reports as `1 - d² / 2`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::db::{self, schema, SharedConnection};
use crate::memory::types::{Metadata, VectorHit, VectorPayload, VectorRecord};
use crate::store::structured::{json_column, placeholders};
use crate::store::VectorStore;

pub struct SqliteVectorStore {
    db: SharedConnection,
    dimensions: usize,
}

impl SqliteVectorStore {
    /// Wrap a `vectors.db` connection. The vec0 dimension is fixed on first
    /// creation; reopening with another dimension is an error.
    pub fn new(db: SharedConnection, dimensions: usize) -> Result<Self> {
        {
            let conn = db.lock().map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            schema::init_vector(&conn, dimensions).context("failed to initialize vector schema")?;
            if let Some(stored) = schema::get_meta(&conn, "dimensions")? {
                anyhow::ensure!(
                    stored == dimensions.to_string(),
                    "vector store was created with {stored} dimensions, configured {dimensions}"
                );
            }
        }
        Ok(Self { db, dimensions })
    }
}

/// Convert an f32 embedding slice to the little-endian blob sqlite-vec expects.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity of two unit vectors from their L2 distance.
pub fn distance_to_score(distance: f64) -> f32 {
    (1.0 - distance * distance / 2.0) as f32
}

pub fn upsert_point(conn: &mut Connection, record: &VectorRecord, dimensions: usize) -> Result<()> {
    anyhow::ensure!(
        record.vector.len() == dimensions,
        "vector has {} dimensions, expected {dimensions}",
        record.vector.len()
    );
    let metadata = serde_json::to_string(&record.payload.metadata)?;

    // vec0 has no upsert; replace inside one transaction.
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM memory_vectors WHERE point_id = ?1", [&record.point_id])?;
    tx.execute(
        "INSERT INTO memory_vectors (point_id, embedding) VALUES (?1, ?2)",
        params![record.point_id, embedding_to_bytes(&record.vector)],
    )?;
    tx.execute(
        "INSERT OR REPLACE INTO vector_payloads (point_id, memory_id, metadata) VALUES (?1, ?2, ?3)",
        params![record.point_id, record.payload.memory_id, metadata],
    )?;
    tx.commit()?;
    Ok(())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<VectorRecord> {
    let blob: Vec<u8> = row.get(1)?;
    let metadata: String = row.get(3)?;
    Ok(VectorRecord {
        point_id: row.get(0)?,
        vector: bytes_to_embedding(&blob),
        payload: VectorPayload {
            memory_id: row.get(2)?,
            metadata: json_column(3, &metadata)?,
        },
    })
}

pub fn get_point(conn: &Connection, point_id: &str) -> Result<Option<VectorRecord>> {
    let record = conn
        .query_row(
            "SELECT v.point_id, v.embedding, p.memory_id, p.metadata
             FROM memory_vectors v JOIN vector_payloads p ON p.point_id = v.point_id
             WHERE v.point_id = ?1",
            [point_id],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

pub fn get_points(conn: &Connection, point_ids: &[String]) -> Result<Vec<VectorRecord>> {
    if point_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT v.point_id, v.embedding, p.memory_id, p.metadata
         FROM memory_vectors v JOIN vector_payloads p ON p.point_id = v.point_id
         WHERE v.point_id IN ({})",
        placeholders(point_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params_from_iter(point_ids.iter()), row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

pub fn delete_point(conn: &mut Connection, point_id: &str) -> Result<bool> {
    let tx = conn.transaction()?;
    let deleted = tx.execute("DELETE FROM memory_vectors WHERE point_id = ?1", [point_id])?;
    tx.execute("DELETE FROM vector_payloads WHERE point_id = ?1", [point_id])?;
    tx.commit()?;
    Ok(deleted > 0)
}

/// KNN search, best first, scores below `score_threshold` dropped.
pub fn search_points(
    conn: &Connection,
    vector: &[f32],
    limit: usize,
    score_threshold: f32,
) -> Result<Vec<VectorHit>> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(
        "SELECT point_id, distance FROM memory_vectors
         WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
    )?;
    let neighbours = stmt
        .query_map(params![embedding_to_bytes(vector), limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut payload_stmt =
        conn.prepare("SELECT memory_id, metadata FROM vector_payloads WHERE point_id = ?1")?;
    let mut hits = Vec::with_capacity(neighbours.len());
    for (point_id, distance) in neighbours {
        let score = distance_to_score(distance);
        if score < score_threshold {
            continue;
        }
        let payload = payload_stmt
            .query_row([&point_id], |row| {
                let metadata: String = row.get(1)?;
                Ok(VectorPayload {
                    memory_id: row.get(0)?,
                    metadata: json_column::<Metadata>(1, &metadata)?,
                })
            })
            .optional()?;
        match payload {
            Some(payload) => hits.push(VectorHit {
                point_id,
                score,
                payload,
            }),
            None => tracing::debug!(point_id = %point_id, "vector without payload skipped"),
        }
    }
    Ok(hits)
}

pub fn count_points(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM vector_payloads", [], |r| r.get(0))?;
    Ok(count as u64)
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn put(&self, record: &VectorRecord) -> Result<()> {
        let record = record.clone();
        let dimensions = self.dimensions;
        db::with_conn(&self.db, move |conn| upsert_point(conn, &record, dimensions)).await
    }

    async fn get(&self, point_id: &str) -> Result<Option<VectorRecord>> {
        let point_id = point_id.to_string();
        db::with_conn(&self.db, move |conn| get_point(conn, &point_id)).await
    }

    async fn get_many(&self, point_ids: &[String]) -> Result<Vec<VectorRecord>> {
        let point_ids = point_ids.to_vec();
        db::with_conn(&self.db, move |conn| get_points(conn, &point_ids)).await
    }

    async fn delete(&self, point_id: &str) -> Result<bool> {
        let point_id = point_id.to_string();
        db::with_conn(&self.db, move |conn| delete_point(conn, &point_id)).await
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<VectorHit>> {
        let vector = vector.to_vec();
        db::with_conn(&self.db, move |conn| {
            search_points(conn, &vector, limit, score_threshold)
        })
        .await
    }

    async fn count(&self) -> Result<u64> {
        db::with_conn(&self.db, |conn| count_points(conn)).await
    }

    async fn ping(&self) -> Result<()> {
        db::with_conn(&self.db, |conn| {
            conn.query_row("SELECT vec_version()", [], |r| r.get::<_, String>(0))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIMS: usize = 8;

    fn test_db() -> Connection {
        let conn = db::open_memory_database().unwrap();
        schema::init_vector(&conn, DIMS).unwrap();
        conn
    }

    fn unit(index: usize) -> Vec<f32> {
        let mut v = vec![0.0; DIMS];
        v[index] = 1.0;
        v
    }

    fn record(point_id: &str, memory_id: i64, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            point_id: point_id.into(),
            vector,
            payload: VectorPayload {
                memory_id,
                metadata: Metadata::new(),
            },
        }
    }

    #[test]
    fn blob_round_trip() {
        let v = vec![0.25f32, -1.5, 3.0];
        assert_eq!(bytes_to_embedding(&embedding_to_bytes(&v)), v);
    }

    #[test]
    fn distance_maps_to_cosine() {
        assert!((distance_to_score(0.0) - 1.0).abs() < 1e-6);
        assert!(distance_to_score(std::f64::consts::SQRT_2).abs() < 1e-6);
        assert!((distance_to_score(2.0) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn search_orders_by_similarity_and_applies_threshold() {
        let mut conn = test_db();
        upsert_point(&mut conn, &record("a", 1, unit(0)), DIMS).unwrap();
        upsert_point(&mut conn, &record("b", 2, unit(1)), DIMS).unwrap();

        let mut query = vec![0.0; DIMS];
        query[0] = 0.8;
        query[1] = 0.6;

        let hits = search_points(&conn, &query, 10, 0.1).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].payload.memory_id, 1);
        assert!((hits[0].score - 0.8).abs() < 1e-4);
        assert!(hits[0].score >= hits[1].score);

        let strict = search_points(&conn, &query, 10, 0.7).unwrap();
        assert_eq!(strict.len(), 1);
        assert_eq!(strict[0].point_id, "a");
    }

    #[test]
    fn upsert_replaces_existing_point() {
        let mut conn = test_db();
        upsert_point(&mut conn, &record("a", 1, unit(0)), DIMS).unwrap();
        upsert_point(&mut conn, &record("a", 1, unit(3)), DIMS).unwrap();

        assert_eq!(count_points(&conn).unwrap(), 1);
        assert_eq!(get_point(&conn, "a").unwrap().unwrap().vector, unit(3));
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let mut conn = test_db();
        assert!(upsert_point(&mut conn, &record("a", 1, vec![1.0; 3]), DIMS).is_err());
    }

    #[test]
    fn delete_removes_point_and_payload() {
        let mut conn = test_db();
        upsert_point(&mut conn, &record("a", 1, unit(0)), DIMS).unwrap();
        assert!(delete_point(&mut conn, "a").unwrap());
        assert!(get_point(&conn, "a").unwrap().is_none());
        assert!(get_points(&conn, &["a".into()]).unwrap().is_empty());
        assert_eq!(count_points(&conn).unwrap(), 0);
    }

    #[test]
    fn reopening_with_other_dimensions_fails() {
        let shared = db::shared(db::open_memory_database().unwrap());
        SqliteVectorStore::new(shared.clone(), DIMS).unwrap();
        assert!(SqliteVectorStore::new(shared, DIMS * 2).is_err());
    }
}
