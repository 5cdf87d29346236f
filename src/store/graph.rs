//! Graph store: `graph_nodes` and `graph_edges` in `graph.db`.
//!
//! Nodes are merged on `(label, key)` and edges on `(from, rel_type, to)`, so
//! replaying a write is a no-op. Deleting a node cascades to its edges.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::db::{self, schema, SharedConnection};
use crate::memory::types::{
    now_timestamp, Direction, GraphEdge, GraphLink, GraphNode, Metadata, Neighbor, NodeId,
    NodeLabel, NodeRef, RelType, Subgraph,
};
use crate::store::structured::{json_column, placeholders};
use crate::store::GraphStore;

pub struct SqliteGraphStore {
    db: SharedConnection,
}

impl SqliteGraphStore {
    pub fn new(db: SharedConnection) -> Result<Self> {
        {
            let conn = db.lock().map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            schema::init_graph(&conn).context("failed to initialize graph schema")?;
        }
        Ok(Self { db })
    }
}

fn parse_label(idx: usize, raw: &str) -> rusqlite::Result<NodeLabel> {
    raw.parse::<NodeLabel>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn parse_rel(idx: usize, raw: &str) -> rusqlite::Result<RelType> {
    raw.parse::<RelType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn row_to_link(row: &Row<'_>) -> rusqlite::Result<GraphLink> {
    let rel: String = row.get(1)?;
    Ok(GraphLink {
        from_id: row.get(0)?,
        rel_type: parse_rel(1, &rel)?,
        to_id: row.get(2)?,
    })
}

fn row_to_node(row: &Row<'_>) -> rusqlite::Result<GraphNode> {
    let label: String = row.get(1)?;
    let properties: String = row.get(3)?;
    Ok(GraphNode {
        id: row.get(0)?,
        label: parse_label(1, &label)?,
        key: row.get(2)?,
        properties: json_column(3, &properties)?,
        created_at: row.get(4)?,
    })
}

/// Merge a node; properties are patched key by key onto any existing ones.
pub fn upsert_node(conn: &Connection, node: &NodeRef, properties: &Metadata) -> Result<GraphNode> {
    let stored = conn.query_row(
        "INSERT INTO graph_nodes (label, key, properties, created_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(label, key) DO UPDATE SET
             properties = json_patch(graph_nodes.properties, excluded.properties)
         RETURNING id, label, key, properties, created_at",
        params![
            node.label.as_str(),
            node.key,
            serde_json::to_string(properties)?,
            now_timestamp()
        ],
        row_to_node,
    )?;
    Ok(stored)
}

fn node_id(conn: &Connection, node: &NodeRef) -> Result<Option<NodeId>> {
    let id = conn
        .query_row(
            "SELECT id FROM graph_nodes WHERE label = ?1 AND key = ?2",
            params![node.label.as_str(), node.key],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Merge an edge between two existing nodes. Returns `true` if it was new.
pub fn upsert_edge(conn: &Connection, edge: &GraphEdge) -> Result<bool> {
    let from = node_id(conn, &edge.from)?
        .with_context(|| format!("node {}:{} not found", edge.from.label, edge.from.key))?;
    let to = node_id(conn, &edge.to)?
        .with_context(|| format!("node {}:{} not found", edge.to.label, edge.to.key))?;

    let inserted = conn.execute(
        "INSERT OR IGNORE INTO graph_edges (from_id, rel_type, to_id, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![from, edge.rel_type.as_str(), to, now_timestamp()],
    )?;
    Ok(inserted > 0)
}

/// Merge nodes, then edges, in a single transaction.
pub fn merge_subgraph(
    conn: &mut Connection,
    nodes: &[(NodeRef, Metadata)],
    edges: &[GraphEdge],
) -> Result<()> {
    let tx = conn.transaction()?;
    for (node, properties) in nodes {
        upsert_node(&tx, node, properties)?;
    }
    for edge in edges {
        upsert_edge(&tx, edge)?;
    }
    tx.commit()?;
    Ok(())
}

pub fn get_node(conn: &Connection, node: &NodeRef) -> Result<Option<GraphNode>> {
    let found = conn
        .query_row(
            "SELECT id, label, key, properties, created_at FROM graph_nodes
             WHERE label = ?1 AND key = ?2",
            params![node.label.as_str(), node.key],
            row_to_node,
        )
        .optional()?;
    Ok(found)
}

pub fn delete_node(conn: &Connection, node: &NodeRef) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM graph_nodes WHERE label = ?1 AND key = ?2",
        params![node.label.as_str(), node.key],
    )?;
    Ok(deleted > 0)
}

/// Adjacent nodes in both directions, optionally filtered by relationship type.
pub fn neighbors(conn: &Connection, node: &NodeRef, rel_type: Option<RelType>) -> Result<Vec<Neighbor>> {
    let Some(id) = node_id(conn, node)? else {
        return Ok(Vec::new());
    };
    let rel = rel_type.map(|r| r.as_str());

    let mut stmt = conn.prepare(
        "SELECT e.rel_type, 'outgoing', n.id, n.label, n.key, n.properties, n.created_at
         FROM graph_edges e JOIN graph_nodes n ON n.id = e.to_id
         WHERE e.from_id = ?1 AND (?2 IS NULL OR e.rel_type = ?2)
         UNION ALL
         SELECT e.rel_type, 'incoming', n.id, n.label, n.key, n.properties, n.created_at
         FROM graph_edges e JOIN graph_nodes n ON n.id = e.from_id
         WHERE e.to_id = ?1 AND (?2 IS NULL OR e.rel_type = ?2)
         ORDER BY 3",
    )?;
    let rows = stmt
        .query_map(params![id, rel], |row| {
            let rel: String = row.get(0)?;
            let direction: String = row.get(1)?;
            let label: String = row.get(3)?;
            let properties: String = row.get(5)?;
            let rel_type = parse_rel(0, &rel)?;
            Ok(Neighbor {
                rel_type,
                direction: if direction == "outgoing" {
                    Direction::Outgoing
                } else {
                    Direction::Incoming
                },
                node: GraphNode {
                    id: row.get(2)?,
                    label: parse_label(3, &label)?,
                    key: row.get(4)?,
                    properties: json_column(5, &properties)?,
                    created_at: row.get(6)?,
                },
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Hop distance from `start` to every node within `depth`, edges taken in
/// either direction.
pub fn distances(conn: &Connection, start: NodeId, depth: u32) -> Result<HashMap<NodeId, u32>> {
    let mut stmt = conn.prepare(
        "WITH RECURSIVE reach(id, depth) AS (
             SELECT ?1, 0
             UNION
             SELECT CASE WHEN e.from_id = r.id THEN e.to_id ELSE e.from_id END, r.depth + 1
             FROM reach r JOIN graph_edges e ON e.from_id = r.id OR e.to_id = r.id
             WHERE r.depth < ?2
         )
         SELECT id, MIN(depth) FROM reach GROUP BY id",
    )?;
    let rows = stmt
        .query_map(params![start, depth], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<HashMap<NodeId, u32>>>()?;
    Ok(rows)
}

fn nodes_by_id(conn: &Connection, ids: &[NodeId]) -> Result<Vec<GraphNode>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, label, key, properties, created_at FROM graph_nodes
         WHERE id IN ({}) ORDER BY id",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let nodes = stmt
        .query_map(params_from_iter(ids.iter()), row_to_node)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(nodes)
}

fn links_among(conn: &Connection, ids: &[NodeId]) -> Result<Vec<GraphLink>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let set = placeholders(ids.len());
    let sql = format!(
        "SELECT from_id, rel_type, to_id FROM graph_edges
         WHERE from_id IN ({set}) AND to_id IN ({set})
         ORDER BY from_id, to_id, rel_type"
    );
    let mut stmt = conn.prepare(&sql)?;
    let links = stmt
        .query_map(params_from_iter(ids.iter()), row_to_link)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(links)
}

/// Nodes within `depth` hops of `node` plus every edge among them.
pub fn subgraph(conn: &Connection, node: &NodeRef, depth: u32) -> Result<Option<Subgraph>> {
    let Some(start) = node_id(conn, node)? else {
        return Ok(None);
    };
    let mut ids: Vec<NodeId> = distances(conn, start, depth)?.into_keys().collect();
    ids.sort_unstable();
    Ok(Some(Subgraph {
        nodes: nodes_by_id(conn, &ids)?,
        edges: links_among(conn, &ids)?,
    }))
}

/// Breadth-first distances from `from`, then a walk back from `to` choosing
/// the lowest-id predecessor at each step.
pub fn shortest_path(
    conn: &Connection,
    from: &NodeRef,
    to: &NodeRef,
    max_depth: u32,
) -> Result<Option<Subgraph>> {
    let (Some(start), Some(end)) = (node_id(conn, from)?, node_id(conn, to)?) else {
        return Ok(None);
    };
    let dist = distances(conn, start, max_depth)?;
    let Some(&hops) = dist.get(&end) else {
        return Ok(None);
    };

    let mut step = conn.prepare(
        "SELECT from_id, rel_type, to_id FROM graph_edges
         WHERE from_id = ?1 OR to_id = ?1
         ORDER BY from_id, to_id, rel_type",
    )?;
    let mut ids = vec![end];
    let mut links = Vec::with_capacity(hops as usize);
    let mut current = end;
    for remaining in (0..hops).rev() {
        let candidates = step
            .query_map([current], row_to_link)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let (prev, link) = candidates
            .into_iter()
            .filter_map(|link| {
                let other = if link.from_id == current { link.to_id } else { link.from_id };
                (dist.get(&other) == Some(&remaining)).then_some((other, link))
            })
            .min_by_key(|(other, _)| *other)
            .context("graph changed during path search")?;
        ids.push(prev);
        links.push(link);
        current = prev;
    }
    ids.reverse();
    links.reverse();

    let mut by_id: HashMap<NodeId, GraphNode> = nodes_by_id(conn, &ids)?
        .into_iter()
        .map(|n| (n.id, n))
        .collect();
    let nodes = ids
        .iter()
        .map(|id| by_id.remove(id).context("graph changed during path search"))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(Subgraph { nodes, edges: links }))
}

pub fn count_graph(conn: &Connection) -> Result<(u64, u64)> {
    let nodes: i64 = conn.query_row("SELECT COUNT(*) FROM graph_nodes", [], |r| r.get(0))?;
    let edges: i64 = conn.query_row("SELECT COUNT(*) FROM graph_edges", [], |r| r.get(0))?;
    Ok((nodes as u64, edges as u64))
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn put_node(&self, node: &NodeRef, properties: &Metadata) -> Result<GraphNode> {
        let node = node.clone();
        let properties = properties.clone();
        db::with_conn(&self.db, move |conn| upsert_node(conn, &node, &properties)).await
    }

    async fn put_edge(&self, edge: &GraphEdge) -> Result<bool> {
        let edge = edge.clone();
        db::with_conn(&self.db, move |conn| upsert_edge(conn, &edge)).await
    }

    async fn merge(&self, nodes: &[(NodeRef, Metadata)], edges: &[GraphEdge]) -> Result<()> {
        let nodes = nodes.to_vec();
        let edges = edges.to_vec();
        db::with_conn(&self.db, move |conn| merge_subgraph(conn, &nodes, &edges)).await
    }

    async fn get(&self, node: &NodeRef) -> Result<Option<GraphNode>> {
        let node = node.clone();
        db::with_conn(&self.db, move |conn| get_node(conn, &node)).await
    }

    async fn get_many(&self, nodes: &[NodeRef]) -> Result<Vec<GraphNode>> {
        let nodes = nodes.to_vec();
        db::with_conn(&self.db, move |conn| {
            let mut found = Vec::with_capacity(nodes.len());
            for node in &nodes {
                if let Some(n) = get_node(conn, node)? {
                    found.push(n);
                }
            }
            Ok(found)
        })
        .await
    }

    async fn delete(&self, node: &NodeRef) -> Result<bool> {
        let node = node.clone();
        db::with_conn(&self.db, move |conn| delete_node(conn, &node)).await
    }

    async fn search(&self, node: &NodeRef, rel_type: Option<RelType>) -> Result<Vec<Neighbor>> {
        let node = node.clone();
        db::with_conn(&self.db, move |conn| neighbors(conn, &node, rel_type)).await
    }

    async fn subgraph(&self, node: &NodeRef, depth: u32) -> Result<Option<Subgraph>> {
        let node = node.clone();
        db::with_conn(&self.db, move |conn| subgraph(conn, &node, depth)).await
    }

    async fn shortest_path(
        &self,
        from: &NodeRef,
        to: &NodeRef,
        max_depth: u32,
    ) -> Result<Option<Subgraph>> {
        let (from, to) = (from.clone(), to.clone());
        db::with_conn(&self.db, move |conn| shortest_path(conn, &from, &to, max_depth)).await
    }

    async fn count(&self) -> Result<(u64, u64)> {
        db::with_conn(&self.db, |conn| count_graph(conn)).await
    }

    async fn ping(&self) -> Result<()> {
        db::with_conn(&self.db, |conn| {
            conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}
