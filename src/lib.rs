//! Multi-tier memory for AI agents, served over MCP.
//!
//! memos keeps every memory in three independent stores and coordinates
//! writes and reads across them:
//!
//! | Tier | Store | Role |
//! |------|-------|------|
//! | Structured | `memos.db` (SQLite + FTS5) | Authoritative memory records and the tool registry |
//! | Vector | `vectors.db` ([sqlite-vec](https://github.com/asg017/sqlite-vec)) | Similarity search over embeddings |
//! | Graph | `graph.db` (SQLite) | Concepts mentioned by memories, tools, agents |
//!
//! A short-lived in-process cache ([`moka`]) sits in front of embeddings,
//! query results and tool discovery, and doubles as tier 1 working memory.
//!
//! The structured store is the source of truth. If the vector or graph store
//! is unavailable a write still succeeds and reports the degraded tier in its
//! response; `memos backfill` repairs missing vectors later.
//!
//! # Modules
//!
//! - [`config`]: configuration from TOML and environment variables
//! - [`db`]: SQLite connections, per-file schema and health checks
//! - [`embedding`]: text-to-vector providers (feature hashing, remote HTTP)
//! - [`store`]: async storage traits and their SQLite adapters
//! - [`cache`]: namespaced cache layer with hit/miss counters
//! - [`memory`]: the coordinator, tool registry and concept extraction
//! - [`tools`]: MCP tool handlers
//! - [`server`]: wiring and transports

pub mod cache;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod server;
pub mod store;
pub mod tools;
