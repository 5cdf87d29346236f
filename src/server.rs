//! MCP server initialization for stdio and streamable HTTP transports.
//!
//! [`build_coordinator`] wires the three store files, the embedding provider
//! and the cache into one [`MemoryCoordinator`]; [`serve_stdio`] and
//! [`serve_http`] put the MCP tool handler in front of it.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::ServiceExt;
use rusqlite::Connection;

use crate::cache::CacheLayer;
use crate::config::MemosConfig;
use crate::db::{self, schema};
use crate::embedding::{self, EmbeddingProvider};
use crate::memory::coordinator::{MemoryCoordinator, Stores};
use crate::store::graph::SqliteGraphStore;
use crate::store::structured::{SqliteMemoryStore, SqliteToolStore};
use crate::store::vector::SqliteVectorStore;

/// Open `memos.db`, `vectors.db` and `graph.db` under the data dir and build
/// the coordinator over them.
pub fn build_coordinator(config: MemosConfig) -> Result<Arc<MemoryCoordinator>> {
    let structured = db::open_database(config.structured_db_path())?;
    let vectors = db::open_database(config.vector_db_path())?;
    let graph = db::open_database(config.graph_db_path())?;
    tracing::info!(data_dir = %config.resolved_data_dir().display(), "databases ready");
    assemble(config, structured, vectors, graph)
}

/// Same wiring over throwaway in-memory databases.
pub fn build_in_memory(config: MemosConfig) -> Result<Arc<MemoryCoordinator>> {
    assemble(
        config,
        db::open_memory_database()?,
        db::open_memory_database()?,
        db::open_memory_database()?,
    )
}

fn assemble(
    config: MemosConfig,
    structured: Connection,
    vectors: Connection,
    graph: Connection,
) -> Result<Arc<MemoryCoordinator>> {
    let embedding = embedding::create_provider(&config.embedding)?;
    tracing::info!(
        provider = %config.embedding.provider,
        model = %embedding.model(),
        dimensions = embedding.dimensions(),
        "embedding provider ready"
    );

    check_embedding_model(&vectors, &*embedding)?;

    let structured = db::shared(structured);
    let stores = Stores {
        memories: Arc::new(SqliteMemoryStore::new(Arc::clone(&structured))?),
        tools: Arc::new(SqliteToolStore::new(structured)?),
        vectors: Arc::new(SqliteVectorStore::new(
            db::shared(vectors),
            embedding.dimensions(),
        )?),
        graph: Arc::new(SqliteGraphStore::new(db::shared(graph))?),
    };

    let cache = Arc::new(CacheLayer::from_config(&config.cache));
    Ok(Arc::new(MemoryCoordinator::new(
        stores,
        embedding,
        cache,
        Arc::new(config),
    )))
}

/// Record the model on first use; warn when the configured one differs from
/// the model that produced the stored vectors.
fn check_embedding_model(vectors: &Connection, provider: &dyn EmbeddingProvider) -> Result<()> {
    match schema::get_embedding_model(vectors).context("failed to read embedding model")? {
        Some(stored) if stored != provider.model() => {
            tracing::warn!(
                stored = %stored,
                configured = %provider.model(),
                "embedding model changed; similarity against existing vectors will be unreliable"
            );
        }
        Some(_) => {}
        None => schema::set_embedding_model(vectors, provider.model())
            .context("failed to record embedding model")?,
    }
    Ok(())
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: MemosConfig) -> Result<()> {
    tracing::info!("starting memos MCP server on stdio");

    let coordinator = build_coordinator(config)?;
    let tools = crate::tools::MemosTools::new(coordinator);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over streamable HTTP at `/mcp`.
pub async fn serve_http(config: MemosConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting memos MCP server on HTTP");

    let coordinator = build_coordinator(config)?;

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(crate::tools::MemosTools::new(Arc::clone(&coordinator))),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                return;
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
