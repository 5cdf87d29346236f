mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use memos::config::MemosConfig;
use memos::server;

#[derive(Parser)]
#[command(name = "memos", version, about = "Multi-tier memory MCP server for AI agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server
    Serve {
        /// Transport to serve on (defaults to server.transport from config)
        #[arg(long, value_enum)]
        transport: Option<Transport>,
    },
    /// Show row counts for every store
    Stats,
    /// Run integrity and schema diagnostics on the store files
    Doctor,
    /// Index memories that were stored without a vector
    Backfill {
        /// Maximum number of memories to index
        #[arg(long, default_value_t = 1000)]
        limit: usize,
    },
    /// Query memories from the terminal
    Search {
        query: String,
        /// Number of memories to return
        #[arg(long)]
        top_k: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Transport {
    Stdio,
    Http,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = MemosConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { transport } => {
            let transport = match transport {
                Some(t) => t,
                None if config.server.transport == "http" => Transport::Http,
                None => Transport::Stdio,
            };
            match transport {
                Transport::Stdio => server::serve_stdio(config).await?,
                Transport::Http => server::serve_http(config).await?,
            }
        }
        Command::Stats => cli::stats::stats(config).await?,
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::Backfill { limit } => cli::backfill::backfill(config, limit).await?,
        Command::Search { query, top_k } => cli::search::search(config, &query, top_k).await?,
    }

    Ok(())
}
