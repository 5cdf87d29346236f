//! CLI `doctor` command: integrity and schema diagnostics for each store file.

use anyhow::{Context, Result};

use memos::config::MemosConfig;
use memos::db;

/// Run diagnostics on `memos.db`, `vectors.db` and `graph.db` and print a report.
pub fn doctor(config: &MemosConfig) -> Result<()> {
    println!("memos Health Report");
    println!("===================");

    let files = [
        ("Structured", config.structured_db_path()),
        ("Vector", config.vector_db_path()),
        ("Graph", config.graph_db_path()),
    ];

    let mut all_ok = true;
    for (name, path) in &files {
        println!();
        println!("{name} store:  {}", path.display());

        if !path.exists() {
            println!("  not found. Run `memos serve` to initialize.");
            continue;
        }

        let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let conn = db::open_database(path)
            .with_context(|| format!("failed to open {} (may be corrupt)", path.display()))?;
        let report = db::check_database_health(&conn).context("failed to run health check")?;

        println!("  File size:       {}", format_bytes(file_size));
        println!("  Schema version:  {}", report.schema_version);
        println!("  sqlite-vec:      {}", report.sqlite_vec_version);
        if let Some(ref stored) = report.embedding_model {
            println!("  Embedding model: {stored} (configured: {})", config.embedding.model);
            if stored != &config.embedding.model {
                println!("  WARNING: model mismatch, existing vectors were produced by another model.");
            }
        }
        if report.integrity_ok {
            println!("  Integrity check: PASSED");
        } else {
            all_ok = false;
            println!("  Integrity check: FAILED ({})", report.integrity_details);
        }
    }

    if !all_ok {
        println!();
        println!("Recovery: restore the failing file from a backup. The vector and graph");
        println!("stores can be rebuilt from memos.db by deleting them and running");
        println!("`memos backfill`.");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
