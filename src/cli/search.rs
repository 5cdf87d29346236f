use anyhow::Result;

use memos::config::MemosConfig;

/// Run a similarity query from the terminal.
pub async fn search(config: MemosConfig, query: &str, top_k: Option<usize>) -> Result<()> {
    let coordinator = memos::server::build_coordinator(config)?;
    let response = coordinator.query_memory(query, top_k, None).await?;

    if response.memories.is_empty() {
        println!("No memories found.");
    } else {
        println!("Found {} memory(ies)\n", response.memories.len());
        for (i, hit) in response.memories.iter().enumerate() {
            println!("  {}. #{} (score: {:.4})", i + 1, hit.id, hit.score);
            println!("     {}", super::preview(&hit.content, 120));
            println!();
        }
    }

    if !response.tools.is_empty() {
        println!("Suggested tools:");
        for tool in &response.tools {
            println!("  - {}: {}", tool.name, super::preview(&tool.description, 80));
        }
    }

    Ok(())
}
