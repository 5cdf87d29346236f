use anyhow::Result;

use memos::config::MemosConfig;

/// Display row counts across the three stores.
pub async fn stats(config: MemosConfig) -> Result<()> {
    let coordinator = memos::server::build_coordinator(config)?;
    let stats = coordinator.stats().await?;

    println!("Memory Statistics");
    println!("{}", "=".repeat(40));
    println!("  Memories:            {}", stats.memories);
    println!("  Registered tools:    {}", stats.tools);
    println!("  Vector points:       {}", stats.vectors);
    println!("  Not yet indexed:     {}", stats.unindexed_estimate());
    println!();
    println!("Graph:");
    println!("  Nodes:               {}", stats.graph_nodes);
    println!("  Edges:               {}", stats.graph_edges);

    if stats.unindexed_estimate() > 0 {
        println!();
        println!("Run `memos backfill` to index the missing vectors.");
    }

    Ok(())
}
