//! CLI `backfill` command: index memories that have no vector point yet.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

use memos::config::MemosConfig;

/// Re-run vector indexing for up to `limit` memories whose earlier write
/// degraded.
pub async fn backfill(config: MemosConfig, limit: usize) -> Result<()> {
    let coordinator = memos::server::build_coordinator(config)?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} ({eta})")?
            .progress_chars("##-"),
    );

    let report = coordinator
        .backfill_with(limit, |report, _, _| {
            pb.set_length(report.scanned as u64);
            pb.inc(1);
        })
        .await?;
    pb.finish_and_clear();

    if report.scanned == 0 {
        println!("Every memory already has a vector.");
        return Ok(());
    }
    println!(
        "Indexed {} of {} memories ({} failed).",
        report.indexed, report.scanned, report.failed
    );
    Ok(())
}
