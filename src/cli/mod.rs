//! Terminal commands that run against the store files directly, without an
//! MCP client.

pub mod backfill;
pub mod doctor;
pub mod search;
pub mod stats;

fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() > max_chars {
        let cut: String = content.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        content.to_string()
    }
}
