//! Structured store: memories and the tool registry in `memos.db`.

pub mod memories;
pub mod tools;

pub use memories::SqliteMemoryStore;
pub use tools::SqliteToolStore;

use rusqlite::types::Type;

/// `?1, ?2, …, ?n` for an `IN (...)` clause.
pub(crate) fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

/// Parse a JSON text column into a value, reporting failures as a column
/// conversion error.
pub(crate) fn json_column<T: serde::de::DeserializeOwned>(
    idx: usize,
    raw: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
