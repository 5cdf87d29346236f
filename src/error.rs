//! Error taxonomy for coordinator operations.
//!
//! Adapters report failures through `anyhow`; the coordinator converts them into
//! [`MemosError`] so callers can tell a rejected request from an unavailable store.
//! Degraded sub-writes are not errors: they are reported as
//! [`WriteStatus::Failed`](crate::memory::types::WriteStatus) in responses.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemosError {
    /// Empty content or query, malformed metadata, out-of-range arguments.
    #[error("validation error: {0}")]
    Validation(String),

    /// The embedding provider errored or timed out.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// A primary store read or write failed.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A tool name collided with an existing registration.
    #[error("duplicate name: {0}")]
    DuplicateName(String),
}

impl MemosError {
    /// Short machine-readable kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::EmbeddingUnavailable(_) => "embedding_unavailable",
            Self::Storage(_) => "storage",
            Self::NotFound(_) => "not_found",
            Self::DuplicateName(_) => "duplicate_name",
        }
    }
}

pub type Result<T> = std::result::Result<T, MemosError>;
