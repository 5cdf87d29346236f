pub mod concepts;
pub mod coordinator;
pub mod stats;
pub mod tools;
pub mod types;

use std::future::Future;
use std::time::Duration;

use crate::error::MemosError;

/// Bound a store or provider call. An elapsed deadline becomes an error for
/// that step only; the dropped future cancels its database call, so a
/// timed-out write does not land later.
pub(crate) async fn with_timeout<T, F>(step: &str, limit: Duration, fut: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "{step} timed out after {}ms",
            limit.as_millis()
        )),
    }
}

pub(crate) fn map_storage(err: anyhow::Error) -> MemosError {
    MemosError::Storage(format!("{err:#}"))
}
