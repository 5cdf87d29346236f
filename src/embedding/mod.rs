//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait and two implementations: a
//! deterministic feature-hashing embedder (default, no network or model files)
//! and an OpenAI-compatible HTTP client. Providers are created via
//! [`create_provider`] from configuration.

pub mod hashing;
pub mod remote;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for embedding text into vectors.
///
/// Implementations produce L2-normalized vectors of exactly
/// [`dimensions`](EmbeddingProvider::dimensions) entries.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Number of dimensions this provider produces.
    fn dimensions(&self) -> usize;

    /// Identifier recorded in `schema_meta` next to the stored vectors.
    fn model(&self) -> &str;
}

/// Create an embedding provider from config.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>> {
    anyhow::ensure!(config.dimensions > 0, "embedding dimensions must be positive");
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(hashing::HashingEmbeddingProvider::new(
            &config.model,
            config.dimensions,
        ))),
        "remote" => Ok(Arc::new(remote::RemoteEmbeddingProvider::new(config)?)),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: hashing, remote"),
    }
}

/// L2-normalize a vector. Zero vectors are returned unchanged.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}
