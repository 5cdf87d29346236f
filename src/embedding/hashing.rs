//! Feature-hashing embedder.
//!
//! Each lower-cased alphanumeric token is hashed with SHA-256 into one of
//! `dimensions` buckets with a hash-derived sign, then the vector is
//! L2-normalized. Texts sharing vocabulary get positive cosine similarity.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{l2_normalize, EmbeddingProvider};

pub struct HashingEmbeddingProvider {
    model: String,
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(model: &str, dimensions: usize) -> Self {
        Self {
            model: model.to_string(),
            dimensions: dimensions.max(1),
        }
    }

    /// Synchronous embedding; the async trait method delegates here.
    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>> {
        let trimmed = text.trim();
        anyhow::ensure!(!trimmed.is_empty(), "cannot embed empty text");

        let mut v = vec![0.0f32; self.dimensions];
        let lowered = trimmed.to_lowercase();
        let mut any_token = false;
        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            self.accumulate(&mut v, token);
            any_token = true;
        }
        if !any_token {
            self.accumulate(&mut v, trimmed);
        }

        l2_normalize(&mut v);
        Ok(v)
    }

    fn accumulate(&self, v: &mut [f32], feature: &str) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign;
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_sync(text)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }
}
