//! OpenAI-compatible HTTP embedding provider.
//!
//! Sends `POST {endpoint}/embeddings` with `{model, input}` and reads
//! `data[0].embedding` from the response.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{l2_normalize, EmbeddingProvider};
use crate::config::EmbeddingConfig;

pub struct RemoteEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    dimensions: usize,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl RemoteEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .context("remote embedding provider requires embedding.endpoint")?;
        let url = format!("{}/embeddings", endpoint.trim_end_matches('/'));
        let api_key = std::env::var(&config.api_key_env).ok();

        tracing::info!(url = %url, model = %config.model, "remote embedding provider configured");

        Ok(Self {
            client: reqwest::Client::new(),
            url,
            model: config.model.clone(),
            dimensions: config.dimensions,
            api_key,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        anyhow::ensure!(!text.trim().is_empty(), "cannot embed empty text");

        let mut request = self.client.post(&self.url).json(&EmbeddingRequest {
            model: &self.model,
            input: text,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("HTTP request failed for {}", self.url))?;
        anyhow::ensure!(
            response.status().is_success(),
            "embedding request failed with HTTP {}",
            response.status()
        );

        let body: EmbeddingResponse = response
            .json()
            .await
            .context("invalid embedding response body")?;
        let mut vector = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .context("embedding response contained no data")?;

        anyhow::ensure!(
            vector.len() == self.dimensions,
            "embedding has {} dimensions, expected {}",
            vector.len(),
            self.dimensions
        );
        l2_normalize(&mut vector);
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }
}
