//! Embedding provider seam.
//!
//! The embedding provider is an external collaborator used solely for
//! deduplication similarity. The HTTP client carries a bounded timeout and
//! maps every provider failure into [`Error::DependencyTimeout`]-class
//! errors so synthesis can degrade (persist with `dedup_skipped`) instead of
//! failing the batch.

use async_trait::async_trait;
use pulse_core::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, instrument};

/// Dimensionality of the embedding vectors.
pub const EMBEDDING_DIM: usize = 1536;

/// Synchronous embedding capability: `embed(text) -> vector[1536]`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Request body for the HTTP provider.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
}

/// Response body from the HTTP provider.
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// HTTP embedding provider client.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpEmbeddingProvider {
    /// Create a client with the given request timeout.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| Error::config(format!("embedding client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    #[instrument(skip(self, text), fields(len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&EmbedRequest { input: text })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::dependency_timeout("embedding provider timed out")
                } else {
                    Error::dependency_timeout(format!("embedding provider: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(Error::dependency_timeout(format!(
                "embedding provider returned {}",
                response.status()
            )));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::dependency_timeout(format!("embedding decode: {}", e)))?;

        if body.embedding.len() != EMBEDDING_DIM {
            return Err(Error::dependency_timeout(format!(
                "embedding dimension {} != {}",
                body.embedding.len(),
                EMBEDDING_DIM
            )));
        }

        debug!("embedding received");
        Ok(body.embedding)
    }
}

/// Deterministic bag-of-tokens embedder for tests and single-node
/// deployments without a provider.
///
/// Each token hashes to a fixed pseudo-random direction; a text embeds as
/// the normalized sum of its token directions, so texts sharing most tokens
/// land close in cosine space.
#[derive(Debug, Clone, Default)]
pub struct HashingEmbedder;

impl HashingEmbedder {
    /// Create a new hashing embedder.
    pub fn new() -> Self {
        Self
    }

    fn token_direction(token: &str) -> Vec<f32> {
        let digest = Sha256::digest(token.as_bytes());
        (0..EMBEDDING_DIM)
            .map(|i| {
                let byte = digest[(i * 7 + i / 32) % digest.len()];
                let mixed = byte.wrapping_mul(31).wrapping_add((i % 251) as u8);
                (mixed as f32 / 127.5) - 1.0
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut sum = vec![0.0f32; EMBEDDING_DIM];
        let mut tokens = 0usize;
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            tokens += 1;
            for (slot, value) in sum.iter_mut().zip(Self::token_direction(token)) {
                *slot += value;
            }
        }
        if tokens == 0 {
            return Err(Error::validation("cannot embed empty text"));
        }

        let norm = sum.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for slot in sum.iter_mut() {
                *slot /= norm;
            }
        }
        Ok(sum)
    }
}
