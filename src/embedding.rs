//! Embedding provider boundary.
//!
//! The [`Embedder`] trait is the seam between the pipeline and the external
//! embedding service; tests substitute deterministic fakes through it. The
//! production implementation, [`OpenAiEmbedder`], calls the OpenAI
//! embeddings API with timeout and exponential-backoff retry.
//!
//! The embedding space is defined entirely by the provider+model identity.
//! Vectors produced under different models are never comparable; the store
//! tags every record with the model name and queries filter on it.
//!
//! Also home to the vector utilities shared by store and tests:
//! [`vec_to_blob`] / [`blob_to_vec`] for SQLite BLOB storage and [`Metric`]
//! for distance computation.
//!
//! # Retry strategy
//!
//! - HTTP 429 and 5xx, and network errors → retry with backoff
//!   (1s, 2s, 4s, ... capped at 32s)
//! - other 4xx → fail immediately
//! - retries exhausted → surfaced as a retryable provider error

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Text-to-vector boundary. One call per text; inputs are expected to have
/// passed through [`crate::truncate::truncate`] already.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`). Defines the
    /// embedding space; stored alongside every record.
    fn model_name(&self) -> &str;
    /// Vector dimensionality, constant for the lifetime of the corpus.
    fn dims(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embedding client for the OpenAI API.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiEmbedder {
    /// Create a client from configuration. Fails with a configuration error
    /// if `OPENAI_API_KEY` is not set — before any network call.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY environment variable not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            api_key,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(OPENAI_EMBEDDINGS_URL)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            provider_err("embedding", format!("invalid response body: {}", e), false)
                        })?;
                        let vector = parse_embedding_response(&json)?;
                        if vector.len() != self.dims {
                            return Err(provider_err(
                                "embedding",
                                format!(
                                    "model {} returned {} dims, expected {}",
                                    self.model,
                                    vector.len(),
                                    self.dims
                                ),
                                false,
                            ));
                        }
                        return Ok(vector);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(provider_err(
                            "embedding",
                            format!("HTTP {}: {}", status, body_text),
                            true,
                        ));
                        continue;
                    }

                    // Hard client error, retrying won't help.
                    return Err(provider_err(
                        "embedding",
                        format!("HTTP {}: {}", status, body_text),
                        false,
                    ));
                }
                Err(e) => {
                    last_err = Some(provider_err("embedding", e.to_string(), true));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| provider_err("embedding", "retries exhausted".into(), true)))
    }
}

fn provider_err(provider: &'static str, message: String, retryable: bool) -> Error {
    Error::Provider {
        provider,
        message,
        retryable,
    }
}

/// Extract the first embedding vector from an OpenAI embeddings response.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            provider_err("embedding", "response missing data[0].embedding".into(), false)
        })?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

/// Distance metric for nearest-neighbor ranking. Fixed per deployment;
/// mixing metrics across queries reorders results meaninglessly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
    Euclidean,
}

impl Metric {
    /// Distance between two vectors; smaller means more similar.
    ///
    /// Cosine distance is `1 - cosine_similarity`, so identical directions
    /// score 0.0 and opposite directions 2.0. Mismatched lengths yield
    /// `f64::INFINITY` so corrupt rows sink to the bottom of any ranking.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f64 {
        if a.len() != b.len() || a.is_empty() {
            return f64::INFINITY;
        }
        match self {
            Metric::Cosine => 1.0 - cosine_similarity(a, b),
            Metric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| {
                    let d = (x - y) as f64;
                    d * d
                })
                .sum::<f64>()
                .sqrt(),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Cosine => write!(f, "cosine"),
            Metric::Euclidean => write!(f, "euclidean"),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
