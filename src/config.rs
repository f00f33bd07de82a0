//! TOML configuration parsing and validation.
//!
//! Settings live in a config file; credentials stay in the environment
//! (`OPENAI_API_KEY`) and are checked when the provider clients are built.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::embedding::Metric;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Where raw dataset rows come from: a local JSONL export or the Hugging
/// Face datasets-server rows API.
#[derive(Debug, Deserialize, Clone)]
pub struct DatasetConfig {
    /// `"jsonl"` or `"huggingface"`.
    pub source: String,
    /// Path to the JSONL file (required for the `jsonl` source).
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_dataset_name")]
    pub name: String,
    #[serde(default = "default_dataset_config")]
    pub config: String,
    #[serde(default = "default_split")]
    pub split: String,
    /// Optional cap on rows ingested per run.
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Token budget for embedding input; text over it is truncated.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_metric")]
    pub metric: Metric,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dims: default_dims(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            max_retries: default_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            metric: default_metric(),
        }
    }
}

fn default_dataset_name() -> String {
    "SWE-bench/SWE-bench_Lite".to_string()
}
fn default_dataset_config() -> String {
    "default".to_string()
}
fn default_split() -> String {
    "test".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_max_tokens() -> usize {
    8000
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_top_k() -> usize {
    5
}
fn default_metric() -> Metric {
    Metric::Cosine
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config =
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid config: {}", e)))?;

    match config.dataset.source.as_str() {
        "jsonl" => {
            if config.dataset.path.is_none() {
                return Err(Error::Config(
                    "dataset.path is required when dataset.source is 'jsonl'".into(),
                ));
            }
        }
        "huggingface" => {}
        other => {
            return Err(Error::Config(format!(
                "unknown dataset source '{}', must be jsonl or huggingface",
                other
            )));
        }
    }

    if config.embedding.dims == 0 {
        return Err(Error::Config("embedding.dims must be > 0".into()));
    }
    if config.embedding.max_tokens == 0 {
        return Err(Error::Config("embedding.max_tokens must be > 0".into()));
    }
    if config.retrieval.top_k == 0 {
        return Err(Error::Config("retrieval.top_k must be >= 1".into()));
    }

    Ok(config)
}
