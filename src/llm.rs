//! Language-model boundary.
//!
//! [`LanguageModel`] is the second external-provider seam: given a prompt,
//! return text. [`OpenAiChat`] calls the chat completions API with the same
//! timeout and backoff policy as the embedding client.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Prompt-to-text boundary. Output may be empty; the answer synthesizer
/// handles that, not the client.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Chat-completions client for the OpenAI API.
pub struct OpenAiChat {
    model: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiChat {
    /// Create a client from configuration. Fails with a configuration error
    /// if `OPENAI_API_KEY` is not set — before any network call.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY environment variable not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(OPENAI_CHAT_URL)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            Error::Provider {
                                provider: "llm",
                                message: format!("invalid response body: {}", e),
                                retryable: false,
                            }
                        })?;
                        return Ok(parse_chat_response(&json));
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(Error::Provider {
                            provider: "llm",
                            message: format!("HTTP {}: {}", status, body_text),
                            retryable: true,
                        });
                        continue;
                    }

                    return Err(Error::Provider {
                        provider: "llm",
                        message: format!("HTTP {}: {}", status, body_text),
                        retryable: false,
                    });
                }
                Err(e) => {
                    last_err = Some(Error::Provider {
                        provider: "llm",
                        message: e.to_string(),
                        retryable: true,
                    });
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Provider {
            provider: "llm",
            message: "retries exhausted".into(),
            retryable: true,
        }))
    }
}

/// Extract the message text from a chat completions response. A missing or
/// non-string content field reads as empty; the synthesizer's fallback
/// covers that case.
fn parse_chat_response(json: &serde_json::Value) -> String {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string()
}
