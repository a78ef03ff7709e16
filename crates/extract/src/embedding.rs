use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tradepost_core::config::EmbeddingConfig;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding transport failed: {0}")]
    Transport(String),
    #[error("embedding endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("embedding response carried no vector")]
    EmptyResponse,
    #[error("embedding client misconfigured: {0}")]
    Configuration(String),
}

/// Fallible by contract; the orchestrator treats a failed embedding as
/// best-effort and carries on.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

pub struct HttpEmbeddingClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
}

impl HttpEmbeddingClient {
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| EmbeddingError::Configuration(error.to_string()))?;

        let base = config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/')
            .to_string();
        let endpoint = if base.ends_with("/v1") {
            format!("{base}/embeddings")
        } else {
            format!("{base}/v1/embeddings")
        };

        Ok(Self { http, endpoint, model: config.model.clone(), api_key: config.api_key.clone() })
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let request = EmbeddingRequest { model: &self.model, input: text };

        let mut builder = self.http.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response =
            builder.send().await.map_err(|error| EmbeddingError::Transport(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status { status: status.as_u16(), body });
        }

        let parsed: EmbeddingResponse =
            response.json().await.map_err(|error| EmbeddingError::Transport(error.to_string()))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .filter(|vector| !vector.is_empty())
            .ok_or(EmbeddingError::EmptyResponse)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}
