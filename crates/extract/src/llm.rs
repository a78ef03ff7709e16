use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use tradepost_core::config::{LlmConfig, LlmProvider};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm transport failed: {0}")]
    Transport(String),
    #[error("llm returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm returned no completion content")]
    EmptyResponse,
    #[error("llm client misconfigured: {0}")]
    Configuration(String),
}

impl LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::EmptyResponse | Self::Configuration(_) => false,
        }
    }
}

/// One completion call expected to yield a JSON document. Implementations
/// own their transport, timeouts, and retries.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete_json(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Chat-completions client against an OpenAI-compatible endpoint. All
/// three supported providers expose the same wire shape.
pub struct HttpLlmClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
    retry: RetryPolicy,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Configuration(error.to_string()))?;

        Ok(Self {
            http,
            endpoint: chat_endpoint(config.provider, config.base_url.as_deref()),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            retry: RetryPolicy { max_retries: config.max_retries, ..RetryPolicy::default() },
        })
    }

    async fn send_once(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature: 0.0,
        };

        let mut builder = self.http.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response =
            builder.send().await.map_err(|error| LlmError::Transport(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let parsed: ChatResponse =
            response.json().await.map_err(|error| LlmError::Transport(error.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete_json(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.send_once(system, user).await {
                Ok(content) => {
                    debug!(
                        event_name = "extract.llm.completed",
                        attempt,
                        model = %self.model,
                        "llm completion succeeded"
                    );
                    return Ok(content);
                }
                Err(error) if error.is_retryable() && attempt < self.retry.max_retries => {
                    warn!(
                        event_name = "extract.llm.retry",
                        attempt,
                        max_retries = self.retry.max_retries,
                        error = %error,
                        "llm call failed; backing off"
                    );
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn chat_endpoint(provider: LlmProvider, base_url: Option<&str>) -> String {
    let base = match base_url {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => match provider {
            LlmProvider::OpenAi => "https://api.openai.com/v1".to_string(),
            LlmProvider::Anthropic => "https://api.anthropic.com/v1".to_string(),
            LlmProvider::Ollama => "http://localhost:11434/v1".to_string(),
        },
    };
    // Ollama's native port serves the compatible API under /v1 as well.
    if base.ends_with("/v1") {
        format!("{base}/chat/completions")
    } else {
        format!("{base}/v1/chat/completions")
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tradepost_core::config::LlmProvider;

    use super::{chat_endpoint, LlmError, RetryPolicy};

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy { max_retries: 5, base_delay_ms: 100, max_delay_ms: 400 };

        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(10), Duration::from_millis(400));
    }

    #[test]
    fn endpoint_defaults_follow_the_provider() {
        assert_eq!(
            chat_endpoint(LlmProvider::OpenAi, None),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat_endpoint(LlmProvider::Ollama, Some("http://llm.internal:11434/")),
            "http://llm.internal:11434/v1/chat/completions"
        );
    }

    #[test]
    fn only_transport_and_server_errors_are_retryable() {
        assert!(LlmError::Transport("reset".to_string()).is_retryable());
        assert!(LlmError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(LlmError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(!LlmError::Status { status: 401, body: String::new() }.is_retryable());
        assert!(!LlmError::EmptyResponse.is_retryable());
    }
}
