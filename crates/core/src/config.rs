use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub webhook: WebhookConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    /// Shared secret the gateway sends in `X-Webhook-Token`. Empty means
    /// unauthenticated ingestion (local development only).
    pub shared_secret: Option<SecretString>,
    pub fetch_media: bool,
    pub media_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Confidence at or above which a listing publishes without review.
    pub auto_accept_threshold: f64,
    /// Confidence below which no draft listing is created.
    pub review_threshold: f64,
    pub workers: u32,
    pub max_task_attempts: u32,
    pub poll_interval_ms: u64,
    pub stale_claim_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub webhook_shared_secret: Option<String>,
    pub pipeline_workers: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://tradepost.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            webhook: WebhookConfig {
                shared_secret: None,
                fetch_media: false,
                media_dir: PathBuf::from("media"),
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            embedding: EmbeddingConfig {
                enabled: false,
                base_url: None,
                api_key: None,
                model: "text-embedding-3-small".to_string(),
                timeout_secs: 15,
            },
            pipeline: PipelineConfig {
                auto_accept_threshold: 0.8,
                review_threshold: 0.5,
                workers: 4,
                max_task_attempts: 5,
                poll_interval_ms: 500,
                stale_claim_secs: 300,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("tradepost.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(webhook) = patch.webhook {
            if let Some(shared_secret) = webhook.shared_secret {
                self.webhook.shared_secret = Some(secret_value(shared_secret));
            }
            if let Some(fetch_media) = webhook.fetch_media {
                self.webhook.fetch_media = fetch_media;
            }
            if let Some(media_dir) = webhook.media_dir {
                self.webhook.media_dir = media_dir;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(embedding) = patch.embedding {
            if let Some(enabled) = embedding.enabled {
                self.embedding.enabled = enabled;
            }
            if let Some(base_url) = embedding.base_url {
                self.embedding.base_url = Some(base_url);
            }
            if let Some(api_key) = embedding.api_key {
                self.embedding.api_key = Some(secret_value(api_key));
            }
            if let Some(model) = embedding.model {
                self.embedding.model = model;
            }
            if let Some(timeout_secs) = embedding.timeout_secs {
                self.embedding.timeout_secs = timeout_secs;
            }
        }

        if let Some(pipeline) = patch.pipeline {
            if let Some(auto_accept_threshold) = pipeline.auto_accept_threshold {
                self.pipeline.auto_accept_threshold = auto_accept_threshold;
            }
            if let Some(review_threshold) = pipeline.review_threshold {
                self.pipeline.review_threshold = review_threshold;
            }
            if let Some(workers) = pipeline.workers {
                self.pipeline.workers = workers;
            }
            if let Some(max_task_attempts) = pipeline.max_task_attempts {
                self.pipeline.max_task_attempts = max_task_attempts;
            }
            if let Some(poll_interval_ms) = pipeline.poll_interval_ms {
                self.pipeline.poll_interval_ms = poll_interval_ms;
            }
            if let Some(stale_claim_secs) = pipeline.stale_claim_secs {
                self.pipeline.stale_claim_secs = stale_claim_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TRADEPOST_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TRADEPOST_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("TRADEPOST_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TRADEPOST_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TRADEPOST_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TRADEPOST_WEBHOOK_SHARED_SECRET") {
            self.webhook.shared_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("TRADEPOST_WEBHOOK_FETCH_MEDIA") {
            self.webhook.fetch_media = parse_bool("TRADEPOST_WEBHOOK_FETCH_MEDIA", &value)?;
        }
        if let Some(value) = read_env("TRADEPOST_WEBHOOK_MEDIA_DIR") {
            self.webhook.media_dir = PathBuf::from(value);
        }

        if let Some(value) = read_env("TRADEPOST_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("TRADEPOST_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TRADEPOST_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("TRADEPOST_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("TRADEPOST_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("TRADEPOST_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TRADEPOST_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("TRADEPOST_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("TRADEPOST_EMBEDDING_ENABLED") {
            self.embedding.enabled = parse_bool("TRADEPOST_EMBEDDING_ENABLED", &value)?;
        }
        if let Some(value) = read_env("TRADEPOST_EMBEDDING_BASE_URL") {
            self.embedding.base_url = Some(value);
        }
        if let Some(value) = read_env("TRADEPOST_EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TRADEPOST_EMBEDDING_MODEL") {
            self.embedding.model = value;
        }

        if let Some(value) = read_env("TRADEPOST_PIPELINE_AUTO_ACCEPT_THRESHOLD") {
            self.pipeline.auto_accept_threshold =
                parse_f64("TRADEPOST_PIPELINE_AUTO_ACCEPT_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("TRADEPOST_PIPELINE_REVIEW_THRESHOLD") {
            self.pipeline.review_threshold =
                parse_f64("TRADEPOST_PIPELINE_REVIEW_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("TRADEPOST_PIPELINE_WORKERS") {
            self.pipeline.workers = parse_u32("TRADEPOST_PIPELINE_WORKERS", &value)?;
        }
        if let Some(value) = read_env("TRADEPOST_PIPELINE_MAX_TASK_ATTEMPTS") {
            self.pipeline.max_task_attempts =
                parse_u32("TRADEPOST_PIPELINE_MAX_TASK_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("TRADEPOST_PIPELINE_POLL_INTERVAL_MS") {
            self.pipeline.poll_interval_ms =
                parse_u64("TRADEPOST_PIPELINE_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = read_env("TRADEPOST_PIPELINE_STALE_CLAIM_SECS") {
            self.pipeline.stale_claim_secs =
                parse_u64("TRADEPOST_PIPELINE_STALE_CLAIM_SECS", &value)?;
        }

        if let Some(value) = read_env("TRADEPOST_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TRADEPOST_SERVER_PORT") {
            self.server.port = parse_u16("TRADEPOST_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TRADEPOST_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TRADEPOST_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("TRADEPOST_LOGGING_LEVEL").or_else(|| read_env("TRADEPOST_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TRADEPOST_LOGGING_FORMAT").or_else(|| read_env("TRADEPOST_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(shared_secret) = overrides.webhook_shared_secret {
            self.webhook.shared_secret = Some(secret_value(shared_secret));
        }
        if let Some(workers) = overrides.pipeline_workers {
            self.pipeline.workers = workers;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_embedding(&self.embedding)?;
        validate_pipeline(&self.pipeline)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    pub fn routing_thresholds(&self) -> crate::routing::RoutingThresholds {
        crate::routing::RoutingThresholds {
            upper: self.pipeline.auto_accept_threshold,
            lower: self.pipeline.review_threshold,
        }
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tradepost.toml"), PathBuf::from("config/tradepost.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_embedding(embedding: &EmbeddingConfig) -> Result<(), ConfigError> {
    if embedding.enabled {
        let missing =
            embedding.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "embedding.base_url is required when embedding.enabled is true".to_string(),
            ));
        }
    }

    if embedding.timeout_secs == 0 || embedding.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "embedding.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    let bounded = |value: f64| (0.0..=1.0).contains(&value);
    if !bounded(pipeline.auto_accept_threshold) || !bounded(pipeline.review_threshold) {
        return Err(ConfigError::Validation(
            "pipeline thresholds must be in range 0.0..=1.0".to_string(),
        ));
    }

    if pipeline.review_threshold >= pipeline.auto_accept_threshold {
        return Err(ConfigError::Validation(
            "pipeline.review_threshold must be strictly below pipeline.auto_accept_threshold"
                .to_string(),
        ));
    }

    if pipeline.workers == 0 {
        return Err(ConfigError::Validation(
            "pipeline.workers must be greater than zero".to_string(),
        ));
    }

    if pipeline.max_task_attempts == 0 {
        return Err(ConfigError::Validation(
            "pipeline.max_task_attempts must be greater than zero".to_string(),
        ));
    }

    if pipeline.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "pipeline.poll_interval_ms must be greater than zero".to_string(),
        ));
    }

    if pipeline.stale_claim_secs == 0 {
        return Err(ConfigError::Validation(
            "pipeline.stale_claim_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation(
            "server.port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    webhook: Option<WebhookPatch>,
    llm: Option<LlmPatch>,
    embedding: Option<EmbeddingPatch>,
    pipeline: Option<PipelinePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPatch {
    shared_secret: Option<String>,
    fetch_media: Option<bool>,
    media_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddingPatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelinePatch {
    auto_accept_threshold: Option<f64>,
    review_threshold: Option<f64>,
    workers: Option<u32>,
    max_task_attempts: Option<u32>,
    poll_interval_ms: Option<u64>,
    stale_claim_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_WEBHOOK_SECRET", "hook-secret-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("tradepost.toml");
            fs::write(
                &path,
                r#"
[webhook]
shared_secret = "${TEST_WEBHOOK_SECRET}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let secret = config
                .webhook
                .shared_secret
                .as_ref()
                .ok_or("shared secret should be set".to_string())?;
            ensure(
                secret.expose_secret() == "hook-secret-from-env",
                "shared secret should be loaded from environment",
            )
        })();

        clear_vars(&["TEST_WEBHOOK_SECRET"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TRADEPOST_LOG_LEVEL", "warn");
        env::set_var("TRADEPOST_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["TRADEPOST_LOG_LEVEL", "TRADEPOST_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TRADEPOST_DATABASE_URL", "sqlite://from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("tradepost.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(&["TRADEPOST_DATABASE_URL"]);
        result
    }

    #[test]
    fn inverted_thresholds_fail_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TRADEPOST_PIPELINE_AUTO_ACCEPT_THRESHOLD", "0.5");
        env::set_var("TRADEPOST_PIPELINE_REVIEW_THRESHOLD", "0.8");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("review_threshold")
            );
            ensure(has_message, "validation failure should mention review_threshold")
        })();

        clear_vars(&[
            "TRADEPOST_PIPELINE_AUTO_ACCEPT_THRESHOLD",
            "TRADEPOST_PIPELINE_REVIEW_THRESHOLD",
        ]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TRADEPOST_WEBHOOK_SHARED_SECRET", "hook-secret-value");
        env::set_var("TRADEPOST_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("hook-secret-value"),
                "debug output should not contain webhook secret",
            )?;
            ensure(
                !debug.contains("sk-secret-value"),
                "debug output should not contain llm api key",
            )?;
            Ok(())
        })();

        clear_vars(&["TRADEPOST_WEBHOOK_SHARED_SECRET", "TRADEPOST_LLM_API_KEY"]);
        result
    }
}
