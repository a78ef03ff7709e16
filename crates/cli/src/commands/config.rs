use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;
use tradepost_core::config::{AppConfig, LoadOptions};

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", "TRADEPOST_DATABASE_URL"),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "TRADEPOST_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", "TRADEPOST_DATABASE_TIMEOUT_SECS"),
    ));

    let shared_secret = config
        .webhook
        .shared_secret
        .as_ref()
        .map(|secret| redact_token(secret.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    lines.push(render_line(
        "webhook.shared_secret",
        &shared_secret,
        source("webhook.shared_secret", "TRADEPOST_WEBHOOK_SHARED_SECRET"),
    ));
    lines.push(render_line(
        "webhook.fetch_media",
        &config.webhook.fetch_media.to_string(),
        source("webhook.fetch_media", "TRADEPOST_WEBHOOK_FETCH_MEDIA"),
    ));
    lines.push(render_line(
        "webhook.media_dir",
        &config.webhook.media_dir.display().to_string(),
        source("webhook.media_dir", "TRADEPOST_WEBHOOK_MEDIA_DIR"),
    ));

    lines.push(render_line(
        "llm.provider",
        &format!("{:?}", config.llm.provider),
        source("llm.provider", "TRADEPOST_LLM_PROVIDER"),
    ));
    lines.push(render_line("llm.model", &config.llm.model, source("llm.model", "TRADEPOST_LLM_MODEL")));
    lines.push(render_line(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("<unset>"),
        source("llm.base_url", "TRADEPOST_LLM_BASE_URL"),
    ));
    let llm_api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|secret| redact_token(secret.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    lines.push(render_line("llm.api_key", &llm_api_key, source("llm.api_key", "TRADEPOST_LLM_API_KEY")));
    lines.push(render_line(
        "llm.timeout_secs",
        &config.llm.timeout_secs.to_string(),
        source("llm.timeout_secs", "TRADEPOST_LLM_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "embedding.enabled",
        &config.embedding.enabled.to_string(),
        source("embedding.enabled", "TRADEPOST_EMBEDDING_ENABLED"),
    ));
    lines.push(render_line(
        "embedding.model",
        &config.embedding.model,
        source("embedding.model", "TRADEPOST_EMBEDDING_MODEL"),
    ));

    lines.push(render_line(
        "pipeline.auto_accept_threshold",
        &config.pipeline.auto_accept_threshold.to_string(),
        source("pipeline.auto_accept_threshold", "TRADEPOST_PIPELINE_AUTO_ACCEPT_THRESHOLD"),
    ));
    lines.push(render_line(
        "pipeline.review_threshold",
        &config.pipeline.review_threshold.to_string(),
        source("pipeline.review_threshold", "TRADEPOST_PIPELINE_REVIEW_THRESHOLD"),
    ));
    lines.push(render_line(
        "pipeline.workers",
        &config.pipeline.workers.to_string(),
        source("pipeline.workers", "TRADEPOST_PIPELINE_WORKERS"),
    ));
    lines.push(render_line(
        "pipeline.max_task_attempts",
        &config.pipeline.max_task_attempts.to_string(),
        source("pipeline.max_task_attempts", "TRADEPOST_PIPELINE_MAX_TASK_ATTEMPTS"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "TRADEPOST_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", "TRADEPOST_SERVER_PORT"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "TRADEPOST_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "TRADEPOST_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("tradepost.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/tradepost.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
