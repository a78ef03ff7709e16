use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use tradepost_core::config::{AppConfig, ConfigError};
use tradepost_db::repositories::{
    SqlAuditLog, SqlJargonRepository, SqlListingRepository, SqlMessageRepository,
    SqlNotificationRuleRepository, SqlPipelineQueueRepository, SqlReferenceRepository,
    SqlReviewQueueRepository,
};
use tradepost_db::{connect_with_settings, migrations, DbPool, ReferenceCache};
use tradepost_extract::{
    EmbeddingClient, ExtractionEngine, HttpEmbeddingClient, HttpLlmClient,
};
use tradepost_ingest::{HttpMediaFetcher, MediaFetcher, MessageArchive, NoopMediaFetcher};
use tradepost_pipeline::{
    BackoffPolicy, CrossPostDetector, JargonLearner, NotificationMatcher, Orchestrator,
    RetryService, ReviewService, TaskQueue, WebhookDispatcher, WorkerPool,
};

use crate::routes::AppState;

const NOTIFY_TIMEOUT_SECS: u64 = 10;
const MEDIA_TIMEOUT_SECS: u64 = 30;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
    pub queue: Arc<TaskQueue>,
    pub workers: WorkerPool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("http client init failed: {0}")]
    ClientInit(String),
}

/// Wires the full object graph from a validated config: pool and
/// migrations first, then repositories, then the extraction and pipeline
/// services, then the HTTP state.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let messages = Arc::new(SqlMessageRepository::new(db_pool.clone()));
    let listings = Arc::new(SqlListingRepository::new(db_pool.clone()));
    let reviews = Arc::new(SqlReviewQueueRepository::new(db_pool.clone()));
    let rules = Arc::new(SqlNotificationRuleRepository::new(db_pool.clone()));
    let audit = Arc::new(SqlAuditLog::new(db_pool.clone()));
    let reference = Arc::new(ReferenceCache::new(Arc::new(SqlReferenceRepository::new(
        db_pool.clone(),
    ))));
    let learner = Arc::new(JargonLearner::new(
        Arc::new(SqlJargonRepository::new(db_pool.clone())),
        audit.clone(),
    ));

    let llm = HttpLlmClient::from_config(&config.llm)
        .map_err(|error| BootstrapError::ClientInit(error.to_string()))?;
    let engine = Arc::new(ExtractionEngine::new(Arc::new(llm)));
    let embedder: Option<Arc<dyn EmbeddingClient>> = if config.embedding.enabled {
        let client = HttpEmbeddingClient::from_config(&config.embedding)
            .map_err(|error| BootstrapError::ClientInit(error.to_string()))?;
        Some(Arc::new(client))
    } else {
        None
    };

    let dispatcher = WebhookDispatcher::new(NOTIFY_TIMEOUT_SECS)
        .map_err(|error| BootstrapError::ClientInit(error.to_string()))?;
    let matcher = Arc::new(NotificationMatcher::new(rules, Arc::new(dispatcher)));

    let orchestrator = Arc::new(Orchestrator::new(
        messages.clone(),
        listings.clone(),
        reviews.clone(),
        learner.clone(),
        reference.clone(),
        engine.clone(),
        embedder,
        matcher.clone(),
        config.routing_thresholds(),
    ));

    let queue = Arc::new(TaskQueue::new(
        Arc::new(SqlPipelineQueueRepository::new(db_pool.clone())),
        BackoffPolicy::default(),
    ));
    let workers = WorkerPool::new(
        queue.clone(),
        orchestrator,
        config.pipeline.workers,
        Duration::from_millis(config.pipeline.poll_interval_ms),
    );

    let media: Arc<dyn MediaFetcher> = if config.webhook.fetch_media {
        let fetcher = HttpMediaFetcher::new(config.webhook.media_dir.clone(), MEDIA_TIMEOUT_SECS)
            .map_err(|error| BootstrapError::ClientInit(error.to_string()))?;
        Arc::new(fetcher)
    } else {
        Arc::new(NoopMediaFetcher)
    };
    let archive = Arc::new(MessageArchive::new(
        messages.clone(),
        media,
        config.pipeline.max_task_attempts,
    ));

    let review_service = Arc::new(ReviewService::new(
        reviews,
        listings.clone(),
        messages.clone(),
        reference.clone(),
        matcher,
        audit.clone(),
    ));
    let retry_service = Arc::new(RetryService::new(
        listings.clone(),
        messages,
        reference,
        learner,
        engine,
        audit,
    ));
    let crossposts = Arc::new(CrossPostDetector::new(listings));

    let state = AppState {
        archive,
        reviews: review_service,
        retry: retry_service,
        crossposts,
        webhook_secret: config.webhook.shared_secret.clone(),
    };

    Ok(Application { config, db_pool, state, queue, workers })
}

#[cfg(test)]
mod tests {
    use tradepost_core::config::AppConfig;

    use crate::bootstrap::bootstrap_with_config;

    fn in_memory_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:?cache=shared".to_string();
        config
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_builds_the_object_graph() {
        let app = bootstrap_with_config(in_memory_config()).await.expect("bootstrap");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN \
             ('raw_message', 'listing', 'review_queue_item', 'pipeline_task')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("count baseline tables");
        assert_eq!(table_count, 4);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_an_unreachable_database() {
        let mut config = in_memory_config();
        config.database.url = "sqlite:///nonexistent-dir/tradepost.db".to_string();

        let result = bootstrap_with_config(config).await;
        assert!(result.is_err());
    }
}
