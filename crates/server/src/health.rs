use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tradepost_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub pipeline_queue: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let pipeline_queue = queue_check(&state.db_pool).await;
    let ready = database.status == "ready" && pipeline_queue.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "tradepost-server runtime initialized".to_string(),
        },
        database,
        pipeline_queue,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

/// Reports how many extraction tasks are waiting for a worker. A depth
/// that keeps growing between probes means the pool is stuck or
/// undersized.
async fn queue_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM pipeline_task WHERE state IN ('queued', 'retryable_failed')",
    )
    .fetch_one(pool)
    .await
    {
        Ok(depth) => HealthCheck {
            status: "ready",
            detail: format!("{depth} tasks awaiting a worker"),
        },
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("queue depth query failed: {error}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use tradepost_db::{connect_with_settings, migrations};

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_returns_ready_when_database_is_reachable() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 5)
            .await
            .expect("pool should connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.status, "ready");
        assert_eq!(payload.pipeline_queue.status, "ready");

        pool.close().await;
    }

    #[tokio::test]
    async fn health_reports_the_backlog_depth() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 5)
            .await
            .expect("pool should connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO conversation (id, external_id, display_name, created_at)
             VALUES ('C-h1', 'wa-health-group', NULL, '2026-04-01T09:00:00Z')
             ON CONFLICT(external_id) DO NOTHING",
        )
        .execute(&pool)
        .await
        .expect("insert conversation");
        sqlx::query(
            "INSERT INTO raw_message (
                id, external_id, conversation_id, sender_id, sender_name, body,
                forwarded, sent_at, processed, created_at
             ) VALUES ('M-h1', 'wa-health-1', 'C-h1', 'wa-user-7', 'Dale', 'WTS pipe',
                0, '2026-04-01T09:00:00Z', 0, '2026-04-01T09:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert message");
        sqlx::query(
            "INSERT INTO pipeline_task (
                id, kind, message_id, state, attempts, max_attempts,
                run_after, created_at, updated_at
             ) VALUES ('T-h1', 'extract_message', 'M-h1', 'queued', 0, 5,
                '2026-04-01T09:00:00Z', '2026-04-01T09:00:00Z', '2026-04-01T09:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert task");

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.pipeline_queue.status, "ready");
        assert!(payload.pipeline_queue.detail.starts_with("1 "));

        pool.close().await;
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_database_is_unavailable() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 5)
            .await
            .expect("pool should connect");
        pool.close().await;

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.pipeline_queue.status, "degraded");
    }
}
