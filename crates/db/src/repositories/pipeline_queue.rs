use sqlx::{sqlite::SqliteRow, Row};

use tradepost_core::chrono::{DateTime, Utc};
use tradepost_core::domain::message::MessageId;
use tradepost_core::domain::task::{PipelineTask, PipelineTaskId, TaskKind, TaskState};

use super::{
    parse_optional_timestamp, parse_timestamp, parse_u32, PipelineQueueRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlPipelineQueueRepository {
    pool: DbPool,
}

impl SqlPipelineQueueRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const TASK_COLUMNS: &str = "id,
    kind,
    message_id,
    state,
    attempts,
    max_attempts,
    last_error,
    claimed_by,
    claimed_at,
    run_after,
    created_at,
    updated_at";

#[async_trait::async_trait]
impl PipelineQueueRepository for SqlPipelineQueueRepository {
    async fn find_by_id(
        &self,
        id: &PipelineTaskId,
    ) -> Result<Option<PipelineTask>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM pipeline_task WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(task_from_row).transpose()
    }

    async fn save(&self, task: PipelineTask) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO pipeline_task (
                id,
                kind,
                message_id,
                state,
                attempts,
                max_attempts,
                last_error,
                claimed_by,
                claimed_at,
                run_after,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                message_id = excluded.message_id,
                state = excluded.state,
                attempts = excluded.attempts,
                max_attempts = excluded.max_attempts,
                last_error = excluded.last_error,
                claimed_by = excluded.claimed_by,
                claimed_at = excluded.claimed_at,
                run_after = excluded.run_after,
                updated_at = excluded.updated_at",
        )
        .bind(&task.id.0)
        .bind(task.kind.as_str())
        .bind(&task.message_id.0)
        .bind(task.state.as_str())
        .bind(i64::from(task.attempts))
        .bind(i64::from(task.max_attempts))
        .bind(task.last_error.as_deref())
        .bind(task.claimed_by.as_deref())
        .bind(task.claimed_at.map(|value| value.to_rfc3339()))
        .bind(task.run_after.to_rfc3339())
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_runnable(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<PipelineTask>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM pipeline_task
             WHERE state IN ('queued', 'retryable_failed') AND run_after <= ?
             ORDER BY run_after ASC, created_at ASC
             LIMIT ?"
        ))
        .bind(now.to_rfc3339())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(task_from_row).collect()
    }

    async fn claim(
        &self,
        id: &PipelineTaskId,
        worker: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let claimed = sqlx::query(
            "UPDATE pipeline_task SET
                state = 'running',
                attempts = attempts + 1,
                claimed_by = ?,
                claimed_at = ?,
                updated_at = ?
             WHERE id = ?
               AND state IN ('queued', 'retryable_failed')
               AND run_after <= ?",
        )
        .bind(worker)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(&id.0)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(claimed == 1)
    }

    async fn recover_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let recovered = sqlx::query(
            "UPDATE pipeline_task SET
                state = 'queued',
                claimed_by = NULL,
                claimed_at = NULL,
                updated_at = ?
             WHERE state = 'running' AND claimed_at < ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(cutoff.to_rfc3339())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(recovered)
    }
}

fn task_from_row(row: SqliteRow) -> Result<PipelineTask, RepositoryError> {
    let kind_raw = row.try_get::<String, _>("kind")?;
    let kind = TaskKind::parse(&kind_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown task kind `{kind_raw}`")))?;

    let state_raw = row.try_get::<String, _>("state")?;
    let state = TaskState::parse(&state_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown task state `{state_raw}`")))?;

    Ok(PipelineTask {
        id: PipelineTaskId(row.try_get("id")?),
        kind,
        message_id: MessageId(row.try_get("message_id")?),
        state,
        attempts: parse_u32("attempts", row.try_get("attempts")?)?,
        max_attempts: parse_u32("max_attempts", row.try_get("max_attempts")?)?,
        last_error: row.try_get("last_error")?,
        claimed_by: row.try_get("claimed_by")?,
        claimed_at: parse_optional_timestamp("claimed_at", row.try_get("claimed_at")?)?,
        run_after: parse_timestamp("run_after", row.try_get("run_after")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
