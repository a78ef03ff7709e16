use sqlx::{sqlite::SqliteRow, Row};

use tradepost_core::AuditRecord;

use super::{parse_timestamp, AuditLog, RepositoryError};
use crate::DbPool;

pub struct SqlAuditLog {
    pool: DbPool,
}

impl SqlAuditLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AuditLog for SqlAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<(), RepositoryError> {
        let before_json = record
            .before
            .as_ref()
            .map(|value| serde_json::to_string(value))
            .transpose()
            .map_err(|error| {
                RepositoryError::Decode(format!("could not encode `before_json`: {error}"))
            })?;
        let after_json = record
            .after
            .as_ref()
            .map(|value| serde_json::to_string(value))
            .transpose()
            .map_err(|error| {
                RepositoryError::Decode(format!("could not encode `after_json`: {error}"))
            })?;

        sqlx::query(
            "INSERT INTO audit_log (
                id,
                actor,
                action,
                target_type,
                target_id,
                before_json,
                after_json,
                ip,
                timestamp
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.record_id)
        .bind(&record.actor)
        .bind(&record.action)
        .bind(&record.target_type)
        .bind(&record.target_id)
        .bind(before_json.as_deref())
        .bind(after_json.as_deref())
        .bind(record.ip.as_deref())
        .bind(record.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_target(
        &self,
        target_type: &str,
        target_id: &str,
    ) -> Result<Vec<AuditRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                actor,
                action,
                target_type,
                target_id,
                before_json,
                after_json,
                ip,
                timestamp
             FROM audit_log
             WHERE target_type = ? AND target_id = ?
             ORDER BY timestamp ASC",
        )
        .bind(target_type)
        .bind(target_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: SqliteRow) -> Result<AuditRecord, RepositoryError> {
    let before = row
        .try_get::<Option<String>, _>("before_json")?
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|error| {
                RepositoryError::Decode(format!("invalid JSON in `before_json`: {error}"))
            })
        })
        .transpose()?;
    let after = row
        .try_get::<Option<String>, _>("after_json")?
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|error| {
                RepositoryError::Decode(format!("invalid JSON in `after_json`: {error}"))
            })
        })
        .transpose()?;

    Ok(AuditRecord {
        record_id: row.try_get("id")?,
        actor: row.try_get("actor")?,
        action: row.try_get("action")?,
        target_type: row.try_get("target_type")?,
        target_id: row.try_get("target_id")?,
        before,
        after,
        ip: row.try_get("ip")?,
        timestamp: parse_timestamp("timestamp", row.try_get("timestamp")?)?,
    })
}

#[cfg(test)]
mod tests {
    use tradepost_core::AuditRecord;

    use super::SqlAuditLog;
    use crate::migrations;
    use crate::repositories::AuditLog;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn append_and_list_round_trip() {
        let pool = setup_pool().await;
        let log = SqlAuditLog::new(pool.clone());

        let record =
            AuditRecord::new("reviewer-7", "review.resolve", "review_queue_item", "RQ-42")
                .with_before(serde_json::json!({"status": "pending"}))
                .with_after(serde_json::json!({"status": "resolved"}))
                .with_ip("10.0.0.9");

        log.append(record.clone()).await.expect("append record");

        let records =
            log.list_for_target("review_queue_item", "RQ-42").await.expect("list records");
        assert_eq!(records, vec![record]);

        let other = log.list_for_target("listing", "L-1").await.expect("list other target");
        assert!(other.is_empty());

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }
}
