use sqlx::{sqlite::SqliteRow, Row};

use tradepost_core::chrono::{DateTime, Utc};
use tradepost_core::domain::listing::ListingId;
use tradepost_core::domain::message::MessageId;
use tradepost_core::domain::review::{
    ResolutionSnapshot, ReviewQueueItem, ReviewQueueItemId, ReviewReason, ReviewStatus,
    SuggestedValues,
};

use super::{
    parse_json, parse_optional_timestamp, parse_timestamp, to_json, RepositoryError,
    ReviewQueueRepository,
};
use crate::DbPool;

pub struct SqlReviewQueueRepository {
    pool: DbPool,
}

impl SqlReviewQueueRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const REVIEW_COLUMNS: &str = "id,
    message_id,
    listing_id,
    reason,
    llm_explanation,
    suggested_values_json,
    status,
    resolved_by,
    resolved_at,
    resolution_json,
    created_at,
    updated_at";

#[async_trait::async_trait]
impl ReviewQueueRepository for SqlReviewQueueRepository {
    async fn find_by_id(
        &self,
        id: &ReviewQueueItemId,
    ) -> Result<Option<ReviewQueueItem>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {REVIEW_COLUMNS} FROM review_queue_item WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(item_from_row).transpose()
    }

    async fn create(&self, item: ReviewQueueItem) -> Result<(), RepositoryError> {
        let suggested_values_json = to_json("suggested_values_json", &item.suggested_values)?;
        let resolution_json =
            item.resolution.as_ref().map(|value| to_json("resolution_json", value)).transpose()?;

        sqlx::query(
            "INSERT INTO review_queue_item (
                id,
                message_id,
                listing_id,
                reason,
                llm_explanation,
                suggested_values_json,
                status,
                resolved_by,
                resolved_at,
                resolution_json,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.id.0)
        .bind(&item.message_id.0)
        .bind(item.listing_id.as_ref().map(|id| id.0.as_str()))
        .bind(item.reason.as_str())
        .bind(item.llm_explanation.as_deref())
        .bind(suggested_values_json)
        .bind(item.status.as_str())
        .bind(item.resolved_by.as_deref())
        .bind(item.resolved_at.map(|value| value.to_rfc3339()))
        .bind(resolution_json)
        .bind(item.created_at.to_rfc3339())
        .bind(item.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<ReviewQueueItem>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {REVIEW_COLUMNS} FROM review_queue_item
             WHERE status = 'pending'
             ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(item_from_row).collect()
    }

    async fn mark_resolved(
        &self,
        id: &ReviewQueueItemId,
        resolved_by: &str,
        resolution: &ResolutionSnapshot,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let resolution_json = to_json("resolution_json", resolution)?;

        let updated = sqlx::query(
            "UPDATE review_queue_item SET
                status = 'resolved',
                resolved_by = ?,
                resolved_at = ?,
                resolution_json = ?,
                updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(resolved_by)
        .bind(resolved_at.to_rfc3339())
        .bind(resolution_json)
        .bind(resolved_at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated == 1)
    }

    async fn mark_skipped(
        &self,
        id: &ReviewQueueItemId,
        skipped_by: &str,
        skipped_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let updated = sqlx::query(
            "UPDATE review_queue_item SET
                status = 'skipped',
                resolved_by = ?,
                resolved_at = ?,
                updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(skipped_by)
        .bind(skipped_at.to_rfc3339())
        .bind(skipped_at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated == 1)
    }
}

fn item_from_row(row: SqliteRow) -> Result<ReviewQueueItem, RepositoryError> {
    let reason_raw = row.try_get::<String, _>("reason")?;
    let reason = ReviewReason::parse(&reason_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown review reason `{reason_raw}`")))?;

    let status_raw = row.try_get::<String, _>("status")?;
    let status = ReviewStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown review status `{status_raw}`")))?;

    let suggested_values_raw = row.try_get::<String, _>("suggested_values_json")?;
    let suggested_values =
        parse_json::<SuggestedValues>("suggested_values_json", &suggested_values_raw)?;

    let resolution = row
        .try_get::<Option<String>, _>("resolution_json")?
        .map(|raw| parse_json::<ResolutionSnapshot>("resolution_json", &raw))
        .transpose()?;

    Ok(ReviewQueueItem {
        id: ReviewQueueItemId(row.try_get("id")?),
        message_id: MessageId(row.try_get("message_id")?),
        listing_id: row.try_get::<Option<String>, _>("listing_id")?.map(ListingId),
        reason,
        llm_explanation: row.try_get("llm_explanation")?,
        suggested_values,
        status,
        resolved_by: row.try_get("resolved_by")?,
        resolved_at: parse_optional_timestamp("resolved_at", row.try_get("resolved_at")?)?,
        resolution,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use tradepost_core::domain::listing::ListingId;
    use tradepost_core::domain::message::MessageId;
    use tradepost_core::domain::review::{
        ResolutionSnapshot, ReviewCorrections, ReviewQueueItem, ReviewQueueItemId, ReviewReason,
        ReviewStatus, SuggestedValues,
    };

    use super::SqlReviewQueueRepository;
    use crate::migrations;
    use crate::repositories::ReviewQueueRepository;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn sql_review_queue_repo_round_trip() {
        let pool = setup_pool().await;
        insert_message(&pool, "M-1", "wa-msg-1").await;

        let repo = SqlReviewQueueRepository::new(pool.clone());
        let item = sample_item("RQ-1", "M-1");

        repo.create(item.clone()).await.expect("create item");

        let found = repo.find_by_id(&item.id).await.expect("find item");
        assert_eq!(found, Some(item.clone()));

        let pending = repo.list_pending().await.expect("list pending");
        assert_eq!(pending, vec![item]);

        pool.close().await;
    }

    #[tokio::test]
    async fn resolve_is_first_writer_wins() {
        let pool = setup_pool().await;
        insert_message(&pool, "M-1", "wa-msg-1").await;

        let repo = SqlReviewQueueRepository::new(pool.clone());
        let item = sample_item("RQ-1", "M-1");
        repo.create(item.clone()).await.expect("create item");

        let resolution = ResolutionSnapshot {
            corrections: ReviewCorrections::default(),
            listing_id: ListingId("L-1".to_string()),
            note: Some("confirmed with the seller".to_string()),
        };
        let at = parse_ts("2026-04-01T10:00:00Z");

        let first = repo
            .mark_resolved(&item.id, "reviewer-a", &resolution, at)
            .await
            .expect("first resolve");
        assert!(first);

        let second = repo
            .mark_resolved(&item.id, "reviewer-b", &resolution, at)
            .await
            .expect("second resolve");
        assert!(!second);

        let skipped = repo.mark_skipped(&item.id, "reviewer-b", at).await.expect("skip attempt");
        assert!(!skipped);

        let found = repo.find_by_id(&item.id).await.expect("find").expect("item exists");
        assert_eq!(found.status, ReviewStatus::Resolved);
        assert_eq!(found.resolved_by.as_deref(), Some("reviewer-a"));
        assert_eq!(found.resolution, Some(resolution));

        pool.close().await;
    }

    #[tokio::test]
    async fn skip_leaves_no_resolution_snapshot() {
        let pool = setup_pool().await;
        insert_message(&pool, "M-1", "wa-msg-1").await;

        let repo = SqlReviewQueueRepository::new(pool.clone());
        let item = sample_item("RQ-1", "M-1");
        repo.create(item.clone()).await.expect("create item");

        let skipped = repo
            .mark_skipped(&item.id, "reviewer-a", parse_ts("2026-04-01T10:00:00Z"))
            .await
            .expect("skip");
        assert!(skipped);

        let found = repo.find_by_id(&item.id).await.expect("find").expect("item exists");
        assert_eq!(found.status, ReviewStatus::Skipped);
        assert_eq!(found.resolution, None);

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn insert_message(pool: &DbPool, id: &str, external_id: &str) {
        let timestamp = "2026-04-01T09:00:00Z";

        sqlx::query(
            "INSERT INTO conversation (id, external_id, display_name, created_at)
             VALUES ('C-1', 'wa-group-1', 'Surplus Traders', ?)
             ON CONFLICT(external_id) DO NOTHING",
        )
        .bind(timestamp)
        .execute(pool)
        .await
        .expect("insert conversation");

        sqlx::query(
            "INSERT INTO raw_message (
                id, external_id, conversation_id, sender_id, sender_name, body,
                forwarded, sent_at, processed, created_at
             ) VALUES (?, ?, 'C-1', 'wa-user-7', 'Dale', 'WTS XJ-900', 0, ?, 0, ?)",
        )
        .bind(id)
        .bind(external_id)
        .bind(timestamp)
        .bind(timestamp)
        .execute(pool)
        .await
        .expect("insert message");
    }

    fn sample_item(id: &str, message_id: &str) -> ReviewQueueItem {
        ReviewQueueItem {
            id: ReviewQueueItemId(id.to_string()),
            message_id: MessageId(message_id.to_string()),
            listing_id: None,
            reason: ReviewReason::LowConfidence,
            llm_explanation: Some("no part number found".to_string()),
            suggested_values: SuggestedValues::default(),
            status: ReviewStatus::Pending,
            resolved_by: None,
            resolved_at: None,
            resolution: None,
            created_at: parse_ts("2026-04-01T09:00:05Z"),
            updated_at: parse_ts("2026-04-01T09:00:05Z"),
        }
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
