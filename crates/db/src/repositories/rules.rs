use sqlx::{sqlite::SqliteRow, Row};

use tradepost_core::chrono::{DateTime, Utc};
use tradepost_core::domain::rules::{NotificationRule, NotificationRuleId, RuleCriteria};

use super::{
    parse_json, parse_optional_timestamp, parse_timestamp, to_json, NotificationRuleRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlNotificationRuleRepository {
    pool: DbPool,
}

impl SqlNotificationRuleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const RULE_COLUMNS: &str = "id,
    owner,
    rule_text,
    criteria_json,
    channel_endpoint,
    active,
    last_triggered,
    created_at";

#[async_trait::async_trait]
impl NotificationRuleRepository for SqlNotificationRuleRepository {
    async fn list_active(&self) -> Result<Vec<NotificationRule>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM notification_rule
             WHERE active = 1
             ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(rule_from_row).collect()
    }

    async fn save(&self, rule: NotificationRule) -> Result<(), RepositoryError> {
        let criteria_json = to_json("criteria_json", &rule.criteria)?;

        sqlx::query(
            "INSERT INTO notification_rule (
                id,
                owner,
                rule_text,
                criteria_json,
                channel_endpoint,
                active,
                last_triggered,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                owner = excluded.owner,
                rule_text = excluded.rule_text,
                criteria_json = excluded.criteria_json,
                channel_endpoint = excluded.channel_endpoint,
                active = excluded.active,
                last_triggered = excluded.last_triggered",
        )
        .bind(&rule.id.0)
        .bind(&rule.owner)
        .bind(&rule.rule_text)
        .bind(criteria_json)
        .bind(&rule.channel_endpoint)
        .bind(rule.active)
        .bind(rule.last_triggered.map(|value| value.to_rfc3339()))
        .bind(rule.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn touch_last_triggered(
        &self,
        id: &NotificationRuleId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE notification_rule SET last_triggered = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn rule_from_row(row: SqliteRow) -> Result<NotificationRule, RepositoryError> {
    let criteria_raw = row.try_get::<String, _>("criteria_json")?;
    let criteria = parse_json::<RuleCriteria>("criteria_json", &criteria_raw)?;

    Ok(NotificationRule {
        id: NotificationRuleId(row.try_get("id")?),
        owner: row.try_get("owner")?,
        rule_text: row.try_get("rule_text")?,
        criteria,
        channel_endpoint: row.try_get("channel_endpoint")?,
        active: row.try_get("active")?,
        last_triggered: parse_optional_timestamp(
            "last_triggered",
            row.try_get("last_triggered")?,
        )?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
