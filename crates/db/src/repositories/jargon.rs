use sqlx::{sqlite::SqliteRow, Row};

use tradepost_core::domain::jargon::{JargonEntry, JargonEntryId, JargonSource};

use super::{parse_timestamp, parse_u32, JargonRepository, RepositoryError};
use crate::DbPool;

pub struct SqlJargonRepository {
    pool: DbPool,
}

impl SqlJargonRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const JARGON_COLUMNS: &str = "id,
    acronym,
    expansion,
    source,
    confidence,
    usage_count,
    verified,
    created_at,
    updated_at";

#[async_trait::async_trait]
impl JargonRepository for SqlJargonRepository {
    async fn list_verified(&self) -> Result<Vec<JargonEntry>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {JARGON_COLUMNS} FROM jargon_entry
             WHERE verified = 1
             ORDER BY acronym ASC, expansion ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(entry_from_row).collect()
    }

    async fn list_all(&self) -> Result<Vec<JargonEntry>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {JARGON_COLUMNS} FROM jargon_entry
             ORDER BY acronym ASC, expansion ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(entry_from_row).collect()
    }

    async fn record_observation(&self, entry: JargonEntry) -> Result<(), RepositoryError> {
        // The (acronym, expansion) pair is NOCASE-unique, so a repeated
        // sighting in any casing lands on the existing row.
        sqlx::query(
            "INSERT INTO jargon_entry (
                id,
                acronym,
                expansion,
                source,
                confidence,
                usage_count,
                verified,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(acronym, expansion) DO UPDATE SET
                usage_count = usage_count + 1,
                updated_at = excluded.updated_at",
        )
        .bind(&entry.id.0)
        .bind(&entry.acronym)
        .bind(&entry.expansion)
        .bind(entry.source.as_str())
        .bind(entry.confidence)
        .bind(i64::from(entry.usage_count))
        .bind(entry.verified)
        .bind(entry.created_at.to_rfc3339())
        .bind(entry.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_verified(
        &self,
        id: &JargonEntryId,
        verified: bool,
    ) -> Result<bool, RepositoryError> {
        let updated = sqlx::query(
            "UPDATE jargon_entry SET verified = ?, source = CASE WHEN ? THEN 'human' ELSE source END WHERE id = ?",
        )
        .bind(verified)
        .bind(verified)
        .bind(&id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated == 1)
    }
}

fn entry_from_row(row: SqliteRow) -> Result<JargonEntry, RepositoryError> {
    let source_raw = row.try_get::<String, _>("source")?;
    let source = JargonSource::parse(&source_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown jargon source `{source_raw}`")))?;

    Ok(JargonEntry {
        id: JargonEntryId(row.try_get("id")?),
        acronym: row.try_get("acronym")?,
        expansion: row.try_get("expansion")?,
        source,
        confidence: row.try_get("confidence")?,
        usage_count: parse_u32("usage_count", row.try_get("usage_count")?)?,
        verified: row.try_get("verified")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
