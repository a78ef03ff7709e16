use sqlx::{sqlite::SqliteRow, Row};

use tradepost_core::domain::extraction::Intent;
use tradepost_core::domain::listing::{Listing, ListingId, ListingStatus};
use tradepost_core::domain::message::MessageId;
use tradepost_core::domain::reference::{CategoryId, ConditionId, ManufacturerId, UnitId};

use super::{
    parse_optional_decimal, parse_optional_timestamp, parse_timestamp, ListingRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlListingRepository {
    pool: DbPool,
}

impl SqlListingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const LISTING_COLUMNS: &str = "id,
    message_id,
    sender_name,
    sender_phone,
    intent,
    status,
    part_number,
    description,
    quantity,
    price,
    currency,
    total_price,
    category_id,
    manufacturer_id,
    unit_id,
    condition_id,
    confidence_score,
    needs_human_review,
    reviewed_by,
    reviewed_at,
    deleted_at,
    deleted_by,
    created_at,
    updated_at";

#[async_trait::async_trait]
impl ListingRepository for SqlListingRepository {
    async fn find_by_id(&self, id: &ListingId) -> Result<Option<Listing>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {LISTING_COLUMNS} FROM listing WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(listing_from_row).transpose()
    }

    async fn find_by_message_id(
        &self,
        message_id: &MessageId,
    ) -> Result<Option<Listing>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {LISTING_COLUMNS} FROM listing WHERE message_id = ?"))
                .bind(&message_id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(listing_from_row).transpose()
    }

    async fn save(&self, listing: Listing) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO listing (
                id,
                message_id,
                sender_name,
                sender_phone,
                intent,
                status,
                part_number,
                description,
                quantity,
                price,
                currency,
                total_price,
                category_id,
                manufacturer_id,
                unit_id,
                condition_id,
                confidence_score,
                needs_human_review,
                reviewed_by,
                reviewed_at,
                deleted_at,
                deleted_by,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                message_id = excluded.message_id,
                sender_name = excluded.sender_name,
                sender_phone = excluded.sender_phone,
                intent = excluded.intent,
                status = excluded.status,
                part_number = excluded.part_number,
                description = excluded.description,
                quantity = excluded.quantity,
                price = excluded.price,
                currency = excluded.currency,
                total_price = excluded.total_price,
                category_id = excluded.category_id,
                manufacturer_id = excluded.manufacturer_id,
                unit_id = excluded.unit_id,
                condition_id = excluded.condition_id,
                confidence_score = excluded.confidence_score,
                needs_human_review = excluded.needs_human_review,
                reviewed_by = excluded.reviewed_by,
                reviewed_at = excluded.reviewed_at,
                deleted_at = excluded.deleted_at,
                deleted_by = excluded.deleted_by,
                updated_at = excluded.updated_at",
        )
        .bind(&listing.id.0)
        .bind(&listing.message_id.0)
        .bind(&listing.sender_name)
        .bind(listing.sender_phone.as_deref())
        .bind(listing.intent.as_str())
        .bind(listing.status.as_str())
        .bind(listing.part_number.as_deref())
        .bind(listing.description.as_deref())
        .bind(listing.quantity.map(|value| value.to_string()))
        .bind(listing.price.map(|value| value.to_string()))
        .bind(listing.currency.as_deref())
        .bind(listing.total_price.map(|value| value.to_string()))
        .bind(listing.category_id.as_ref().map(|id| id.0.as_str()))
        .bind(listing.manufacturer_id.as_ref().map(|id| id.0.as_str()))
        .bind(listing.unit_id.as_ref().map(|id| id.0.as_str()))
        .bind(listing.condition_id.as_ref().map(|id| id.0.as_str()))
        .bind(listing.confidence_score)
        .bind(listing.needs_human_review)
        .bind(listing.reviewed_by.as_deref())
        .bind(listing.reviewed_at.map(|value| value.to_rfc3339()))
        .bind(listing.deleted_at.map(|value| value.to_rfc3339()))
        .bind(listing.deleted_by.as_deref())
        .bind(listing.created_at.to_rfc3339())
        .bind(listing.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_not_deleted_by_part_number(
        &self,
        part_number: &str,
    ) -> Result<Vec<Listing>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {LISTING_COLUMNS} FROM listing
             WHERE part_number = ? COLLATE NOCASE
               AND status != 'deleted'
               AND deleted_at IS NULL
             ORDER BY created_at ASC"
        ))
        .bind(part_number)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(listing_from_row).collect()
    }
}

fn listing_from_row(row: SqliteRow) -> Result<Listing, RepositoryError> {
    let intent_raw = row.try_get::<String, _>("intent")?;
    let intent = Intent::parse(&intent_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown intent `{intent_raw}`")))?;

    let status_raw = row.try_get::<String, _>("status")?;
    let status = ListingStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown listing status `{status_raw}`")))?;

    Ok(Listing {
        id: ListingId(row.try_get("id")?),
        message_id: MessageId(row.try_get("message_id")?),
        sender_name: row.try_get("sender_name")?,
        sender_phone: row.try_get("sender_phone")?,
        intent,
        status,
        part_number: row.try_get("part_number")?,
        description: row.try_get("description")?,
        quantity: parse_optional_decimal("quantity", row.try_get("quantity")?)?,
        price: parse_optional_decimal("price", row.try_get("price")?)?,
        currency: row.try_get("currency")?,
        total_price: parse_optional_decimal("total_price", row.try_get("total_price")?)?,
        category_id: row.try_get::<Option<String>, _>("category_id")?.map(CategoryId),
        manufacturer_id: row.try_get::<Option<String>, _>("manufacturer_id")?.map(ManufacturerId),
        unit_id: row.try_get::<Option<String>, _>("unit_id")?.map(UnitId),
        condition_id: row.try_get::<Option<String>, _>("condition_id")?.map(ConditionId),
        confidence_score: row.try_get("confidence_score")?,
        needs_human_review: row.try_get("needs_human_review")?,
        reviewed_by: row.try_get("reviewed_by")?,
        reviewed_at: parse_optional_timestamp("reviewed_at", row.try_get("reviewed_at")?)?,
        deleted_at: parse_optional_timestamp("deleted_at", row.try_get("deleted_at")?)?,
        deleted_by: row.try_get("deleted_by")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
