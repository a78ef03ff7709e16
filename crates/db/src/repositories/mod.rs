use async_trait::async_trait;
use thiserror::Error;

use tradepost_core::chrono::{DateTime, Utc};
use tradepost_core::domain::jargon::{JargonEntry, JargonEntryId};
use tradepost_core::domain::listing::{Listing, ListingId};
use tradepost_core::domain::message::{Conversation, MessageId, RawMessage};
use tradepost_core::domain::reference::{Category, Condition, Manufacturer, Unit, Vocabulary};
use tradepost_core::domain::review::{ResolutionSnapshot, ReviewQueueItem, ReviewQueueItemId};
use tradepost_core::domain::rules::{NotificationRule, NotificationRuleId};
use tradepost_core::domain::task::{PipelineTask, PipelineTaskId};
use tradepost_core::AuditRecord;

pub mod audit;
pub mod jargon;
pub mod listing;
pub mod memory;
pub mod message;
pub mod pipeline_queue;
pub mod reference;
pub mod review_queue;
pub mod rules;

pub use audit::SqlAuditLog;
pub use jargon::SqlJargonRepository;
pub use listing::SqlListingRepository;
pub use memory::{
    InMemoryAuditLog, InMemoryJargonRepository, InMemoryListingRepository,
    InMemoryMessageRepository, InMemoryNotificationRuleRepository,
    InMemoryPipelineQueueRepository, InMemoryReferenceRepository, InMemoryReviewQueueRepository,
};
pub use message::SqlMessageRepository;
pub use pipeline_queue::SqlPipelineQueueRepository;
pub use reference::SqlReferenceRepository;
pub use review_queue::SqlReviewQueueRepository;
pub use rules::SqlNotificationRuleRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn find_by_id(&self, id: &MessageId) -> Result<Option<RawMessage>, RepositoryError>;

    async fn find_conversation_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Conversation>, RepositoryError>;

    /// Persists message, conversation, and extraction task in one
    /// transaction. Returns false when the message's external id is
    /// already archived; nothing is written in that case.
    async fn archive(
        &self,
        message: RawMessage,
        conversation: Conversation,
        task: PipelineTask,
    ) -> Result<bool, RepositoryError>;

    async fn mark_processed(
        &self,
        id: &MessageId,
        error: Option<&str>,
    ) -> Result<(), RepositoryError>;

    async fn set_embedding(
        &self,
        id: &MessageId,
        embedding: &[f32],
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ListingRepository: Send + Sync {
    async fn find_by_id(&self, id: &ListingId) -> Result<Option<Listing>, RepositoryError>;

    async fn find_by_message_id(
        &self,
        message_id: &MessageId,
    ) -> Result<Option<Listing>, RepositoryError>;

    async fn save(&self, listing: Listing) -> Result<(), RepositoryError>;

    /// Non-deleted listings carrying the given part number, whatever
    /// their lifecycle state. Cross-post detection filters these by
    /// sender and price in memory.
    async fn list_not_deleted_by_part_number(
        &self,
        part_number: &str,
    ) -> Result<Vec<Listing>, RepositoryError>;
}

#[async_trait]
pub trait ReviewQueueRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &ReviewQueueItemId,
    ) -> Result<Option<ReviewQueueItem>, RepositoryError>;

    async fn create(&self, item: ReviewQueueItem) -> Result<(), RepositoryError>;

    async fn list_pending(&self) -> Result<Vec<ReviewQueueItem>, RepositoryError>;

    /// Compare-and-set resolve: the UPDATE is guarded on `pending`, so of
    /// two concurrent reviewers exactly one sees true.
    async fn mark_resolved(
        &self,
        id: &ReviewQueueItemId,
        resolved_by: &str,
        resolution: &ResolutionSnapshot,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn mark_skipped(
        &self,
        id: &ReviewQueueItemId,
        skipped_by: &str,
        skipped_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait JargonRepository: Send + Sync {
    async fn list_verified(&self) -> Result<Vec<JargonEntry>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<JargonEntry>, RepositoryError>;

    /// Inserts a new observation or bumps usage_count on the existing
    /// (acronym, expansion) pair, case-insensitively.
    async fn record_observation(&self, entry: JargonEntry) -> Result<(), RepositoryError>;

    async fn set_verified(
        &self,
        id: &JargonEntryId,
        verified: bool,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait NotificationRuleRepository: Send + Sync {
    async fn list_active(&self) -> Result<Vec<NotificationRule>, RepositoryError>;

    async fn save(&self, rule: NotificationRule) -> Result<(), RepositoryError>;

    async fn touch_last_triggered(
        &self,
        id: &NotificationRuleId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ReferenceRepository: Send + Sync {
    async fn load_vocabulary(&self) -> Result<Vocabulary, RepositoryError>;

    async fn save_category(&self, category: Category) -> Result<(), RepositoryError>;

    async fn save_manufacturer(&self, manufacturer: Manufacturer) -> Result<(), RepositoryError>;

    async fn save_unit(&self, unit: Unit) -> Result<(), RepositoryError>;

    async fn save_condition(&self, condition: Condition) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PipelineQueueRepository: Send + Sync {
    async fn find_by_id(&self, id: &PipelineTaskId)
        -> Result<Option<PipelineTask>, RepositoryError>;

    async fn save(&self, task: PipelineTask) -> Result<(), RepositoryError>;

    /// Tasks in a runnable state whose run_after has passed, oldest first.
    async fn list_runnable(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<PipelineTask>, RepositoryError>;

    /// Compare-and-set claim. False means another worker got there first.
    async fn claim(
        &self,
        id: &PipelineTaskId,
        worker: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Returns running tasks claimed before the cutoff to the queue.
    async fn recover_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, record: AuditRecord) -> Result<(), RepositoryError>;

    async fn list_for_target(
        &self,
        target_type: &str,
        target_id: &str,
    ) -> Result<Vec<AuditRecord>, RepositoryError>;
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_optional_decimal(
    column: &str,
    value: Option<String>,
) -> Result<Option<rust_decimal::Decimal>, RepositoryError> {
    value
        .map(|raw| {
            raw.parse::<rust_decimal::Decimal>().map_err(|error| {
                RepositoryError::Decode(format!(
                    "invalid decimal in `{column}`: `{raw}` ({error})"
                ))
            })
        })
        .transpose()
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    column: &str,
    value: &str,
) -> Result<T, RepositoryError> {
    serde_json::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("invalid JSON in `{column}`: {error}")))
}

pub(crate) fn to_json<T: serde::Serialize>(
    column: &str,
    value: &T,
) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|error| RepositoryError::Decode(format!("could not encode `{column}`: {error}")))
}
