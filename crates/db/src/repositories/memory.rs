use std::collections::HashMap;

use tokio::sync::RwLock;

use tradepost_core::chrono::{DateTime, Utc};
use tradepost_core::domain::jargon::{JargonEntry, JargonEntryId, JargonSource};
use tradepost_core::domain::listing::{Listing, ListingId, ListingStatus};
use tradepost_core::domain::message::{Conversation, MessageId, RawMessage};
use tradepost_core::domain::reference::{Category, Condition, Manufacturer, Unit, Vocabulary};
use tradepost_core::domain::review::{
    ResolutionSnapshot, ReviewQueueItem, ReviewQueueItemId, ReviewStatus,
};
use tradepost_core::domain::rules::{NotificationRule, NotificationRuleId};
use tradepost_core::domain::task::{PipelineTask, PipelineTaskId, TaskState};
use tradepost_core::AuditRecord;

use super::{
    AuditLog, JargonRepository, ListingRepository, MessageRepository, NotificationRuleRepository,
    PipelineQueueRepository, ReferenceRepository, RepositoryError, ReviewQueueRepository,
};

#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<HashMap<String, RawMessage>>,
    conversations: RwLock<HashMap<String, Conversation>>,
    tasks: RwLock<Vec<PipelineTask>>,
}

impl InMemoryMessageRepository {
    pub async fn enqueued_tasks(&self) -> Vec<PipelineTask> {
        self.tasks.read().await.clone()
    }
}

#[async_trait::async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn find_by_id(&self, id: &MessageId) -> Result<Option<RawMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages.get(&id.0).cloned())
    }

    async fn find_conversation_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.values().find(|conv| conv.external_id == external_id).cloned())
    }

    async fn archive(
        &self,
        mut message: RawMessage,
        conversation: Conversation,
        task: PipelineTask,
    ) -> Result<bool, RepositoryError> {
        let mut messages = self.messages.write().await;
        if messages.values().any(|existing| existing.external_id == message.external_id) {
            return Ok(false);
        }

        let mut conversations = self.conversations.write().await;
        let canonical = conversations
            .values()
            .find(|existing| existing.external_id == conversation.external_id)
            .cloned()
            .unwrap_or_else(|| {
                conversations.insert(conversation.id.0.clone(), conversation.clone());
                conversation
            });
        message.conversation_id = canonical.id;

        messages.insert(message.id.0.clone(), message);
        self.tasks.write().await.push(task);
        Ok(true)
    }

    async fn mark_processed(
        &self,
        id: &MessageId,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        if let Some(message) = messages.get_mut(&id.0) {
            message.processed = true;
            message.processing_error = error.map(str::to_string);
        }
        Ok(())
    }

    async fn set_embedding(
        &self,
        id: &MessageId,
        embedding: &[f32],
    ) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        if let Some(message) = messages.get_mut(&id.0) {
            message.embedding = Some(embedding.to_vec());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryListingRepository {
    listings: RwLock<HashMap<String, Listing>>,
}

#[async_trait::async_trait]
impl ListingRepository for InMemoryListingRepository {
    async fn find_by_id(&self, id: &ListingId) -> Result<Option<Listing>, RepositoryError> {
        let listings = self.listings.read().await;
        Ok(listings.get(&id.0).cloned())
    }

    async fn find_by_message_id(
        &self,
        message_id: &MessageId,
    ) -> Result<Option<Listing>, RepositoryError> {
        let listings = self.listings.read().await;
        Ok(listings.values().find(|listing| listing.message_id == *message_id).cloned())
    }

    async fn save(&self, listing: Listing) -> Result<(), RepositoryError> {
        let mut listings = self.listings.write().await;
        listings.insert(listing.id.0.clone(), listing);
        Ok(())
    }

    async fn list_not_deleted_by_part_number(
        &self,
        part_number: &str,
    ) -> Result<Vec<Listing>, RepositoryError> {
        let listings = self.listings.read().await;
        let mut matches: Vec<Listing> = listings
            .values()
            .filter(|listing| {
                listing.status != ListingStatus::Deleted
                    && listing.deleted_at.is_none()
                    && listing
                        .part_number
                        .as_deref()
                        .is_some_and(|part| part.eq_ignore_ascii_case(part_number))
            })
            .cloned()
            .collect();
        matches.sort_by_key(|listing| listing.created_at);
        Ok(matches)
    }
}

#[derive(Default)]
pub struct InMemoryReviewQueueRepository {
    items: RwLock<HashMap<String, ReviewQueueItem>>,
}

#[async_trait::async_trait]
impl ReviewQueueRepository for InMemoryReviewQueueRepository {
    async fn find_by_id(
        &self,
        id: &ReviewQueueItemId,
    ) -> Result<Option<ReviewQueueItem>, RepositoryError> {
        let items = self.items.read().await;
        Ok(items.get(&id.0).cloned())
    }

    async fn create(&self, item: ReviewQueueItem) -> Result<(), RepositoryError> {
        let mut items = self.items.write().await;
        items.insert(item.id.0.clone(), item);
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<ReviewQueueItem>, RepositoryError> {
        let items = self.items.read().await;
        let mut pending: Vec<ReviewQueueItem> =
            items.values().filter(|item| item.status == ReviewStatus::Pending).cloned().collect();
        pending.sort_by_key(|item| item.created_at);
        Ok(pending)
    }

    async fn mark_resolved(
        &self,
        id: &ReviewQueueItemId,
        resolved_by: &str,
        resolution: &ResolutionSnapshot,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut items = self.items.write().await;
        match items.get_mut(&id.0) {
            Some(item) if item.status == ReviewStatus::Pending => {
                item.status = ReviewStatus::Resolved;
                item.resolved_by = Some(resolved_by.to_string());
                item.resolved_at = Some(resolved_at);
                item.resolution = Some(resolution.clone());
                item.updated_at = resolved_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_skipped(
        &self,
        id: &ReviewQueueItemId,
        skipped_by: &str,
        skipped_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut items = self.items.write().await;
        match items.get_mut(&id.0) {
            Some(item) if item.status == ReviewStatus::Pending => {
                item.status = ReviewStatus::Skipped;
                item.resolved_by = Some(skipped_by.to_string());
                item.resolved_at = Some(skipped_at);
                item.updated_at = skipped_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryJargonRepository {
    entries: RwLock<Vec<JargonEntry>>,
}

#[async_trait::async_trait]
impl JargonRepository for InMemoryJargonRepository {
    async fn list_verified(&self) -> Result<Vec<JargonEntry>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|entry| entry.verified).cloned().collect())
    }

    async fn list_all(&self) -> Result<Vec<JargonEntry>, RepositoryError> {
        Ok(self.entries.read().await.clone())
    }

    async fn record_observation(&self, entry: JargonEntry) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.iter_mut().find(|existing| {
            existing.acronym.eq_ignore_ascii_case(&entry.acronym)
                && existing.expansion.eq_ignore_ascii_case(&entry.expansion)
        }) {
            existing.usage_count += 1;
            existing.updated_at = entry.updated_at;
        } else {
            entries.push(entry);
        }
        Ok(())
    }

    async fn set_verified(
        &self,
        id: &JargonEntryId,
        verified: bool,
    ) -> Result<bool, RepositoryError> {
        let mut entries = self.entries.write().await;
        match entries.iter_mut().find(|entry| entry.id == *id) {
            Some(entry) => {
                entry.verified = verified;
                if verified {
                    entry.source = JargonSource::Human;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryNotificationRuleRepository {
    rules: RwLock<HashMap<String, NotificationRule>>,
}

#[async_trait::async_trait]
impl NotificationRuleRepository for InMemoryNotificationRuleRepository {
    async fn list_active(&self) -> Result<Vec<NotificationRule>, RepositoryError> {
        let rules = self.rules.read().await;
        let mut active: Vec<NotificationRule> =
            rules.values().filter(|rule| rule.active).cloned().collect();
        active.sort_by_key(|rule| rule.created_at);
        Ok(active)
    }

    async fn save(&self, rule: NotificationRule) -> Result<(), RepositoryError> {
        let mut rules = self.rules.write().await;
        rules.insert(rule.id.0.clone(), rule);
        Ok(())
    }

    async fn touch_last_triggered(
        &self,
        id: &NotificationRuleId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut rules = self.rules.write().await;
        if let Some(rule) = rules.get_mut(&id.0) {
            rule.last_triggered = Some(at);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryReferenceRepository {
    vocabulary: RwLock<Vocabulary>,
}

impl InMemoryReferenceRepository {
    pub fn with_vocabulary(vocabulary: Vocabulary) -> Self {
        Self { vocabulary: RwLock::new(vocabulary) }
    }
}

#[async_trait::async_trait]
impl ReferenceRepository for InMemoryReferenceRepository {
    async fn load_vocabulary(&self) -> Result<Vocabulary, RepositoryError> {
        Ok(self.vocabulary.read().await.clone())
    }

    async fn save_category(&self, category: Category) -> Result<(), RepositoryError> {
        let mut vocabulary = self.vocabulary.write().await;
        vocabulary.categories.retain(|existing| !existing.name.eq_ignore_ascii_case(&category.name));
        vocabulary.categories.push(category);
        Ok(())
    }

    async fn save_manufacturer(&self, manufacturer: Manufacturer) -> Result<(), RepositoryError> {
        let mut vocabulary = self.vocabulary.write().await;
        vocabulary
            .manufacturers
            .retain(|existing| !existing.name.eq_ignore_ascii_case(&manufacturer.name));
        vocabulary.manufacturers.push(manufacturer);
        Ok(())
    }

    async fn save_unit(&self, unit: Unit) -> Result<(), RepositoryError> {
        let mut vocabulary = self.vocabulary.write().await;
        vocabulary.units.retain(|existing| !existing.name.eq_ignore_ascii_case(&unit.name));
        vocabulary.units.push(unit);
        Ok(())
    }

    async fn save_condition(&self, condition: Condition) -> Result<(), RepositoryError> {
        let mut vocabulary = self.vocabulary.write().await;
        if !vocabulary
            .conditions
            .iter()
            .any(|existing| existing.name.eq_ignore_ascii_case(&condition.name))
        {
            vocabulary.conditions.push(condition);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPipelineQueueRepository {
    tasks: RwLock<HashMap<String, PipelineTask>>,
}

#[async_trait::async_trait]
impl PipelineQueueRepository for InMemoryPipelineQueueRepository {
    async fn find_by_id(
        &self,
        id: &PipelineTaskId,
    ) -> Result<Option<PipelineTask>, RepositoryError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(&id.0).cloned())
    }

    async fn save(&self, task: PipelineTask) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.write().await;
        tasks.insert(task.id.0.clone(), task);
        Ok(())
    }

    async fn list_runnable(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<PipelineTask>, RepositoryError> {
        let tasks = self.tasks.read().await;
        let mut runnable: Vec<PipelineTask> = tasks
            .values()
            .filter(|task| {
                matches!(task.state, TaskState::Queued | TaskState::RetryableFailed)
                    && task.run_after <= now
            })
            .cloned()
            .collect();
        runnable.sort_by_key(|task| (task.run_after, task.created_at));
        runnable.truncate(limit as usize);
        Ok(runnable)
    }

    async fn claim(
        &self,
        id: &PipelineTaskId,
        worker: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&id.0) {
            Some(task)
                if matches!(task.state, TaskState::Queued | TaskState::RetryableFailed)
                    && task.run_after <= now =>
            {
                task.state = TaskState::Running;
                task.attempts += 1;
                task.claimed_by = Some(worker.to_string());
                task.claimed_at = Some(now);
                task.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn recover_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut tasks = self.tasks.write().await;
        let mut recovered = 0;
        for task in tasks.values_mut() {
            if task.state == TaskState::Running
                && task.claimed_at.is_some_and(|claimed| claimed < cutoff)
            {
                task.state = TaskState::Queued;
                task.claimed_by = None;
                task.claimed_at = None;
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

#[derive(Default)]
pub struct InMemoryAuditLog {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait::async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<(), RepositoryError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn list_for_target(
        &self,
        target_type: &str,
        target_id: &str,
    ) -> Result<Vec<AuditRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|record| record.target_type == target_type && record.target_id == target_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use tradepost_core::domain::message::{Conversation, ConversationId, MessageId, RawMessage};
    use tradepost_core::domain::task::{PipelineTask, PipelineTaskId, TaskKind};

    use crate::repositories::{InMemoryMessageRepository, MessageRepository};

    #[tokio::test]
    async fn in_memory_archive_is_idempotent_on_external_id() {
        let repo = InMemoryMessageRepository::default();

        let first = repo
            .archive(message("M-1", "wa-msg-1"), conversation(), task("T-1"))
            .await
            .expect("first archive");
        let second = repo
            .archive(message("M-2", "wa-msg-1"), conversation(), task("T-2"))
            .await
            .expect("second archive");

        assert!(first);
        assert!(!second);
        assert_eq!(repo.enqueued_tasks().await.len(), 1);
    }

    fn conversation() -> Conversation {
        Conversation {
            id: ConversationId("C-1".to_string()),
            external_id: "wa-group-1".to_string(),
            display_name: None,
            created_at: Utc::now(),
        }
    }

    fn message(id: &str, external_id: &str) -> RawMessage {
        RawMessage {
            id: MessageId(id.to_string()),
            external_id: external_id.to_string(),
            conversation_id: ConversationId("C-1".to_string()),
            sender_id: "wa-user-7".to_string(),
            sender_name: "Dale".to_string(),
            sender_phone: None,
            body: "WTS XJ-900".to_string(),
            media_url: None,
            media_mime_type: None,
            media_local_path: None,
            quoted_external_id: None,
            forwarded: false,
            sent_at: Utc::now(),
            processed: false,
            processing_error: None,
            embedding: None,
            created_at: Utc::now(),
        }
    }

    fn task(id: &str) -> PipelineTask {
        PipelineTask::enqueue(
            PipelineTaskId(id.to_string()),
            TaskKind::ExtractMessage,
            MessageId("M-1".to_string()),
            5,
        )
    }
}
