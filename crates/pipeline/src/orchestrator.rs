use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use tradepost_core::domain::message::RawMessage;
use tradepost_core::domain::reference::Vocabulary;
use tradepost_core::domain::task::{PipelineTask, TaskKind};
use tradepost_core::routing::{route, RouteDecision, RoutingThresholds};
use tradepost_core::{
    ExtractionResult, Listing, ListingId, ListingStatus, MessageId, ReviewQueueItem,
    ReviewQueueItemId, ReviewReason, ReviewStatus, SuggestedValues,
};
use tradepost_db::repositories::{
    ListingRepository, MessageRepository, RepositoryError, ReviewQueueRepository,
};
use tradepost_db::ReferenceCache;
use tradepost_extract::{EmbeddingClient, ExtractionEngine};

use crate::jargon::JargonLearner;
use crate::notify::NotificationMatcher;
use crate::worker::{TaskFailure, TaskHandler};

/// Runs one archived message through the full pipeline: embed, extract,
/// route, persist, learn, notify, mark processed. Stages after the
/// routing decision never unwind it; external failures are downgraded
/// inside the extraction engine, so an error here means persistence
/// broke and the task should retry.
pub struct Orchestrator {
    messages: Arc<dyn MessageRepository>,
    listings: Arc<dyn ListingRepository>,
    reviews: Arc<dyn ReviewQueueRepository>,
    learner: Arc<JargonLearner>,
    reference: Arc<ReferenceCache>,
    engine: Arc<ExtractionEngine>,
    embedder: Option<Arc<dyn EmbeddingClient>>,
    matcher: Arc<NotificationMatcher>,
    thresholds: RoutingThresholds,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        listings: Arc<dyn ListingRepository>,
        reviews: Arc<dyn ReviewQueueRepository>,
        learner: Arc<JargonLearner>,
        reference: Arc<ReferenceCache>,
        engine: Arc<ExtractionEngine>,
        embedder: Option<Arc<dyn EmbeddingClient>>,
        matcher: Arc<NotificationMatcher>,
        thresholds: RoutingThresholds,
    ) -> Self {
        Self {
            messages,
            listings,
            reviews,
            learner,
            reference,
            engine,
            embedder,
            matcher,
            thresholds,
        }
    }

    pub async fn process_message(&self, message_id: &MessageId) -> Result<(), TaskFailure> {
        let message = self
            .messages
            .find_by_id(message_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| TaskFailure(format!("message `{}` is gone", message_id.0)))?;

        // A crash between the processed-write and task completion
        // re-delivers the task; the message itself is done.
        if message.processed {
            return Ok(());
        }

        self.embed_best_effort(&message).await;

        let vocabulary = self.reference.vocabulary().await.map_err(persistence)?;
        let glossary = self.learner.verified_glossary().await.map_err(persistence)?;
        let result = self.engine.extract(&message.body, &vocabulary, &glossary).await;
        let decision = route(&result, self.thresholds);

        let accepted = self.apply_decision(&message, &result, decision, &vocabulary).await?;

        self.learner.learn(&result.unknown_terms).await.map_err(persistence)?;

        if let Some((listing, category_name)) = accepted {
            self.matcher
                .notify_matches(&listing, category_name.as_deref())
                .await
                .map_err(persistence)?;
        }

        let processing_error = result
            .is_failure()
            .then(|| result.explanation.as_deref().unwrap_or("extraction failed"));
        self.messages
            .mark_processed(&message.id, processing_error)
            .await
            .map_err(persistence)?;

        Ok(())
    }

    async fn embed_best_effort(&self, message: &RawMessage) {
        let Some(embedder) = &self.embedder else {
            return;
        };

        match embedder.embed(&message.body).await {
            Ok(vector) => {
                if let Err(error) = self.messages.set_embedding(&message.id, &vector).await {
                    warn!(
                        event_name = "pipeline.embedding_write_failed",
                        message_id = %message.id.0,
                        error = %error,
                        "could not store embedding; continuing"
                    );
                }
            }
            Err(error) => {
                warn!(
                    event_name = "pipeline.embedding_failed",
                    message_id = %message.id.0,
                    error = %error,
                    "embedding failed; continuing without one"
                );
            }
        }
    }

    /// Persists the routing outcome. Returns the listing (with its
    /// resolved category name) when it went straight to active.
    async fn apply_decision(
        &self,
        message: &RawMessage,
        result: &ExtractionResult,
        decision: RouteDecision,
        vocabulary: &Vocabulary,
    ) -> Result<Option<(Listing, Option<String>)>, TaskFailure> {
        match decision {
            RouteDecision::AutoAccept => {
                let (listing, category_name) =
                    listing_from_extraction(message, result, vocabulary, ListingStatus::Active);
                self.listings.save(listing.clone()).await.map_err(persistence)?;
                info!(
                    event_name = "pipeline.listing_accepted",
                    message_id = %message.id.0,
                    listing_id = %listing.id.0,
                    confidence = result.confidence,
                    "listing auto-accepted"
                );
                Ok(Some((listing, category_name)))
            }
            RouteDecision::QueueWithDraft { reason } => {
                let (listing, _) = listing_from_extraction(
                    message,
                    result,
                    vocabulary,
                    ListingStatus::PendingReview,
                );
                self.listings.save(listing.clone()).await.map_err(persistence)?;
                self.queue_for_review(message, result, reason, Some(listing.id.clone())).await?;
                info!(
                    event_name = "pipeline.listing_queued_with_draft",
                    message_id = %message.id.0,
                    listing_id = %listing.id.0,
                    reason = reason.as_str(),
                    "draft listing queued for review"
                );
                Ok(None)
            }
            RouteDecision::QueueWithoutDraft { reason } => {
                self.queue_for_review(message, result, reason, None).await?;
                info!(
                    event_name = "pipeline.listing_queued_without_draft",
                    message_id = %message.id.0,
                    reason = reason.as_str(),
                    "raw extraction queued for review"
                );
                Ok(None)
            }
        }
    }

    async fn queue_for_review(
        &self,
        message: &RawMessage,
        result: &ExtractionResult,
        reason: ReviewReason,
        listing_id: Option<ListingId>,
    ) -> Result<(), TaskFailure> {
        let now = Utc::now();
        let item = ReviewQueueItem {
            id: ReviewQueueItemId(Uuid::new_v4().to_string()),
            message_id: message.id.clone(),
            listing_id,
            reason,
            llm_explanation: result.explanation.clone(),
            suggested_values: SuggestedValues {
                intent: result.intent,
                items: result.items.clone(),
                unknown_terms: result.unknown_terms.clone(),
                confidence: result.confidence,
            },
            status: ReviewStatus::Pending,
            resolved_by: None,
            resolved_at: None,
            resolution: None,
            created_at: now,
            updated_at: now,
        };
        self.reviews.create(item).await.map_err(persistence)
    }
}

#[async_trait]
impl TaskHandler for Orchestrator {
    async fn handle(&self, task: &PipelineTask) -> Result<(), TaskFailure> {
        match task.kind {
            TaskKind::ExtractMessage => self.process_message(&task.message_id).await,
        }
    }
}

fn persistence(error: RepositoryError) -> TaskFailure {
    TaskFailure(format!("persistence failure: {error}"))
}

/// Builds a listing from the primary extracted item, normalizing names
/// against the reference vocabulary. Also returns the matched category
/// name for notification keyword matching.
fn listing_from_extraction(
    message: &RawMessage,
    result: &ExtractionResult,
    vocabulary: &Vocabulary,
    status: ListingStatus,
) -> (Listing, Option<String>) {
    let item = result.primary_item().cloned().unwrap_or_default();

    let category = item.category.as_deref().and_then(|name| vocabulary.find_category(name));
    let manufacturer =
        item.manufacturer.as_deref().and_then(|name| vocabulary.find_manufacturer(name));
    let unit = item.unit.as_deref().and_then(|name| vocabulary.find_unit(name));
    let condition = item.condition.as_deref().and_then(|name| vocabulary.find_condition(name));

    let now = Utc::now();
    let mut listing = Listing {
        id: ListingId(Uuid::new_v4().to_string()),
        message_id: message.id.clone(),
        sender_name: message.sender_name.clone(),
        sender_phone: message.sender_phone.clone(),
        intent: result.intent,
        status,
        part_number: item.part_number,
        description: item.description,
        quantity: item.quantity,
        price: item.price,
        currency: item.currency,
        total_price: None,
        category_id: category.map(|category| category.id.clone()),
        manufacturer_id: manufacturer.map(|manufacturer| manufacturer.id.clone()),
        unit_id: unit.map(|unit| unit.id.clone()),
        condition_id: condition.map(|condition| condition.id.clone()),
        confidence_score: result.confidence,
        needs_human_review: status == ListingStatus::PendingReview,
        reviewed_by: None,
        reviewed_at: None,
        deleted_at: None,
        deleted_by: None,
        created_at: now,
        updated_at: now,
    };
    listing.total_price = listing.derived_total();

    (listing, category.map(|category| category.name.clone()))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tokio::sync::Mutex;

    use tradepost_core::domain::message::{Conversation, ConversationId, MessageId, RawMessage};
    use tradepost_core::domain::reference::{Category, CategoryId, Vocabulary};
    use tradepost_core::domain::rules::{NotificationRule, NotificationRuleId, RuleCriteria};
    use tradepost_core::domain::task::{PipelineTask, PipelineTaskId, TaskKind};
    use tradepost_core::routing::RoutingThresholds;
    use tradepost_core::{Intent, Listing, ListingStatus, ReviewReason, ReviewStatus};
    use tradepost_db::repositories::{
        InMemoryAuditLog, InMemoryJargonRepository, InMemoryListingRepository,
        InMemoryMessageRepository, InMemoryNotificationRuleRepository,
        InMemoryReferenceRepository, InMemoryReviewQueueRepository, JargonRepository,
        ListingRepository, MessageRepository, NotificationRuleRepository, ReviewQueueRepository,
    };
    use tradepost_db::ReferenceCache;
    use tradepost_extract::{ExtractionEngine, LlmClient, LlmError};

    use super::Orchestrator;
    use crate::jargon::JargonLearner;
    use crate::notify::{DispatchError, NotificationDispatcher, NotificationMatcher};

    struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
    }

    impl ScriptedLlm {
        fn replying(reply: &str) -> Self {
            Self { replies: Mutex::new(vec![Ok(reply.to_string())].into()) }
        }

        fn failing() -> Self {
            Self {
                replies: Mutex::new(
                    vec![Err(LlmError::Transport("connection reset".to_string()))].into(),
                ),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete_json(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
            self.replies
                .lock()
                .await
                .pop_front()
                .unwrap_or(Err(LlmError::Transport("script exhausted".to_string())))
        }
    }

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationDispatcher for RecordingDispatcher {
        async fn send(
            &self,
            rule: &NotificationRule,
            _listing: &Listing,
        ) -> Result<(), DispatchError> {
            self.sent.lock().await.push(rule.id.0.clone());
            Ok(())
        }
    }

    struct Fixture {
        messages: Arc<InMemoryMessageRepository>,
        listings: Arc<InMemoryListingRepository>,
        reviews: Arc<InMemoryReviewQueueRepository>,
        jargon: Arc<InMemoryJargonRepository>,
        rules: Arc<InMemoryNotificationRuleRepository>,
        dispatcher: Arc<RecordingDispatcher>,
        orchestrator: Orchestrator,
    }

    fn fixture(llm: ScriptedLlm) -> Fixture {
        let messages = Arc::new(InMemoryMessageRepository::default());
        let listings = Arc::new(InMemoryListingRepository::default());
        let reviews = Arc::new(InMemoryReviewQueueRepository::default());
        let jargon = Arc::new(InMemoryJargonRepository::default());
        let rules = Arc::new(InMemoryNotificationRuleRepository::default());
        let dispatcher = Arc::new(RecordingDispatcher::default());

        let reference = Arc::new(ReferenceCache::new(Arc::new(
            InMemoryReferenceRepository::with_vocabulary(Vocabulary {
                categories: vec![Category {
                    id: CategoryId("cat-pipe".to_string()),
                    name: "Pipe".to_string(),
                    aliases: vec!["piping".to_string()],
                }],
                ..Vocabulary::default()
            }),
        )));
        let learner = Arc::new(JargonLearner::new(
            jargon.clone(),
            Arc::new(InMemoryAuditLog::default()),
        ));
        let matcher =
            Arc::new(NotificationMatcher::new(rules.clone(), dispatcher.clone()));
        let engine = Arc::new(ExtractionEngine::new(Arc::new(llm)));

        let orchestrator = Orchestrator::new(
            messages.clone(),
            listings.clone(),
            reviews.clone(),
            learner,
            reference,
            engine,
            None,
            matcher,
            RoutingThresholds::default(),
        );

        Fixture { messages, listings, reviews, jargon, rules, dispatcher, orchestrator }
    }

    async fn archive_message(fixture: &Fixture, id: &str, body: &str) -> MessageId {
        let message_id = MessageId(id.to_string());
        let message = RawMessage {
            id: message_id.clone(),
            external_id: format!("wa-{id}"),
            conversation_id: ConversationId("C-1".to_string()),
            sender_id: "wa-user-7".to_string(),
            sender_name: "Dale".to_string(),
            sender_phone: Some("+15550001111".to_string()),
            body: body.to_string(),
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
        };
        let conversation = Conversation {
            id: ConversationId("C-1".to_string()),
            external_id: "wa-group-1".to_string(),
            display_name: None,
            created_at: Utc::now(),
        };
        let task = PipelineTask::enqueue(
            PipelineTaskId(format!("T-{id}")),
            TaskKind::ExtractMessage,
            message_id.clone(),
            5,
        );
        fixture.messages.archive(message, conversation, task).await.expect("archive");
        message_id
    }

    const HIGH_CONFIDENCE_SELL: &str = r#"{
        "intent": "sell",
        "items": [{"part_number": "316-SS-PIPE", "description": "316 SS pipe",
                   "quantity": 500, "unit": "ft", "category": "piping",
                   "price": 12, "currency": "USD"}],
        "unknown_terms": ["BNIB = brand new in box"],
        "confidence": 0.92,
        "explanation": "clear sell offer"
    }"#;

    #[tokio::test]
    async fn high_confidence_sell_publishes_and_notifies() {
        let fixture = fixture(ScriptedLlm::replying(HIGH_CONFIDENCE_SELL));
        fixture
            .rules
            .save(NotificationRule {
                id: NotificationRuleId("R-1".to_string()),
                owner: "buyer-3".to_string(),
                rule_text: "SS pipe under $15/ft".to_string(),
                criteria: RuleCriteria {
                    keywords: vec!["SS".to_string(), "pipe".to_string()],
                    price_max: Some(Decimal::new(15, 0)),
                    ..RuleCriteria::default()
                },
                channel_endpoint: "https://hooks.example/buyer-3".to_string(),
                active: true,
                last_triggered: None,
                created_at: Utc::now(),
            })
            .await
            .expect("save rule");

        let message_id =
            archive_message(&fixture, "M-1", "WTS 500ft 316 SS pipe $12/ft BNIB").await;
        fixture.orchestrator.process_message(&message_id).await.expect("process");

        let listing =
            fixture.listings.find_by_message_id(&message_id).await.expect("find").expect("listing");
        assert_eq!(listing.intent, Intent::Sell);
        assert_eq!(listing.status, ListingStatus::Active);
        assert!(!listing.needs_human_review);
        assert_eq!(listing.category_id, Some(CategoryId("cat-pipe".to_string())));
        assert_eq!(listing.total_price, Some(Decimal::new(6000, 0)));

        assert!(fixture.reviews.list_pending().await.expect("list").is_empty());
        assert_eq!(fixture.dispatcher.sent.lock().await.clone(), vec!["R-1"]);

        let message =
            fixture.messages.find_by_id(&message_id).await.expect("find").expect("message");
        assert!(message.processed);
        assert_eq!(message.processing_error, None);
    }

    #[tokio::test]
    async fn medium_confidence_queues_a_draft_listing() {
        let reply = r#"{"intent": "sell",
                        "items": [{"part_number": "XJ-900", "price": 1200}],
                        "confidence": 0.65}"#;
        let fixture = fixture(ScriptedLlm::replying(reply));

        let message_id = archive_message(&fixture, "M-1", "maybe selling XJ-900 pumps").await;
        fixture.orchestrator.process_message(&message_id).await.expect("process");

        let listing =
            fixture.listings.find_by_message_id(&message_id).await.expect("find").expect("listing");
        assert_eq!(listing.status, ListingStatus::PendingReview);
        assert!(listing.needs_human_review);

        let pending = fixture.reviews.list_pending().await.expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].reason, ReviewReason::MediumConfidence);
        assert_eq!(pending[0].listing_id, Some(listing.id));
        assert!(fixture.dispatcher.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn low_confidence_queues_without_a_listing() {
        let reply = r#"{"intent": "unknown", "items": [], "confidence": 0.2,
                        "explanation": "mostly greetings"}"#;
        let fixture = fixture(ScriptedLlm::replying(reply));

        let message_id = archive_message(&fixture, "M-1", "gm all, anyone around?").await;
        fixture.orchestrator.process_message(&message_id).await.expect("process");

        assert!(fixture
            .listings
            .find_by_message_id(&message_id)
            .await
            .expect("find")
            .is_none());

        let pending = fixture.reviews.list_pending().await.expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].reason, ReviewReason::LowConfidence);
        assert_eq!(pending[0].listing_id, None);
    }

    #[tokio::test]
    async fn llm_failure_downgrades_and_marks_processed_with_error() {
        let fixture = fixture(ScriptedLlm::failing());

        let message_id = archive_message(&fixture, "M-1", "WTS XJ-900").await;
        fixture.orchestrator.process_message(&message_id).await.expect("process");

        let pending = fixture.reviews.list_pending().await.expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].reason, ReviewReason::ExtractionFailed);
        assert_eq!(pending[0].status, ReviewStatus::Pending);

        let message =
            fixture.messages.find_by_id(&message_id).await.expect("find").expect("message");
        assert!(message.processed);
        assert!(message.processing_error.as_deref().unwrap().contains("llm call failed"));
    }

    #[tokio::test]
    async fn unknown_terms_are_learned_unverified() {
        let fixture = fixture(ScriptedLlm::replying(HIGH_CONFIDENCE_SELL));

        let message_id =
            archive_message(&fixture, "M-1", "WTS 500ft 316 SS pipe $12/ft BNIB").await;
        fixture.orchestrator.process_message(&message_id).await.expect("process");

        let entries = fixture.jargon.list_all().await.expect("list");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].acronym, "BNIB");
        assert_eq!(entries[0].expansion, "brand new in box");
        assert!(!entries[0].verified);
    }

    #[tokio::test]
    async fn already_processed_message_is_a_no_op() {
        let fixture = fixture(ScriptedLlm::replying(HIGH_CONFIDENCE_SELL));

        let message_id = archive_message(&fixture, "M-1", "WTS XJ-900").await;
        fixture
            .messages
            .mark_processed(&message_id, None)
            .await
            .expect("mark processed");

        fixture.orchestrator.process_message(&message_id).await.expect("process");

        assert!(fixture
            .listings
            .find_by_message_id(&message_id)
            .await
            .expect("find")
            .is_none());
    }
}
