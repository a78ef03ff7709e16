use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use tradepost_core::domain::reference::Vocabulary;
use tradepost_core::{
    ApplicationError, AuditRecord, DomainError, Listing, ListingId, ListingStatus,
    ResolutionSnapshot, ReviewCorrections, ReviewQueueItem, ReviewQueueItemId, ReviewStatus,
};
use tradepost_db::repositories::{
    AuditLog, ListingRepository, MessageRepository, RepositoryError, ReviewQueueRepository,
};
use tradepost_db::ReferenceCache;

use crate::notify::NotificationMatcher;

/// Resolve/skip over the review queue. The pending-to-terminal flip is a
/// compare-and-swap in the repository, so concurrent reviewers cannot
/// both win; the loser gets an invalid-transition error.
pub struct ReviewService {
    reviews: Arc<dyn ReviewQueueRepository>,
    listings: Arc<dyn ListingRepository>,
    messages: Arc<dyn MessageRepository>,
    reference: Arc<ReferenceCache>,
    matcher: Arc<NotificationMatcher>,
    audit: Arc<dyn AuditLog>,
}

impl ReviewService {
    pub fn new(
        reviews: Arc<dyn ReviewQueueRepository>,
        listings: Arc<dyn ListingRepository>,
        messages: Arc<dyn MessageRepository>,
        reference: Arc<ReferenceCache>,
        matcher: Arc<NotificationMatcher>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self { reviews, listings, messages, reference, matcher, audit }
    }

    /// Applies the reviewer's corrections, activates the listing
    /// (creating one when the item carried no draft), and marks the item
    /// resolved. Runs the notification matcher for the now-active
    /// listing.
    pub async fn resolve(
        &self,
        id: &ReviewQueueItemId,
        corrections: ReviewCorrections,
        note: Option<String>,
        actor: &str,
    ) -> Result<ListingId, ApplicationError> {
        let item = self.load_item(id).await?;
        item.guard_transition(ReviewStatus::Resolved)?;

        let now = Utc::now();
        let mut listing = match &item.listing_id {
            Some(listing_id) => {
                let mut draft = self
                    .listings
                    .find_by_id(listing_id)
                    .await
                    .map_err(persistence)?
                    .ok_or_else(|| ApplicationError::NotFound {
                        kind: "listing",
                        id: listing_id.0.clone(),
                    })?;
                draft.transition_to(ListingStatus::Active)?;
                draft
            }
            None => self.build_listing(&item).await?,
        };

        apply_corrections(&mut listing, &corrections);
        listing.total_price = listing.derived_total();
        listing.needs_human_review = false;
        listing.reviewed_by = Some(actor.to_string());
        listing.reviewed_at = Some(now);
        listing.updated_at = now;

        let resolution = ResolutionSnapshot {
            corrections,
            listing_id: listing.id.clone(),
            note,
        };

        let won = self
            .reviews
            .mark_resolved(id, actor, &resolution, now)
            .await
            .map_err(persistence)?;
        if !won {
            return Err(self.lost_transition(id, ReviewStatus::Resolved).await);
        }

        self.listings.save(listing.clone()).await.map_err(persistence)?;

        let record = AuditRecord::new(actor, "review.resolve", "review_queue_item", id.0.clone())
            .with_before(snapshot(&item))
            .with_after(snapshot(&resolution));
        self.audit.append(record).await.map_err(persistence)?;

        let vocabulary = self.reference.vocabulary().await.map_err(persistence)?;
        let category_name = category_name(&vocabulary, &listing);
        self.matcher
            .notify_matches(&listing, category_name.as_deref())
            .await
            .map_err(persistence)?;

        info!(
            event_name = "pipeline.review_resolved",
            item_id = %id.0,
            listing_id = %listing.id.0,
            actor,
            "review item resolved"
        );
        Ok(listing.id)
    }

    /// Marks the item skipped. Touches no listing.
    pub async fn skip(
        &self,
        id: &ReviewQueueItemId,
        actor: &str,
    ) -> Result<(), ApplicationError> {
        let item = self.load_item(id).await?;
        item.guard_transition(ReviewStatus::Skipped)?;

        let won = self
            .reviews
            .mark_skipped(id, actor, Utc::now())
            .await
            .map_err(persistence)?;
        if !won {
            return Err(self.lost_transition(id, ReviewStatus::Skipped).await);
        }

        let record = AuditRecord::new(actor, "review.skip", "review_queue_item", id.0.clone())
            .with_before(snapshot(&item));
        self.audit.append(record).await.map_err(persistence)?;

        info!(
            event_name = "pipeline.review_skipped",
            item_id = %id.0,
            actor,
            "review item skipped"
        );
        Ok(())
    }

    async fn load_item(
        &self,
        id: &ReviewQueueItemId,
    ) -> Result<ReviewQueueItem, ApplicationError> {
        self.reviews
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| ApplicationError::NotFound {
                kind: "review queue item",
                id: id.0.clone(),
            })
    }

    /// The CAS lost: report the transition against the item's actual
    /// terminal state.
    async fn lost_transition(
        &self,
        id: &ReviewQueueItemId,
        attempted: ReviewStatus,
    ) -> ApplicationError {
        let from = match self.reviews.find_by_id(id).await {
            Ok(Some(current)) => current.status,
            _ => ReviewStatus::Resolved,
        };
        DomainError::InvalidReviewTransition { from, to: attempted }.into()
    }

    /// Item queued without a draft: the reviewer builds the listing from
    /// the suggested values, with their corrections layered on top.
    async fn build_listing(&self, item: &ReviewQueueItem) -> Result<Listing, ApplicationError> {
        let message = self
            .messages
            .find_by_id(&item.message_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| ApplicationError::NotFound {
                kind: "message",
                id: item.message_id.0.clone(),
            })?;

        let suggested = item.suggested_values.items.first().cloned().unwrap_or_default();
        let now = Utc::now();
        Ok(Listing {
            id: ListingId(Uuid::new_v4().to_string()),
            message_id: message.id,
            sender_name: message.sender_name,
            sender_phone: message.sender_phone,
            intent: item.suggested_values.intent,
            status: ListingStatus::Active,
            part_number: suggested.part_number,
            description: suggested.description,
            quantity: suggested.quantity,
            price: suggested.price,
            currency: suggested.currency,
            total_price: None,
            category_id: None,
            manufacturer_id: None,
            unit_id: None,
            condition_id: None,
            confidence_score: item.suggested_values.confidence,
            needs_human_review: false,
            reviewed_by: None,
            reviewed_at: None,
            deleted_at: None,
            deleted_by: None,
            created_at: now,
            updated_at: now,
        })
    }
}

fn apply_corrections(listing: &mut Listing, corrections: &ReviewCorrections) {
    if let Some(intent) = corrections.intent {
        listing.intent = intent;
    }
    if let Some(part_number) = &corrections.part_number {
        listing.part_number = Some(part_number.clone());
    }
    if let Some(description) = &corrections.description {
        listing.description = Some(description.clone());
    }
    if let Some(quantity) = corrections.quantity {
        listing.quantity = Some(quantity);
    }
    if let Some(price) = corrections.price {
        listing.price = Some(price);
    }
    if let Some(currency) = &corrections.currency {
        listing.currency = Some(currency.clone());
    }
    if let Some(category_id) = &corrections.category_id {
        listing.category_id = Some(category_id.clone());
    }
    if let Some(manufacturer_id) = &corrections.manufacturer_id {
        listing.manufacturer_id = Some(manufacturer_id.clone());
    }
    if let Some(unit_id) = &corrections.unit_id {
        listing.unit_id = Some(unit_id.clone());
    }
    if let Some(condition_id) = &corrections.condition_id {
        listing.condition_id = Some(condition_id.clone());
    }
}

fn category_name(vocabulary: &Vocabulary, listing: &Listing) -> Option<String> {
    let category_id = listing.category_id.as_ref()?;
    vocabulary
        .categories
        .iter()
        .find(|category| category.id == *category_id)
        .map(|category| category.name.clone())
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

fn snapshot<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}
