use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use tradepost_core::domain::extraction::FieldSnapshot;
use tradepost_core::domain::reference::Vocabulary;
use tradepost_core::{ApplicationError, AuditRecord, Listing, ListingId};
use tradepost_db::repositories::{
    AuditLog, ListingRepository, MessageRepository, RepositoryError,
};
use tradepost_db::ReferenceCache;

use tradepost_extract::ExtractionEngine;

use crate::jargon::JargonLearner;

/// Reviewer-assisted re-extraction. The model sees the original message,
/// the listing's current field values, and the reviewer's hint; only the
/// fields it returns are overwritten, so a hint about price cannot wipe
/// out a correct part number.
pub struct RetryService {
    listings: Arc<dyn ListingRepository>,
    messages: Arc<dyn MessageRepository>,
    reference: Arc<ReferenceCache>,
    learner: Arc<JargonLearner>,
    engine: Arc<ExtractionEngine>,
    audit: Arc<dyn AuditLog>,
}

impl RetryService {
    pub fn new(
        listings: Arc<dyn ListingRepository>,
        messages: Arc<dyn MessageRepository>,
        reference: Arc<ReferenceCache>,
        learner: Arc<JargonLearner>,
        engine: Arc<ExtractionEngine>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self { listings, messages, reference, learner, engine, audit }
    }

    pub async fn retry(
        &self,
        listing_id: &ListingId,
        hint: &str,
        actor: &str,
    ) -> Result<Listing, ApplicationError> {
        if hint.trim().is_empty() {
            return Err(ApplicationError::Validation("hint must not be empty".to_string()));
        }

        let mut listing = self
            .listings
            .find_by_id(listing_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| ApplicationError::NotFound {
                kind: "listing",
                id: listing_id.0.clone(),
            })?;
        if listing.is_deleted() {
            return Err(ApplicationError::NotFound { kind: "listing", id: listing_id.0.clone() });
        }

        let message = self
            .messages
            .find_by_id(&listing.message_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| ApplicationError::NotFound {
                kind: "message",
                id: listing.message_id.0.clone(),
            })?;

        let vocabulary = self.reference.vocabulary().await.map_err(persistence)?;
        let glossary = self.learner.verified_glossary().await.map_err(persistence)?;
        let previous = snapshot_of(&listing, &vocabulary);

        let result = self
            .engine
            .extract_with_hint(&message.body, &previous, hint, &vocabulary, &glossary)
            .await;
        if result.is_failure() {
            let reason = result
                .explanation
                .unwrap_or_else(|| "re-extraction failed".to_string());
            return Err(ApplicationError::ExternalService(reason));
        }

        let before = snapshot(&listing);
        merge_result(&mut listing, &result, &vocabulary);
        listing.total_price = listing.derived_total();
        listing.updated_at = Utc::now();

        self.listings.save(listing.clone()).await.map_err(persistence)?;
        self.learner.learn(&result.unknown_terms).await.map_err(persistence)?;

        let record = AuditRecord::new(actor, "listing.retry_extraction", "listing", listing.id.0.clone())
            .with_before(before)
            .with_after(snapshot(&listing));
        self.audit.append(record).await.map_err(persistence)?;

        info!(
            event_name = "pipeline.retry_applied",
            listing_id = %listing.id.0,
            confidence = result.confidence,
            actor,
            "assisted retry applied"
        );
        Ok(listing)
    }
}

/// The listing's normalized ids rendered back to names, so the snapshot
/// the model sees speaks the same vocabulary as the system prompt.
fn snapshot_of(listing: &Listing, vocabulary: &Vocabulary) -> FieldSnapshot {
    FieldSnapshot {
        intent: Some(listing.intent),
        part_number: listing.part_number.clone(),
        description: listing.description.clone(),
        quantity: listing.quantity,
        unit: listing.unit_id.as_ref().and_then(|id| {
            vocabulary.units.iter().find(|unit| unit.id == *id).map(|unit| unit.name.clone())
        }),
        category: listing.category_id.as_ref().and_then(|id| {
            vocabulary
                .categories
                .iter()
                .find(|category| category.id == *id)
                .map(|category| category.name.clone())
        }),
        manufacturer: listing.manufacturer_id.as_ref().and_then(|id| {
            vocabulary
                .manufacturers
                .iter()
                .find(|manufacturer| manufacturer.id == *id)
                .map(|manufacturer| manufacturer.name.clone())
        }),
        condition: listing.condition_id.as_ref().and_then(|id| {
            vocabulary
                .conditions
                .iter()
                .find(|condition| condition.id == *id)
                .map(|condition| condition.name.clone())
        }),
        price: listing.price,
        currency: listing.currency.clone(),
    }
}

/// Overwrites only the fields the new extraction actually returned.
fn merge_result(
    listing: &mut Listing,
    result: &tradepost_core::ExtractionResult,
    vocabulary: &Vocabulary,
) {
    if result.intent != tradepost_core::Intent::Unknown {
        listing.intent = result.intent;
    }
    listing.confidence_score = result.confidence;

    let Some(item) = result.primary_item() else {
        return;
    };
    if let Some(part_number) = &item.part_number {
        listing.part_number = Some(part_number.clone());
    }
    if let Some(description) = &item.description {
        listing.description = Some(description.clone());
    }
    if let Some(quantity) = item.quantity {
        listing.quantity = Some(quantity);
    }
    if let Some(price) = item.price {
        listing.price = Some(price);
    }
    if let Some(currency) = &item.currency {
        listing.currency = Some(currency.clone());
    }
    if let Some(category) = &item.category {
        if let Some(known) = vocabulary.find_category(category) {
            listing.category_id = Some(known.id.clone());
        }
    }
    if let Some(manufacturer) = &item.manufacturer {
        if let Some(known) = vocabulary.find_manufacturer(manufacturer) {
            listing.manufacturer_id = Some(known.id.clone());
        }
    }
    if let Some(unit) = &item.unit {
        if let Some(known) = vocabulary.find_unit(unit) {
            listing.unit_id = Some(known.id.clone());
        }
    }
    if let Some(condition) = &item.condition {
        if let Some(known) = vocabulary.find_condition(condition) {
            listing.condition_id = Some(known.id.clone());
        }
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

fn snapshot<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}
