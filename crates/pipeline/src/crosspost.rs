use std::sync::Arc;

use tradepost_core::{ApplicationError, CrossPostSignature, Listing, ListingId};
use tradepost_db::repositories::ListingRepository;

/// Read-only lookup of listings that look like the same offer posted to
/// multiple conversations. A UI signal; it never suppresses
/// notifications or merges rows.
pub struct CrossPostDetector {
    listings: Arc<dyn ListingRepository>,
}

impl CrossPostDetector {
    pub fn new(listings: Arc<dyn ListingRepository>) -> Self {
        Self { listings }
    }

    pub async fn find_crossposts(
        &self,
        listing_id: &ListingId,
    ) -> Result<Vec<Listing>, ApplicationError> {
        let listing = self
            .listings
            .find_by_id(listing_id)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?
            .ok_or_else(|| ApplicationError::NotFound {
                kind: "listing",
                id: listing_id.0.clone(),
            })?;

        let Some(signature) = CrossPostSignature::of(&listing) else {
            return Ok(Vec::new());
        };

        let candidates = self
            .listings
            .list_not_deleted_by_part_number(&signature.part_number)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

        Ok(candidates
            .into_iter()
            .filter(|candidate| {
                candidate.id != listing.id
                    && candidate.message_id != listing.message_id
                    && signature.matches(candidate)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use tradepost_core::{
        ApplicationError, Intent, Listing, ListingId, ListingStatus, MessageId,
    };
    use tradepost_db::repositories::{InMemoryListingRepository, ListingRepository};

    use super::CrossPostDetector;

    fn listing(id: &str, message: &str, part: Option<&str>, price: i64) -> Listing {
        Listing {
            id: ListingId(id.to_string()),
            message_id: MessageId(message.to_string()),
            sender_name: "Acme Surplus".to_string(),
            sender_phone: Some("+15550001111".to_string()),
            intent: Intent::Sell,
            status: ListingStatus::Active,
            part_number: part.map(str::to_string),
            description: None,
            quantity: None,
            price: Some(Decimal::new(price, 0)),
            currency: Some("USD".to_string()),
            total_price: None,
            category_id: None,
            manufacturer_id: None,
            unit_id: None,
            condition_id: None,
            confidence_score: 0.9,
            needs_human_review: false,
            reviewed_by: None,
            reviewed_at: None,
            deleted_at: None,
            deleted_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn cross_posts_share_sender_part_and_price_across_messages() {
        let repo = Arc::new(InMemoryListingRepository::default());
        repo.save(listing("L-1", "M-1", Some("XJ-900"), 1200)).await.expect("save");
        repo.save(listing("L-2", "M-2", Some("XJ-900"), 1200)).await.expect("save");
        repo.save(listing("L-3", "M-3", Some("XJ-900"), 900)).await.expect("save");

        let detector = CrossPostDetector::new(repo);
        let matches =
            detector.find_crossposts(&ListingId("L-1".to_string())).await.expect("detect");

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id.0, "L-2");
    }

    #[tokio::test]
    async fn sold_and_expired_cross_posts_are_still_reported() {
        let repo = Arc::new(InMemoryListingRepository::default());
        repo.save(listing("L-1", "M-1", Some("XJ-900"), 1200)).await.expect("save");

        let mut sold = listing("L-2", "M-2", Some("XJ-900"), 1200);
        sold.status = ListingStatus::Sold;
        repo.save(sold).await.expect("save");

        let mut expired = listing("L-3", "M-3", Some("XJ-900"), 1200);
        expired.status = ListingStatus::Expired;
        repo.save(expired).await.expect("save");

        let mut deleted = listing("L-4", "M-4", Some("XJ-900"), 1200);
        deleted.status = ListingStatus::Deleted;
        deleted.deleted_at = Some(Utc::now());
        repo.save(deleted).await.expect("save");

        let detector = CrossPostDetector::new(repo);
        let matches =
            detector.find_crossposts(&ListingId("L-1".to_string())).await.expect("detect");

        let mut ids: Vec<&str> = matches.iter().map(|found| found.id.0.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["L-2", "L-3"]);
    }

    #[tokio::test]
    async fn listing_without_a_part_number_has_no_cross_posts() {
        let repo = Arc::new(InMemoryListingRepository::default());
        repo.save(listing("L-1", "M-1", None, 1200)).await.expect("save");

        let detector = CrossPostDetector::new(repo);
        let matches =
            detector.find_crossposts(&ListingId("L-1".to_string())).await.expect("detect");

        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn missing_listing_is_not_found() {
        let detector = CrossPostDetector::new(Arc::new(InMemoryListingRepository::default()));
        let error = detector
            .find_crossposts(&ListingId("L-404".to_string()))
            .await
            .expect_err("should fail");

        assert!(matches!(error, ApplicationError::NotFound { .. }));
    }
}
