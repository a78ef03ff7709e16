use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::extraction::Intent;
use crate::domain::message::MessageId;
use crate::domain::reference::{CategoryId, ConditionId, ManufacturerId, UnitId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListingId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    PendingReview,
    Expired,
    Sold,
    Deleted,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PendingReview => "pending_review",
            Self::Expired => "expired",
            Self::Sold => "sold",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "pending_review" => Some(Self::PendingReview),
            "expired" => Some(Self::Expired),
            "sold" => Some(Self::Sold),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Structured trade listing extracted from exactly one raw message.
/// Listings are never physically deleted; `deleted_at`/`deleted_by` mark
/// the soft delete.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub message_id: MessageId,
    pub sender_name: String,
    pub sender_phone: Option<String>,
    pub intent: Intent,
    pub status: ListingStatus,
    pub part_number: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub total_price: Option<Decimal>,
    pub category_id: Option<CategoryId>,
    pub manufacturer_id: Option<ManufacturerId>,
    pub unit_id: Option<UnitId>,
    pub condition_id: Option<ConditionId>,
    pub confidence_score: f64,
    pub needs_human_review: bool,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    pub fn can_transition_to(&self, next: ListingStatus) -> bool {
        matches!(
            (self.status, next),
            (ListingStatus::PendingReview, ListingStatus::Active)
                | (ListingStatus::Active, ListingStatus::Expired)
                | (ListingStatus::Active, ListingStatus::Sold)
                | (_, ListingStatus::Deleted)
        )
    }

    pub fn transition_to(&mut self, next: ListingStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidListingTransition { from: self.status, to: next })
    }

    pub fn is_deleted(&self) -> bool {
        self.status == ListingStatus::Deleted || self.deleted_at.is_some()
    }

    /// `price * quantity` where both are present; bare price otherwise.
    pub fn derived_total(&self) -> Option<Decimal> {
        match (self.price, self.quantity) {
            (Some(price), Some(quantity)) => Some(price * quantity),
            (Some(price), None) => Some(price),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::extraction::Intent;
    use crate::domain::message::MessageId;

    use super::{Listing, ListingId, ListingStatus};

    fn listing(status: ListingStatus) -> Listing {
        Listing {
            id: ListingId("L-1".to_string()),
            message_id: MessageId("M-1".to_string()),
            sender_name: "Ahmed Surplus".to_string(),
            sender_phone: Some("+15550100".to_string()),
            intent: Intent::Sell,
            status,
            part_number: Some("316-SS-2IN".to_string()),
            description: Some("316 SS pipe".to_string()),
            quantity: Some(Decimal::new(500, 0)),
            price: Some(Decimal::new(1200, 2)),
            currency: Some("USD".to_string()),
            total_price: None,
            category_id: None,
            manufacturer_id: None,
            unit_id: None,
            condition_id: None,
            confidence_score: 0.92,
            needs_human_review: false,
            reviewed_by: None,
            reviewed_at: None,
            deleted_at: None,
            deleted_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn pending_review_listing_can_activate() {
        let mut listing = listing(ListingStatus::PendingReview);
        listing.transition_to(ListingStatus::Active).expect("pending_review -> active");
        assert_eq!(listing.status, ListingStatus::Active);
    }

    #[test]
    fn sold_listing_cannot_reactivate() {
        let mut listing = listing(ListingStatus::Sold);
        let error = listing
            .transition_to(ListingStatus::Active)
            .expect_err("sold -> active should fail");
        assert!(matches!(
            error,
            crate::errors::DomainError::InvalidListingTransition { .. }
        ));
    }

    #[test]
    fn any_status_can_soft_delete() {
        for status in [ListingStatus::Active, ListingStatus::PendingReview, ListingStatus::Sold] {
            let mut listing = listing(status);
            listing.transition_to(ListingStatus::Deleted).expect("soft delete always allowed");
        }
    }

    #[test]
    fn derived_total_multiplies_price_by_quantity() {
        let listing = listing(ListingStatus::Active);
        assert_eq!(listing.derived_total(), Some(Decimal::new(600000, 2)));
    }
}
