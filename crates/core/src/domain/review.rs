use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::extraction::{ExtractedItem, Intent};
use crate::domain::listing::ListingId;
use crate::domain::message::MessageId;
use crate::domain::reference::{CategoryId, ConditionId, ManufacturerId, UnitId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewQueueItemId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Resolved,
    Skipped,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "resolved" => Some(Self::Resolved),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// Why the confidence router queued a message for a human. Stored as a
/// typed tag so the review UI never has to interpret free text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    LowConfidence,
    MediumConfidence,
    UnknownIntent,
    ExtractionFailed,
}

impl ReviewReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowConfidence => "low_confidence",
            Self::MediumConfidence => "medium_confidence",
            Self::UnknownIntent => "unknown_intent",
            Self::ExtractionFailed => "extraction_failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low_confidence" => Some(Self::LowConfidence),
            "medium_confidence" => Some(Self::MediumConfidence),
            "unknown_intent" => Some(Self::UnknownIntent),
            "extraction_failed" => Some(Self::ExtractionFailed),
            _ => None,
        }
    }
}

/// Typed snapshot of the raw extraction at queue time. The reviewer sees
/// exactly what the model reported, whether or not a draft listing exists.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestedValues {
    pub intent: Intent,
    pub items: Vec<ExtractedItem>,
    pub unknown_terms: Vec<String>,
    pub confidence: f64,
}

/// Field corrections a reviewer applies on resolve. `None` leaves the
/// draft value untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewCorrections {
    pub intent: Option<Intent>,
    pub part_number: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub category_id: Option<CategoryId>,
    pub manufacturer_id: Option<ManufacturerId>,
    pub unit_id: Option<UnitId>,
    pub condition_id: Option<ConditionId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolutionSnapshot {
    pub corrections: ReviewCorrections,
    pub listing_id: ListingId,
    pub note: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewQueueItem {
    pub id: ReviewQueueItemId,
    pub message_id: MessageId,
    pub listing_id: Option<ListingId>,
    pub reason: ReviewReason,
    pub llm_explanation: Option<String>,
    pub suggested_values: SuggestedValues,
    pub status: ReviewStatus,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<ResolutionSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewQueueItem {
    /// pending -> {resolved, skipped} is the only legal move; terminal
    /// states never change again.
    pub fn can_transition_to(&self, next: ReviewStatus) -> bool {
        matches!(
            (self.status, next),
            (ReviewStatus::Pending, ReviewStatus::Resolved)
                | (ReviewStatus::Pending, ReviewStatus::Skipped)
        )
    }

    pub fn guard_transition(&self, next: ReviewStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            return Ok(());
        }

        Err(DomainError::InvalidReviewTransition { from: self.status, to: next })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::message::MessageId;

    use super::{
        ReviewQueueItem, ReviewQueueItemId, ReviewReason, ReviewStatus, SuggestedValues,
    };

    fn item(status: ReviewStatus) -> ReviewQueueItem {
        ReviewQueueItem {
            id: ReviewQueueItemId("RQ-1".to_string()),
            message_id: MessageId("M-1".to_string()),
            listing_id: None,
            reason: ReviewReason::LowConfidence,
            llm_explanation: Some("could not identify a part number".to_string()),
            suggested_values: SuggestedValues::default(),
            status,
            resolved_by: None,
            resolved_at: None,
            resolution: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn pending_item_can_resolve_or_skip() {
        assert!(item(ReviewStatus::Pending).can_transition_to(ReviewStatus::Resolved));
        assert!(item(ReviewStatus::Pending).can_transition_to(ReviewStatus::Skipped));
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        for terminal in [ReviewStatus::Resolved, ReviewStatus::Skipped] {
            let error = item(terminal)
                .guard_transition(ReviewStatus::Resolved)
                .expect_err("terminal item must not transition");
            assert!(matches!(
                error,
                crate::errors::DomainError::InvalidReviewTransition { .. }
            ));
        }
    }

    #[test]
    fn reason_round_trips_through_str() {
        for reason in [
            ReviewReason::LowConfidence,
            ReviewReason::MediumConfidence,
            ReviewReason::UnknownIntent,
            ReviewReason::ExtractionFailed,
        ] {
            assert_eq!(ReviewReason::parse(reason.as_str()), Some(reason));
        }
    }
}
