//! Confidence routing: the single decision point between an extraction
//! result and what gets persisted. Pure so it can be tested exhaustively
//! without a database or model in the loop.

use serde::{Deserialize, Serialize};

use crate::domain::extraction::{ExtractionResult, Intent};
use crate::domain::review::ReviewReason;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingThresholds {
    /// At or above this, a listing goes live without review.
    pub upper: f64,
    /// Below this, nothing is drafted; the raw extraction goes straight
    /// to the queue.
    pub lower: f64,
}

impl Default for RoutingThresholds {
    fn default() -> Self {
        Self { upper: 0.8, lower: 0.5 }
    }
}

/// Closed set of routing outcomes. Every extraction lands in exactly one
/// arm, so the orchestrator's match has no fallthrough.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum RouteDecision {
    /// Publish an active listing immediately.
    AutoAccept,
    /// Create a draft listing in pending review and queue it.
    QueueWithDraft { reason: ReviewReason },
    /// Queue the raw extraction only; no listing row is created.
    QueueWithoutDraft { reason: ReviewReason },
}

pub fn route(result: &ExtractionResult, thresholds: RoutingThresholds) -> RouteDecision {
    let confidence = result.confidence;

    if confidence >= thresholds.upper {
        if result.intent == Intent::Unknown {
            // High confidence with no discernible intent is still not
            // publishable; a human decides what it was.
            return RouteDecision::QueueWithDraft { reason: ReviewReason::UnknownIntent };
        }
        return RouteDecision::AutoAccept;
    }

    if confidence >= thresholds.lower {
        return RouteDecision::QueueWithDraft { reason: ReviewReason::MediumConfidence };
    }

    let reason = if result.is_failure() {
        ReviewReason::ExtractionFailed
    } else {
        ReviewReason::LowConfidence
    };
    RouteDecision::QueueWithoutDraft { reason }
}

#[cfg(test)]
mod tests {
    use crate::domain::extraction::{ExtractedItem, ExtractionResult, Intent};
    use crate::domain::review::ReviewReason;

    use super::{route, RouteDecision, RoutingThresholds};

    fn result(intent: Intent, confidence: f64) -> ExtractionResult {
        ExtractionResult {
            intent,
            items: vec![ExtractedItem {
                part_number: Some("XJ-900".to_string()),
                ..ExtractedItem::default()
            }],
            unknown_terms: Vec::new(),
            confidence,
            explanation: None,
        }
    }

    #[test]
    fn high_confidence_with_intent_auto_accepts() {
        let decision = route(&result(Intent::Sell, 0.95), RoutingThresholds::default());
        assert_eq!(decision, RouteDecision::AutoAccept);
    }

    #[test]
    fn upper_threshold_is_inclusive() {
        let decision = route(&result(Intent::Want, 0.8), RoutingThresholds::default());
        assert_eq!(decision, RouteDecision::AutoAccept);
    }

    #[test]
    fn high_confidence_unknown_intent_queues_a_draft() {
        let decision = route(&result(Intent::Unknown, 0.95), RoutingThresholds::default());
        assert_eq!(
            decision,
            RouteDecision::QueueWithDraft { reason: ReviewReason::UnknownIntent }
        );
    }

    #[test]
    fn medium_band_queues_a_draft() {
        for confidence in [0.5, 0.65, 0.79] {
            let decision = route(&result(Intent::Sell, confidence), RoutingThresholds::default());
            assert_eq!(
                decision,
                RouteDecision::QueueWithDraft { reason: ReviewReason::MediumConfidence }
            );
        }
    }

    #[test]
    fn low_confidence_queues_without_a_draft() {
        let decision = route(&result(Intent::Sell, 0.3), RoutingThresholds::default());
        assert_eq!(
            decision,
            RouteDecision::QueueWithoutDraft { reason: ReviewReason::LowConfidence }
        );
    }

    #[test]
    fn failed_extraction_is_tagged_as_such() {
        let failed = ExtractionResult::failed("model timed out");
        let decision = route(&failed, RoutingThresholds::default());
        assert_eq!(
            decision,
            RouteDecision::QueueWithoutDraft { reason: ReviewReason::ExtractionFailed }
        );
    }

    #[test]
    fn custom_thresholds_shift_the_bands() {
        let thresholds = RoutingThresholds { upper: 0.5, lower: 0.2 };
        assert_eq!(route(&result(Intent::Sell, 0.5), thresholds), RouteDecision::AutoAccept);
        assert_eq!(
            route(&result(Intent::Sell, 0.3), thresholds),
            RouteDecision::QueueWithDraft { reason: ReviewReason::MediumConfidence }
        );
    }
}
