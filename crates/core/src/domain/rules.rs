use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::extraction::Intent;
use crate::domain::listing::Listing;
use crate::domain::reference::CategoryId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationRuleId(pub String);

/// Criteria parsed out of the user's natural-language rule text. All
/// fields are optional; an empty criteria set matches every active
/// listing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleCriteria {
    pub intent: Option<Intent>,
    pub keywords: Vec<String>,
    pub category_ids: Vec<CategoryId>,
    pub price_min: Option<Decimal>,
    pub price_max: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationRule {
    pub id: NotificationRuleId,
    pub owner: String,
    pub rule_text: String,
    pub criteria: RuleCriteria,
    pub channel_endpoint: String,
    pub active: bool,
    pub last_triggered: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NotificationRule {
    /// Whether this rule matches a newly active listing. Intent must be
    /// unset or equal; price bounds (if set) must bracket the listing
    /// price; keywords and category ids must overlap when present.
    pub fn matches(&self, listing: &Listing, category_name: Option<&str>) -> bool {
        if !self.active {
            return false;
        }

        if let Some(intent) = self.criteria.intent {
            if intent != listing.intent {
                return false;
            }
        }

        if self.criteria.price_min.is_some() || self.criteria.price_max.is_some() {
            let Some(price) = listing.price else {
                return false;
            };
            if self.criteria.price_min.is_some_and(|min| price < min) {
                return false;
            }
            if self.criteria.price_max.is_some_and(|max| price > max) {
                return false;
            }
        }

        if !self.criteria.keywords.is_empty()
            && !keywords_overlap(&self.criteria.keywords, listing, category_name)
        {
            return false;
        }

        if !self.criteria.category_ids.is_empty() {
            let Some(category_id) = &listing.category_id else {
                return false;
            };
            if !self.criteria.category_ids.contains(category_id) {
                return false;
            }
        }

        true
    }
}

fn keywords_overlap(keywords: &[String], listing: &Listing, category_name: Option<&str>) -> bool {
    let haystack = [
        listing.part_number.as_deref(),
        listing.description.as_deref(),
        category_name,
    ]
    .into_iter()
    .flatten()
    .map(str::to_ascii_lowercase)
    .collect::<Vec<_>>()
    .join(" ");

    keywords.iter().any(|keyword| haystack.contains(&keyword.trim().to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::extraction::Intent;
    use crate::domain::listing::{Listing, ListingId, ListingStatus};
    use crate::domain::message::MessageId;

    use super::{NotificationRule, NotificationRuleId, RuleCriteria};

    fn listing(price: i64) -> Listing {
        Listing {
            id: ListingId("L-1".to_string()),
            message_id: MessageId("M-1".to_string()),
            sender_name: "Surplus Depot".to_string(),
            sender_phone: None,
            intent: Intent::Sell,
            status: ListingStatus::Active,
            part_number: Some("316-SS-PIPE".to_string()),
            description: Some("316 SS pipe, schedule 40".to_string()),
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

    fn rule(criteria: RuleCriteria) -> NotificationRule {
        NotificationRule {
            id: NotificationRuleId("R-1".to_string()),
            owner: "buyer-12".to_string(),
            rule_text: "SS pipe under $15/ft".to_string(),
            criteria,
            channel_endpoint: "https://hooks.example.com/buyer-12".to_string(),
            active: true,
            last_triggered: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn price_bounds_bracket_the_listing_price() {
        let rule = rule(RuleCriteria {
            price_min: Some(Decimal::new(100, 0)),
            price_max: Some(Decimal::new(500, 0)),
            ..RuleCriteria::default()
        });

        assert!(rule.matches(&listing(300), None));
        assert!(!rule.matches(&listing(50), None));
        assert!(!rule.matches(&listing(600), None));
    }

    #[test]
    fn keyword_overlap_is_case_insensitive_across_fields() {
        let rule = rule(RuleCriteria {
            keywords: vec!["ss".to_string(), "pipe".to_string()],
            ..RuleCriteria::default()
        });

        assert!(rule.matches(&listing(300), None));
    }

    #[test]
    fn intent_mismatch_blocks_the_rule() {
        let rule = rule(RuleCriteria { intent: Some(Intent::Want), ..RuleCriteria::default() });
        assert!(!rule.matches(&listing(300), None));
    }

    #[test]
    fn inactive_rule_never_matches() {
        let mut rule = rule(RuleCriteria::default());
        rule.active = false;
        assert!(!rule.matches(&listing(300), None));
    }

    #[test]
    fn priced_rule_skips_unpriced_listings() {
        let rule = rule(RuleCriteria {
            price_max: Some(Decimal::new(500, 0)),
            ..RuleCriteria::default()
        });
        let mut unpriced = listing(300);
        unpriced.price = None;

        assert!(!rule.matches(&unpriced, None));
    }
}
