use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::listing::Listing;

/// Identity of an offer independent of which conversation it was posted
/// in: the sender, the part, and the asking price. Two listings with the
/// same signature but different source messages are cross-posts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossPostSignature {
    pub sender_name: String,
    pub sender_phone: Option<String>,
    pub part_number: String,
    pub price: Option<String>,
}

impl CrossPostSignature {
    /// `None` when the listing has no part number; unidentified items are
    /// never treated as cross-posts.
    pub fn of(listing: &Listing) -> Option<Self> {
        let part_number = listing.part_number.as_deref()?.trim();
        if part_number.is_empty() {
            return None;
        }

        Some(Self {
            sender_name: listing.sender_name.trim().to_ascii_lowercase(),
            sender_phone: listing
                .sender_phone
                .as_deref()
                .map(str::trim)
                .filter(|phone| !phone.is_empty())
                .map(str::to_string),
            part_number: part_number.to_ascii_lowercase(),
            price: listing.price.as_ref().map(Decimal::normalize).map(|p| p.to_string()),
        })
    }

    /// Part and price must agree exactly; the sender matches when either
    /// the name or the phone agrees, so a listing missing one of the two
    /// still pairs with its cross-post.
    pub fn matches(&self, other: &Listing) -> bool {
        let Some(other) = CrossPostSignature::of(other) else {
            return false;
        };

        if other.part_number != self.part_number || other.price != self.price {
            return false;
        }

        let name_match = !self.sender_name.is_empty() && other.sender_name == self.sender_name;
        let phone_match = match (&self.sender_phone, &other.sender_phone) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => false,
        };
        name_match || phone_match
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::extraction::Intent;
    use crate::domain::listing::{Listing, ListingId, ListingStatus};
    use crate::domain::message::MessageId;

    use super::CrossPostSignature;

    fn listing(id: &str, message: &str, part: Option<&str>, price: Option<Decimal>) -> Listing {
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
            price,
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

    #[test]
    fn same_sender_part_and_price_is_a_cross_post() {
        let a = listing("L-1", "M-1", Some("XJ-900"), Some(Decimal::new(1200, 0)));
        let b = listing("L-2", "M-2", Some("xj-900"), Some(Decimal::new(12000, 1)));

        let signature = CrossPostSignature::of(&a).unwrap();
        assert!(signature.matches(&b));
    }

    #[test]
    fn different_price_is_not_a_cross_post() {
        let a = listing("L-1", "M-1", Some("XJ-900"), Some(Decimal::new(1200, 0)));
        let b = listing("L-2", "M-2", Some("XJ-900"), Some(Decimal::new(1300, 0)));

        assert!(!CrossPostSignature::of(&a).unwrap().matches(&b));
    }

    #[test]
    fn missing_part_number_has_no_signature() {
        let unidentified = listing("L-1", "M-1", None, Some(Decimal::new(1200, 0)));
        assert!(CrossPostSignature::of(&unidentified).is_none());
    }

    #[test]
    fn name_match_survives_a_missing_phone_on_one_side() {
        let with_phone = listing("L-1", "M-1", Some("XJ-900"), None);
        let mut without_phone = listing("L-2", "M-2", Some("XJ-900"), None);
        without_phone.sender_phone = None;
        without_phone.sender_name = "acme surplus".to_string();

        assert!(CrossPostSignature::of(&with_phone).unwrap().matches(&without_phone));
        assert!(CrossPostSignature::of(&without_phone).unwrap().matches(&with_phone));
    }

    #[test]
    fn phone_match_survives_a_renamed_sender() {
        let a = listing("L-1", "M-1", Some("XJ-900"), None);
        let mut renamed = listing("L-2", "M-2", Some("XJ-900"), None);
        renamed.sender_name = "Dale's Industrial".to_string();

        assert!(CrossPostSignature::of(&a).unwrap().matches(&renamed));
    }

    #[test]
    fn neither_name_nor_phone_agreeing_is_not_a_cross_post() {
        let a = listing("L-1", "M-1", Some("XJ-900"), None);
        let mut other = listing("L-2", "M-2", Some("XJ-900"), None);
        other.sender_name = "Dale's Industrial".to_string();
        other.sender_phone = Some("+15550009999".to_string());

        assert!(!CrossPostSignature::of(&a).unwrap().matches(&other));
    }
}
