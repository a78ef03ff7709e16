use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use tradepost_core::domain::rules::NotificationRule;
use tradepost_core::Listing;
use tradepost_db::repositories::{NotificationRuleRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("notification transport failed: {0}")]
    Transport(String),
    #[error("notification endpoint returned status {status}")]
    Status { status: u16 },
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, rule: &NotificationRule, listing: &Listing) -> Result<(), DispatchError>;
}

#[derive(Default)]
pub struct NoopDispatcher;

#[async_trait]
impl NotificationDispatcher for NoopDispatcher {
    async fn send(
        &self,
        _rule: &NotificationRule,
        _listing: &Listing,
    ) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// POSTs the matched listing to the rule's channel endpoint.
pub struct WebhookDispatcher {
    http: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(timeout_secs: u64) -> Result<Self, DispatchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|error| DispatchError::Transport(error.to_string()))?;
        Ok(Self { http })
    }
}

#[derive(Serialize)]
struct NotificationPayload<'a> {
    rule_id: &'a str,
    rule_text: &'a str,
    listing: &'a Listing,
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn send(&self, rule: &NotificationRule, listing: &Listing) -> Result<(), DispatchError> {
        let payload = NotificationPayload {
            rule_id: &rule.id.0,
            rule_text: &rule.rule_text,
            listing,
        };

        let response = self
            .http
            .post(&rule.channel_endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|error| DispatchError::Transport(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Status { status: status.as_u16() });
        }
        Ok(())
    }
}

/// Evaluates every active rule against a listing that just went active.
/// Dispatch failures are logged and swallowed; a broken endpoint must
/// never roll back listing creation.
pub struct NotificationMatcher {
    rules: Arc<dyn NotificationRuleRepository>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl NotificationMatcher {
    pub fn new(
        rules: Arc<dyn NotificationRuleRepository>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self { rules, dispatcher }
    }

    /// Returns how many rules were dispatched. `category_name` is the
    /// resolved name of the listing's category, if it has one, for
    /// keyword matching.
    pub async fn notify_matches(
        &self,
        listing: &Listing,
        category_name: Option<&str>,
    ) -> Result<u32, RepositoryError> {
        let mut dispatched = 0;
        for rule in self.rules.list_active().await? {
            if !rule.matches(listing, category_name) {
                continue;
            }

            match self.dispatcher.send(&rule, listing).await {
                Ok(()) => {
                    self.rules.touch_last_triggered(&rule.id, Utc::now()).await?;
                    dispatched += 1;
                    info!(
                        event_name = "pipeline.notification_dispatched",
                        rule_id = %rule.id.0,
                        listing_id = %listing.id.0,
                        "dispatched notification"
                    );
                }
                Err(error) => {
                    warn!(
                        event_name = "pipeline.notification_failed",
                        rule_id = %rule.id.0,
                        listing_id = %listing.id.0,
                        error = %error,
                        "notification dispatch failed; continuing"
                    );
                }
            }
        }
        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tokio::sync::Mutex;

    use tradepost_core::domain::rules::{NotificationRule, NotificationRuleId, RuleCriteria};
    use tradepost_core::{Intent, Listing, ListingId, ListingStatus, MessageId};
    use tradepost_db::repositories::{
        InMemoryNotificationRuleRepository, NotificationRuleRepository,
    };

    use super::{DispatchError, NotificationDispatcher, NotificationMatcher};

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationDispatcher for RecordingDispatcher {
        async fn send(
            &self,
            rule: &NotificationRule,
            _listing: &Listing,
        ) -> Result<(), DispatchError> {
            if self.fail {
                return Err(DispatchError::Status { status: 500 });
            }
            self.sent.lock().await.push(rule.id.0.clone());
            Ok(())
        }
    }

    fn listing() -> Listing {
        Listing {
            id: ListingId("L-1".to_string()),
            message_id: MessageId("M-1".to_string()),
            sender_name: "Dale".to_string(),
            sender_phone: None,
            intent: Intent::Sell,
            status: ListingStatus::Active,
            part_number: Some("316-SS-2IN".to_string()),
            description: Some("316 SS pipe, 500ft".to_string()),
            quantity: Some(Decimal::new(500, 0)),
            price: Some(Decimal::new(12, 0)),
            currency: Some("USD".to_string()),
            total_price: Some(Decimal::new(6000, 0)),
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

    fn rule(id: &str, criteria: RuleCriteria) -> NotificationRule {
        NotificationRule {
            id: NotificationRuleId(id.to_string()),
            owner: "buyer-3".to_string(),
            rule_text: "SS pipe under $15/ft".to_string(),
            criteria,
            channel_endpoint: "https://hooks.example/buyer-3".to_string(),
            active: true,
            last_triggered: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn matching_rule_dispatches_and_stamps_last_triggered() {
        let rules = Arc::new(InMemoryNotificationRuleRepository::default());
        rules
            .save(rule(
                "R-1",
                RuleCriteria {
                    keywords: vec!["SS".to_string(), "pipe".to_string()],
                    price_max: Some(Decimal::new(15, 0)),
                    ..RuleCriteria::default()
                },
            ))
            .await
            .expect("save rule");

        let dispatcher = Arc::new(RecordingDispatcher::default());
        let matcher = NotificationMatcher::new(rules.clone(), dispatcher.clone());

        let dispatched = matcher.notify_matches(&listing(), None).await.expect("match");

        assert_eq!(dispatched, 1);
        assert_eq!(dispatcher.sent.lock().await.clone(), vec!["R-1"]);
        let stored = rules.list_active().await.expect("list");
        assert!(stored[0].last_triggered.is_some());
    }

    #[tokio::test]
    async fn non_matching_rule_stays_quiet() {
        let rules = Arc::new(InMemoryNotificationRuleRepository::default());
        rules
            .save(rule(
                "R-1",
                RuleCriteria { intent: Some(Intent::Want), ..RuleCriteria::default() },
            ))
            .await
            .expect("save rule");

        let dispatcher = Arc::new(RecordingDispatcher::default());
        let matcher = NotificationMatcher::new(rules, dispatcher.clone());

        let dispatched = matcher.notify_matches(&listing(), None).await.expect("match");

        assert_eq!(dispatched, 0);
        assert!(dispatcher.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn dispatch_failure_is_swallowed_and_not_counted() {
        let rules = Arc::new(InMemoryNotificationRuleRepository::default());
        rules.save(rule("R-1", RuleCriteria::default())).await.expect("save rule");

        let dispatcher = Arc::new(RecordingDispatcher { fail: true, ..Default::default() });
        let matcher = NotificationMatcher::new(rules.clone(), dispatcher);

        let dispatched = matcher.notify_matches(&listing(), None).await.expect("match");

        assert_eq!(dispatched, 0);
        let stored = rules.list_active().await.expect("list");
        assert_eq!(stored[0].last_triggered, None);
    }
}
