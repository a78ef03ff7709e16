use chrono::{DateTime, Utc};
use serde::Deserialize;

use tradepost_core::ApplicationError;

/// Normalized inbound record as the gateway posts it. Platform quirks
/// (WhatsApp ids, Telegram payload framing) are the gateway's problem;
/// by the time a record lands here it has this one shape.
#[derive(Clone, Debug, Deserialize)]
pub struct InboundMessage {
    pub external_id: String,
    pub conversation_external_id: String,
    pub conversation_display_name: Option<String>,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_phone: Option<String>,
    #[serde(default)]
    pub body: String,
    pub media_url: Option<String>,
    pub media_mime_type: Option<String>,
    pub quoted_external_id: Option<String>,
    #[serde(default)]
    pub forwarded: bool,
    pub sent_at: DateTime<Utc>,
}

impl InboundMessage {
    /// A record must be attributable and carry content: body text or a
    /// media attachment, either will do.
    pub fn validate(&self) -> Result<(), ApplicationError> {
        if self.external_id.trim().is_empty() {
            return Err(ApplicationError::Validation(
                "external_id must not be empty".to_string(),
            ));
        }
        if self.conversation_external_id.trim().is_empty() {
            return Err(ApplicationError::Validation(
                "conversation_external_id must not be empty".to_string(),
            ));
        }
        if self.sender_id.trim().is_empty() {
            return Err(ApplicationError::Validation("sender_id must not be empty".to_string()));
        }
        if self.body.trim().is_empty() && self.media_url.is_none() {
            return Err(ApplicationError::Validation(
                "message carries neither body text nor media".to_string(),
            ));
        }
        Ok(())
    }
}
