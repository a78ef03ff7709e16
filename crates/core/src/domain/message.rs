use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

/// Archived inbound chat message. Created once per distinct `external_id`;
/// after that only `processed`, `processing_error`, `media_local_path` and
/// `embedding` may change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: MessageId,
    pub external_id: String,
    pub conversation_id: ConversationId,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_phone: Option<String>,
    pub body: String,
    pub media_url: Option<String>,
    pub media_mime_type: Option<String>,
    pub media_local_path: Option<String>,
    pub quoted_external_id: Option<String>,
    pub forwarded: bool,
    pub sent_at: DateTime<Utc>,
    pub processed: bool,
    pub processing_error: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub external_id: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}
