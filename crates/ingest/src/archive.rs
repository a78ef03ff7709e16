use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use tradepost_core::domain::message::{Conversation, ConversationId, MessageId, RawMessage};
use tradepost_core::domain::task::{PipelineTask, PipelineTaskId, TaskKind};
use tradepost_core::ApplicationError;
use tradepost_db::repositories::MessageRepository;

use crate::webhook::InboundMessage;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Archived { message_id: MessageId },
    AlreadyArchived,
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media transport failed: {0}")]
    Transport(String),
    #[error("media endpoint returned status {status}")]
    Status { status: u16 },
    #[error("could not write media file: {0}")]
    Io(#[from] std::io::Error),
}

/// Media download seam. Failure never fails archival; the message is
/// stored with `media_local_path` left null.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(
        &self,
        message_id: &MessageId,
        url: &str,
        mime_type: Option<&str>,
    ) -> Result<Option<String>, MediaError>;
}

/// Used when media fetching is disabled in config.
#[derive(Default)]
pub struct NoopMediaFetcher;

#[async_trait]
impl MediaFetcher for NoopMediaFetcher {
    async fn fetch(
        &self,
        _message_id: &MessageId,
        _url: &str,
        _mime_type: Option<&str>,
    ) -> Result<Option<String>, MediaError> {
        Ok(None)
    }
}

pub struct HttpMediaFetcher {
    http: reqwest::Client,
    media_dir: PathBuf,
}

impl HttpMediaFetcher {
    pub fn new(media_dir: PathBuf, timeout_secs: u64) -> Result<Self, MediaError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|error| MediaError::Transport(error.to_string()))?;
        Ok(Self { http, media_dir })
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(
        &self,
        message_id: &MessageId,
        url: &str,
        mime_type: Option<&str>,
    ) -> Result<Option<String>, MediaError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|error| MediaError::Transport(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::Status { status: status.as_u16() });
        }
        let bytes =
            response.bytes().await.map_err(|error| MediaError::Transport(error.to_string()))?;

        tokio::fs::create_dir_all(&self.media_dir).await?;
        let path = self.media_dir.join(file_name(message_id, mime_type));
        tokio::fs::write(&path, &bytes).await?;

        Ok(Some(path.to_string_lossy().into_owned()))
    }
}

fn file_name(message_id: &MessageId, mime_type: Option<&str>) -> String {
    match mime_type.and_then(|mime| mime.split('/').nth(1)).filter(|sub| !sub.is_empty()) {
        Some(subtype) => format!("{}.{subtype}", message_id.0),
        None => message_id.0.clone(),
    }
}

/// Idempotent intake: validates the normalized record, resolves or
/// creates the conversation, fetches media best-effort, and commits the
/// message together with its pipeline task in one transaction.
pub struct MessageArchive {
    messages: Arc<dyn MessageRepository>,
    media: Arc<dyn MediaFetcher>,
    max_task_attempts: u32,
}

impl MessageArchive {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        media: Arc<dyn MediaFetcher>,
        max_task_attempts: u32,
    ) -> Self {
        Self { messages, media, max_task_attempts }
    }

    pub async fn archive(
        &self,
        inbound: InboundMessage,
    ) -> Result<ArchiveOutcome, ApplicationError> {
        inbound.validate()?;

        let conversation = match self
            .messages
            .find_conversation_by_external_id(&inbound.conversation_external_id)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?
        {
            Some(existing) => existing,
            None => Conversation {
                id: ConversationId(Uuid::new_v4().to_string()),
                external_id: inbound.conversation_external_id.clone(),
                display_name: inbound.conversation_display_name.clone(),
                created_at: Utc::now(),
            },
        };

        let message_id = MessageId(Uuid::new_v4().to_string());
        let media_local_path = match &inbound.media_url {
            Some(url) => match self.media.fetch(&message_id, url, inbound.media_mime_type.as_deref()).await {
                Ok(path) => path,
                Err(error) => {
                    warn!(
                        event_name = "ingest.media_fetch_failed",
                        external_id = %inbound.external_id,
                        error = %error,
                        "media fetch failed; archiving without a local copy"
                    );
                    None
                }
            },
            None => None,
        };

        let message = RawMessage {
            id: message_id.clone(),
            external_id: inbound.external_id.clone(),
            conversation_id: conversation.id.clone(),
            sender_id: inbound.sender_id,
            sender_name: inbound.sender_name,
            sender_phone: inbound.sender_phone,
            body: inbound.body,
            media_url: inbound.media_url,
            media_mime_type: inbound.media_mime_type,
            media_local_path,
            quoted_external_id: inbound.quoted_external_id,
            forwarded: inbound.forwarded,
            sent_at: inbound.sent_at,
            processed: false,
            processing_error: None,
            embedding: None,
            created_at: Utc::now(),
        };
        let task = PipelineTask::enqueue(
            PipelineTaskId(Uuid::new_v4().to_string()),
            TaskKind::ExtractMessage,
            message_id.clone(),
            self.max_task_attempts,
        );

        let stored = self
            .messages
            .archive(message, conversation, task)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

        if stored {
            info!(
                event_name = "ingest.message_archived",
                external_id = %inbound.external_id,
                message_id = %message_id.0,
                "archived inbound message"
            );
            Ok(ArchiveOutcome::Archived { message_id })
        } else {
            info!(
                event_name = "ingest.duplicate_ignored",
                external_id = %inbound.external_id,
                "external id already archived; ignoring duplicate"
            );
            Ok(ArchiveOutcome::AlreadyArchived)
        }
    }
}
