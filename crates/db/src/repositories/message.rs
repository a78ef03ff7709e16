use sqlx::{sqlite::SqliteRow, Row};

use tradepost_core::domain::message::{Conversation, ConversationId, MessageId, RawMessage};
use tradepost_core::domain::task::PipelineTask;

use super::{parse_json, parse_timestamp, to_json, MessageRepository, RepositoryError};
use crate::DbPool;

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageRepository for SqlMessageRepository {
    async fn find_by_id(&self, id: &MessageId) -> Result<Option<RawMessage>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                external_id,
                conversation_id,
                sender_id,
                sender_name,
                sender_phone,
                body,
                media_url,
                media_mime_type,
                media_local_path,
                quoted_external_id,
                forwarded,
                sent_at,
                processed,
                processing_error,
                embedding_json,
                created_at
             FROM raw_message
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(message_from_row).transpose()
    }

    async fn find_conversation_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, external_id, display_name, created_at
             FROM conversation
             WHERE external_id = ?",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(conversation_from_row).transpose()
    }

    async fn archive(
        &self,
        message: RawMessage,
        conversation: Conversation,
        task: PipelineTask,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO conversation (id, external_id, display_name, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(external_id) DO NOTHING",
        )
        .bind(&conversation.id.0)
        .bind(&conversation.external_id)
        .bind(conversation.display_name.as_deref())
        .bind(conversation.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        // A concurrent archive may have created the conversation first;
        // the message row must point at the winning id.
        let conversation_id = sqlx::query("SELECT id FROM conversation WHERE external_id = ?")
            .bind(&conversation.external_id)
            .fetch_one(&mut *tx)
            .await?
            .get::<String, _>("id");

        let embedding_json = message
            .embedding
            .as_ref()
            .map(|embedding| to_json("embedding_json", embedding))
            .transpose()?;

        let inserted = sqlx::query(
            "INSERT INTO raw_message (
                id,
                external_id,
                conversation_id,
                sender_id,
                sender_name,
                sender_phone,
                body,
                media_url,
                media_mime_type,
                media_local_path,
                quoted_external_id,
                forwarded,
                sent_at,
                processed,
                processing_error,
                embedding_json,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(external_id) DO NOTHING",
        )
        .bind(&message.id.0)
        .bind(&message.external_id)
        .bind(&conversation_id)
        .bind(&message.sender_id)
        .bind(&message.sender_name)
        .bind(message.sender_phone.as_deref())
        .bind(&message.body)
        .bind(message.media_url.as_deref())
        .bind(message.media_mime_type.as_deref())
        .bind(message.media_local_path.as_deref())
        .bind(message.quoted_external_id.as_deref())
        .bind(message.forwarded)
        .bind(message.sent_at.to_rfc3339())
        .bind(message.processed)
        .bind(message.processing_error.as_deref())
        .bind(embedding_json.as_deref())
        .bind(message.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO pipeline_task (
                id,
                kind,
                message_id,
                state,
                attempts,
                max_attempts,
                last_error,
                claimed_by,
                claimed_at,
                run_after,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&task.id.0)
        .bind(task.kind.as_str())
        .bind(&task.message_id.0)
        .bind(task.state.as_str())
        .bind(i64::from(task.attempts))
        .bind(i64::from(task.max_attempts))
        .bind(task.last_error.as_deref())
        .bind(task.claimed_by.as_deref())
        .bind(task.claimed_at.map(|value| value.to_rfc3339()))
        .bind(task.run_after.to_rfc3339())
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn mark_processed(
        &self,
        id: &MessageId,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE raw_message SET processed = 1, processing_error = ? WHERE id = ?")
            .bind(error)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_embedding(
        &self,
        id: &MessageId,
        embedding: &[f32],
    ) -> Result<(), RepositoryError> {
        let embedding_json = to_json("embedding_json", &embedding)?;

        sqlx::query("UPDATE raw_message SET embedding_json = ? WHERE id = ?")
            .bind(embedding_json)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn message_from_row(row: SqliteRow) -> Result<RawMessage, RepositoryError> {
    let embedding = row
        .try_get::<Option<String>, _>("embedding_json")?
        .map(|raw| parse_json::<Vec<f32>>("embedding_json", &raw))
        .transpose()?;

    Ok(RawMessage {
        id: MessageId(row.try_get("id")?),
        external_id: row.try_get("external_id")?,
        conversation_id: ConversationId(row.try_get("conversation_id")?),
        sender_id: row.try_get("sender_id")?,
        sender_name: row.try_get("sender_name")?,
        sender_phone: row.try_get("sender_phone")?,
        body: row.try_get("body")?,
        media_url: row.try_get("media_url")?,
        media_mime_type: row.try_get("media_mime_type")?,
        media_local_path: row.try_get("media_local_path")?,
        quoted_external_id: row.try_get("quoted_external_id")?,
        forwarded: row.try_get("forwarded")?,
        sent_at: parse_timestamp("sent_at", row.try_get("sent_at")?)?,
        processed: row.try_get("processed")?,
        processing_error: row.try_get("processing_error")?,
        embedding,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn conversation_from_row(row: SqliteRow) -> Result<Conversation, RepositoryError> {
    Ok(Conversation {
        id: ConversationId(row.try_get("id")?),
        external_id: row.try_get("external_id")?,
        display_name: row.try_get("display_name")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
