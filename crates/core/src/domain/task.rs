use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::message::MessageId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineTaskId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    RetryableFailed,
    FailedTerminal,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::RetryableFailed => "retryable_failed",
            Self::FailedTerminal => "failed_terminal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "retryable_failed" => Some(Self::RetryableFailed),
            "failed_terminal" => Some(Self::FailedTerminal),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::FailedTerminal)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ExtractMessage,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtractMessage => "extract_message",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "extract_message" => Some(Self::ExtractMessage),
            _ => None,
        }
    }
}

/// Durable unit of pipeline work, enqueued in the same transaction that
/// archives its message so a crash between archive and extraction loses
/// nothing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineTask {
    pub id: PipelineTaskId,
    pub kind: TaskKind,
    pub message_id: MessageId,
    pub state: TaskState,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub run_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineTask {
    pub fn enqueue(id: PipelineTaskId, kind: TaskKind, message_id: MessageId, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            message_id,
            state: TaskState::Queued,
            attempts: 0,
            max_attempts,
            last_error: None,
            claimed_by: None,
            claimed_at: None,
            run_after: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}
