//! Outbox task records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::ledger::LedgerError;

pub const TASK_SEND_VERIFY_EMAIL: &str = "task:send_verify_email";

pub const QUEUE_CRITICAL: &str = "critical";
pub const QUEUE_DEFAULT: &str = "default";

/// A side effect to persist in the same transaction as the write that
/// caused it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxTask {
    pub task_type: String,
    pub queue: String,
    /// JSON-encoded payload
    pub payload: String,
}

impl OutboxTask {
    pub fn new<P: Serialize>(task_type: &str, queue: &str, payload: &P) -> Result<Self, LedgerError> {
        Ok(Self {
            task_type: task_type.to_string(),
            queue: queue.to_string(),
            payload: serde_json::to_string(payload)?,
        })
    }

    pub fn send_verify_email(username: &str) -> Result<Self, LedgerError> {
        Self::new(
            TASK_SEND_VERIFY_EMAIL,
            QUEUE_CRITICAL,
            &PayloadSendVerifyEmail {
                username: username.to_string(),
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSendVerifyEmail {
    pub username: String,
}

/// Committed, not yet delivered outbox row
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PendingTask {
    pub id: i64,
    pub task_type: String,
    pub queue: String,
    pub payload: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingTask {
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, LedgerError> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}
