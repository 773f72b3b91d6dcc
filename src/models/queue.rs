//! Durable queue entries backing the Broker (C4): one row per in-flight job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "queue_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Processing,
    Cleanup,
}

/// An at-least-once delivery record. A worker claims a row by updating
/// `claimed_at`/`claimed_by` in the same transaction it reads with, so a
/// crash mid-job leaves the row claimed-but-unacked for a visibility-timeout
/// sweep to reclaim rather than losing the job.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueueEntry {
    pub entry_id: Uuid,
    pub kind: QueueKind,
    pub task_id: Uuid,
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
    pub attempts: i32,
    pub visible_after: DateTime<Utc>,
}
