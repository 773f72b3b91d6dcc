//! Broker (C4) persistence: a durable FIFO with at-least-once delivery.
//! Claiming a row and acknowledging it are separate statements so a worker
//! crash between them leaves the row visible again once `visible_after`
//! elapses, rather than losing the job.

use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, Pool, Sqlite};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{QueueEntry, QueueKind};

#[derive(FromRow)]
struct QueueRow {
    entry_id: String,
    kind: String,
    task_id: String,
    payload: String,
    enqueued_at: DateTime<Utc>,
    claimed_at: Option<DateTime<Utc>>,
    claimed_by: Option<String>,
    attempts: i64,
    visible_after: DateTime<Utc>,
}

fn kind_to_str(kind: QueueKind) -> &'static str {
    match kind {
        QueueKind::Processing => "processing",
        QueueKind::Cleanup => "cleanup",
    }
}

impl QueueRow {
    fn into_entry(self) -> Result<QueueEntry, AppError> {
        let kind = match self.kind.as_str() {
            "processing" => QueueKind::Processing,
            "cleanup" => QueueKind::Cleanup,
            other => return Err(AppError::internal(format!("unknown queue kind '{other}'"))),
        };

        Ok(QueueEntry {
            entry_id: Uuid::parse_str(&self.entry_id)
                .map_err(|e| AppError::internal(format!("corrupt entry_id: {e}")))?,
            kind,
            task_id: Uuid::parse_str(&self.task_id)
                .map_err(|e| AppError::internal(format!("corrupt task_id: {e}")))?,
            payload: serde_json::from_str(&self.payload)
                .map_err(|e| AppError::internal(format!("corrupt queue payload: {e}")))?,
            enqueued_at: self.enqueued_at,
            claimed_at: self.claimed_at,
            claimed_by: self.claimed_by,
            attempts: self.attempts as i32,
            visible_after: self.visible_after,
        })
    }
}

#[derive(Clone)]
pub struct QueueRepository {
    pool: Pool<Sqlite>,
}

impl QueueRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn enqueue(
        &self,
        kind: QueueKind,
        task_id: Uuid,
        payload: serde_json::Value,
    ) -> Result<Uuid, AppError> {
        let entry_id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO queue_entries (
                entry_id, kind, task_id, payload, enqueued_at, claimed_at, claimed_by,
                attempts, visible_after
            ) VALUES (?, ?, ?, ?, ?, NULL, NULL, 0, ?)
            "#,
        )
        .bind(entry_id.to_string())
        .bind(kind_to_str(kind))
        .bind(task_id.to_string())
        .bind(serde_json::to_string(&payload).unwrap_or_default())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(entry_id)
    }

    /// Claims the oldest visible entry of `kind` by marking it claimed and
    /// pushing its visibility out by `visibility_timeout`, atomically via a
    /// transaction so two pollers never claim the same row.
    pub async fn claim_next(
        &self,
        kind: QueueKind,
        worker_id: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<QueueEntry>, AppError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let row = sqlx::query_as::<_, QueueRow>(
            r#"
            SELECT * FROM queue_entries
            WHERE kind = ? AND visible_after <= ?
            ORDER BY enqueued_at ASC
            LIMIT 1
            "#,
        )
        .bind(kind_to_str(kind))
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let next_visible = now + visibility_timeout;
        sqlx::query(
            r#"
            UPDATE queue_entries SET
                claimed_at = ?, claimed_by = ?, attempts = attempts + 1, visible_after = ?
            WHERE entry_id = ?
            "#,
        )
        .bind(now)
        .bind(worker_id)
        .bind(next_visible)
        .bind(&row.entry_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut entry = row.into_entry()?;
        entry.claimed_at = Some(now);
        entry.claimed_by = Some(worker_id.to_string());
        entry.visible_after = next_visible;
        Ok(Some(entry))
    }

    pub async fn ack(&self, entry_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM queue_entries WHERE entry_id = ?")
            .bind(entry_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Makes the entry immediately visible again for another claim, used
    /// when a job fails in a recoverable way.
    pub async fn release(&self, entry_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE queue_entries SET claimed_at = NULL, claimed_by = NULL, visible_after = ? WHERE entry_id = ?",
        )
        .bind(Utc::now())
        .bind(entry_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Counts entries of `kind` still outstanding (claimed or not), for the
    /// Intake API's backpressure check (§5 "the broker bounds in-flight
    /// work ... new submissions return 503 with Retry-After").
    pub async fn depth(&self, kind: QueueKind) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM queue_entries WHERE kind = ?")
            .bind(kind_to_str(kind))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
