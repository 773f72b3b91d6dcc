//! Task Registry (C3) persistence: one row per Task Record, owned for writes
//! by whichever worker currently holds the job.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Sqlite};
use uuid::Uuid;

use crate::errors::{AppError, RepositoryError};
use crate::models::task::{InitialRequest, Progress, SourceMetadata, TaskError, TaskResult};
use crate::models::{Task, TaskState, UserChoices};

#[derive(FromRow)]
struct TaskRow {
    task_id: String,
    state: String,
    initial_request: String,
    user_choices: String,
    source_metadata: Option<String>,
    progress: String,
    result: Option<String>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    artifact_expires_at: Option<DateTime<Utc>>,
}

fn state_to_str(state: TaskState) -> &'static str {
    match state {
        TaskState::Pending => "pending",
        TaskState::Progress => "progress",
        TaskState::Success => "success",
        TaskState::Failure => "failure",
    }
}

fn state_from_str(s: &str) -> Result<TaskState, AppError> {
    match s {
        "pending" => Ok(TaskState::Pending),
        "progress" => Ok(TaskState::Progress),
        "success" => Ok(TaskState::Success),
        "failure" => Ok(TaskState::Failure),
        other => Err(AppError::Repository(RepositoryError::query_failed(
            "tasks.state",
            format!("unknown task state '{other}'"),
        ))),
    }
}

impl TaskRow {
    fn into_task(self) -> Result<Task, AppError> {
        Ok(Task {
            task_id: Uuid::parse_str(&self.task_id)
                .map_err(|e| AppError::internal(format!("corrupt task_id: {e}")))?,
            state: state_from_str(&self.state)?,
            initial_request: serde_json::from_str::<InitialRequest>(&self.initial_request)
                .map_err(RepositoryError::SerializationFailed)?,
            user_choices: serde_json::from_str::<UserChoices>(&self.user_choices)
                .map_err(RepositoryError::SerializationFailed)?,
            source_metadata: self
                .source_metadata
                .map(|raw| serde_json::from_str::<SourceMetadata>(&raw))
                .transpose()
                .map_err(RepositoryError::SerializationFailed)?,
            progress: serde_json::from_str::<Progress>(&self.progress)
                .map_err(RepositoryError::SerializationFailed)?,
            result: self
                .result
                .map(|raw| serde_json::from_str::<TaskResult>(&raw))
                .transpose()
                .map_err(RepositoryError::SerializationFailed)?,
            error: self
                .error
                .map(|raw| serde_json::from_str::<TaskError>(&raw))
                .transpose()
                .map_err(RepositoryError::SerializationFailed)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_at: self.expires_at,
            artifact_expires_at: self.artifact_expires_at,
        })
    }
}

#[derive(Clone)]
pub struct TaskRepository {
    pool: Pool<Sqlite>,
}

impl TaskRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, task: &Task) -> Result<(), AppError> {
        let initial_request = serde_json::to_string(&task.initial_request)
            .map_err(RepositoryError::SerializationFailed)?;
        let user_choices = serde_json::to_string(&task.user_choices)
            .map_err(RepositoryError::SerializationFailed)?;
        let progress =
            serde_json::to_string(&task.progress).map_err(RepositoryError::SerializationFailed)?;

        sqlx::query(
            r#"
            INSERT INTO tasks (
                task_id, state, initial_request, user_choices, source_metadata,
                progress, result, error, created_at, updated_at, expires_at, artifact_expires_at
            ) VALUES (?, ?, ?, ?, NULL, ?, NULL, NULL, ?, ?, ?, NULL)
            "#,
        )
        .bind(task.task_id.to_string())
        .bind(state_to_str(task.state))
        .bind(initial_request)
        .bind(user_choices)
        .bind(progress)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, task_id: Uuid) -> Result<Option<Task>, AppError> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE task_id = ?")
            .bind(task_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TaskRow::into_task).transpose()
    }

    /// Persists a full snapshot of the task (state, progress, source
    /// metadata, result/error) in one write. Callers are responsible for the
    /// single-writer discipline; this method does not itself serialize
    /// concurrent writers.
    pub async fn save(&self, task: &Task) -> Result<(), AppError> {
        let source_metadata = task
            .source_metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(RepositoryError::SerializationFailed)?;
        let progress =
            serde_json::to_string(&task.progress).map_err(RepositoryError::SerializationFailed)?;
        let result = task
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(RepositoryError::SerializationFailed)?;
        let error = task
            .error
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(RepositoryError::SerializationFailed)?;

        sqlx::query(
            r#"
            UPDATE tasks SET
                state = ?, source_metadata = ?, progress = ?, result = ?, error = ?,
                updated_at = ?, artifact_expires_at = ?
            WHERE task_id = ?
            "#,
        )
        .bind(state_to_str(task.state))
        .bind(source_metadata)
        .bind(progress)
        .bind(result)
        .bind(error)
        .bind(task.updated_at)
        .bind(task.artifact_expires_at)
        .bind(task.task_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Tasks whose `expires_at` has passed; the Scheduler reaps these rows
    /// along with any artifacts they still reference.
    pub async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Task>, AppError> {
        let rows = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE expires_at <= ?")
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TaskRow::into_task).collect()
    }

    pub async fn delete(&self, task_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM tasks WHERE task_id = ?")
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
