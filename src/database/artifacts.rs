//! Artifact metadata persistence, backing the published-file rows the
//! Artifact Store (C1) hands out download tokens for.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::Artifact;

#[derive(Clone)]
pub struct ArtifactRepository {
    pool: Pool<Sqlite>,
}

impl ArtifactRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, artifact: &Artifact) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO artifacts (
                artifact_id, task_id, kind, path, size_bytes, content_type, created_at, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(artifact.artifact_id.to_string())
        .bind(artifact.task_id.to_string())
        .bind(serde_json::to_string(&artifact.kind).unwrap_or_default())
        .bind(&artifact.path)
        .bind(artifact.size_bytes)
        .bind(&artifact.content_type)
        .bind(artifact.created_at)
        .bind(artifact.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, artifact_id: Uuid) -> Result<Option<Artifact>, AppError> {
        let row = sqlx::query_as::<_, ArtifactRow>("SELECT * FROM artifacts WHERE artifact_id = ?")
            .bind(artifact_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(ArtifactRow::into_artifact).transpose()
    }

    pub async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<Artifact>, AppError> {
        let rows =
            sqlx::query_as::<_, ArtifactRow>("SELECT * FROM artifacts WHERE task_id = ?")
                .bind(task_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(ArtifactRow::into_artifact).collect()
    }

    /// Looks up the row behind a published `path`, for the direct
    /// `/download/{filename}` route (§6) which has no token to resolve.
    pub async fn find_by_path(&self, path: &str) -> Result<Option<Artifact>, AppError> {
        let row = sqlx::query_as::<_, ArtifactRow>("SELECT * FROM artifacts WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ArtifactRow::into_artifact).transpose()
    }

    pub async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Artifact>, AppError> {
        let rows =
            sqlx::query_as::<_, ArtifactRow>("SELECT * FROM artifacts WHERE expires_at <= ?")
                .bind(now)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(ArtifactRow::into_artifact).collect()
    }

    pub async fn delete(&self, artifact_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM artifacts WHERE artifact_id = ?")
            .bind(artifact_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ArtifactRow {
    artifact_id: String,
    task_id: String,
    kind: String,
    path: String,
    size_bytes: i64,
    content_type: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl ArtifactRow {
    fn into_artifact(self) -> Result<Artifact, AppError> {
        Ok(Artifact {
            artifact_id: Uuid::parse_str(&self.artifact_id)
                .map_err(|e| AppError::internal(format!("corrupt artifact_id: {e}")))?,
            task_id: Uuid::parse_str(&self.task_id)
                .map_err(|e| AppError::internal(format!("corrupt task_id: {e}")))?,
            kind: serde_json::from_str(&self.kind)
                .map_err(|e| AppError::internal(format!("corrupt artifact kind: {e}")))?,
            path: self.path,
            size_bytes: self.size_bytes,
            content_type: self.content_type,
            created_at: self.created_at,
            expires_at: self.expires_at,
        })
    }
}
